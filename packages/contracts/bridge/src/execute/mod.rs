//! Execute message handlers.

mod claims;
mod gov;
mod pool;
mod registry;

pub use claims::execute_submit_claim;
pub use gov::{
    execute_airdrop, execute_set_denom_metadata, execute_set_outgoing_logic_call,
    execute_unhalt_bridge, execute_update_params, validate_params as gov_validate_params,
};
pub use pool::{execute_cancel_send_to_eth, execute_request_batch, execute_send_to_eth};
pub use registry::{
    execute_confirm_batch, execute_confirm_logic_call, execute_set_orchestrator_binding,
    execute_submit_bad_signature_evidence, execute_valset_confirm, require_orchestrator,
};
