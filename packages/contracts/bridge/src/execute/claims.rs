//! Claim submission: the bridge's oracle input.

use cosmwasm_std::{DepsMut, Env, MessageInfo, Response};

use crate::attestation::{submit_claim, Claim};
use crate::error::ContractError;
use crate::msg::HostMsg;

use super::require_orchestrator;

/// Route one orchestrator's claim into the attestation engine and fold the
/// outcome (possibly several applied events) into a single response.
pub fn execute_submit_claim(
    mut deps: DepsMut,
    env: Env,
    info: MessageInfo,
    claim: Claim,
) -> Result<Response<HostMsg>, ContractError> {
    let binding = require_orchestrator(&deps, &info)?;

    let event_nonce = claim.event_nonce();
    let kind = claim.kind();
    let outcome = submit_claim(deps.branch(), &env, &binding.valcons, claim)?;

    Ok(Response::new()
        .add_messages(outcome.messages)
        .add_events(outcome.events)
        .add_attribute("action", "submit_claim")
        .add_attribute("claim_kind", kind)
        .add_attribute("event_nonce", event_nonce.to_string())
        .add_attribute("orchestrator", info.sender))
}
