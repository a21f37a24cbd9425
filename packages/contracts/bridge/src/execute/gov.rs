//! Governance-gated handlers.
//!
//! The host chain routes passed proposals through its governance account;
//! that account is the only permitted sender here.

use cosmwasm_std::{BankMsg, DepsMut, Event, MessageInfo, Response, Uint128};

use crate::abi::str_to_fixed_bytes32;
use crate::error::ContractError;
use crate::logic_call::set_outgoing_logic_call;
use crate::msg::{AirdropRecipient, HostMsg};
use crate::state::{DenomMetadata, OutgoingLogicCall, Params, DENOM_METADATA, GOV, PARAMS};

fn require_gov(deps: &DepsMut, info: &MessageInfo) -> Result<(), ContractError> {
    let gov = GOV.load(deps.storage)?;
    if info.sender != gov {
        return Err(ContractError::Unauthorized);
    }
    Ok(())
}

/// Resume a bridge halted by an invariant violation.
pub fn execute_unhalt_bridge(
    deps: DepsMut,
    info: MessageInfo,
) -> Result<Response<HostMsg>, ContractError> {
    require_gov(&deps, &info)?;

    let mut params = PARAMS.load(deps.storage)?;
    params.bridge_active = true;
    PARAMS.save(deps.storage, &params)?;

    Ok(Response::new()
        .add_event(Event::new("bridge_unhalted").add_attribute("module", "bridge"))
        .add_attribute("action", "unhalt_bridge"))
}

/// Replace the parameter set.
pub fn execute_update_params(
    deps: DepsMut,
    info: MessageInfo,
    params: Params,
) -> Result<Response<HostMsg>, ContractError> {
    require_gov(&deps, &info)?;
    validate_params(&params)?;
    PARAMS.save(deps.storage, &params)?;
    Ok(Response::new().add_attribute("action", "update_params"))
}

pub fn validate_params(params: &Params) -> Result<(), ContractError> {
    // overlong ids would panic at checkpoint time, reject them here
    str_to_fixed_bytes32(&params.bridge_id)?;
    if params.bridge_id.is_empty() {
        return Err(ContractError::invalid("bridge_id", "empty"));
    }
    if params.batch_max_elements == 0 {
        return Err(ContractError::invalid("batch_max_elements", "zero"));
    }
    Ok(())
}

/// Distribute the attached funds over the recipients, exactly.
pub fn execute_airdrop(
    deps: DepsMut,
    info: MessageInfo,
    recipients: Vec<AirdropRecipient>,
) -> Result<Response<HostMsg>, ContractError> {
    require_gov(&deps, &info)?;

    if info.funds.len() != 1 {
        return Err(ContractError::invalid(
            "funds",
            "airdrop requires exactly one attached coin",
        ));
    }
    let pot = &info.funds[0];

    let total: Uint128 = recipients.iter().map(|r| r.amount).sum();
    if total != pot.amount {
        return Err(ContractError::invalid(
            "recipients",
            format!("amounts sum to {total}, attached {}", pot.amount),
        ));
    }

    let mut messages = Vec::with_capacity(recipients.len());
    for recipient in &recipients {
        let address = deps.api.addr_validate(&recipient.address)?;
        if recipient.amount.is_zero() {
            return Err(ContractError::invalid("recipients", "zero amount"));
        }
        messages.push(BankMsg::Send {
            to_address: address.into_string(),
            amount: vec![cosmwasm_std::Coin {
                denom: pot.denom.clone(),
                amount: recipient.amount,
            }],
        });
    }

    Ok(Response::new()
        .add_messages(messages)
        .add_event(
            Event::new("airdrop")
                .add_attribute("module", "bridge")
                .add_attribute("denom", pot.denom.clone())
                .add_attribute("recipients", recipients.len().to_string()),
        )
        .add_attribute("action", "airdrop"))
}

/// Record denom metadata so a matching `Erc20DeployedClaim` can be adopted.
pub fn execute_set_denom_metadata(
    deps: DepsMut,
    info: MessageInfo,
    metadata: DenomMetadata,
) -> Result<Response<HostMsg>, ContractError> {
    require_gov(&deps, &info)?;

    if metadata.denom.is_empty() || metadata.symbol.is_empty() {
        return Err(ContractError::invalid("metadata", "denom and symbol required"));
    }
    DENOM_METADATA.save(deps.storage, &metadata.denom.clone(), &metadata)?;

    Ok(Response::new()
        .add_attribute("action", "set_denom_metadata")
        .add_attribute("denom", metadata.denom))
}

/// Queue an arbitrary-logic invocation for signing.
pub fn execute_set_outgoing_logic_call(
    deps: DepsMut,
    info: MessageInfo,
    call: OutgoingLogicCall,
) -> Result<Response<HostMsg>, ContractError> {
    require_gov(&deps, &info)?;

    let invalidation_nonce = call.invalidation_nonce;
    let invalidation_id = hex::encode(call.invalidation_id.as_slice());
    set_outgoing_logic_call(deps.storage, call)?;

    Ok(Response::new()
        .add_attribute("action", "set_outgoing_logic_call")
        .add_attribute("invalidation_id", invalidation_id)
        .add_attribute("invalidation_nonce", invalidation_nonce.to_string()))
}
