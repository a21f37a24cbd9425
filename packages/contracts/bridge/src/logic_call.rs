//! Outgoing arbitrary-logic calls.
//!
//! Keyed by `(invalidation_id, invalidation_nonce)`: executing any call of
//! an invalidation scope on the EVM side invalidates lower nonces in that
//! scope, which is why deletion is keyed the same way.

use cosmwasm_std::{Addr, Binary, CosmosMsg, DepsMut, Event, Storage};

use crate::error::ContractError;
use crate::msg::HostMsg;
use crate::state::{OutgoingLogicCall, LAST_OBSERVED_ETH_HEIGHT, LOGIC_CALLS, LOGIC_CONFIRMS};

/// Queue a logic call for signing and relay.
pub fn set_outgoing_logic_call(
    storage: &mut dyn Storage,
    call: OutgoingLogicCall,
) -> Result<(), ContractError> {
    if call.invalidation_id.len() != 32 {
        return Err(ContractError::invalid(
            "invalidation_id",
            "must be 32 bytes",
        ));
    }
    if call.timeout == 0 {
        return Err(ContractError::invalid("timeout", "zero"));
    }
    LOGIC_CALLS.save(
        storage,
        (call.invalidation_id.as_slice(), call.invalidation_nonce),
        &call,
    )?;
    Ok(())
}

pub fn get_logic_call(
    storage: &dyn Storage,
    invalidation_id: &Binary,
    invalidation_nonce: u64,
) -> Result<Option<OutgoingLogicCall>, ContractError> {
    Ok(LOGIC_CALLS.may_load(storage, (invalidation_id.as_slice(), invalidation_nonce))?)
}

/// Drop a call and its confirmations. Idempotent: the executed-claim
/// handler may fire for calls already timed out.
pub fn delete_logic_call(
    deps: DepsMut,
    invalidation_id: &Binary,
    invalidation_nonce: u64,
) -> Result<Vec<CosmosMsg<HostMsg>>, ContractError> {
    remove_call(deps.storage, invalidation_id.as_slice(), invalidation_nonce)?;
    Ok(vec![])
}

fn remove_call(
    storage: &mut dyn Storage,
    invalidation_id: &[u8],
    invalidation_nonce: u64,
) -> Result<(), ContractError> {
    LOGIC_CALLS.remove(storage, (invalidation_id, invalidation_nonce));
    let signers: Vec<Addr> = LOGIC_CONFIRMS
        .prefix((invalidation_id, invalidation_nonce))
        .keys(storage, None, None, cosmwasm_std::Order::Ascending)
        .collect::<Result<_, _>>()?;
    for orchestrator in signers {
        LOGIC_CONFIRMS.remove(storage, (invalidation_id, invalidation_nonce, &orchestrator));
    }
    Ok(())
}

/// Block-end GC for calls past their EVM timeout height.
pub fn timeout_logic_calls(storage: &mut dyn Storage) -> Result<Vec<Event>, ContractError> {
    let eth_height = LAST_OBSERVED_ETH_HEIGHT
        .may_load(storage)?
        .unwrap_or_default();

    let expired: Vec<OutgoingLogicCall> = LOGIC_CALLS
        .range(storage, None, None, cosmwasm_std::Order::Ascending)
        .filter_map(|item| match item {
            Ok((_, call)) if call.timeout < eth_height => Some(Ok(call)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
        .collect::<Result<_, _>>()?;

    let mut events = vec![];
    for call in expired {
        remove_call(
            storage,
            call.invalidation_id.as_slice(),
            call.invalidation_nonce,
        )?;
        events.push(
            Event::new("logic_call_timed_out")
                .add_attribute("invalidation_id", hex::encode(call.invalidation_id.as_slice()))
                .add_attribute("invalidation_nonce", call.invalidation_nonce.to_string())
                .add_attribute("timeout", call.timeout.to_string()),
        );
    }
    Ok(events)
}
