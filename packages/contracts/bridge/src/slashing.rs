//! Signing-window enforcement.
//!
//! Orchestrators must co-sign every valset and batch within the configured
//! window of host blocks. A bonded validator with no confirmation on an
//! expired artifact is slashed through the host bindings; jailing itself is
//! the provider chain's decision on consumer deployments.

use cosmwasm_std::{CosmosMsg, DepsMut, Env};

use crate::error::ContractError;
use crate::msg::HostMsg;
use crate::state::{
    CrossChainValidator, BATCHES, BATCH_CONFIRMS, BINDING_BY_VALCONS, LAST_SLASHED_BATCH_BLOCK,
    LAST_SLASHED_VALSET_NONCE, PARAMS, VALSETS, VALSET_CONFIRMS,
};
use crate::validator_source::{ForwardedRecords, ValidatorSource};
use crate::valset::Valset;

/// Slash bonded validators that failed to sign valsets and batches whose
/// signing window has closed.
pub fn slash_unsigned_artifacts(
    deps: DepsMut,
    env: &Env,
) -> Result<Vec<CosmosMsg<HostMsg>>, ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let bonded = ForwardedRecords(deps.storage).bonded_validators_by_power()?;
    let mut messages = vec![];

    // valsets past their window, oldest first
    let last_slashed_nonce = LAST_SLASHED_VALSET_NONCE
        .may_load(deps.storage)?
        .unwrap_or_default();
    let expired_valsets: Vec<Valset> = VALSETS
        .range(deps.storage, None, None, cosmwasm_std::Order::Ascending)
        .filter_map(|item| match item {
            Ok((nonce, valset))
                if nonce > last_slashed_nonce
                    && valset.height + params.signed_valsets_window < env.block.height =>
            {
                Some(Ok(valset))
            }
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
        .collect::<Result<_, _>>()?;

    for valset in &expired_valsets {
        for validator in &bonded {
            if !has_valset_confirm(&deps, validator, valset.nonce)? {
                messages.push(CosmosMsg::Custom(HostMsg::Slash {
                    valcons: validator.valcons.clone(),
                    fraction: params.slash_fraction_valset,
                    power: validator.power,
                    height: env.block.height,
                }));
            }
        }
        LAST_SLASHED_VALSET_NONCE.save(deps.storage, &valset.nonce)?;
    }

    // batches past their window, tracked by creation block
    let last_slashed_block = LAST_SLASHED_BATCH_BLOCK
        .may_load(deps.storage)?
        .unwrap_or_default();
    let expired_batches: Vec<crate::state::OutgoingTxBatch> = BATCHES
        .range(deps.storage, None, None, cosmwasm_std::Order::Ascending)
        .filter_map(|item| match item {
            Ok((_, batch))
                if batch.block > last_slashed_block
                    && batch.block + params.signed_batches_window < env.block.height =>
            {
                Some(Ok(batch))
            }
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
        .collect::<Result<_, _>>()?;

    let mut max_block = last_slashed_block;
    for batch in &expired_batches {
        for validator in &bonded {
            if !has_batch_confirm(&deps, validator, batch)? {
                messages.push(CosmosMsg::Custom(HostMsg::Slash {
                    valcons: validator.valcons.clone(),
                    fraction: params.slash_fraction_batch,
                    power: validator.power,
                    height: env.block.height,
                }));
            }
        }
        max_block = max_block.max(batch.block);
    }
    if max_block > last_slashed_block {
        LAST_SLASHED_BATCH_BLOCK.save(deps.storage, &max_block)?;
    }

    Ok(messages)
}

fn has_valset_confirm(
    deps: &DepsMut,
    validator: &CrossChainValidator,
    nonce: u64,
) -> Result<bool, ContractError> {
    // a validator that never bound an orchestrator cannot have signed
    let Some(binding) = BINDING_BY_VALCONS.may_load(deps.storage, &validator.valcons)? else {
        return Ok(false);
    };
    Ok(VALSET_CONFIRMS.has(deps.storage, (nonce, &binding.orchestrator)))
}

fn has_batch_confirm(
    deps: &DepsMut,
    validator: &CrossChainValidator,
    batch: &crate::state::OutgoingTxBatch,
) -> Result<bool, ContractError> {
    let Some(binding) = BINDING_BY_VALCONS.may_load(deps.storage, &validator.valcons)? else {
        return Ok(false);
    };
    Ok(BATCH_CONFIRMS.has(
        deps.storage,
        (
            batch.token_contract.as_str(),
            batch.batch_nonce,
            &binding.orchestrator,
        ),
    ))
}
