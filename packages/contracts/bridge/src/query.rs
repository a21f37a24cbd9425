//! Read-only projections.

use cosmwasm_std::{Addr, Binary, Coin, Deps, Env, Order, StdResult};

use crate::address::EthAddress;
use crate::attestation::Attestation;
use crate::error::ContractError;
use crate::invariants::module_balance;
use crate::msg::{
    AllBatchFeesResponse, AttestationsResponse, BatchConfirmsResponse, BatchFees,
    BatchesResponse, BridgeStatusResponse, DenomMappingResponse, Erc20DenomMapping,
    Erc20MappingResponse, GenesisState, InvariantResponse, PendingWorkResponse,
    UnbatchedTransactionsResponse, ValconsNonce, ValsetConfirmsResponse, ValsetsResponse,
};
use crate::pool;
use crate::state::{
    OrchestratorBinding, OutgoingLogicCall, OutgoingTxBatch, Params, ATTESTATIONS,
    BATCHES, BATCH_CONFIRMS, BINDING_BY_VALCONS, DENOM_METADATA, ERC20_TO_DENOM,
    ESCROW, LAST_EVENT_NONCE_BY_VALCONS, LAST_OBSERVED_ETH_HEIGHT, LAST_OBSERVED_EVENT_NONCE,
    LAST_OBSERVED_VALSET_NONCE, LAST_TX_ID, LATEST_BATCH_NONCE, LATEST_VALSET_NONCE,
    LOGIC_CALLS, LOGIC_CONFIRMS, PARAMS, UNBATCHED_TXS, VALCONS_BY_ETH,
    VALCONS_BY_ORCHESTRATOR, VALIDATOR_RECORDS, VALSETS, VALSET_CONFIRMS,
};
use crate::validator_source::current_members;
use crate::valset::Valset;

const DEFAULT_ATTESTATION_LIMIT: u64 = 1000;

pub fn query_params(deps: Deps) -> Result<Params, ContractError> {
    Ok(PARAMS.load(deps.storage)?)
}

pub fn query_bridge_status(deps: Deps) -> Result<BridgeStatusResponse, ContractError> {
    let load = |item: &cw_storage_plus::Item<u64>| -> StdResult<u64> {
        Ok(item.may_load(deps.storage)?.unwrap_or_default())
    };
    Ok(BridgeStatusResponse {
        bridge_active: PARAMS.load(deps.storage)?.bridge_active,
        latest_valset_nonce: load(&LATEST_VALSET_NONCE)?,
        latest_batch_nonce: load(&LATEST_BATCH_NONCE)?,
        last_tx_id: load(&LAST_TX_ID)?,
        last_observed_event_nonce: load(&LAST_OBSERVED_EVENT_NONCE)?,
        last_observed_eth_height: load(&LAST_OBSERVED_ETH_HEIGHT)?,
        last_observed_valset_nonce: load(&LAST_OBSERVED_VALSET_NONCE)?,
    })
}

/// The set that would be checkpointed right now, under the next nonce.
pub fn query_current_valset(deps: Deps, env: Env) -> Result<Valset, ContractError> {
    let members = current_members(deps.storage)?.ok_or_else(|| {
        ContractError::invalid("valset", "no bonded validators with registered eth keys")
    })?;
    let params = PARAMS.load(deps.storage)?;
    let nonce = LATEST_VALSET_NONCE
        .may_load(deps.storage)?
        .unwrap_or_default();
    Ok(Valset {
        nonce: nonce + 1,
        height: env.block.height,
        members,
        reward_amount: params.valset_reward.amount,
        reward_denom: params.valset_reward.denom,
    })
}

pub fn query_valset(deps: Deps, nonce: u64) -> Result<Option<Valset>, ContractError> {
    Ok(VALSETS.may_load(deps.storage, nonce)?)
}

pub fn query_valsets(deps: Deps, limit: Option<u32>) -> Result<ValsetsResponse, ContractError> {
    let limit = limit.unwrap_or(20) as usize;
    let valsets = VALSETS
        .range(deps.storage, None, None, Order::Descending)
        .take(limit)
        .map(|item| item.map(|(_, v)| v))
        .collect::<StdResult<_>>()?;
    Ok(ValsetsResponse { valsets })
}

pub fn query_valset_confirms(
    deps: Deps,
    nonce: u64,
) -> Result<ValsetConfirmsResponse, ContractError> {
    let confirms = VALSET_CONFIRMS
        .prefix(nonce)
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, c)| c))
        .collect::<StdResult<_>>()?;
    Ok(ValsetConfirmsResponse { confirms })
}

pub fn query_batch(
    deps: Deps,
    token_contract: String,
    nonce: u64,
) -> Result<Option<OutgoingTxBatch>, ContractError> {
    let contract = EthAddress::new(&token_contract)?;
    Ok(BATCHES.may_load(deps.storage, (contract.as_str(), nonce))?)
}

pub fn query_batches(deps: Deps) -> Result<BatchesResponse, ContractError> {
    let batches = BATCHES
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, b)| b))
        .collect::<StdResult<_>>()?;
    Ok(BatchesResponse { batches })
}

pub fn query_batch_confirms(
    deps: Deps,
    token_contract: String,
    nonce: u64,
) -> Result<BatchConfirmsResponse, ContractError> {
    let contract = EthAddress::new(&token_contract)?;
    let confirms = BATCH_CONFIRMS
        .prefix((contract.as_str(), nonce))
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, c)| c))
        .collect::<StdResult<_>>()?;
    Ok(BatchConfirmsResponse { confirms })
}

pub fn query_unbatched_transactions(
    deps: Deps,
    token_contract: String,
) -> Result<UnbatchedTransactionsResponse, ContractError> {
    let contract = EthAddress::new(&token_contract)?;
    Ok(UnbatchedTransactionsResponse {
        transactions: pool::unbatched_by_contract(deps.storage, &contract)?,
    })
}

pub fn query_batch_fee_by_token(
    deps: Deps,
    token_contract: String,
    max_elements: u64,
) -> Result<BatchFees, ContractError> {
    let contract = EthAddress::new(&token_contract)?;
    pool::batch_fee_by_token(deps.storage, &contract, max_elements)
}

pub fn query_all_batch_fees(
    deps: Deps,
    max_elements: u64,
) -> Result<AllBatchFeesResponse, ContractError> {
    Ok(AllBatchFeesResponse {
        batch_fees: pool::all_batch_fees(deps.storage, max_elements)?,
    })
}

pub fn query_logic_call(
    deps: Deps,
    invalidation_id: Binary,
    invalidation_nonce: u64,
) -> Result<Option<OutgoingLogicCall>, ContractError> {
    crate::logic_call::get_logic_call(deps.storage, &invalidation_id, invalidation_nonce)
}

pub fn query_erc20_to_denom(
    deps: Deps,
    token_contract: String,
) -> Result<DenomMappingResponse, ContractError> {
    let contract = EthAddress::new(&token_contract)?;
    let (cosmos_originated, denom) = pool::erc20_to_denom(deps.storage, &contract)?;
    Ok(DenomMappingResponse {
        denom,
        cosmos_originated,
    })
}

pub fn query_denom_to_erc20(
    deps: Deps,
    denom: String,
) -> Result<Erc20MappingResponse, ContractError> {
    let (cosmos_originated, contract) = pool::denom_to_erc20(deps.storage, &denom)?;
    Ok(Erc20MappingResponse {
        token_contract: contract.to_string(),
        cosmos_originated,
    })
}

pub fn query_binding_by_valcons(
    deps: Deps,
    valcons: String,
) -> Result<Option<OrchestratorBinding>, ContractError> {
    Ok(BINDING_BY_VALCONS.may_load(deps.storage, &valcons)?)
}

pub fn query_binding_by_orchestrator(
    deps: Deps,
    orchestrator: String,
) -> Result<Option<OrchestratorBinding>, ContractError> {
    let orchestrator = deps.api.addr_validate(&orchestrator)?;
    let Some(valcons) = VALCONS_BY_ORCHESTRATOR.may_load(deps.storage, &orchestrator)? else {
        return Ok(None);
    };
    Ok(BINDING_BY_VALCONS.may_load(deps.storage, &valcons)?)
}

pub fn query_binding_by_eth(
    deps: Deps,
    eth_address: String,
) -> Result<Option<OrchestratorBinding>, ContractError> {
    let eth = EthAddress::new(&eth_address)?;
    let Some(valcons) = VALCONS_BY_ETH.may_load(deps.storage, eth.as_str())? else {
        return Ok(None);
    };
    Ok(BINDING_BY_VALCONS.may_load(deps.storage, &valcons)?)
}

pub fn query_attestation(
    deps: Deps,
    event_nonce: u64,
    claim_hash: Binary,
) -> Result<Option<Attestation>, ContractError> {
    Ok(ATTESTATIONS.may_load(deps.storage, (event_nonce, claim_hash.as_slice()))?)
}

pub fn query_attestations(
    deps: Deps,
    limit: Option<u64>,
) -> Result<AttestationsResponse, ContractError> {
    let limit = limit.unwrap_or(DEFAULT_ATTESTATION_LIMIT) as usize;
    let attestations = ATTESTATIONS
        .range(deps.storage, None, None, Order::Ascending)
        .take(limit)
        .map(|item| item.map(|(_, a)| a))
        .collect::<StdResult<_>>()?;
    Ok(AttestationsResponse { attestations })
}

pub fn query_last_event_nonce_by_valcons(
    deps: Deps,
    valcons: String,
) -> Result<u64, ContractError> {
    match LAST_EVENT_NONCE_BY_VALCONS.may_load(deps.storage, &valcons)? {
        Some(nonce) => Ok(nonce),
        None => Ok(LAST_OBSERVED_EVENT_NONCE
            .may_load(deps.storage)?
            .unwrap_or_default()),
    }
}

/// Everything the given orchestrator still has to sign.
pub fn query_pending_work(
    deps: Deps,
    orchestrator: String,
) -> Result<PendingWorkResponse, ContractError> {
    let orchestrator: Addr = deps.api.addr_validate(&orchestrator)?;

    let mut valsets = vec![];
    for item in VALSETS.range(deps.storage, None, None, Order::Ascending) {
        let (nonce, valset) = item?;
        if !VALSET_CONFIRMS.has(deps.storage, (nonce, &orchestrator)) {
            valsets.push(valset);
        }
    }

    let mut batches = vec![];
    for item in BATCHES.range(deps.storage, None, None, Order::Ascending) {
        let ((contract, nonce), batch) = item?;
        if !BATCH_CONFIRMS.has(deps.storage, (contract.as_str(), nonce, &orchestrator)) {
            batches.push(batch);
        }
    }

    let mut logic_calls = vec![];
    for item in LOGIC_CALLS.range(deps.storage, None, None, Order::Ascending) {
        let ((id, nonce), call) = item?;
        if !LOGIC_CONFIRMS.has(deps.storage, (id.as_slice(), nonce, &orchestrator)) {
            logic_calls.push(call);
        }
    }

    Ok(PendingWorkResponse {
        valsets,
        batches,
        logic_calls,
    })
}

pub fn query_check_invariant(deps: Deps, env: Env) -> Result<InvariantResponse, ContractError> {
    module_balance(deps, &env)
}

/// Full state export; importing it into a fresh instance reproduces it
/// byte for byte.
pub fn query_export_genesis(deps: Deps) -> Result<GenesisState, ContractError> {
    let load = |item: &cw_storage_plus::Item<u64>| -> StdResult<u64> {
        Ok(item.may_load(deps.storage)?.unwrap_or_default())
    };

    let bindings = BINDING_BY_VALCONS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, b)| b))
        .collect::<StdResult<_>>()?;
    let validator_records = VALIDATOR_RECORDS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, v)| v))
        .collect::<StdResult<_>>()?;
    let valsets = VALSETS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, v)| v))
        .collect::<StdResult<_>>()?;
    let valset_confirms = VALSET_CONFIRMS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, c)| c))
        .collect::<StdResult<_>>()?;
    let unbatched_transactions = UNBATCHED_TXS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, tx)| tx))
        .collect::<StdResult<_>>()?;
    let batches = BATCHES
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, b)| b))
        .collect::<StdResult<_>>()?;
    let batch_confirms = BATCH_CONFIRMS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, c)| c))
        .collect::<StdResult<_>>()?;
    let logic_calls = LOGIC_CALLS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, c)| c))
        .collect::<StdResult<_>>()?;
    let logic_confirms = LOGIC_CONFIRMS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, c)| c))
        .collect::<StdResult<_>>()?;
    let attestations = ATTESTATIONS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, a)| a))
        .collect::<StdResult<_>>()?;
    let last_event_nonce_by_valcons = LAST_EVENT_NONCE_BY_VALCONS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(valcons, nonce)| ValconsNonce { valcons, nonce }))
        .collect::<StdResult<_>>()?;
    let erc20_to_denom = ERC20_TO_DENOM
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(erc20, denom)| Erc20DenomMapping { erc20, denom }))
        .collect::<StdResult<_>>()?;
    let denom_metadata = DENOM_METADATA
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, m)| m))
        .collect::<StdResult<_>>()?;
    let escrow = ESCROW
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| {
            item.map(|(denom, amount)| Coin {
                denom,
                amount,
            })
        })
        .collect::<StdResult<_>>()?;

    Ok(GenesisState {
        params: PARAMS.load(deps.storage)?,
        bindings,
        validator_records,
        latest_valset_nonce: load(&LATEST_VALSET_NONCE)?,
        valsets,
        valset_confirms,
        last_tx_id: load(&LAST_TX_ID)?,
        unbatched_transactions,
        latest_batch_nonce: load(&LATEST_BATCH_NONCE)?,
        batches,
        batch_confirms,
        logic_calls,
        logic_confirms,
        attestations,
        last_observed_event_nonce: load(&LAST_OBSERVED_EVENT_NONCE)?,
        last_observed_eth_height: load(&LAST_OBSERVED_ETH_HEIGHT)?,
        last_observed_valset_nonce: load(&LAST_OBSERVED_VALSET_NONCE)?,
        last_event_nonce_by_valcons,
        erc20_to_denom,
        denom_metadata,
        escrow,
    })
}

