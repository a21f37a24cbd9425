//! Contract entry points.
//!
//! `execute` carries user, orchestrator and governance traffic; `sudo` is
//! the host chain's block glue (staking-view sync and block-end
//! maintenance). All state transitions happen inside these calls in block
//! order; there is no other way in.

use cosmwasm_std::{
    entry_point, to_json_binary, Binary, CosmosMsg, Deps, DepsMut, Env, Event, MessageInfo,
    Response,
};
use cw2::set_contract_version;

use crate::address::EthAddress;
use crate::attestation::Claim;
use crate::batch::timeout_batches;
use crate::error::ContractError;
use crate::execute::{
    execute_airdrop, execute_cancel_send_to_eth, execute_confirm_batch,
    execute_confirm_logic_call, execute_request_batch, execute_send_to_eth,
    execute_set_denom_metadata, execute_set_orchestrator_binding, execute_set_outgoing_logic_call,
    execute_submit_bad_signature_evidence, execute_submit_claim, execute_unhalt_bridge,
    execute_update_params, execute_valset_confirm,
};
use crate::execute::gov_validate_params;
use crate::invariants::enforce_module_balance;
use crate::logic_call::timeout_logic_calls;
use crate::msg::{
    ExecuteMsg, GenesisState, HostMsg, InstantiateMsg, MigrateMsg, QueryMsg, SudoMsg,
};
use crate::query::{
    query_all_batch_fees, query_attestation, query_attestations, query_batch,
    query_batch_confirms, query_batch_fee_by_token, query_batches, query_binding_by_eth,
    query_binding_by_orchestrator, query_binding_by_valcons, query_bridge_status,
    query_check_invariant, query_current_valset, query_denom_to_erc20, query_erc20_to_denom,
    query_export_genesis, query_last_event_nonce_by_valcons, query_logic_call, query_params,
    query_pending_work, query_unbatched_transactions, query_valset, query_valset_confirms,
    query_valsets,
};
use crate::slashing::slash_unsigned_artifacts;
use crate::state::{
    next_id, ATTESTATIONS, BATCHES, BATCH_CONFIRMS, BINDING_BY_VALCONS, CONTRACT_NAME,
    CONTRACT_VERSION, DENOM_METADATA, DENOM_TO_ERC20, ERC20_TO_DENOM, ESCROW, GOV,
    LAST_EVENT_NONCE_BY_VALCONS, LAST_OBSERVED_ETH_HEIGHT, LAST_OBSERVED_EVENT_NONCE,
    LAST_OBSERVED_VALSET_NONCE, LAST_TX_ID, LATEST_BATCH_NONCE, LATEST_VALSET_NONCE,
    LOGIC_CALLS, LOGIC_CONFIRMS, PARAMS, VALCONS_BY_ETH, VALCONS_BY_ORCHESTRATOR,
    VALIDATOR_RECORDS, VALSETS, VALSET_CONFIRMS,
};
use crate::validator_source::{current_members, sync_validator_set};
use crate::valset::{should_update, Valset};

// ============================================================================
// Instantiate
// ============================================================================

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response<HostMsg>, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    let gov = deps.api.addr_validate(&msg.gov)?;
    GOV.save(deps.storage, &gov)?;

    if let Some(genesis) = msg.genesis {
        import_genesis(deps, genesis)?;
        return Ok(Response::new()
            .add_attribute("method", "instantiate")
            .add_attribute("genesis", "imported"));
    }

    let params = msg.params.unwrap_or_default();
    gov_validate_params(&params)?;
    PARAMS.save(deps.storage, &params)?;

    Ok(Response::new()
        .add_attribute("method", "instantiate")
        .add_attribute("bridge_id", params.bridge_id))
}

fn import_genesis(deps: DepsMut, genesis: GenesisState) -> Result<(), ContractError> {
    gov_validate_params(&genesis.params)?;
    PARAMS.save(deps.storage, &genesis.params)?;

    for binding in genesis.bindings {
        BINDING_BY_VALCONS.save(deps.storage, &binding.valcons, &binding)?;
        VALCONS_BY_ORCHESTRATOR.save(deps.storage, &binding.orchestrator, &binding.valcons)?;
        VALCONS_BY_ETH.save(deps.storage, binding.eth_address.as_str(), &binding.valcons)?;
    }
    for record in genesis.validator_records {
        VALIDATOR_RECORDS.save(deps.storage, &record.valcons.clone(), &record)?;
    }

    LATEST_VALSET_NONCE.save(deps.storage, &genesis.latest_valset_nonce)?;
    for valset in genesis.valsets {
        VALSETS.save(deps.storage, valset.nonce, &valset)?;
    }
    for confirm in genesis.valset_confirms {
        VALSET_CONFIRMS.save(deps.storage, (confirm.nonce, &confirm.orchestrator), &confirm)?;
    }

    LAST_TX_ID.save(deps.storage, &genesis.last_tx_id)?;
    for tx in genesis.unbatched_transactions {
        crate::pool::add_unbatched(deps.storage, &tx)?;
    }

    LATEST_BATCH_NONCE.save(deps.storage, &genesis.latest_batch_nonce)?;
    for batch in genesis.batches {
        BATCHES.save(
            deps.storage,
            (batch.token_contract.as_str(), batch.batch_nonce),
            &batch,
        )?;
    }
    for confirm in genesis.batch_confirms {
        BATCH_CONFIRMS.save(
            deps.storage,
            (
                confirm.token_contract.as_str(),
                confirm.batch_nonce,
                &confirm.orchestrator,
            ),
            &confirm,
        )?;
    }

    for call in genesis.logic_calls {
        LOGIC_CALLS.save(
            deps.storage,
            (call.invalidation_id.as_slice(), call.invalidation_nonce),
            &call,
        )?;
    }
    for confirm in genesis.logic_confirms {
        LOGIC_CONFIRMS.save(
            deps.storage,
            (
                confirm.invalidation_id.as_slice(),
                confirm.invalidation_nonce,
                &confirm.orchestrator,
            ),
            &confirm,
        )?;
    }

    for attestation in genesis.attestations {
        let hash = attestation.claim.claim_hash()?;
        ATTESTATIONS.save(
            deps.storage,
            (attestation.claim.event_nonce(), hash.as_slice()),
            &attestation,
        )?;
    }
    LAST_OBSERVED_EVENT_NONCE.save(deps.storage, &genesis.last_observed_event_nonce)?;
    LAST_OBSERVED_ETH_HEIGHT.save(deps.storage, &genesis.last_observed_eth_height)?;
    LAST_OBSERVED_VALSET_NONCE.save(deps.storage, &genesis.last_observed_valset_nonce)?;
    for entry in genesis.last_event_nonce_by_valcons {
        LAST_EVENT_NONCE_BY_VALCONS.save(deps.storage, &entry.valcons, &entry.nonce)?;
    }

    for mapping in genesis.erc20_to_denom {
        ERC20_TO_DENOM.save(deps.storage, &mapping.erc20, &mapping.denom)?;
        DENOM_TO_ERC20.save(deps.storage, &mapping.denom, &mapping.erc20)?;
    }
    for metadata in genesis.denom_metadata {
        DENOM_METADATA.save(deps.storage, &metadata.denom.clone(), &metadata)?;
    }
    for coin in genesis.escrow {
        ESCROW.save(deps.storage, &coin.denom, &coin.amount)?;
    }

    Ok(())
}

// ============================================================================
// Execute
// ============================================================================

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response<HostMsg>, ContractError> {
    match msg {
        ExecuteMsg::SetOrchestratorBinding {
            valcons,
            eth_address,
        } => execute_set_orchestrator_binding(deps, info, valcons, eth_address),
        ExecuteMsg::ValsetConfirm {
            nonce,
            eth_signer,
            signature,
        } => execute_valset_confirm(deps, info, nonce, eth_signer, signature),

        ExecuteMsg::SendToEth {
            eth_dest,
            amount,
            bridge_fee,
        } => execute_send_to_eth(deps, info, eth_dest, amount, bridge_fee),
        ExecuteMsg::CancelSendToEth { transaction_id } => {
            execute_cancel_send_to_eth(deps, info, transaction_id)
        }
        ExecuteMsg::RequestBatch { denom } => execute_request_batch(deps, env, denom),
        ExecuteMsg::ConfirmBatch {
            nonce,
            token_contract,
            eth_signer,
            signature,
        } => execute_confirm_batch(deps, info, nonce, token_contract, eth_signer, signature),
        ExecuteMsg::ConfirmLogicCall {
            invalidation_id,
            invalidation_nonce,
            eth_signer,
            signature,
        } => execute_confirm_logic_call(
            deps,
            info,
            invalidation_id,
            invalidation_nonce,
            eth_signer,
            signature,
        ),

        ExecuteMsg::SendToCosmosClaim {
            event_nonce,
            eth_block_height,
            token_contract,
            amount,
            ethereum_sender,
            cosmos_receiver,
        } => execute_submit_claim(
            deps,
            env,
            info,
            Claim::SendToCosmos {
                event_nonce,
                eth_block_height,
                token_contract: EthAddress::new(&token_contract)?,
                amount,
                ethereum_sender: EthAddress::new(&ethereum_sender)?,
                cosmos_receiver,
            },
        ),
        ExecuteMsg::BatchSendToEthClaim {
            event_nonce,
            eth_block_height,
            batch_nonce,
            token_contract,
            reward_recipient,
        } => execute_submit_claim(
            deps,
            env,
            info,
            Claim::BatchExecuted {
                event_nonce,
                eth_block_height,
                batch_nonce,
                token_contract: EthAddress::new(&token_contract)?,
                reward_recipient,
            },
        ),
        ExecuteMsg::Erc20DeployedClaim {
            event_nonce,
            eth_block_height,
            cosmos_denom,
            token_contract,
            name,
            symbol,
            decimals,
        } => execute_submit_claim(
            deps,
            env,
            info,
            Claim::Erc20Deployed {
                event_nonce,
                eth_block_height,
                cosmos_denom,
                token_contract: EthAddress::new(&token_contract)?,
                name,
                symbol,
                decimals,
            },
        ),
        ExecuteMsg::LogicCallExecutedClaim {
            event_nonce,
            eth_block_height,
            invalidation_id,
            invalidation_nonce,
        } => execute_submit_claim(
            deps,
            env,
            info,
            Claim::LogicCallExecuted {
                event_nonce,
                eth_block_height,
                invalidation_id,
                invalidation_nonce,
            },
        ),
        ExecuteMsg::ValsetUpdatedClaim {
            event_nonce,
            eth_block_height,
            valset_nonce,
            members,
            reward_amount,
            reward_denom,
            reward_recipient,
        } => execute_submit_claim(
            deps,
            env,
            info,
            Claim::ValsetUpdated {
                event_nonce,
                eth_block_height,
                valset_nonce,
                members,
                reward_amount,
                reward_denom,
                reward_recipient,
            },
        ),

        ExecuteMsg::SubmitBadSignatureEvidence { subject, signature } => {
            execute_submit_bad_signature_evidence(deps, env, subject, signature)
        }

        ExecuteMsg::UnhaltBridge {} => execute_unhalt_bridge(deps, info),
        ExecuteMsg::UpdateParams { params } => execute_update_params(deps, info, params),
        ExecuteMsg::Airdrop { recipients } => execute_airdrop(deps, info, recipients),
        ExecuteMsg::SetDenomMetadata { metadata } => {
            execute_set_denom_metadata(deps, info, metadata)
        }
        ExecuteMsg::SetOutgoingLogicCall { call } => {
            execute_set_outgoing_logic_call(deps, info, call)
        }
    }
}

// ============================================================================
// Sudo
// ============================================================================

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn sudo(deps: DepsMut, env: Env, msg: SudoMsg) -> Result<Response<HostMsg>, ContractError> {
    match msg {
        SudoMsg::SyncValidatorSet { validators } => {
            let count = validators.len();
            sync_validator_set(deps.storage, validators)?;
            Ok(Response::new()
                .add_attribute("method", "sync_validator_set")
                .add_attribute("validators", count.to_string()))
        }
        SudoMsg::EndBlock {} => end_block(deps, env),
    }
}

/// Block-end maintenance, in fixed order: timeout GC, valset drift check,
/// signing-window slashing, balance invariant.
fn end_block(mut deps: DepsMut, env: Env) -> Result<Response<HostMsg>, ContractError> {
    let mut events: Vec<Event> = vec![];
    let mut messages: Vec<CosmosMsg<HostMsg>> = vec![];

    events.extend(timeout_batches(deps.storage)?);
    events.extend(timeout_logic_calls(deps.storage)?);

    if let Some(event) = maybe_create_valset(deps.branch(), &env)? {
        events.push(event);
    }

    messages.extend(slash_unsigned_artifacts(deps.branch(), &env)?);

    events.extend(enforce_module_balance(deps.branch(), &env)?);

    Ok(Response::new()
        .add_messages(messages)
        .add_events(events)
        .add_attribute("method", "end_block"))
}

/// Store a new valset when none exists yet or when normalized power drifted
/// past the threshold.
fn maybe_create_valset(
    deps: DepsMut,
    env: &Env,
) -> Result<Option<Event>, ContractError> {
    let Some(current) = current_members(deps.storage)? else {
        return Ok(None);
    };

    let params = PARAMS.load(deps.storage)?;
    let latest_nonce = LATEST_VALSET_NONCE
        .may_load(deps.storage)?
        .unwrap_or_default();

    if latest_nonce > 0 {
        let latest = VALSETS
            .may_load(deps.storage, latest_nonce)?
            .ok_or_else(|| {
                ContractError::invariant(format!("latest valset {latest_nonce} missing"))
            })?;
        if !should_update(&latest.members, &current, params.power_diff_threshold) {
            return Ok(None);
        }
    }

    let nonce = next_id(deps.storage, &LATEST_VALSET_NONCE)?;
    let valset = Valset {
        nonce,
        height: env.block.height,
        members: current,
        reward_amount: params.valset_reward.amount,
        reward_denom: params.valset_reward.denom,
    };
    VALSETS.save(deps.storage, nonce, &valset)?;

    Ok(Some(
        Event::new("valset_updated")
            .add_attribute("module", "bridge")
            .add_attribute("bridge_id", params.bridge_id)
            .add_attribute("nonce", nonce.to_string())
            .add_attribute("members", valset.members.members().len().to_string()),
    ))
}

// ============================================================================
// Query
// ============================================================================

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, env: Env, msg: QueryMsg) -> Result<Binary, ContractError> {
    match msg {
        QueryMsg::Params {} => Ok(to_json_binary(&query_params(deps)?)?),
        QueryMsg::BridgeStatus {} => Ok(to_json_binary(&query_bridge_status(deps)?)?),
        QueryMsg::CurrentValset {} => Ok(to_json_binary(&query_current_valset(deps, env)?)?),
        QueryMsg::Valset { nonce } => Ok(to_json_binary(&query_valset(deps, nonce)?)?),
        QueryMsg::Valsets { limit } => Ok(to_json_binary(&query_valsets(deps, limit)?)?),
        QueryMsg::ValsetConfirms { nonce } => {
            Ok(to_json_binary(&query_valset_confirms(deps, nonce)?)?)
        }
        QueryMsg::Batch {
            token_contract,
            nonce,
        } => Ok(to_json_binary(&query_batch(deps, token_contract, nonce)?)?),
        QueryMsg::Batches {} => Ok(to_json_binary(&query_batches(deps)?)?),
        QueryMsg::BatchConfirms {
            token_contract,
            nonce,
        } => Ok(to_json_binary(&query_batch_confirms(
            deps,
            token_contract,
            nonce,
        )?)?),
        QueryMsg::UnbatchedTransactions { token_contract } => Ok(to_json_binary(
            &query_unbatched_transactions(deps, token_contract)?,
        )?),
        QueryMsg::BatchFeeByToken {
            token_contract,
            max_elements,
        } => Ok(to_json_binary(&query_batch_fee_by_token(
            deps,
            token_contract,
            max_elements,
        )?)?),
        QueryMsg::AllBatchFees { max_elements } => {
            Ok(to_json_binary(&query_all_batch_fees(deps, max_elements)?)?)
        }
        QueryMsg::LogicCall {
            invalidation_id,
            invalidation_nonce,
        } => Ok(to_json_binary(&query_logic_call(
            deps,
            invalidation_id,
            invalidation_nonce,
        )?)?),
        QueryMsg::Erc20ToDenom { token_contract } => {
            Ok(to_json_binary(&query_erc20_to_denom(deps, token_contract)?)?)
        }
        QueryMsg::DenomToErc20 { denom } => {
            Ok(to_json_binary(&query_denom_to_erc20(deps, denom)?)?)
        }
        QueryMsg::BindingByValcons { valcons } => {
            Ok(to_json_binary(&query_binding_by_valcons(deps, valcons)?)?)
        }
        QueryMsg::BindingByOrchestrator { orchestrator } => Ok(to_json_binary(
            &query_binding_by_orchestrator(deps, orchestrator)?,
        )?),
        QueryMsg::BindingByEth { eth_address } => {
            Ok(to_json_binary(&query_binding_by_eth(deps, eth_address)?)?)
        }
        QueryMsg::Attestation {
            event_nonce,
            claim_hash,
        } => Ok(to_json_binary(&query_attestation(
            deps,
            event_nonce,
            claim_hash,
        )?)?),
        QueryMsg::Attestations { limit } => {
            Ok(to_json_binary(&query_attestations(deps, limit)?)?)
        }
        QueryMsg::LastEventNonceByValcons { valcons } => Ok(to_json_binary(
            &query_last_event_nonce_by_valcons(deps, valcons)?,
        )?),
        QueryMsg::PendingWork { orchestrator } => {
            Ok(to_json_binary(&query_pending_work(deps, orchestrator)?)?)
        }
        QueryMsg::CheckInvariant {} => Ok(to_json_binary(&query_check_invariant(deps, env)?)?),
        QueryMsg::ExportGenesis {} => Ok(to_json_binary(&query_export_genesis(deps)?)?),
    }
}

// ============================================================================
// Migrate
// ============================================================================

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn migrate(deps: DepsMut, _env: Env, _msg: MigrateMsg) -> Result<Response<HostMsg>, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;
    Ok(Response::new().add_attribute("action", "migrate"))
}
