//! The attestation engine.
//!
//! Every EVM event is voted on by orchestrators. An attestation is keyed by
//! `(event_nonce, claim_hash)` where the hash covers the claim payload but
//! not the submitting orchestrator, so honest observers of the same event
//! vote on the same record. When the voters' normalized power crosses 2/3
//! of 2^32 the attestation flips to observed, and observed events are
//! applied in strictly increasing event-nonce order — an out-of-order
//! observation waits in the store until the gap below it fills.
//!
//! A handler error never rolls back the observed flag: the event is
//! resolved, its effect skipped and surfaced as a `handler_error` event.
//! Only an invariant-class failure halts the bridge.

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{
    to_json_vec, Addr, BankMsg, Binary, Coin, CosmosMsg, DepsMut, DistributionMsg, Env, Event,
    Uint128,
};

use crate::abi::keccak256;
use crate::address::EthAddress;
use crate::batch;
use crate::error::ContractError;
use crate::msg::HostMsg;
use crate::state::{
    ATTESTATIONS, ERC20_TO_DENOM, DENOM_METADATA, DENOM_TO_ERC20, ESCROW,
    LAST_EVENT_NONCE_BY_VALCONS, LAST_OBSERVED_ETH_HEIGHT, LAST_OBSERVED_EVENT_NONCE,
    LAST_OBSERVED_VALSET_NONCE, PARAMS, VALSETS, VALSET_CONFIRMS,
};
use crate::validator_source::{normalized_power_of, total_bonded_power};
use crate::valset::TOTAL_BRIDGE_POWER;

/// A member entry as it appears in a `ValsetUpdated` event payload,
/// unvalidated on purpose: the payload only feeds the fingerprint.
#[cw_serde]
pub struct ValsetMember {
    pub power: u64,
    pub eth_address: String,
}

/// A validator's assertion that a specific EVM event occurred.
///
/// Closed set: adding an event kind means adding a variant here and an arm
/// in [`apply_claim`]; the compiler finds every other place.
#[cw_serde]
pub enum Claim {
    SendToCosmos {
        event_nonce: u64,
        eth_block_height: u64,
        token_contract: EthAddress,
        amount: Uint128,
        ethereum_sender: EthAddress,
        cosmos_receiver: String,
    },
    BatchExecuted {
        event_nonce: u64,
        eth_block_height: u64,
        batch_nonce: u64,
        token_contract: EthAddress,
        reward_recipient: String,
    },
    Erc20Deployed {
        event_nonce: u64,
        eth_block_height: u64,
        cosmos_denom: String,
        token_contract: EthAddress,
        name: String,
        symbol: String,
        decimals: u8,
    },
    LogicCallExecuted {
        event_nonce: u64,
        eth_block_height: u64,
        invalidation_id: Binary,
        invalidation_nonce: u64,
    },
    ValsetUpdated {
        event_nonce: u64,
        eth_block_height: u64,
        valset_nonce: u64,
        members: Vec<ValsetMember>,
        reward_amount: Uint128,
        reward_denom: String,
        reward_recipient: String,
    },
}

impl Claim {
    pub fn event_nonce(&self) -> u64 {
        match self {
            Claim::SendToCosmos { event_nonce, .. }
            | Claim::BatchExecuted { event_nonce, .. }
            | Claim::Erc20Deployed { event_nonce, .. }
            | Claim::LogicCallExecuted { event_nonce, .. }
            | Claim::ValsetUpdated { event_nonce, .. } => *event_nonce,
        }
    }

    pub fn eth_block_height(&self) -> u64 {
        match self {
            Claim::SendToCosmos {
                eth_block_height, ..
            }
            | Claim::BatchExecuted {
                eth_block_height, ..
            }
            | Claim::Erc20Deployed {
                eth_block_height, ..
            }
            | Claim::LogicCallExecuted {
                eth_block_height, ..
            }
            | Claim::ValsetUpdated {
                eth_block_height, ..
            } => *eth_block_height,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Claim::SendToCosmos { .. } => "send_to_cosmos",
            Claim::BatchExecuted { .. } => "batch_executed",
            Claim::Erc20Deployed { .. } => "erc20_deployed",
            Claim::LogicCallExecuted { .. } => "logic_call_executed",
            Claim::ValsetUpdated { .. } => "valset_updated",
        }
    }

    /// Deterministic fingerprint of the payload. The submitting
    /// orchestrator is not part of the claim, so two orchestrators
    /// observing the same event always produce the same hash.
    pub fn claim_hash(&self) -> Result<[u8; 32], ContractError> {
        let bytes = to_json_vec(self)?;
        Ok(keccak256(&bytes))
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        if self.event_nonce() == 0 {
            return Err(ContractError::invalid("claim", "event nonce must be > 0"));
        }
        if let Claim::LogicCallExecuted {
            invalidation_id, ..
        } = self
        {
            if invalidation_id.len() != 32 {
                return Err(ContractError::invalid(
                    "claim",
                    "invalidation id must be 32 bytes",
                ));
            }
        }
        Ok(())
    }
}

/// Stored record of votes toward observing one external event.
#[cw_serde]
pub struct Attestation {
    pub observed: bool,
    /// Host-chain height at creation
    pub height: u64,
    /// Consensus addresses that voted, in arrival order
    pub votes: Vec<String>,
    pub claim: Claim,
}

/// Outcome of a claim submission, folded into the caller's `Response`.
pub struct ClaimOutcome {
    pub messages: Vec<CosmosMsg<HostMsg>>,
    pub events: Vec<Event>,
}

/// Record one orchestrator's vote and run the tally.
///
/// Claims from one orchestrator must arrive with contiguous event nonces;
/// a fresh orchestrator starts at the last observed nonce.
pub fn submit_claim(
    deps: DepsMut,
    env: &Env,
    valcons: &str,
    claim: Claim,
) -> Result<ClaimOutcome, ContractError> {
    claim.validate()?;

    let last_for_submitter = LAST_EVENT_NONCE_BY_VALCONS
        .may_load(deps.storage, valcons)?
        .unwrap_or(LAST_OBSERVED_EVENT_NONCE.may_load(deps.storage)?.unwrap_or_default());
    if claim.event_nonce() != last_for_submitter + 1 {
        return Err(ContractError::invalid(
            "claim",
            format!(
                "non contiguous event nonce, expected {} got {}",
                last_for_submitter + 1,
                claim.event_nonce()
            ),
        ));
    }

    let hash = claim.claim_hash()?;
    let key = (claim.event_nonce(), hash.as_slice());

    let mut attestation = match ATTESTATIONS.may_load(deps.storage, key)? {
        Some(existing) => existing,
        None => Attestation {
            observed: false,
            height: env.block.height,
            votes: vec![],
            claim: claim.clone(),
        },
    };

    if attestation.observed {
        return Err(ContractError::invalid(
            "claim",
            "event has already been observed",
        ));
    }
    if attestation.votes.iter().any(|v| v.as_str() == valcons) {
        return Err(ContractError::DuplicateVote);
    }

    attestation.votes.push(valcons.to_string());
    ATTESTATIONS.save(deps.storage, key, &attestation)?;
    LAST_EVENT_NONCE_BY_VALCONS.save(deps.storage, valcons, &claim.event_nonce())?;

    try_attestation(deps, env, &hash, attestation)
}

/// Tally the attestation and, on supermajority, observe it and drain every
/// gap-free observed successor.
fn try_attestation(
    mut deps: DepsMut,
    env: &Env,
    hash: &[u8; 32],
    attestation: Attestation,
) -> Result<ClaimOutcome, ContractError> {
    let mut outcome = ClaimOutcome {
        messages: vec![],
        events: vec![],
    };

    let total = total_bonded_power(deps.storage)?;
    let mut voted_power: u128 = 0;
    for valcons in &attestation.votes {
        voted_power += normalized_power_of(deps.storage, valcons, total)? as u128;
    }

    // strict supermajority over normalized power
    if voted_power * 3 <= 2 * TOTAL_BRIDGE_POWER as u128 {
        return Ok(outcome);
    }

    let nonce = attestation.claim.event_nonce();
    let mut observed = attestation;
    observed.observed = true;
    ATTESTATIONS.save(deps.storage, (nonce, hash.as_slice()), &observed)?;

    // the observed EVM height only moves forward
    let height = observed.claim.eth_block_height();
    let last_height = LAST_OBSERVED_ETH_HEIGHT
        .may_load(deps.storage)?
        .unwrap_or_default();
    if height > last_height {
        LAST_OBSERVED_ETH_HEIGHT.save(deps.storage, &height)?;
    }

    outcome.events.push(
        Event::new("attestation_observed")
            .add_attribute("claim_kind", observed.claim.kind())
            .add_attribute("event_nonce", nonce.to_string())
            .add_attribute("claim_hash", hex::encode(hash)),
    );

    drain_observed(deps.branch(), env, &mut outcome)?;
    prune_attestations(deps)?;

    Ok(outcome)
}

/// Apply observed attestations in strictly increasing nonce order until the
/// first gap.
fn drain_observed(
    mut deps: DepsMut,
    env: &Env,
    outcome: &mut ClaimOutcome,
) -> Result<(), ContractError> {
    loop {
        let last = LAST_OBSERVED_EVENT_NONCE
            .may_load(deps.storage)?
            .unwrap_or_default();
        let target = last + 1;

        let next: Vec<(Vec<u8>, Attestation)> = ATTESTATIONS
            .prefix(target)
            .range(deps.storage, None, None, cosmwasm_std::Order::Ascending)
            .collect::<Result<_, _>>()?;
        let Some((_, attestation)) = next.into_iter().find(|(_, a)| a.observed) else {
            return Ok(());
        };

        LAST_OBSERVED_EVENT_NONCE.save(deps.storage, &target)?;

        match apply_claim(deps.branch(), env, &attestation.claim) {
            Ok(mut messages) => {
                outcome.messages.append(&mut messages);
                if let Some(event) = applied_event(deps.storage, &attestation.claim)? {
                    outcome.events.push(event);
                }
            }
            Err(err) => {
                // resolved but skipped; a corrupted-state failure halts the
                // bridge for governance to inspect
                if let ContractError::Invariant { .. } = err {
                    let mut params = PARAMS.load(deps.storage)?;
                    params.bridge_active = false;
                    PARAMS.save(deps.storage, &params)?;
                }
                outcome.events.push(
                    Event::new("handler_error")
                        .add_attribute("claim_kind", attestation.claim.kind())
                        .add_attribute("event_nonce", target.to_string())
                        .add_attribute("error", err.to_string()),
                );
            }
        }
    }
}

/// The externally visible event of a successfully applied claim, for the
/// kinds that settle bridge artifacts.
fn applied_event(
    storage: &dyn cosmwasm_std::Storage,
    claim: &Claim,
) -> Result<Option<Event>, ContractError> {
    let bridge_id = PARAMS.load(storage)?.bridge_id;
    let event = match claim {
        Claim::BatchExecuted {
            batch_nonce,
            token_contract,
            ..
        } => Some(
            Event::new("batch_executed")
                .add_attribute("module", "bridge")
                .add_attribute("bridge_id", bridge_id)
                .add_attribute("token_contract", token_contract.to_string())
                .add_attribute("nonce", batch_nonce.to_string()),
        ),
        Claim::Erc20Deployed {
            cosmos_denom,
            token_contract,
            ..
        } => Some(
            Event::new("erc20_registered")
                .add_attribute("module", "bridge")
                .add_attribute("bridge_id", bridge_id)
                .add_attribute("cosmos_denom", cosmos_denom.clone())
                .add_attribute("token_contract", token_contract.to_string()),
        ),
        _ => None,
    };
    Ok(event)
}

/// Delete attestations that fell behind the retention window. Observed
/// records inside the window stay as replay defense.
fn prune_attestations(deps: DepsMut) -> Result<(), ContractError> {
    let params = PARAMS.load(deps.storage)?;
    let last = LAST_OBSERVED_EVENT_NONCE
        .may_load(deps.storage)?
        .unwrap_or_default();
    let cutoff = last.saturating_sub(params.attestation_retention_events);
    if cutoff == 0 {
        return Ok(());
    }

    let stale: Vec<(u64, Vec<u8>)> = ATTESTATIONS
        .range(deps.storage, None, None, cosmwasm_std::Order::Ascending)
        .map(|item| item.map(|(key, _)| key))
        .take_while(|item| match item {
            Ok((nonce, _)) => *nonce < cutoff,
            Err(_) => true,
        })
        .collect::<Result<_, _>>()?;
    for (nonce, hash) in stale {
        ATTESTATIONS.remove(deps.storage, (nonce, &hash));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Exhaustive dispatch over the closed claim set. Handlers are idempotent
/// given the strict nonce ordering.
fn apply_claim(
    deps: DepsMut,
    env: &Env,
    claim: &Claim,
) -> Result<Vec<CosmosMsg<HostMsg>>, ContractError> {
    match claim {
        Claim::SendToCosmos {
            token_contract,
            amount,
            cosmos_receiver,
            ..
        } => handle_send_to_cosmos(deps, env, token_contract, *amount, cosmos_receiver),
        Claim::BatchExecuted {
            batch_nonce,
            token_contract,
            reward_recipient,
            ..
        } => batch::outgoing_tx_batch_executed(deps, token_contract, *batch_nonce, reward_recipient),
        Claim::Erc20Deployed {
            cosmos_denom,
            token_contract,
            name,
            symbol,
            decimals,
            ..
        } => handle_erc20_deployed(deps, cosmos_denom, token_contract, name, symbol, *decimals),
        Claim::LogicCallExecuted {
            invalidation_id,
            invalidation_nonce,
            ..
        } => crate::logic_call::delete_logic_call(deps, invalidation_id, *invalidation_nonce),
        Claim::ValsetUpdated {
            valset_nonce,
            reward_amount,
            reward_denom,
            reward_recipient,
            ..
        } => handle_valset_updated(
            deps,
            env,
            *valset_nonce,
            *reward_amount,
            reward_denom,
            reward_recipient,
        ),
    }
}

/// A deposit on the EVM side: mint vouchers for EVM-originated tokens,
/// release escrow for cosmos-originated ones. An unparseable receiver
/// credits the community pool instead of deadlocking the nonce stream.
fn handle_send_to_cosmos(
    deps: DepsMut,
    env: &Env,
    token_contract: &EthAddress,
    amount: Uint128,
    cosmos_receiver: &str,
) -> Result<Vec<CosmosMsg<HostMsg>>, ContractError> {
    let (cosmos_originated, denom) = crate::pool::erc20_to_denom(deps.storage, token_contract)?;
    let coin = Coin {
        denom: denom.clone(),
        amount,
    };

    let receiver = deps.api.addr_validate(cosmos_receiver).ok();

    let mut messages: Vec<CosmosMsg<HostMsg>> = vec![];
    if cosmos_originated {
        release_escrow(deps, &denom, amount)?;
        match receiver {
            Some(receiver) => messages.push(
                BankMsg::Send {
                    to_address: receiver.into_string(),
                    amount: vec![coin],
                }
                .into(),
            ),
            None => messages.push(
                DistributionMsg::FundCommunityPool { amount: vec![coin] }.into(),
            ),
        }
    } else {
        match receiver {
            Some(receiver) => messages.push(CosmosMsg::Custom(HostMsg::Mint {
                recipient: receiver.into_string(),
                amount: coin,
            })),
            None => {
                // mint to the bridge account, then forward to the pool
                messages.push(CosmosMsg::Custom(HostMsg::Mint {
                    recipient: env.contract.address.to_string(),
                    amount: coin.clone(),
                }));
                messages.push(DistributionMsg::FundCommunityPool { amount: vec![coin] }.into());
            }
        }
    }
    Ok(messages)
}

fn release_escrow(deps: DepsMut, denom: &str, amount: Uint128) -> Result<(), ContractError> {
    let escrowed = ESCROW.may_load(deps.storage, denom)?.unwrap_or_default();
    let remaining = escrowed.checked_sub(amount).map_err(|_| {
        ContractError::invariant(format!(
            "release of {amount}{denom} exceeds escrowed {escrowed}"
        ))
    })?;
    if remaining.is_zero() {
        ESCROW.remove(deps.storage, denom);
    } else {
        ESCROW.save(deps.storage, denom, &remaining)?;
    }
    Ok(())
}

/// An ERC-20 representation was deployed for a cosmos-originated denom.
/// The mapping is adopted only if it matches the denom metadata on record;
/// a mismatched deployment stays observed but rejected, which makes the
/// deploying orchestrators a slashing target.
fn handle_erc20_deployed(
    deps: DepsMut,
    cosmos_denom: &str,
    token_contract: &EthAddress,
    name: &str,
    symbol: &str,
    decimals: u8,
) -> Result<Vec<CosmosMsg<HostMsg>>, ContractError> {
    if DENOM_TO_ERC20.may_load(deps.storage, cosmos_denom)?.is_some() {
        return Err(ContractError::invalid(
            "erc20 deployment",
            format!("denom {cosmos_denom} already has a representation"),
        ));
    }
    if ERC20_TO_DENOM
        .may_load(deps.storage, token_contract.as_str())?
        .is_some()
    {
        return Err(ContractError::invalid(
            "erc20 deployment",
            format!("contract {token_contract} already represents a denom"),
        ));
    }

    let metadata = DENOM_METADATA
        .may_load(deps.storage, cosmos_denom)?
        .ok_or_else(|| {
            ContractError::invalid(
                "erc20 deployment",
                format!("no metadata on record for denom {cosmos_denom}"),
            )
        })?;
    if metadata.name != name || metadata.symbol != symbol || metadata.decimals != decimals {
        return Err(ContractError::invalid(
            "erc20 deployment",
            format!(
                "metadata mismatch for {cosmos_denom}: got {name}/{symbol}/{decimals}, \
                 expected {}/{}/{}",
                metadata.name, metadata.symbol, metadata.decimals
            ),
        ));
    }

    DENOM_TO_ERC20.save(deps.storage, cosmos_denom, &token_contract.to_string())?;
    ERC20_TO_DENOM.save(
        deps.storage,
        token_contract.as_str(),
        &cosmos_denom.to_string(),
    )?;
    Ok(vec![])
}

/// The EVM contract adopted a new valset: pay the update reward and advance
/// the observed valset nonce, pruning sets the EVM side can no longer need.
fn handle_valset_updated(
    deps: DepsMut,
    env: &Env,
    valset_nonce: u64,
    reward_amount: Uint128,
    reward_denom: &str,
    reward_recipient: &str,
) -> Result<Vec<CosmosMsg<HostMsg>>, ContractError> {
    let mut messages: Vec<CosmosMsg<HostMsg>> = vec![];

    if !reward_amount.is_zero() && !reward_denom.is_empty() {
        let reward = Coin {
            denom: reward_denom.to_string(),
            amount: reward_amount,
        };
        match deps.api.addr_validate(reward_recipient) {
            Ok(recipient) => messages.push(CosmosMsg::Custom(HostMsg::Mint {
                recipient: recipient.into_string(),
                amount: reward,
            })),
            Err(_) => {
                messages.push(CosmosMsg::Custom(HostMsg::Mint {
                    recipient: env.contract.address.to_string(),
                    amount: reward.clone(),
                }));
                messages.push(
                    DistributionMsg::FundCommunityPool {
                        amount: vec![reward],
                    }
                    .into(),
                );
            }
        }
    }

    let last = LAST_OBSERVED_VALSET_NONCE
        .may_load(deps.storage)?
        .unwrap_or_default();
    if valset_nonce > last {
        LAST_OBSERVED_VALSET_NONCE.save(deps.storage, &valset_nonce)?;
    }

    // observed sets older than the retention window are dead weight
    let retention = PARAMS.load(deps.storage)?.valset_retention;
    let cutoff = valset_nonce.saturating_sub(retention);
    let stale: Vec<u64> = VALSETS
        .keys(deps.storage, None, None, cosmwasm_std::Order::Ascending)
        .take_while(|k| matches!(k, Ok(nonce) if *nonce < cutoff) || k.is_err())
        .collect::<Result<_, _>>()?;
    for nonce in stale {
        VALSETS.remove(deps.storage, nonce);
        let confirms: Vec<Addr> = VALSET_CONFIRMS
            .prefix(nonce)
            .keys(deps.storage, None, None, cosmwasm_std::Order::Ascending)
            .collect::<Result<_, _>>()?;
        for orchestrator in confirms {
            VALSET_CONFIRMS.remove(deps.storage, (nonce, &orchestrator));
        }
    }

    Ok(messages)
}
