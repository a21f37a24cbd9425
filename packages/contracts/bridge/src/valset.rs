//! Bridge validator sets.
//!
//! Powers here are *bridge* powers, not host-chain voting powers: each
//! member's stake is normalized so the whole set sums to `2^32 - 1`. The
//! EVM verifier's signature-weighting cost is therefore independent of
//! absolute stake, and inflation that preserves relative stakes produces no
//! new validator set at all.

use std::collections::BTreeMap;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Decimal, Uint128};

use crate::address::EthAddress;
use crate::error::ContractError;

/// Normalized power of the whole set.
pub const TOTAL_BRIDGE_POWER: u64 = u32::MAX as u64;

/// One member of the EVM-side multisig set.
#[cw_serde]
pub struct BridgeValidator {
    pub power: u64,
    pub eth_address: EthAddress,
}

/// A validated member set: non-empty, unique addresses, positive powers,
/// canonically sorted ascending by lowercase eth address. Reordering the
/// members changes the checkpoint, so the sort is applied on construction
/// and never after.
#[cw_serde]
pub struct InternalValidatorSet(Vec<BridgeValidator>);

impl InternalValidatorSet {
    pub fn new(mut members: Vec<BridgeValidator>) -> Result<Self, ContractError> {
        if members.is_empty() {
            return Err(ContractError::invalid("validator set", "empty"));
        }
        for member in &members {
            if member.power == 0 {
                return Err(ContractError::invalid(
                    "validator set",
                    format!("member {} has zero power", member.eth_address),
                ));
            }
        }
        let mut seen = BTreeMap::new();
        for member in &members {
            if seen.insert(member.eth_address.clone(), ()).is_some() {
                return Err(ContractError::invalid(
                    "validator set",
                    format!("duplicate eth address {}", member.eth_address),
                ));
            }
        }
        members.sort_by(|a, b| a.eth_address.cmp(&b.eth_address));
        Ok(InternalValidatorSet(members))
    }

    pub fn members(&self) -> &[BridgeValidator] {
        &self.0
    }

    pub fn total_power(&self) -> u64 {
        self.0.iter().map(|m| m.power).sum()
    }

    /// Normalized L1 distance between two sets, in `[0, 2]`.
    ///
    /// Members absent on one side count as zero power there. Deltas are
    /// accumulated in address order so every replica sums the same floats
    /// in the same order.
    pub fn power_diff(&self, other: &InternalValidatorSet) -> f64 {
        let mut deltas: BTreeMap<&EthAddress, i64> = BTreeMap::new();
        for member in &self.0 {
            deltas.insert(&member.eth_address, member.power as i64);
        }
        for member in &other.0 {
            *deltas.entry(&member.eth_address).or_insert(0) -= member.power as i64;
        }

        let total: f64 = deltas.values().map(|d| (*d as f64).abs()).sum();
        total / TOTAL_BRIDGE_POWER as f64
    }
}

/// Rescale a host-chain voting power into bridge power.
pub fn normalize_power(power: u64, total_power: u64) -> u64 {
    if total_power == 0 {
        return 0;
    }
    (power as u128 * TOTAL_BRIDGE_POWER as u128 / total_power as u128) as u64
}

/// Whether `current` has drifted far enough from `prev` to justify paying
/// for a validator-set update on the EVM side.
pub fn should_update(
    prev: &InternalValidatorSet,
    current: &InternalValidatorSet,
    threshold: Decimal,
) -> bool {
    let threshold = decimal_to_f64(threshold);
    prev.power_diff(current) > threshold
}

fn decimal_to_f64(d: Decimal) -> f64 {
    // Decimal is a fixed-point integer over 10^18
    d.atomics().u128() as f64 / 1e18
}

/// A checkpointed snapshot of the signing set. Immutable once stored.
#[cw_serde]
pub struct Valset {
    pub nonce: u64,
    pub height: u64,
    pub members: InternalValidatorSet,
    pub reward_amount: Uint128,
    pub reward_denom: String,
}

impl Valset {
    pub fn new(
        nonce: u64,
        height: u64,
        members: Vec<BridgeValidator>,
        reward_amount: Uint128,
        reward_denom: String,
    ) -> Result<Self, ContractError> {
        Ok(Valset {
            nonce,
            height,
            members: InternalValidatorSet::new(members)?,
            reward_amount,
            reward_denom,
        })
    }
}
