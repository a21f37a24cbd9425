//! The staking view behind the bridge.
//!
//! Consumer-chain deployments have no native staking records, so the host
//! forwards its validator set into [`crate::state::VALIDATOR_RECORDS`],
//! keyed by consensus address. [`ValidatorSource`] is the capability seam:
//! everything above it (tallies, valset materialization, slashing windows)
//! only ever sees valcons-keyed records, whether they were forwarded from a
//! provider chain or mirrored from sovereign staking.

use cosmwasm_std::{Order, Storage};

use crate::error::ContractError;
use crate::state::{CrossChainValidator, BINDING_BY_VALCONS, VALIDATOR_RECORDS};
use crate::valset::{normalize_power, BridgeValidator, InternalValidatorSet};

pub trait ValidatorSource {
    /// Bonded (unjailed) validators, highest power first.
    fn bonded_validators_by_power(&self) -> Result<Vec<CrossChainValidator>, ContractError>;

    fn lookup_by_valcons(&self, valcons: &str)
        -> Result<Option<CrossChainValidator>, ContractError>;

    fn is_jailed(&self, valcons: &str) -> Result<bool, ContractError>;
}

/// [`ValidatorSource`] backed by the forwarded records.
pub struct ForwardedRecords<'a>(pub &'a dyn Storage);

impl ValidatorSource for ForwardedRecords<'_> {
    fn bonded_validators_by_power(&self) -> Result<Vec<CrossChainValidator>, ContractError> {
        let mut validators: Vec<CrossChainValidator> = VALIDATOR_RECORDS
            .range(self.0, None, None, Order::Ascending)
            .map(|item| item.map(|(_, record)| record))
            .collect::<Result<_, _>>()?;
        validators.retain(|v| !v.jailed);
        // records come out of the store sorted by address; resort by power,
        // address as the deterministic tie-break
        validators.sort_by(|a, b| b.power.cmp(&a.power).then(a.valcons.cmp(&b.valcons)));
        Ok(validators)
    }

    fn lookup_by_valcons(
        &self,
        valcons: &str,
    ) -> Result<Option<CrossChainValidator>, ContractError> {
        Ok(VALIDATOR_RECORDS.may_load(self.0, valcons)?)
    }

    fn is_jailed(&self, valcons: &str) -> Result<bool, ContractError> {
        Ok(self
            .lookup_by_valcons(valcons)?
            .map(|v| v.jailed)
            .unwrap_or(true))
    }
}

/// Replace the forwarded staking view wholesale.
pub fn sync_validator_set(
    storage: &mut dyn Storage,
    validators: Vec<CrossChainValidator>,
) -> Result<(), ContractError> {
    let stale: Vec<String> = VALIDATOR_RECORDS
        .keys(storage, None, None, Order::Ascending)
        .collect::<Result<_, _>>()?;
    for valcons in stale {
        VALIDATOR_RECORDS.remove(storage, &valcons);
    }
    for validator in validators {
        if validator.power == 0 {
            continue;
        }
        VALIDATOR_RECORDS.save(storage, &validator.valcons.clone(), &validator)?;
    }
    Ok(())
}

/// Mark a record jailed; the provider chain performs the actual jailing.
pub fn mark_jailed(storage: &mut dyn Storage, valcons: &str) -> Result<(), ContractError> {
    if let Some(mut record) = VALIDATOR_RECORDS.may_load(storage, valcons)? {
        record.jailed = true;
        VALIDATOR_RECORDS.save(storage, valcons, &record)?;
    }
    Ok(())
}

/// Total bonded (unjailed) host power.
pub fn total_bonded_power(storage: &dyn Storage) -> Result<u64, ContractError> {
    Ok(ForwardedRecords(storage)
        .bonded_validators_by_power()?
        .iter()
        .map(|v| v.power)
        .sum())
}

/// One validator's power rescaled into bridge power; zero for unknown or
/// jailed validators.
pub fn normalized_power_of(
    storage: &dyn Storage,
    valcons: &str,
    total_power: u64,
) -> Result<u64, ContractError> {
    let source = ForwardedRecords(storage);
    match source.lookup_by_valcons(valcons)? {
        Some(record) if !record.jailed => Ok(normalize_power(record.power, total_power)),
        _ => Ok(0),
    }
}

/// Materialize the signing set from the live staking view.
///
/// Validators without a registered eth key and members whose normalized
/// power rounds to zero are dropped. Returns `None` when nothing remains.
pub fn current_members(
    storage: &dyn Storage,
) -> Result<Option<InternalValidatorSet>, ContractError> {
    let bonded = ForwardedRecords(storage).bonded_validators_by_power()?;
    let total: u64 = bonded.iter().map(|v| v.power).sum();
    if total == 0 {
        return Ok(None);
    }

    let mut members = Vec::with_capacity(bonded.len());
    for validator in bonded {
        let Some(binding) = BINDING_BY_VALCONS.may_load(storage, &validator.valcons)? else {
            continue;
        };
        let power = normalize_power(validator.power, total);
        if power == 0 {
            continue;
        }
        members.push(BridgeValidator {
            power,
            eth_address: binding.eth_address,
        });
    }

    if members.is_empty() {
        return Ok(None);
    }
    Ok(Some(InternalValidatorSet::new(members)?))
}

#[cfg(test)]
mod tests {
    use cosmwasm_std::testing::mock_dependencies;
    use cosmwasm_std::Addr;

    use super::*;
    use crate::address::EthAddress;
    use crate::state::OrchestratorBinding;

    fn record(valcons: &str, power: u64, jailed: bool) -> CrossChainValidator {
        CrossChainValidator {
            valcons: valcons.to_string(),
            power,
            jailed,
        }
    }

    #[test]
    fn sync_replaces_previous_view() {
        let mut deps = mock_dependencies();
        sync_validator_set(
            deps.as_mut().storage,
            vec![record("valcons1", 10, false), record("valcons2", 20, false)],
        )
        .unwrap();
        sync_validator_set(deps.as_mut().storage, vec![record("valcons3", 5, false)])
            .unwrap();

        let bonded = ForwardedRecords(deps.as_ref().storage)
            .bonded_validators_by_power()
            .unwrap();
        assert_eq!(bonded.len(), 1);
        assert_eq!(bonded[0].valcons, "valcons3");
    }

    #[test]
    fn jailed_validators_carry_no_power() {
        let mut deps = mock_dependencies();
        sync_validator_set(
            deps.as_mut().storage,
            vec![record("valcons1", 10, false), record("valcons2", 30, true)],
        )
        .unwrap();

        assert_eq!(total_bonded_power(deps.as_ref().storage).unwrap(), 10);
        assert_eq!(
            normalized_power_of(deps.as_ref().storage, "valcons2", 10).unwrap(),
            0
        );
    }

    #[test]
    fn current_members_needs_bindings() {
        let mut deps = mock_dependencies();
        sync_validator_set(
            deps.as_mut().storage,
            vec![record("valcons1", 10, false), record("valcons2", 30, false)],
        )
        .unwrap();

        // nobody registered an eth key yet
        assert!(current_members(deps.as_ref().storage).unwrap().is_none());

        let binding = OrchestratorBinding {
            valcons: "valcons1".to_string(),
            orchestrator: Addr::unchecked("orch1"),
            eth_address: EthAddress::new("0xc783df8a850f42e7F7e57013759C285caa701eB6").unwrap(),
        };
        BINDING_BY_VALCONS
            .save(deps.as_mut().storage, "valcons1", &binding)
            .unwrap();

        let members = current_members(deps.as_ref().storage).unwrap().unwrap();
        assert_eq!(members.members().len(), 1);
        // valcons1 holds a quarter of the stake
        assert_eq!(members.members()[0].power, u32::MAX as u64 / 4);
    }
}
