//! Deterministic checkpoints for the signed artifacts.
//!
//! A checkpoint is `keccak256(abi.encode(...))` with a fixed layout per
//! artifact kind. The EVM verifier computes the exact same bytes, so any
//! change here is a consensus-breaking upgrade. The second tuple element is
//! a method-name constant that exists only for domain separation between
//! the three kinds.

use cosmwasm_std::Uint128;

use crate::abi::{self, AbiToken};
use crate::error::ContractError;
use crate::state::{OutgoingLogicCall, OutgoingTxBatch};
use crate::valset::Valset;

const VALSET_DOMAIN: &str = "checkpoint";
const BATCH_DOMAIN: &str = "transactionBatch";
const LOGIC_CALL_DOMAIN: &str = "logicCall";

/// Checkpoint of a validator set.
///
/// Layout: `(bridge_id, "checkpoint", nonce, addrs[], powers[],
/// reward_amount, reward_denom)`. Member order is the canonical
/// ascending-address sort applied at construction.
pub fn valset_checkpoint(bridge_id: &str, valset: &Valset) -> Result<[u8; 32], ContractError> {
    let members = valset.members.members();
    let addresses = members.iter().map(|m| m.eth_address.clone()).collect();
    let powers = members.iter().map(|m| Uint128::new(m.power as u128)).collect();

    let encoded = abi::encode(&[
        AbiToken::FixedBytes(abi::str_to_fixed_bytes32(bridge_id)?),
        AbiToken::FixedBytes(abi::str_to_fixed_bytes32(VALSET_DOMAIN)?),
        AbiToken::Uint64(valset.nonce),
        AbiToken::AddressArray(addresses),
        AbiToken::UintArray(powers),
        AbiToken::Uint(valset.reward_amount),
        AbiToken::Str(valset.reward_denom.clone()),
    ]);
    Ok(abi::keccak256(&encoded))
}

/// Checkpoint of an outgoing batch.
///
/// Layout: `(bridge_id, "transactionBatch", amounts[], destinations[],
/// fees[], batch_nonce, token_contract, batch_timeout)`. Transaction order
/// is part of the hash.
pub fn batch_checkpoint(
    bridge_id: &str,
    batch: &OutgoingTxBatch,
) -> Result<[u8; 32], ContractError> {
    let amounts = batch
        .transactions
        .iter()
        .map(|tx| tx.erc20_token.amount)
        .collect();
    let destinations = batch
        .transactions
        .iter()
        .map(|tx| tx.dest_address.clone())
        .collect();
    let fees = batch.transactions.iter().map(|tx| tx.fee.amount).collect();

    let encoded = abi::encode(&[
        AbiToken::FixedBytes(abi::str_to_fixed_bytes32(bridge_id)?),
        AbiToken::FixedBytes(abi::str_to_fixed_bytes32(BATCH_DOMAIN)?),
        AbiToken::UintArray(amounts),
        AbiToken::AddressArray(destinations),
        AbiToken::UintArray(fees),
        AbiToken::Uint64(batch.batch_nonce),
        AbiToken::Address(batch.token_contract.clone()),
        AbiToken::Uint64(batch.batch_timeout),
    ]);
    Ok(abi::keccak256(&encoded))
}

/// Checkpoint of an outgoing logic call.
pub fn logic_call_checkpoint(
    bridge_id: &str,
    call: &OutgoingLogicCall,
) -> Result<[u8; 32], ContractError> {
    let invalidation_id: [u8; 32] = call
        .invalidation_id
        .to_vec()
        .try_into()
        .map_err(|_| ContractError::invalid("invalidation_id", "must be 32 bytes"))?;

    let encoded = abi::encode(&[
        AbiToken::FixedBytes(abi::str_to_fixed_bytes32(bridge_id)?),
        AbiToken::FixedBytes(abi::str_to_fixed_bytes32(LOGIC_CALL_DOMAIN)?),
        AbiToken::UintArray(call.transfers.iter().map(|t| t.amount).collect()),
        AbiToken::AddressArray(call.transfers.iter().map(|t| t.contract.clone()).collect()),
        AbiToken::UintArray(call.fees.iter().map(|t| t.amount).collect()),
        AbiToken::AddressArray(call.fees.iter().map(|t| t.contract.clone()).collect()),
        AbiToken::Address(call.logic_contract_address.clone()),
        AbiToken::Bytes(call.payload.to_vec()),
        AbiToken::Uint64(call.timeout),
        AbiToken::FixedBytes(invalidation_id),
        AbiToken::Uint64(call.invalidation_nonce),
    ]);
    Ok(abi::keccak256(&encoded))
}

#[cfg(test)]
mod tests {
    use cosmwasm_std::{Addr, Binary, Coin};

    use super::*;
    use crate::address::{Erc20Token, EthAddress};
    use crate::state::OutgoingTransferTx;
    use crate::valset::BridgeValidator;

    fn member(power: u64, addr: &str) -> BridgeValidator {
        BridgeValidator {
            power,
            eth_address: EthAddress::new(addr).unwrap(),
        }
    }

    /// Gold hash produced by the EVM verifier for a single-member set.
    #[test]
    fn valset_checkpoint_gold() {
        let valset = Valset::new(
            0,
            0,
            vec![member(6667, "0xc783df8a850f42e7F7e57013759C285caa701eB6")],
            Uint128::zero(),
            String::new(),
        )
        .unwrap();

        let hash = valset_checkpoint("foo", &valset).unwrap();
        assert_eq!(
            hex::encode(hash),
            "e3d534594d4a3cf357de3b07a7b26dbc31daab10edb881cb3eef0292cf0669c0"
        );
    }

    fn three_member_set() -> Vec<BridgeValidator> {
        vec![
            member(3333, "0xc783df8a850f42e7F7e57013759C285caa701eB6"),
            member(3333, "0xE5904695748fe4A84b40b3fc79De2277660BD1D3"),
            member(3333, "0xeAD9C93b79Ae7C1591b1FB5323BD777E86e150d4"),
        ]
    }

    /// Gold hashes shared with the off-chain signer tests: with and without
    /// a reward.
    #[test]
    fn valset_checkpoint_gold_three_members() {
        let with_reward = Valset::new(
            0,
            0,
            three_member_set(),
            Uint128::new(1000),
            "foo_denom".to_string(),
        )
        .unwrap();
        assert_eq!(
            hex::encode(valset_checkpoint("foo", &with_reward).unwrap()),
            "2751e9f1cdef7c6f1365e81a42707c0ecff75e6cd7cecd6c456e571234548a1e"
        );

        let without_reward =
            Valset::new(0, 0, three_member_set(), Uint128::zero(), String::new()).unwrap();
        assert_eq!(
            hex::encode(valset_checkpoint("foo", &without_reward).unwrap()),
            "a2c8dc58c06fa959763bffd4c8fe8668869b7b5c866a7b0f0f1739b92a6cd5d1"
        );

        // a different nonce must change the hash
        let bumped_nonce =
            Valset::new(1, 0, three_member_set(), Uint128::zero(), String::new()).unwrap();
        assert_ne!(
            hex::encode(valset_checkpoint("foo", &bumped_nonce).unwrap()),
            "a2c8dc58c06fa959763bffd4c8fe8668869b7b5c866a7b0f0f1739b92a6cd5d1"
        );
    }

    /// The checkpoint is invariant under input permutation (canonical sort)
    /// and sensitive to every field.
    #[test]
    fn valset_checkpoint_permutation_and_sensitivity() {
        let base = Valset::new(3, 7, three_member_set(), Uint128::new(5), "x".into()).unwrap();
        let base_hash = valset_checkpoint("foo", &base).unwrap();

        let mut shuffled = three_member_set();
        shuffled.rotate_left(2);
        let permuted = Valset::new(3, 7, shuffled, Uint128::new(5), "x".into()).unwrap();
        assert_eq!(valset_checkpoint("foo", &permuted).unwrap(), base_hash);

        let mut powers = three_member_set();
        powers[0].power = 3334;
        let power_changed = Valset::new(3, 7, powers, Uint128::new(5), "x".into()).unwrap();
        assert_ne!(valset_checkpoint("foo", &power_changed).unwrap(), base_hash);

        let reward_changed =
            Valset::new(3, 7, three_member_set(), Uint128::new(6), "x".into()).unwrap();
        assert_ne!(valset_checkpoint("foo", &reward_changed).unwrap(), base_hash);

        // height is not part of the signed layout
        let height_changed =
            Valset::new(3, 9, three_member_set(), Uint128::new(5), "x".into()).unwrap();
        assert_eq!(valset_checkpoint("foo", &height_changed).unwrap(), base_hash);
    }

    /// Gold hash produced by the EVM verifier for a one-transfer batch.
    #[test]
    fn batch_checkpoint_gold() {
        let token = EthAddress::new("0x835973768750b3ED2D5c3EF5AdcD5eDb44d12aD4").unwrap();
        let batch = OutgoingTxBatch {
            batch_nonce: 1,
            token_contract: token.clone(),
            transactions: vec![OutgoingTransferTx {
                id: 1,
                sender: Addr::unchecked("sender"),
                dest_address: EthAddress::new("0x9FC9C2DfBA3b6cF204C37a5F690619772b926e39")
                    .unwrap(),
                erc20_token: Erc20Token::new(Uint128::new(1), token),
                fee: Coin::new(1, "stake"),
            }],
            block: 0,
            batch_timeout: 2111,
        };

        let hash = batch_checkpoint("foo", &batch).unwrap();
        assert_eq!(
            hex::encode(hash),
            "81672af5f562cfe8f1649b06c3f04572b702396343e9aa178ac5a9ce87bbafb5"
        );
    }

    /// Gold hash produced by the EVM verifier for a logic call.
    #[test]
    fn logic_call_checkpoint_gold() {
        let token = Erc20Token::new(
            Uint128::new(1),
            EthAddress::new("0xC26eFfa98B8A2632141562Ae7E34953Cfe5B4888").unwrap(),
        );
        let call = OutgoingLogicCall {
            transfers: vec![token.clone()],
            fees: vec![token],
            logic_contract_address: EthAddress::new("0x17c1736CcF692F653c433d7aa2aB45148C016F68")
                .unwrap(),
            payload: Binary::from(
                hex::decode("74657374696e675061796c6f6164000000000000000000000000000000000000")
                    .unwrap(),
            ),
            timeout: 4766922941000,
            invalidation_id: Binary::from(
                hex::decode("696e76616c69646174696f6e4964000000000000000000000000000000000000")
                    .unwrap(),
            ),
            invalidation_nonce: 1,
        };

        let hash = logic_call_checkpoint("foo", &call).unwrap();
        assert_eq!(
            hex::encode(hash),
            "1de95c9ace999f8ec70c6dc8d045942da2612950567c4861aca959c0650194da"
        );
    }

    #[test]
    fn overlong_bridge_id_fails_loudly() {
        let valset = Valset::new(
            0,
            0,
            vec![member(1, "0xc783df8a850f42e7F7e57013759C285caa701eB6")],
            Uint128::zero(),
            String::new(),
        )
        .unwrap();
        assert!(valset_checkpoint(&"f".repeat(33), &valset).is_err());
    }
}
