//! Solidity ABI encoding and keccak256 hashing.
//!
//! The EVM verifier computes `keccak256(abi.encode(...))` over the signed
//! artifacts. `abi.encode` has no direct equivalent here, so the layout is
//! produced by hand: a head of 32-byte words (static values inline, dynamic
//! values as offsets into the tail) followed by the tail data in element
//! order. No function selector is ever part of the encoding.
//!
//! # Word layout
//! - `uint256`: big-endian, left-padded
//! - `address`: 20 bytes, left-padded
//! - `bytes32`: as-is
//! - `T[]`: length word + one word per element
//! - `string`/`bytes`: length word + data zero-padded to a 32-byte boundary

use cosmwasm_std::{Api, Uint128};
use tiny_keccak::{Hasher, Keccak};

use crate::address::EthAddress;
use crate::error::ContractError;

/// Compute keccak256 of arbitrary data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// One element of an ABI tuple.
pub enum AbiToken {
    FixedBytes([u8; 32]),
    Uint(Uint128),
    Uint64(u64),
    Address(EthAddress),
    UintArray(Vec<Uint128>),
    AddressArray(Vec<EthAddress>),
    Str(String),
    Bytes(Vec<u8>),
}

impl AbiToken {
    fn is_dynamic(&self) -> bool {
        matches!(
            self,
            AbiToken::UintArray(_) | AbiToken::AddressArray(_) | AbiToken::Str(_) | AbiToken::Bytes(_)
        )
    }

    /// The tail bytes of a dynamic token; empty for static tokens.
    fn tail(&self) -> Vec<u8> {
        match self {
            AbiToken::UintArray(values) => {
                let mut out = u64_word(values.len() as u64).to_vec();
                for v in values {
                    out.extend_from_slice(&uint_word(*v));
                }
                out
            }
            AbiToken::AddressArray(addrs) => {
                let mut out = u64_word(addrs.len() as u64).to_vec();
                for a in addrs {
                    out.extend_from_slice(&address_word(a));
                }
                out
            }
            AbiToken::Str(s) => padded_bytes_tail(s.as_bytes()),
            AbiToken::Bytes(b) => padded_bytes_tail(b),
            _ => Vec::new(),
        }
    }
}

/// `abi.encode` of a tuple of tokens.
pub fn encode(tokens: &[AbiToken]) -> Vec<u8> {
    let head_len = 32 * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail: Vec<u8> = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&u64_word((head_len + tail.len()) as u64));
            tail.extend_from_slice(&token.tail());
        } else {
            match token {
                AbiToken::FixedBytes(b) => head.extend_from_slice(b),
                AbiToken::Uint(v) => head.extend_from_slice(&uint_word(*v)),
                AbiToken::Uint64(v) => head.extend_from_slice(&u64_word(*v)),
                AbiToken::Address(a) => head.extend_from_slice(&address_word(a)),
                _ => unreachable!("dynamic token in static branch"),
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

fn padded_bytes_tail(data: &[u8]) -> Vec<u8> {
    let padded_len = (data.len() + 31) / 32 * 32;
    let mut out = u64_word(data.len() as u64).to_vec();
    out.extend_from_slice(data);
    out.resize(32 + padded_len, 0);
    out
}

fn u64_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..32].copy_from_slice(&value.to_be_bytes());
    word
}

fn uint_word(value: Uint128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..32].copy_from_slice(&value.u128().to_be_bytes());
    word
}

fn address_word(addr: &EthAddress) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..32].copy_from_slice(&addr.to_bytes());
    word
}

/// A UTF-8 string zero-padded into a `bytes32`.
///
/// The bridge id and the checkpoint method names use this. An overlong input
/// is a programmer error and fails loudly rather than truncating.
pub fn str_to_fixed_bytes32(s: &str) -> Result<[u8; 32], ContractError> {
    let bytes = s.as_bytes();
    if bytes.len() > 32 {
        return Err(ContractError::invalid(
            "bridge_id",
            format!("{} bytes does not fit in bytes32", bytes.len()),
        ));
    }
    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

// ============================================================================
// Ethereum signatures
// ============================================================================

/// Digest actually signed by orchestrators: the personal-sign envelope over
/// a 32-byte checkpoint.
pub fn personal_sign_digest(checkpoint: &[u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(60);
    data.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
    data.extend_from_slice(checkpoint);
    keccak256(&data)
}

/// Recover the eth address that produced a 65-byte `r || s || v` signature
/// over `checkpoint`.
pub fn recover_eth_signer(
    api: &dyn Api,
    checkpoint: &[u8; 32],
    signature: &[u8],
) -> Result<EthAddress, ContractError> {
    if signature.len() != 65 {
        return Err(ContractError::MalformedSignature {
            reason: format!("expected 65 bytes, got {}", signature.len()),
        });
    }
    let recovery_id = match signature[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        v => {
            return Err(ContractError::MalformedSignature {
                reason: format!("invalid recovery byte {v}"),
            })
        }
    };
    let digest = personal_sign_digest(checkpoint);
    let pubkey = api
        .secp256k1_recover_pubkey(&digest, &signature[..64], recovery_id)
        .map_err(|e| ContractError::MalformedSignature {
            reason: e.to_string(),
        })?;
    // uncompressed SEC1 key: 0x04 || x || y; the address is the low 20 bytes
    // of keccak(x || y)
    let hash = keccak256(&pubkey[1..]);
    EthAddress::new(&format!("0x{}", hex::encode(&hash[12..])))
}

/// Check a signature against the eth address an orchestrator registered.
pub fn validate_eth_signature(
    api: &dyn Api,
    checkpoint: &[u8; 32],
    signature: &[u8],
    expected: &EthAddress,
) -> Result<(), ContractError> {
    let recovered = recover_eth_signer(api, checkpoint, signature)?;
    if recovered != *expected {
        return Err(ContractError::SignatureMismatch {
            expected: expected.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex32(s: &str) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&hex::decode(s).unwrap());
        out
    }

    #[test]
    fn keccak_known_vector() {
        // keccak256("hello")
        assert_eq!(
            hex::encode(keccak256(b"hello")),
            "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn static_words() {
        let encoded = encode(&[
            AbiToken::Uint64(1),
            AbiToken::Uint(Uint128::new(2)),
            AbiToken::FixedBytes(hex32(
                "ff00000000000000000000000000000000000000000000000000000000000000",
            )),
        ]);
        assert_eq!(encoded.len(), 96);
        assert_eq!(encoded[31], 1);
        assert_eq!(encoded[63], 2);
        assert_eq!(encoded[64], 0xff);
    }

    #[test]
    fn dynamic_offsets_match_solidity() {
        // abi.encode(uint256(7), uint256[](5, 6)) ==
        // 0x..07 | offset 0x40 | len 2 | 5 | 6
        let encoded = encode(&[
            AbiToken::Uint64(7),
            AbiToken::UintArray(vec![Uint128::new(5), Uint128::new(6)]),
        ]);
        assert_eq!(encoded.len(), 5 * 32);
        assert_eq!(encoded[31], 7);
        assert_eq!(encoded[63], 0x40);
        assert_eq!(encoded[95], 2);
        assert_eq!(encoded[127], 5);
        assert_eq!(encoded[159], 6);
    }

    #[test]
    fn string_tail_is_length_prefixed_and_padded() {
        let encoded = encode(&[AbiToken::Str("EVM".to_string())]);
        // offset word + length word + one padded data word
        assert_eq!(encoded.len(), 96);
        assert_eq!(encoded[31], 0x20);
        assert_eq!(encoded[63], 3);
        assert_eq!(&encoded[64..67], b"EVM");
        assert_eq!(&encoded[67..96], &[0u8; 29]);
    }

    #[test]
    fn empty_string_has_empty_tail_data() {
        let encoded = encode(&[AbiToken::Str(String::new())]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[63], 0);
    }

    #[test]
    fn fixed_bytes32_rejects_overlong_input() {
        assert!(str_to_fixed_bytes32("foo").is_ok());
        assert!(str_to_fixed_bytes32(&"x".repeat(33)).is_err());
    }

    #[test]
    fn fixed_bytes32_pads_right() {
        let word = str_to_fixed_bytes32("checkpoint").unwrap();
        assert_eq!(&word[..10], b"checkpoint");
        assert_eq!(&word[10..], &[0u8; 22]);
    }
}
