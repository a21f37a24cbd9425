//! EVM address and bridged-amount primitives.
//!
//! An [`EthAddress`] is stored as normalized lowercase hex so that string
//! comparison, storage keys and the canonical validator-set sort all agree.
//! [`Erc20Token`] couples an amount with its token contract and renders both
//! projections of a bridged asset: the external ABI form and the voucher
//! denom used on the host chain.

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Coin, Uint128};

use crate::error::ContractError;

/// Prefix of voucher denoms minted for EVM-originated tokens.
pub const BRIDGE_DENOM_PREFIX: &str = "bridge";

/// A validated, lowercase-normalized 20-byte EVM address.
#[cw_serde]
#[derive(Eq, PartialOrd, Ord)]
pub struct EthAddress(String);

impl EthAddress {
    /// Parse and normalize a `0x`-prefixed hex address.
    ///
    /// Validation is checksum-agnostic: any casing is accepted, the stored
    /// form is lowercase.
    pub fn new(input: &str) -> Result<Self, ContractError> {
        let hex_part = input
            .strip_prefix("0x")
            .ok_or_else(|| ContractError::InvalidEthAddress {
                reason: format!("{input} missing 0x prefix"),
            })?;
        if hex_part.len() != 40 {
            return Err(ContractError::InvalidEthAddress {
                reason: format!("expected 40 hex chars, got {}", hex_part.len()),
            });
        }
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ContractError::InvalidEthAddress {
                reason: format!("{input} contains non-hex characters"),
            });
        }
        Ok(EthAddress(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    /// The normalized `0x`-prefixed lowercase string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The raw 20 bytes, for ABI encoding.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // the constructor validated exactly 40 hex chars
        if let Ok(decoded) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&decoded);
        }
        out
    }
}

impl std::fmt::Display for EthAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of a specific ERC-20, the form a transfer takes while it is
/// headed to or queued for the EVM side.
#[cw_serde]
pub struct Erc20Token {
    pub amount: Uint128,
    pub contract: EthAddress,
}

impl Erc20Token {
    pub fn new(amount: Uint128, contract: EthAddress) -> Self {
        Erc20Token { amount, contract }
    }

    /// The voucher coin representing this amount on the host chain.
    pub fn voucher_coin(&self) -> Coin {
        Coin {
            denom: bridge_denom(&self.contract),
            amount: self.amount,
        }
    }
}

/// Render the voucher denom for an EVM-originated token contract.
pub fn bridge_denom(contract: &EthAddress) -> String {
    format!("{BRIDGE_DENOM_PREFIX}{contract}")
}

/// Parse a voucher denom back into its token contract, if it is one.
pub fn parse_bridge_denom(denom: &str) -> Option<EthAddress> {
    let hex_part = denom.strip_prefix(BRIDGE_DENOM_PREFIX)?;
    EthAddress::new(hex_part).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_normalizes_mixed_case() {
        let addr = EthAddress::new("0xc783df8a850f42e7F7e57013759C285caa701eB6").unwrap();
        assert_eq!(addr.as_str(), "0xc783df8a850f42e7f7e57013759c285caa701eb6");
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(EthAddress::new("c783df8a850f42e7F7e57013759C285caa701eB6").is_err());
        assert!(EthAddress::new("0xc783df8a850f42e7").is_err());
        assert!(EthAddress::new("0xZ783df8a850f42e7F7e57013759C285caa701eB6").is_err());
    }

    #[test]
    fn bytes_round_trip() {
        let addr = EthAddress::new("0x9FC9C2DfBA3b6cF204C37a5F690619772b926e39").unwrap();
        let bytes = addr.to_bytes();
        assert_eq!(
            hex::encode(bytes),
            "9fc9c2dfba3b6cf204c37a5f690619772b926e39"
        );
    }

    #[test]
    fn denom_round_trip() {
        let addr = EthAddress::new("0x835973768750b3ED2D5c3EF5AdcD5eDb44d12aD4").unwrap();
        let denom = bridge_denom(&addr);
        assert_eq!(denom, "bridge0x835973768750b3ed2d5c3ef5adcd5edb44d12ad4");
        assert_eq!(parse_bridge_denom(&denom), Some(addr));
        assert_eq!(parse_bridge_denom("uatom"), None);
    }

    #[test]
    fn ordering_is_lowercase_lexicographic() {
        let a = EthAddress::new("0xa14879a175A2F1cEFC7c616f35b6d9c2b0Fd8326").unwrap();
        let b = EthAddress::new("0xA24879a175A2F1cEFC7c616f35b6d9c2b0Fd8326").unwrap();
        let c = EthAddress::new("0xF14879a175A2F1cEFC7c616f35b6d9c2b0Fd8326").unwrap();
        assert!(a < b && b < c);
    }
}
