//! Error types for the bridge contract.

use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    // ========================================================================
    // Authorization
    // ========================================================================

    #[error("Unauthorized: only the governance account can perform this action")]
    Unauthorized,

    #[error("Unauthorized: sender is not a registered orchestrator")]
    UnknownOrchestrator,

    // ========================================================================
    // Validation
    // ========================================================================

    #[error("Invalid ethereum address: {reason}")]
    InvalidEthAddress { reason: String },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Fees must be paid in {denom}")]
    WrongFeeDenom { denom: String },

    #[error("Denom {denom} has no known token contract")]
    UnknownDenom { denom: String },

    #[error("Contract {contract} has no known denom")]
    UnknownContract { contract: String },

    // ========================================================================
    // Not found
    // ========================================================================

    #[error("Pool transaction {id} not found in the unbatched index")]
    UnknownPoolTransaction { id: u64 },

    #[error("Batch {nonce} for token {token_contract} not found")]
    UnknownBatch { nonce: u64, token_contract: String },

    #[error("Valset {nonce} not found")]
    UnknownValset { nonce: u64 },

    #[error("Logic call not found")]
    UnknownLogicCall,

    // ========================================================================
    // Duplicates
    // ========================================================================

    #[error("Duplicate orchestrator binding on {axis}")]
    DuplicateBinding { axis: String },

    #[error("Orchestrator already voted on this event")]
    DuplicateVote,

    #[error("Transaction already in pool")]
    DuplicatePoolEntry,

    // ========================================================================
    // Forbidden
    // ========================================================================

    #[error("Bridge is paused")]
    BridgePaused,

    #[error("Destination {address} is blacklisted")]
    Blacklisted { address: String },

    #[error("Sender {sender} did not create transaction {id}")]
    NotYourTransaction { sender: String, id: u64 },

    // ========================================================================
    // Profitability
    // ========================================================================

    #[error("New batch would not be more profitable than batch {last_nonce}")]
    BatchNotProfitable { last_nonce: u64 },

    #[error("No batchable transactions for token {token_contract}")]
    EmptyBatch { token_contract: String },

    // ========================================================================
    // Signatures & evidence
    // ========================================================================

    #[error("Signature does not match eth address {expected}")]
    SignatureMismatch { expected: String },

    #[error("Malformed signature: {reason}")]
    MalformedSignature { reason: String },

    #[error("Evidence subject is a checkpoint the bridge actually signed")]
    EvidenceNotFraudulent,

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Persisted-state corruption. Promoted to a bridge halt by the caller.
    #[error("Invariant violation: {reason}")]
    Invariant { reason: String },
}

impl ContractError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ContractError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        ContractError::Invariant {
            reason: reason.into(),
        }
    }
}
