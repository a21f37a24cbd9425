//! On-chain core of a two-way token bridge between a proof-of-stake host
//! chain and an EVM chain.
//!
//! # Outgoing flow (host → EVM)
//! 1. A user queues a withdrawal with `SendToEth`; amount and fee lock in
//!    the bridge account
//! 2. A relayer requests a batch; the builder takes the most profitable
//!    pool transactions of one token
//! 3. Orchestrators co-sign the batch checkpoint (`ConfirmBatch`)
//! 4. The EVM contract executes the batch; the executed-batch claim comes
//!    back through the attestation engine and retires it
//!
//! # Incoming flow (EVM → host)
//! 1. Orchestrators observe a deposit event and submit matching claims
//! 2. At > 2/3 of normalized power the attestation is observed and applied
//!    exactly once, in event-nonce order
//!
//! # Signing domain
//! Validator sets, batches and logic calls are anchored by keccak256
//! checkpoints over Solidity ABI encodings, byte-identical to what the EVM
//! verifier computes.

pub mod abi;
pub mod address;
pub mod attestation;
pub mod batch;
pub mod checkpoint;
pub mod contract;
pub mod error;
mod execute;
pub mod invariants;
pub mod logic_call;
pub mod msg;
pub mod pool;
mod query;
mod slashing;
pub mod state;
pub mod validator_source;
pub mod valset;

pub use crate::address::EthAddress;
pub use crate::error::ContractError;
