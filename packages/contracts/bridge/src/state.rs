//! State definitions for the bridge contract.
//!
//! One keyed store with structured prefixes. The unbatched pool is indexed
//! by `(token_contract, fee_amount, tx_id)` so a descending range walks the
//! most profitable transactions first; counters are monotonic and never
//! reused.

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Binary, Coin, Decimal, Storage, Uint128};
use cw_storage_plus::{Item, Map};

use crate::address::{Erc20Token, EthAddress};
use crate::attestation::Attestation;
use crate::error::ContractError;
use crate::valset::Valset;

/// Contract name for cw2 migration info
pub const CONTRACT_NAME: &str = "crates.io:evm-peg-bridge";

/// Contract version for cw2 migration info
pub const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Configuration
// ============================================================================

/// Governance-settable parameters.
#[cw_serde]
pub struct Params {
    /// 32-byte domain separator folded into every signed checkpoint
    pub bridge_id: String,
    /// False while the bridge is halted; batches cannot be built
    pub bridge_active: bool,
    /// Required fee denom for outgoing transfers; empty means unrestricted
    pub batch_fee_denom: String,
    /// Destinations that never enter a batch
    pub ethereum_blacklist: Vec<EthAddress>,
    /// Maximum transactions per batch
    pub batch_max_elements: u64,
    /// Batch timeout, in EVM blocks past the last observed height
    pub batch_timeout_blocks: u64,
    /// Reward paid on the EVM side to the submitter of a valset update
    pub valset_reward: Coin,
    /// Power drift that triggers a new valset, as a fraction of 2^32
    pub power_diff_threshold: Decimal,
    /// Host-chain blocks a validator has to confirm a valset
    pub signed_valsets_window: u64,
    /// Host-chain blocks a validator has to confirm a batch
    pub signed_batches_window: u64,
    pub slash_fraction_valset: Decimal,
    pub slash_fraction_batch: Decimal,
    pub slash_fraction_bad_eth_signature: Decimal,
    /// Attestations older than this many events behind the last observed
    /// nonce are pruned
    pub attestation_retention_events: u64,
    /// Observed valsets older than this many nonces are pruned
    pub valset_retention: u64,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            bridge_id: "defaultbridgeid".to_string(),
            bridge_active: true,
            batch_fee_denom: String::new(),
            ethereum_blacklist: vec![],
            batch_max_elements: 100,
            batch_timeout_blocks: 43_200,
            valset_reward: Coin::new(0, ""),
            power_diff_threshold: Decimal::percent(5),
            signed_valsets_window: 10_000,
            signed_batches_window: 10_000,
            slash_fraction_valset: Decimal::permille(1),
            slash_fraction_batch: Decimal::permille(1),
            slash_fraction_bad_eth_signature: Decimal::permille(1),
            attestation_retention_events: 1_000,
            valset_retention: 10,
        }
    }
}

// ============================================================================
// Core entities
// ============================================================================

/// A withdrawal waiting in the pool or riding in a batch.
#[cw_serde]
pub struct OutgoingTransferTx {
    pub id: u64,
    pub sender: Addr,
    pub dest_address: EthAddress,
    pub erc20_token: Erc20Token,
    pub fee: Coin,
}

/// An ordered group of withdrawals for one token contract, signed together.
#[cw_serde]
pub struct OutgoingTxBatch {
    pub batch_nonce: u64,
    pub token_contract: EthAddress,
    /// Sorted by fee descending, ties by ascending id
    pub transactions: Vec<OutgoingTransferTx>,
    /// Host-chain height at creation
    pub block: u64,
    /// EVM height after which the batch can no longer execute
    pub batch_timeout: u64,
}

impl OutgoingTxBatch {
    /// Total fees carried by the batch, the profitability measure.
    pub fn total_fees(&self) -> Uint128 {
        self.transactions
            .iter()
            .map(|tx| tx.fee.amount)
            .sum()
    }
}

/// An arbitrary-logic invocation queued for the EVM side.
#[cw_serde]
pub struct OutgoingLogicCall {
    pub transfers: Vec<Erc20Token>,
    pub fees: Vec<Erc20Token>,
    pub logic_contract_address: EthAddress,
    pub payload: Binary,
    pub timeout: u64,
    pub invalidation_id: Binary,
    pub invalidation_nonce: u64,
}

/// One orchestrator's signature over a batch checkpoint.
#[cw_serde]
pub struct BatchConfirmation {
    pub batch_nonce: u64,
    pub token_contract: EthAddress,
    pub eth_signer: EthAddress,
    pub orchestrator: Addr,
    pub signature: String,
}

/// One orchestrator's signature over a valset checkpoint.
#[cw_serde]
pub struct ValsetConfirmation {
    pub nonce: u64,
    pub eth_signer: EthAddress,
    pub orchestrator: Addr,
    pub signature: String,
}

/// One orchestrator's signature over a logic-call checkpoint.
#[cw_serde]
pub struct LogicCallConfirmation {
    pub invalidation_id: Binary,
    pub invalidation_nonce: u64,
    pub eth_signer: EthAddress,
    pub orchestrator: Addr,
    pub signature: String,
}

/// The consensus-operator-eth key triple of one validator. 1-1-1.
#[cw_serde]
pub struct OrchestratorBinding {
    pub valcons: String,
    pub orchestrator: Addr,
    pub eth_address: EthAddress,
}

/// A validator record forwarded from the host chain's staking view,
/// keyed by consensus address.
#[cw_serde]
pub struct CrossChainValidator {
    pub valcons: String,
    pub power: u64,
    pub jailed: bool,
}

/// Denom metadata used to vet `Erc20Deployed` claims for cosmos-originated
/// assets.
#[cw_serde]
pub struct DenomMetadata {
    pub denom: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

// ============================================================================
// Storage
// ============================================================================

pub const PARAMS: Item<Params> = Item::new("params");

/// Host-chain governance account; the only sender allowed on gov messages
pub const GOV: Item<Addr> = Item::new("gov");

/// Orchestrator bindings, three indexes for O(1) lookup in each direction
pub const BINDING_BY_VALCONS: Map<&str, OrchestratorBinding> = Map::new("binding_valcons");
pub const VALCONS_BY_ORCHESTRATOR: Map<&Addr, String> = Map::new("binding_orch");
pub const VALCONS_BY_ETH: Map<&str, String> = Map::new("binding_eth");

/// Validator records synced from the host staking view
/// Key: valcons, Value: CrossChainValidator
pub const VALIDATOR_RECORDS: Map<&str, CrossChainValidator> = Map::new("validator_records");

/// Monotonic id of the last pool transaction
pub const LAST_TX_ID: Item<u64> = Item::new("last_tx_id");

/// The unbatched pool.
/// Key: (token contract, fee amount, tx id) — descending range = profit order
pub const UNBATCHED_TXS: Map<(&str, u128, u64), OutgoingTransferTx> = Map::new("unbatched");

/// Monotonic nonce of the last built batch
pub const LATEST_BATCH_NONCE: Item<u64> = Item::new("last_batch_nonce");

/// In-flight batches. Key: (token contract, batch nonce)
pub const BATCHES: Map<(&str, u64), OutgoingTxBatch> = Map::new("batches");

/// Key: (token contract, batch nonce, orchestrator)
pub const BATCH_CONFIRMS: Map<(&str, u64, &Addr), BatchConfirmation> = Map::new("batch_confirms");

/// Monotonic nonce of the last stored valset
pub const LATEST_VALSET_NONCE: Item<u64> = Item::new("last_valset_nonce");

/// Valsets by nonce, never mutated, pruned after observation
pub const VALSETS: Map<u64, Valset> = Map::new("valsets");

/// Key: (valset nonce, orchestrator)
pub const VALSET_CONFIRMS: Map<(u64, &Addr), ValsetConfirmation> = Map::new("valset_confirms");

/// Key: (invalidation id, invalidation nonce)
pub const LOGIC_CALLS: Map<(&[u8], u64), OutgoingLogicCall> = Map::new("logic_calls");

/// Key: (invalidation id, invalidation nonce, orchestrator)
pub const LOGIC_CONFIRMS: Map<(&[u8], u64, &Addr), LogicCallConfirmation> =
    Map::new("logic_confirms");

/// Key: (event nonce, claim hash)
pub const ATTESTATIONS: Map<(u64, &[u8]), Attestation> = Map::new("attestations");

pub const LAST_OBSERVED_EVENT_NONCE: Item<u64> = Item::new("last_observed_event_nonce");

/// Highest EVM block height attested by a supermajority; drives timeouts
pub const LAST_OBSERVED_ETH_HEIGHT: Item<u64> = Item::new("last_observed_eth_height");

pub const LAST_OBSERVED_VALSET_NONCE: Item<u64> = Item::new("last_observed_valset_nonce");

/// Resume point per orchestrator. Key: valcons
pub const LAST_EVENT_NONCE_BY_VALCONS: Map<&str, u64> = Map::new("last_event_nonce_by_valcons");

pub const LAST_SLASHED_VALSET_NONCE: Item<u64> = Item::new("last_slashed_valset_nonce");
pub const LAST_SLASHED_BATCH_BLOCK: Item<u64> = Item::new("last_slashed_batch_block");

/// Cosmos-originated assets registered by `Erc20Deployed` claims.
/// Key: erc20 contract (lowercase hex), Value: denom — and the reverse
pub const ERC20_TO_DENOM: Map<&str, String> = Map::new("erc20_to_denom");
pub const DENOM_TO_ERC20: Map<&str, String> = Map::new("denom_to_erc20");

/// Metadata for denoms eligible for ERC-20 representation
pub const DENOM_METADATA: Map<&str, DenomMetadata> = Map::new("denom_metadata");

/// Settled escrow of cosmos-originated coins now circulating on the EVM
/// side. Key: denom
pub const ESCROW: Map<&str, Uint128> = Map::new("escrow");

// ============================================================================
// Counter helpers
// ============================================================================

/// Increment-and-return for the monotonic counters; the first issued value
/// is 1.
pub fn next_id(storage: &mut dyn Storage, counter: &Item<u64>) -> Result<u64, ContractError> {
    let id = counter.may_load(storage)?.unwrap_or_default() + 1;
    counter.save(storage, &id)?;
    Ok(id)
}
