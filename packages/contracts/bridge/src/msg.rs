//! Message types for the bridge contract.

use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Binary, Coin, CustomMsg, Decimal, Uint128};

use crate::attestation::{Attestation, ValsetMember};
use crate::state::{
    BatchConfirmation, CrossChainValidator, DenomMetadata, LogicCallConfirmation,
    OrchestratorBinding, OutgoingLogicCall, OutgoingTransferTx, OutgoingTxBatch, Params,
    ValsetConfirmation,
};
use crate::valset::Valset;

// ============================================================================
// Host-chain bindings
// ============================================================================

/// Messages routed to the host application chain for the capabilities wasm
/// cannot express itself: minting bank denoms and slashing validators.
#[cw_serde]
pub enum HostMsg {
    /// Mint `amount` into `recipient`'s bank balance.
    Mint { recipient: String, amount: Coin },
    /// Slash the validator behind `valcons` at `height` with `fraction` of
    /// `power`.
    Slash {
        valcons: String,
        fraction: Decimal,
        power: u64,
        height: u64,
    },
}

impl CustomMsg for HostMsg {}

// ============================================================================
// Instantiate & Migrate
// ============================================================================

#[cw_serde]
pub struct MigrateMsg {}

#[cw_serde]
pub struct InstantiateMsg {
    /// Host-chain governance account, the only sender of gov messages
    pub gov: String,
    /// Initial parameters; ignored when `genesis` is supplied
    pub params: Option<Params>,
    /// Full state import; export → import → export is a fixed point
    pub genesis: Option<GenesisState>,
}

// ============================================================================
// Execute
// ============================================================================

#[cw_serde]
pub enum ExecuteMsg {
    // ========================================================================
    // Validator registry
    // ========================================================================
    /// Bind the sender as orchestrator for a consensus address, together
    /// with its EVM signing key. Rejected if any of the three keys is
    /// already bound.
    SetOrchestratorBinding { valcons: String, eth_address: String },

    /// Submit a signature over a valset checkpoint.
    ValsetConfirm {
        nonce: u64,
        eth_signer: String,
        signature: String,
    },

    // ========================================================================
    // Outgoing transfers
    // ========================================================================
    /// Queue a withdrawal to the EVM side. `amount + bridge_fee` must be
    /// attached as funds.
    SendToEth {
        eth_dest: String,
        amount: Coin,
        bridge_fee: Coin,
    },

    /// Pull an unbatched withdrawal back out of the pool and refund it.
    CancelSendToEth { transaction_id: u64 },

    /// Build the next batch for the token behind `denom`.
    RequestBatch { denom: String },

    /// Submit a signature over a batch checkpoint.
    ConfirmBatch {
        nonce: u64,
        token_contract: String,
        eth_signer: String,
        signature: String,
    },

    /// Submit a signature over a logic-call checkpoint.
    ConfirmLogicCall {
        invalidation_id: Binary,
        invalidation_nonce: u64,
        eth_signer: String,
        signature: String,
    },

    // ========================================================================
    // Claims (orchestrators only)
    // ========================================================================
    SendToCosmosClaim {
        event_nonce: u64,
        eth_block_height: u64,
        token_contract: String,
        amount: Uint128,
        ethereum_sender: String,
        cosmos_receiver: String,
    },

    BatchSendToEthClaim {
        event_nonce: u64,
        eth_block_height: u64,
        batch_nonce: u64,
        token_contract: String,
        reward_recipient: String,
    },

    Erc20DeployedClaim {
        event_nonce: u64,
        eth_block_height: u64,
        cosmos_denom: String,
        token_contract: String,
        name: String,
        symbol: String,
        decimals: u8,
    },

    LogicCallExecutedClaim {
        event_nonce: u64,
        eth_block_height: u64,
        invalidation_id: Binary,
        invalidation_nonce: u64,
    },

    ValsetUpdatedClaim {
        event_nonce: u64,
        eth_block_height: u64,
        valset_nonce: u64,
        members: Vec<ValsetMember>,
        reward_amount: Uint128,
        reward_denom: String,
        reward_recipient: String,
    },

    // ========================================================================
    // Evidence
    // ========================================================================
    /// Prove an orchestrator signed a checkpoint the bridge never produced.
    SubmitBadSignatureEvidence {
        subject: BadSignatureSubject,
        /// 65-byte `r || s || v` signature, hex
        signature: String,
    },

    // ========================================================================
    // Governance
    // ========================================================================
    /// Reactivate a halted bridge.
    UnhaltBridge {},

    /// Replace the parameter set.
    UpdateParams { params: Params },

    /// Distribute the attached funds over `recipients`.
    Airdrop { recipients: Vec<AirdropRecipient> },

    /// Record denom metadata, the vetting source for `Erc20DeployedClaim`.
    SetDenomMetadata { metadata: DenomMetadata },

    /// Queue an arbitrary-logic invocation for the EVM side.
    SetOutgoingLogicCall { call: OutgoingLogicCall },
}

/// The artifact a fraudulent signature was produced over.
#[cw_serde]
pub enum BadSignatureSubject {
    Valset(Valset),
    Batch(OutgoingTxBatch),
    LogicCall(OutgoingLogicCall),
}

#[cw_serde]
pub struct AirdropRecipient {
    pub address: String,
    pub amount: Uint128,
}

// ============================================================================
// Sudo (host-chain block glue)
// ============================================================================

#[cw_serde]
pub enum SudoMsg {
    /// Replace the forwarded staking view with the given records.
    SyncValidatorSet { validators: Vec<CrossChainValidator> },
    /// Block-end maintenance: valset drift check, timeout GC, window
    /// slashing, balance invariant.
    EndBlock {},
}

// ============================================================================
// Query
// ============================================================================

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    #[returns(Params)]
    Params {},

    #[returns(BridgeStatusResponse)]
    BridgeStatus {},

    /// The valset that would be checkpointed right now.
    #[returns(Valset)]
    CurrentValset {},

    #[returns(Option<Valset>)]
    Valset { nonce: u64 },

    /// Stored valsets, newest first.
    #[returns(ValsetsResponse)]
    Valsets { limit: Option<u32> },

    #[returns(ValsetConfirmsResponse)]
    ValsetConfirms { nonce: u64 },

    #[returns(Option<OutgoingTxBatch>)]
    Batch { token_contract: String, nonce: u64 },

    /// All in-flight batches.
    #[returns(BatchesResponse)]
    Batches {},

    #[returns(BatchConfirmsResponse)]
    BatchConfirms { token_contract: String, nonce: u64 },

    /// Unbatched pool for one token, most profitable first.
    #[returns(UnbatchedTransactionsResponse)]
    UnbatchedTransactions { token_contract: String },

    /// The fee the next batch of this token would carry.
    #[returns(BatchFees)]
    BatchFeeByToken {
        token_contract: String,
        max_elements: u64,
    },

    /// One fee entry per distinct token, ascending by token address.
    #[returns(AllBatchFeesResponse)]
    AllBatchFees { max_elements: u64 },

    #[returns(Option<OutgoingLogicCall>)]
    LogicCall {
        invalidation_id: Binary,
        invalidation_nonce: u64,
    },

    #[returns(DenomMappingResponse)]
    Erc20ToDenom { token_contract: String },

    #[returns(Erc20MappingResponse)]
    DenomToErc20 { denom: String },

    #[returns(Option<OrchestratorBinding>)]
    BindingByValcons { valcons: String },

    #[returns(Option<OrchestratorBinding>)]
    BindingByOrchestrator { orchestrator: String },

    #[returns(Option<OrchestratorBinding>)]
    BindingByEth { eth_address: String },

    #[returns(Option<Attestation>)]
    Attestation { event_nonce: u64, claim_hash: Binary },

    /// Most recent attestations, ascending by nonce.
    #[returns(AttestationsResponse)]
    Attestations { limit: Option<u64> },

    #[returns(u64)]
    LastEventNonceByValcons { valcons: String },

    /// Artifacts the given orchestrator has not signed yet.
    #[returns(PendingWorkResponse)]
    PendingWork { orchestrator: String },

    /// Balance invariant projection; `ok == false` means the bridge will
    /// halt at the next block end.
    #[returns(InvariantResponse)]
    CheckInvariant {},

    #[returns(GenesisState)]
    ExportGenesis {},
}

#[cw_serde]
pub struct BridgeStatusResponse {
    pub bridge_active: bool,
    pub latest_valset_nonce: u64,
    pub latest_batch_nonce: u64,
    pub last_tx_id: u64,
    pub last_observed_event_nonce: u64,
    pub last_observed_eth_height: u64,
    pub last_observed_valset_nonce: u64,
}

#[cw_serde]
pub struct ValsetsResponse {
    pub valsets: Vec<Valset>,
}

#[cw_serde]
pub struct ValsetConfirmsResponse {
    pub confirms: Vec<ValsetConfirmation>,
}

#[cw_serde]
pub struct BatchesResponse {
    pub batches: Vec<OutgoingTxBatch>,
}

#[cw_serde]
pub struct BatchConfirmsResponse {
    pub confirms: Vec<BatchConfirmation>,
}

#[cw_serde]
pub struct UnbatchedTransactionsResponse {
    pub transactions: Vec<OutgoingTransferTx>,
}

/// Projection of the fees a batch would carry, used by relayers to decide
/// when requesting a batch is worth the gas.
#[cw_serde]
pub struct BatchFees {
    pub token: String,
    pub total_fees: Uint128,
    pub tx_count: u64,
}

#[cw_serde]
pub struct AllBatchFeesResponse {
    pub batch_fees: Vec<BatchFees>,
}

#[cw_serde]
pub struct DenomMappingResponse {
    pub denom: String,
    pub cosmos_originated: bool,
}

#[cw_serde]
pub struct Erc20MappingResponse {
    pub token_contract: String,
    pub cosmos_originated: bool,
}

#[cw_serde]
pub struct AttestationsResponse {
    pub attestations: Vec<Attestation>,
}

#[cw_serde]
pub struct PendingWorkResponse {
    pub valsets: Vec<Valset>,
    pub batches: Vec<OutgoingTxBatch>,
    pub logic_calls: Vec<OutgoingLogicCall>,
}

#[cw_serde]
pub struct InvariantResponse {
    pub ok: bool,
    pub expected: Vec<Coin>,
    pub actual: Vec<Coin>,
}

// ============================================================================
// Genesis
// ============================================================================

/// Complete exportable state. Round-trips through instantiate.
#[cw_serde]
pub struct GenesisState {
    pub params: Params,
    pub bindings: Vec<OrchestratorBinding>,
    pub validator_records: Vec<CrossChainValidator>,
    pub latest_valset_nonce: u64,
    pub valsets: Vec<Valset>,
    pub valset_confirms: Vec<ValsetConfirmation>,
    pub last_tx_id: u64,
    pub unbatched_transactions: Vec<OutgoingTransferTx>,
    pub latest_batch_nonce: u64,
    pub batches: Vec<OutgoingTxBatch>,
    pub batch_confirms: Vec<BatchConfirmation>,
    pub logic_calls: Vec<OutgoingLogicCall>,
    pub logic_confirms: Vec<LogicCallConfirmation>,
    pub attestations: Vec<Attestation>,
    pub last_observed_event_nonce: u64,
    pub last_observed_eth_height: u64,
    pub last_observed_valset_nonce: u64,
    pub last_event_nonce_by_valcons: Vec<ValconsNonce>,
    pub erc20_to_denom: Vec<Erc20DenomMapping>,
    pub denom_metadata: Vec<DenomMetadata>,
    pub escrow: Vec<Coin>,
}

#[cw_serde]
pub struct ValconsNonce {
    pub valcons: String,
    pub nonce: u64,
}

#[cw_serde]
pub struct Erc20DenomMapping {
    pub erc20: String,
    pub denom: String,
}
