//! Orchestrator bindings, checkpoint confirmations and signature evidence.

use cosmwasm_std::{DepsMut, Env, Event, MessageInfo, Response};

use crate::abi::{recover_eth_signer, validate_eth_signature};
use crate::address::EthAddress;
use crate::checkpoint::{batch_checkpoint, logic_call_checkpoint, valset_checkpoint};
use crate::error::ContractError;
use crate::logic_call::get_logic_call;
use crate::msg::{BadSignatureSubject, HostMsg};
use crate::state::{
    BatchConfirmation, LogicCallConfirmation, OrchestratorBinding, ValsetConfirmation,
    BATCHES, BATCH_CONFIRMS, BINDING_BY_VALCONS, LOGIC_CONFIRMS, PARAMS, VALCONS_BY_ETH,
    VALCONS_BY_ORCHESTRATOR, VALIDATOR_RECORDS, VALSETS, VALSET_CONFIRMS,
};
use crate::validator_source::mark_jailed;

/// Resolve the sender to its orchestrator binding, or reject.
pub fn require_orchestrator(
    deps: &DepsMut,
    info: &MessageInfo,
) -> Result<OrchestratorBinding, ContractError> {
    let valcons = VALCONS_BY_ORCHESTRATOR
        .may_load(deps.storage, &info.sender)?
        .ok_or(ContractError::UnknownOrchestrator)?;
    BINDING_BY_VALCONS
        .may_load(deps.storage, &valcons)?
        .ok_or(ContractError::UnknownOrchestrator)
}

/// Bind `info.sender` as the orchestrator of `valcons`, with `eth_address`
/// as its EVM signing key. Each of the three keys may appear in exactly one
/// binding.
pub fn execute_set_orchestrator_binding(
    deps: DepsMut,
    info: MessageInfo,
    valcons: String,
    eth_address: String,
) -> Result<Response<HostMsg>, ContractError> {
    let eth_address = EthAddress::new(&eth_address)?;

    if VALIDATOR_RECORDS.may_load(deps.storage, &valcons)?.is_none() {
        return Err(ContractError::invalid(
            "valcons",
            format!("{valcons} is not a known validator"),
        ));
    }

    if BINDING_BY_VALCONS.may_load(deps.storage, &valcons)?.is_some() {
        return Err(ContractError::DuplicateBinding {
            axis: "valcons".to_string(),
        });
    }
    if VALCONS_BY_ORCHESTRATOR
        .may_load(deps.storage, &info.sender)?
        .is_some()
    {
        return Err(ContractError::DuplicateBinding {
            axis: "orchestrator".to_string(),
        });
    }
    if VALCONS_BY_ETH
        .may_load(deps.storage, eth_address.as_str())?
        .is_some()
    {
        return Err(ContractError::DuplicateBinding {
            axis: "eth_address".to_string(),
        });
    }

    let binding = OrchestratorBinding {
        valcons: valcons.clone(),
        orchestrator: info.sender.clone(),
        eth_address: eth_address.clone(),
    };
    BINDING_BY_VALCONS.save(deps.storage, &valcons, &binding)?;
    VALCONS_BY_ORCHESTRATOR.save(deps.storage, &info.sender, &valcons)?;
    VALCONS_BY_ETH.save(deps.storage, eth_address.as_str(), &valcons)?;

    Ok(Response::new()
        .add_attribute("action", "set_orchestrator_binding")
        .add_attribute("valcons", valcons)
        .add_attribute("orchestrator", info.sender)
        .add_attribute("eth_address", eth_address.to_string()))
}

/// Store an orchestrator's signature over a valset checkpoint after
/// verifying it actually signs that checkpoint.
pub fn execute_valset_confirm(
    deps: DepsMut,
    info: MessageInfo,
    nonce: u64,
    eth_signer: String,
    signature: String,
) -> Result<Response<HostMsg>, ContractError> {
    let binding = require_orchestrator(&deps, &info)?;
    let eth_signer = EthAddress::new(&eth_signer)?;
    if binding.eth_address != eth_signer {
        return Err(ContractError::SignatureMismatch {
            expected: binding.eth_address.to_string(),
        });
    }

    let valset = VALSETS
        .may_load(deps.storage, nonce)?
        .ok_or(ContractError::UnknownValset { nonce })?;
    let bridge_id = PARAMS.load(deps.storage)?.bridge_id;
    let checkpoint = valset_checkpoint(&bridge_id, &valset)?;
    let sig_bytes = decode_signature(&signature)?;
    validate_eth_signature(deps.api, &checkpoint, &sig_bytes, &eth_signer)?;

    let confirm = ValsetConfirmation {
        nonce,
        eth_signer,
        orchestrator: info.sender.clone(),
        signature,
    };
    VALSET_CONFIRMS.save(deps.storage, (nonce, &info.sender), &confirm)?;

    Ok(Response::new()
        .add_attribute("action", "valset_confirm")
        .add_attribute("nonce", nonce.to_string())
        .add_attribute("orchestrator", info.sender))
}

/// Store an orchestrator's signature over a batch checkpoint. A resubmission
/// replaces the previous confirmation.
pub fn execute_confirm_batch(
    deps: DepsMut,
    info: MessageInfo,
    nonce: u64,
    token_contract: String,
    eth_signer: String,
    signature: String,
) -> Result<Response<HostMsg>, ContractError> {
    let binding = require_orchestrator(&deps, &info)?;
    let token_contract = EthAddress::new(&token_contract)?;
    let eth_signer = EthAddress::new(&eth_signer)?;
    if binding.eth_address != eth_signer {
        return Err(ContractError::SignatureMismatch {
            expected: binding.eth_address.to_string(),
        });
    }

    let batch = BATCHES
        .may_load(deps.storage, (token_contract.as_str(), nonce))?
        .ok_or_else(|| ContractError::UnknownBatch {
            nonce,
            token_contract: token_contract.to_string(),
        })?;
    let bridge_id = PARAMS.load(deps.storage)?.bridge_id;
    let checkpoint = batch_checkpoint(&bridge_id, &batch)?;
    let sig_bytes = decode_signature(&signature)?;
    validate_eth_signature(deps.api, &checkpoint, &sig_bytes, &eth_signer)?;

    let confirm = BatchConfirmation {
        batch_nonce: nonce,
        token_contract: token_contract.clone(),
        eth_signer,
        orchestrator: info.sender.clone(),
        signature,
    };
    BATCH_CONFIRMS.save(
        deps.storage,
        (token_contract.as_str(), nonce, &info.sender),
        &confirm,
    )?;

    Ok(Response::new()
        .add_attribute("action", "confirm_batch")
        .add_attribute("token_contract", token_contract.to_string())
        .add_attribute("batch_nonce", nonce.to_string())
        .add_attribute("orchestrator", info.sender))
}

/// Store an orchestrator's signature over a logic-call checkpoint.
pub fn execute_confirm_logic_call(
    deps: DepsMut,
    info: MessageInfo,
    invalidation_id: cosmwasm_std::Binary,
    invalidation_nonce: u64,
    eth_signer: String,
    signature: String,
) -> Result<Response<HostMsg>, ContractError> {
    let binding = require_orchestrator(&deps, &info)?;
    let eth_signer = EthAddress::new(&eth_signer)?;
    if binding.eth_address != eth_signer {
        return Err(ContractError::SignatureMismatch {
            expected: binding.eth_address.to_string(),
        });
    }

    let call = get_logic_call(deps.storage, &invalidation_id, invalidation_nonce)?
        .ok_or(ContractError::UnknownLogicCall)?;
    let bridge_id = PARAMS.load(deps.storage)?.bridge_id;
    let checkpoint = logic_call_checkpoint(&bridge_id, &call)?;
    let sig_bytes = decode_signature(&signature)?;
    validate_eth_signature(deps.api, &checkpoint, &sig_bytes, &eth_signer)?;

    let confirm = LogicCallConfirmation {
        invalidation_id: invalidation_id.clone(),
        invalidation_nonce,
        eth_signer,
        orchestrator: info.sender.clone(),
        signature,
    };
    LOGIC_CONFIRMS.save(
        deps.storage,
        (invalidation_id.as_slice(), invalidation_nonce, &info.sender),
        &confirm,
    )?;

    Ok(Response::new()
        .add_attribute("action", "confirm_logic_call")
        .add_attribute("invalidation_id", hex::encode(invalidation_id.as_slice()))
        .add_attribute("invalidation_nonce", invalidation_nonce.to_string())
        .add_attribute("orchestrator", info.sender))
}

/// Anyone may prove that a bound eth key signed a checkpoint the bridge
/// never produced. The signer's validator is slashed on the host and its
/// local record jailed; actual jailing is the provider's business on
/// consumer deployments.
pub fn execute_submit_bad_signature_evidence(
    deps: DepsMut,
    env: Env,
    subject: BadSignatureSubject,
    signature: String,
) -> Result<Response<HostMsg>, ContractError> {
    let params = PARAMS.load(deps.storage)?;

    let checkpoint = match &subject {
        BadSignatureSubject::Valset(valset) => {
            let genuine = VALSETS
                .may_load(deps.storage, valset.nonce)?
                .map(|stored| stored == *valset)
                .unwrap_or(false);
            if genuine {
                return Err(ContractError::EvidenceNotFraudulent);
            }
            valset_checkpoint(&params.bridge_id, valset)?
        }
        BadSignatureSubject::Batch(batch) => {
            let genuine = BATCHES
                .may_load(
                    deps.storage,
                    (batch.token_contract.as_str(), batch.batch_nonce),
                )?
                .map(|stored| stored == *batch)
                .unwrap_or(false);
            if genuine {
                return Err(ContractError::EvidenceNotFraudulent);
            }
            batch_checkpoint(&params.bridge_id, batch)?
        }
        BadSignatureSubject::LogicCall(call) => {
            let genuine = get_logic_call(deps.storage, &call.invalidation_id, call.invalidation_nonce)?
                .map(|stored| stored == *call)
                .unwrap_or(false);
            if genuine {
                return Err(ContractError::EvidenceNotFraudulent);
            }
            logic_call_checkpoint(&params.bridge_id, call)?
        }
    };

    let sig_bytes = decode_signature(&signature)?;
    let signer = recover_eth_signer(deps.api, &checkpoint, &sig_bytes)?;

    let valcons = VALCONS_BY_ETH
        .may_load(deps.storage, signer.as_str())?
        .ok_or_else(|| {
            ContractError::invalid("evidence", format!("{signer} is not a bridge signer"))
        })?;
    let record = VALIDATOR_RECORDS
        .may_load(deps.storage, &valcons)?
        .ok_or_else(|| {
            ContractError::invalid("evidence", format!("no validator record for {valcons}"))
        })?;

    mark_jailed(deps.storage, &valcons)?;

    Ok(Response::new()
        .add_message(cosmwasm_std::CosmosMsg::Custom(HostMsg::Slash {
            valcons: valcons.clone(),
            fraction: params.slash_fraction_bad_eth_signature,
            power: record.power,
            height: env.block.height,
        }))
        .add_event(
            Event::new("bad_signature_evidence")
                .add_attribute("valcons", valcons)
                .add_attribute("eth_signer", signer.to_string())
                .add_attribute("checkpoint", hex::encode(checkpoint)),
        )
        .add_attribute("action", "submit_bad_signature_evidence"))
}

fn decode_signature(signature: &str) -> Result<Vec<u8>, ContractError> {
    let cleaned = signature.strip_prefix("0x").unwrap_or(signature);
    hex::decode(cleaned).map_err(|_| ContractError::MalformedSignature {
        reason: "signature is not hex".to_string(),
    })
}
