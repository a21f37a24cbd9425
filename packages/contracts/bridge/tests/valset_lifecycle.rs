//! Validator-set lifecycle tests: drift-driven checkpoint emission,
//! signature confirmation against real secp256k1 keys, fraud evidence and
//! the genesis round-trip.

use cosmwasm_std::{Addr, Empty};
use cw_multi_test::custom_handler::CachingCustomHandler;
use cw_multi_test::{BasicAppBuilder, Executor};
use k256::ecdsa::SigningKey;

use bridge::abi::{keccak256, personal_sign_digest};
use bridge::checkpoint::valset_checkpoint;
use bridge::msg::{
    BadSignatureSubject, ExecuteMsg, GenesisState, HostMsg, InstantiateMsg, QueryMsg, SudoMsg,
    ValsetConfirmsResponse,
};
use bridge::state::{CrossChainValidator, Params};
use bridge::valset::Valset;

type HostApp = cw_multi_test::App<
    cw_multi_test::BankKeeper,
    cosmwasm_std::testing::MockApi,
    cosmwasm_std::testing::MockStorage,
    CachingCustomHandler<HostMsg, Empty>,
    cw_multi_test::WasmKeeper<HostMsg, Empty>,
    cw_multi_test::StakeKeeper,
    cw_multi_test::DistributionKeeper,
    cw_multi_test::IbcFailingModule,
    cw_multi_test::GovFailingModule,
    cw_multi_test::StargateFailing,
>;

struct TestEnv {
    app: HostApp,
    contract_addr: Addr,
    gov: Addr,
    orchestrators: Vec<Addr>,
    signing_keys: Vec<SigningKey>,
}

fn signing_key(seed: u8) -> SigningKey {
    let mut bytes = [0u8; 32];
    bytes[31] = seed;
    SigningKey::from_slice(&bytes).unwrap()
}

fn eth_address_of(key: &SigningKey) -> String {
    let pubkey = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&pubkey.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// 65-byte `r || s || v` signature over a checkpoint, hex encoded.
fn eth_sign(key: &SigningKey, checkpoint: &[u8; 32]) -> String {
    let digest = personal_sign_digest(checkpoint);
    let (signature, recovery_id) = key.sign_prehash_recoverable(&digest).unwrap();
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte() + 27);
    hex::encode(bytes)
}

fn setup() -> TestEnv {
    let gov = Addr::unchecked("gov");
    let orchestrators: Vec<Addr> = (1..=3)
        .map(|i| Addr::unchecked(format!("orch{i}")))
        .collect();
    let signing_keys: Vec<SigningKey> = (1..=3).map(signing_key).collect();

    let mut app = BasicAppBuilder::<HostMsg, Empty>::new_custom()
        .with_custom(CachingCustomHandler::<HostMsg, Empty>::new())
        .build(|_, _, _| {});

    let code_id = app.store_code(bridge_contract());
    let contract_addr = app
        .instantiate_contract(
            code_id,
            gov.clone(),
            &InstantiateMsg {
                gov: gov.to_string(),
                params: Some(Params {
                    bridge_id: "foo".to_string(),
                    ..Params::default()
                }),
                genesis: None,
            },
            &[],
            "bridge",
            Some(gov.to_string()),
        )
        .unwrap();

    sync(&mut app, &contract_addr, &[1000, 1000, 2000]);

    for (i, orchestrator) in orchestrators.iter().enumerate() {
        app.execute_contract(
            orchestrator.clone(),
            contract_addr.clone(),
            &ExecuteMsg::SetOrchestratorBinding {
                valcons: format!("valcons{}", i + 1),
                eth_address: eth_address_of(&signing_keys[i]),
            },
            &[],
        )
        .unwrap();
    }

    TestEnv {
        app,
        contract_addr,
        gov,
        orchestrators,
        signing_keys,
    }
}

fn bridge_contract() -> Box<dyn cw_multi_test::Contract<HostMsg>> {
    Box::new(
        cw_multi_test::ContractWrapper::new(
            bridge::contract::execute,
            bridge::contract::instantiate,
            bridge::contract::query,
        )
        .with_sudo(bridge::contract::sudo),
    )
}

fn sync(app: &mut HostApp, contract_addr: &Addr, powers: &[u64]) {
    let validators: Vec<CrossChainValidator> = powers
        .iter()
        .enumerate()
        .map(|(i, power)| CrossChainValidator {
            valcons: format!("valcons{}", i + 1),
            power: *power,
            jailed: false,
        })
        .collect();
    app.wasm_sudo(
        contract_addr.clone(),
        &SudoMsg::SyncValidatorSet { validators },
    )
    .unwrap();
}

impl TestEnv {
    fn end_block(&mut self) {
        self.app
            .wasm_sudo(self.contract_addr.clone(), &SudoMsg::EndBlock {})
            .unwrap();
    }

    fn valset(&self, nonce: u64) -> Option<Valset> {
        self.app
            .wrap()
            .query_wasm_smart(&self.contract_addr, &QueryMsg::Valset { nonce })
            .unwrap()
    }
}

/// The first block end materializes valset 1; later block ends only emit a
/// new set once normalized power drifts past the threshold.
#[test]
fn valsets_follow_power_drift() {
    let mut env = setup();

    env.end_block();
    let first = env.valset(1).expect("first valset stored");
    assert_eq!(first.nonce, 1);
    // normalized powers sum to just under 2^32, largest member holds half
    let powers: Vec<u64> = first.members.members().iter().map(|m| m.power).collect();
    let total: u64 = powers.iter().sum();
    assert!(total <= u32::MAX as u64 && u32::MAX as u64 - total < 3);
    assert!(powers.contains(&(u32::MAX as u64 / 2)));

    // no drift, no new set
    env.end_block();
    assert_eq!(env.valset(2), None);

    // ~1.5% drift stays under the 5% threshold
    sync(&mut env.app, &env.contract_addr.clone(), &[1030, 1000, 2000]);
    env.end_block();
    assert_eq!(env.valset(2), None);

    // a quarter of the power moving is well past it
    sync(&mut env.app, &env.contract_addr.clone(), &[2000, 1000, 2000]);
    env.end_block();
    let second = env.valset(2).expect("second valset stored");
    assert_eq!(second.nonce, 2);
}

/// Confirmations are accepted only with a valid signature from the bound
/// eth key over the exact checkpoint.
#[test]
fn valset_confirm_verifies_signatures() {
    let mut env = setup();
    env.end_block();
    let valset = env.valset(1).unwrap();

    let checkpoint = valset_checkpoint("foo", &valset).unwrap();
    let signature = eth_sign(&env.signing_keys[0], &checkpoint);

    env.app
        .execute_contract(
            env.orchestrators[0].clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::ValsetConfirm {
                nonce: 1,
                eth_signer: eth_address_of(&env.signing_keys[0]),
                signature,
            },
            &[],
        )
        .unwrap();

    let confirms: ValsetConfirmsResponse = env
        .app
        .wrap()
        .query_wasm_smart(&env.contract_addr, &QueryMsg::ValsetConfirms { nonce: 1 })
        .unwrap();
    assert_eq!(confirms.confirms.len(), 1);
    assert_eq!(confirms.confirms[0].orchestrator, env.orchestrators[0]);

    // a signature from the wrong key is rejected
    let forged = eth_sign(&env.signing_keys[1], &checkpoint);
    let err = env
        .app
        .execute_contract(
            env.orchestrators[0].clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::ValsetConfirm {
                nonce: 1,
                eth_signer: eth_address_of(&env.signing_keys[0]),
                signature: forged,
            },
            &[],
        )
        .unwrap_err();
    assert!(err.root_cause().to_string().contains("does not match"));
}

/// Signing a checkpoint the bridge never produced is slashable fraud;
/// signing a genuine one is not evidence.
#[test]
fn bad_signature_evidence_slashes_the_signer() {
    let mut env = setup();
    env.end_block();
    let genuine = env.valset(1).unwrap();

    // a forged valset: same members, different nonce
    let mut forged = genuine.clone();
    forged.nonce = 99;
    let forged_checkpoint = valset_checkpoint("foo", &forged).unwrap();
    let signature = eth_sign(&env.signing_keys[2], &forged_checkpoint);

    let response = env
        .app
        .execute_contract(
            Addr::unchecked("watcher"),
            env.contract_addr.clone(),
            &ExecuteMsg::SubmitBadSignatureEvidence {
                subject: BadSignatureSubject::Valset(forged),
                signature,
            },
            &[],
        )
        .unwrap();
    assert!(response
        .events
        .iter()
        .any(|e| e.ty == "wasm-bad_signature_evidence"));

    // the jailed validator no longer counts toward the current set
    env.end_block();
    let next = env.valset(2).expect("set rebuilt without the jailed member");
    assert_eq!(next.members.members().len(), 2);

    // evidence over the genuine checkpoint is rejected
    let genuine_checkpoint = valset_checkpoint("foo", &genuine).unwrap();
    let signature = eth_sign(&env.signing_keys[0], &genuine_checkpoint);
    let err = env
        .app
        .execute_contract(
            Addr::unchecked("watcher"),
            env.contract_addr.clone(),
            &ExecuteMsg::SubmitBadSignatureEvidence {
                subject: BadSignatureSubject::Valset(genuine),
                signature,
            },
            &[],
        )
        .unwrap_err();
    assert!(err.root_cause().to_string().contains("actually signed"));
}

/// Export → import → export is a fixed point.
#[test]
fn genesis_round_trips() {
    let mut env = setup();
    env.end_block();

    // leave some state behind: a confirm and denom metadata
    let valset = env.valset(1).unwrap();
    let checkpoint = valset_checkpoint("foo", &valset).unwrap();
    let signature = eth_sign(&env.signing_keys[0], &checkpoint);
    env.app
        .execute_contract(
            env.orchestrators[0].clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::ValsetConfirm {
                nonce: 1,
                eth_signer: eth_address_of(&env.signing_keys[0]),
                signature,
            },
            &[],
        )
        .unwrap();
    env.app
        .execute_contract(
            env.gov.clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::SetDenomMetadata {
                metadata: bridge::state::DenomMetadata {
                    denom: "uatom".to_string(),
                    name: "Atom".to_string(),
                    symbol: "ATOM".to_string(),
                    decimals: 6,
                },
            },
            &[],
        )
        .unwrap();

    let exported: GenesisState = env
        .app
        .wrap()
        .query_wasm_smart(&env.contract_addr, &QueryMsg::ExportGenesis {})
        .unwrap();

    let code_id = env.app.store_code(bridge_contract());
    let reborn = env
        .app
        .instantiate_contract(
            code_id,
            env.gov.clone(),
            &InstantiateMsg {
                gov: env.gov.to_string(),
                params: None,
                genesis: Some(exported.clone()),
            },
            &[],
            "bridge-reborn",
            Some(env.gov.to_string()),
        )
        .unwrap();

    let reexported: GenesisState = env
        .app
        .wrap()
        .query_wasm_smart(&reborn, &QueryMsg::ExportGenesis {})
        .unwrap();
    assert_eq!(exported, reexported);
}
