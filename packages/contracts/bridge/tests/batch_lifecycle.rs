//! Outgoing pool and batch lifecycle tests.
//!
//! Covers the full withdrawal path: queueing, fee-ordered batch selection,
//! profitability gating, refunds, blacklisting, supersession on execution
//! and the reward routing that comes with it.

use cosmwasm_std::{coin, coins, Addr, Empty, Uint128};
use cw_multi_test::custom_handler::CachingCustomHandler;
use cw_multi_test::{BasicAppBuilder, Executor};

use bridge::msg::{
    BatchFees, ExecuteMsg, HostMsg, InstantiateMsg, InvariantResponse, QueryMsg, SudoMsg,
    UnbatchedTransactionsResponse,
};
use bridge::state::{CrossChainValidator, OutgoingTxBatch, Params};
use bridge::EthAddress;

const TOKEN_CONTRACT: &str = "0x429881672B9AE42b8EbA0E26cD9C73711b891Ca5";
const RECEIVER: &str = "0xd041c41EA1bf0F006ADBb6d2c9ef9D425dE5eaD7";
const BLACKLISTED: &str = "0x4d16b9E4a27c3313440923fEfCd013178149A5bD";

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
    user: Addr,
    orchestrators: Vec<Addr>,
    voucher_denom: String,
}

fn test_params(batch_max_elements: u64) -> Params {
    Params {
        bridge_id: "foo".to_string(),
        batch_fee_denom: "stake".to_string(),
        batch_max_elements,
        ..Params::default()
    }
}

fn setup(batch_max_elements: u64) -> TestEnv {
    let gov = Addr::unchecked("gov");
    let user = Addr::unchecked("user");
    let orchestrators = vec![
        Addr::unchecked("orch1"),
        Addr::unchecked("orch2"),
        Addr::unchecked("orch3"),
    ];

    let token = EthAddress::new(TOKEN_CONTRACT).unwrap();
    let voucher_denom = bridge::address::bridge_denom(&token);

    let voucher_balance = coin(1_000_000, voucher_denom.clone());
    let stake_balance = coin(1_000_000, "stake");
    let user_clone = user.clone();
    let mut app = BasicAppBuilder::<HostMsg, Empty>::new_custom()
        .with_custom(CachingCustomHandler::<HostMsg, Empty>::new())
        .build(move |router, _, storage| {
            router
                .bank
                .init_balance(storage, &user_clone, vec![voucher_balance, stake_balance])
                .unwrap();
        });

    let code_id = app.store_code(bridge_contract());
    let contract_addr = app
        .instantiate_contract(
            code_id,
            gov.clone(),
            &InstantiateMsg {
                gov: gov.to_string(),
                params: Some(test_params(batch_max_elements)),
                genesis: None,
            },
            &[],
            "bridge",
            Some(gov.to_string()),
        )
        .unwrap();

    // forward a three-validator staking view and bind the orchestrators
    let validators = vec![
        validator("valcons1", 1000),
        validator("valcons2", 1000),
        validator("valcons3", 1000),
    ];
    app.wasm_sudo(
        contract_addr.clone(),
        &SudoMsg::SyncValidatorSet { validators },
    )
    .unwrap();

    let eth_keys = [
        "0xc783df8a850f42e7F7e57013759C285caa701eB6",
        "0xE5904695748fe4A84b40b3fc79De2277660BD1D3",
        "0xeAD9C93b79Ae7C1591b1FB5323BD777E86e150d4",
    ];
    for (i, orchestrator) in orchestrators.iter().enumerate() {
        app.execute_contract(
            orchestrator.clone(),
            contract_addr.clone(),
            &ExecuteMsg::SetOrchestratorBinding {
                valcons: format!("valcons{}", i + 1),
                eth_address: eth_keys[i].to_string(),
            },
            &[],
        )
        .unwrap();
    }

    TestEnv {
        app,
        contract_addr,
        gov,
        user,
        orchestrators,
        voucher_denom,
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

fn validator(valcons: &str, power: u64) -> CrossChainValidator {
    CrossChainValidator {
        valcons: valcons.to_string(),
        power,
        jailed: false,
    }
}

impl TestEnv {
    /// Queue one withdrawal; amounts follow the 100, 101, ... convention.
    fn send_to_eth(&mut self, amount: u128, fee: u128, dest: &str) {
        let amount = coin(amount, self.voucher_denom.clone());
        let fee = coin(fee, "stake");
        let funds = vec![amount.clone(), fee.clone()];
        self.app
            .execute_contract(
                self.user.clone(),
                self.contract_addr.clone(),
                &ExecuteMsg::SendToEth {
                    eth_dest: dest.to_string(),
                    amount,
                    bridge_fee: fee,
                },
                &funds,
            )
            .unwrap();
    }

    fn request_batch(&mut self) -> anyhow::Result<cw_multi_test::AppResponse> {
        self.app.execute_contract(
            self.user.clone(),
            self.contract_addr.clone(),
            &ExecuteMsg::RequestBatch {
                denom: self.voucher_denom.clone(),
            },
            &[],
        )
    }

    fn batch(&self, nonce: u64) -> Option<OutgoingTxBatch> {
        self.app
            .wrap()
            .query_wasm_smart(
                &self.contract_addr,
                &QueryMsg::Batch {
                    token_contract: TOKEN_CONTRACT.to_string(),
                    nonce,
                },
            )
            .unwrap()
    }

    fn unbatched_ids(&self) -> Vec<u64> {
        let response: UnbatchedTransactionsResponse = self
            .app
            .wrap()
            .query_wasm_smart(
                &self.contract_addr,
                &QueryMsg::UnbatchedTransactions {
                    token_contract: TOKEN_CONTRACT.to_string(),
                },
            )
            .unwrap();
        response.transactions.iter().map(|tx| tx.id).collect()
    }

    /// Drive the executed-batch claim through a supermajority.
    fn execute_batch_on_evm(&mut self, event_nonce: u64, batch_nonce: u64, reward_recipient: &str) {
        for orchestrator in self.orchestrators.clone() {
            self.app
                .execute_contract(
                    orchestrator,
                    self.contract_addr.clone(),
                    &ExecuteMsg::BatchSendToEthClaim {
                        event_nonce,
                        eth_block_height: 100 + event_nonce,
                        batch_nonce,
                        token_contract: TOKEN_CONTRACT.to_string(),
                        reward_recipient: reward_recipient.to_string(),
                    },
                    &[],
                )
                .unwrap();
        }
    }

    fn balance(&self, account: &str, denom: &str) -> u128 {
        self.app
            .wrap()
            .query_balance(account, denom)
            .unwrap()
            .amount
            .u128()
    }
}

/// Batch execution order end to end: selection, supersession and reward.
#[test]
fn batch_execution_order() {
    let mut env = setup(2);

    // ids 1..4 with fees 2, 3, 2, 1
    for (i, fee) in [2u128, 3, 2, 1].into_iter().enumerate() {
        env.send_to_eth(100 + i as u128, fee, RECEIVER);
    }

    env.request_batch().unwrap();
    let first = env.batch(1).expect("first batch stored");
    let first_ids: Vec<u64> = first.transactions.iter().map(|tx| tx.id).collect();
    assert_eq!(first_ids, vec![2, 3]);
    assert_eq!(env.unbatched_ids(), vec![1, 4]);

    // a more profitable pair, ids 5 and 6
    for (i, fee) in [4u128, 5].into_iter().enumerate() {
        env.send_to_eth(100 + i as u128, fee, RECEIVER);
    }

    env.request_batch().unwrap();
    let second = env.batch(2).expect("second batch stored");
    let second_ids: Vec<u64> = second.transactions.iter().map(|tx| tx.id).collect();
    assert_eq!(second_ids, vec![6, 5]);

    // the EVM side executes the profitable batch
    env.execute_batch_on_evm(1, 2, "rewards");

    // both batches are gone, the first one's transactions are back in the
    // pool at their original fee positions
    assert_eq!(env.batch(2), None);
    assert_eq!(env.batch(1), None);
    assert_eq!(env.unbatched_ids(), vec![2, 3, 1, 4]);

    // fees 5 + 4 went to the reward recipient
    assert_eq!(env.balance("rewards", "stake"), 9);

    // balances still reconcile against the pool and escrow
    let invariant: InvariantResponse = env
        .app
        .wrap()
        .query_wasm_smart(&env.contract_addr, &QueryMsg::CheckInvariant {})
        .unwrap();
    assert!(invariant.ok);
}

/// Refund rules: batched transactions and foreign senders are rejected,
/// the original sender gets amount and fee back exactly.
#[test]
fn refund_rules() {
    let mut env = setup(2);

    for (i, fee) in [2u128, 3, 2, 1].into_iter().enumerate() {
        env.send_to_eth(100 + i as u128, fee, RECEIVER);
    }
    env.request_batch().unwrap();

    // tx 3 rides in the batch
    let err = env
        .app
        .execute_contract(
            env.user.clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::CancelSendToEth { transaction_id: 3 },
            &[],
        )
        .unwrap_err();
    assert!(err.root_cause().to_string().contains("not found"));

    // tx 4 belongs to someone else
    let err = env
        .app
        .execute_contract(
            Addr::unchecked("stranger"),
            env.contract_addr.clone(),
            &ExecuteMsg::CancelSendToEth { transaction_id: 4 },
            &[],
        )
        .unwrap_err();
    assert!(err.root_cause().to_string().contains("did not create"));

    let voucher_before = env.balance(env.user.as_str(), &env.voucher_denom);
    let stake_before = env.balance(env.user.as_str(), "stake");

    env.app
        .execute_contract(
            env.user.clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::CancelSendToEth { transaction_id: 4 },
            &[],
        )
        .unwrap();

    assert_eq!(
        env.balance(env.user.as_str(), &env.voucher_denom),
        voucher_before + 103
    );
    assert_eq!(env.balance(env.user.as_str(), "stake"), stake_before + 1);
    assert_eq!(env.unbatched_ids(), vec![1]);
}

/// Blacklisted destinations are invisible to fee projections and batch
/// selection but stay in the pool.
#[test]
fn blacklisted_destination_never_batches() {
    let mut env = setup(10);

    // blacklist one destination via governance
    let mut params = test_params(10);
    params.ethereum_blacklist = vec![EthAddress::new(BLACKLISTED).unwrap()];
    env.app
        .execute_contract(
            env.gov.clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::UpdateParams { params },
            &[],
        )
        .unwrap();

    for (i, fee) in [2u128, 3, 2, 1, 5].into_iter().enumerate() {
        let dest = if i == 4 { BLACKLISTED } else { RECEIVER };
        env.send_to_eth(100 + i as u128, fee, dest);
    }

    let fees: BatchFees = env
        .app
        .wrap()
        .query_wasm_smart(
            &env.contract_addr,
            &QueryMsg::BatchFeeByToken {
                token_contract: TOKEN_CONTRACT.to_string(),
                max_elements: 10,
            },
        )
        .unwrap();
    assert_eq!(fees.total_fees, Uint128::new(8));
    assert_eq!(fees.tx_count, 4);

    env.request_batch().unwrap();
    let batch = env.batch(1).expect("batch stored");
    assert_eq!(batch.transactions.len(), 4);
    assert!(batch.transactions.iter().all(|tx| tx.id != 5));

    // the blacklisted transaction is still waiting in the pool
    assert_eq!(env.unbatched_ids(), vec![5]);
}

/// A paused bridge builds no batches and changes no state.
#[test]
fn paused_bridge_builds_nothing() {
    let mut env = setup(2);

    for (i, fee) in [2u128, 3, 2, 1].into_iter().enumerate() {
        env.send_to_eth(100 + i as u128, fee, RECEIVER);
    }

    let mut params = test_params(2);
    params.bridge_active = false;
    env.app
        .execute_contract(
            env.gov.clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::UpdateParams { params },
            &[],
        )
        .unwrap();

    let err = env.request_batch().unwrap_err();
    assert!(err.root_cause().to_string().contains("paused"));
    assert_eq!(env.batch(1), None);
    assert_eq!(env.unbatched_ids(), vec![2, 3, 1, 4]);

    // governance resumes the bridge and batching works again
    env.app
        .execute_contract(
            env.gov.clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::UnhaltBridge {},
            &[],
        )
        .unwrap();
    env.request_batch().unwrap();
    assert!(env.batch(1).is_some());
}

/// Successive batches of a token must strictly increase in total fees.
#[test]
fn batches_must_grow_more_profitable() {
    let mut env = setup(2);

    for (i, fee) in [5u128, 6].into_iter().enumerate() {
        env.send_to_eth(100 + i as u128, fee, RECEIVER);
    }
    env.request_batch().unwrap();

    // the remaining pool would only carry 3 + 2 in fees
    for (i, fee) in [3u128, 2].into_iter().enumerate() {
        env.send_to_eth(100 + i as u128, fee, RECEIVER);
    }
    let err = env.request_batch().unwrap_err();
    assert!(err.root_cause().to_string().contains("profitable"));

    // topping the pool past the last batch unlocks the next one
    env.send_to_eth(100, 12, RECEIVER);
    env.request_batch().unwrap();
    let batch = env.batch(2).expect("more profitable batch stored");
    assert_eq!(batch.total_fees(), Uint128::new(15));
}

/// Fees must be paid in the configured denom.
#[test]
fn fee_denom_is_enforced() {
    let mut env = setup(2);

    let amount = coin(100, env.voucher_denom.clone());
    let fee = coin(2, env.voucher_denom.clone());
    let funds = vec![coin(102, env.voucher_denom.clone())];
    let err = env
        .app
        .execute_contract(
            env.user.clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::SendToEth {
                eth_dest: RECEIVER.to_string(),
                amount,
                bridge_fee: fee,
            },
            &funds,
        )
        .unwrap_err();
    assert!(err.root_cause().to_string().contains("stake"));
}

/// Attached funds must equal amount plus fee.
#[test]
fn short_funds_are_rejected() {
    let mut env = setup(2);

    let amount = coin(100, env.voucher_denom.clone());
    let fee = coin(2, "stake");
    let err = env
        .app
        .execute_contract(
            env.user.clone(),
            env.contract_addr.clone(),
            &ExecuteMsg::SendToEth {
                eth_dest: RECEIVER.to_string(),
                amount,
                bridge_fee: fee,
            },
            &coins(100, env.voucher_denom.clone()),
        )
        .unwrap_err();
    assert!(err
        .root_cause()
        .to_string()
        .contains("amount plus bridge_fee"));
}

/// An unknown denom cannot enter the pool.
#[test]
fn unknown_denom_is_rejected() {
    let mut env = setup(2);
    let funds = [coin(100, "uatom"), coin(2, "stake")];
    // give the user some uatom first
    env.app
        .init_modules(|router, _, storage| {
            router
                .bank
                .init_balance(storage, &Addr::unchecked("atom_user"), funds.to_vec())
                .unwrap();
        });

    let err = env
        .app
        .execute_contract(
            Addr::unchecked("atom_user"),
            env.contract_addr.clone(),
            &ExecuteMsg::SendToEth {
                eth_dest: RECEIVER.to_string(),
                amount: coin(100, "uatom"),
                bridge_fee: coin(2, "stake"),
            },
            &funds,
        )
        .unwrap_err();
    assert!(err.root_cause().to_string().contains("no known token"));
}
