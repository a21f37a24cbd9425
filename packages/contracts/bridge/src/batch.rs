//! Batch building and retirement.
//!
//! A batch takes the most profitable unbatched withdrawals of one token.
//! Successive batches of a token must strictly increase in total fees, so a
//! relayer can never grief the queue by executing stale work: executing any
//! batch retires every earlier one and returns its transactions to the
//! pool.

use cosmwasm_std::{Addr, BankMsg, CosmosMsg, DepsMut, DistributionMsg, Env, Event, Storage};

use crate::address::EthAddress;
use crate::error::ContractError;
use crate::msg::HostMsg;
use crate::pool;
use crate::state::{
    next_id, OutgoingTxBatch, BATCHES, BATCH_CONFIRMS, ESCROW, LAST_OBSERVED_ETH_HEIGHT,
    LATEST_BATCH_NONCE, PARAMS,
};

/// The still-open batch with the highest nonce for a token, if any.
pub fn last_outgoing_batch(
    storage: &dyn Storage,
    contract: &EthAddress,
) -> Result<Option<OutgoingTxBatch>, ContractError> {
    let mut newest: Option<OutgoingTxBatch> = None;
    for item in BATCHES.prefix(contract.as_str()).range(
        storage,
        None,
        None,
        cosmwasm_std::Order::Descending,
    ) {
        let (_, batch) = item?;
        newest = Some(batch);
        break;
    }
    Ok(newest)
}

/// Build the next batch for a token.
///
/// Selection walks the pool in fee-descending index order, skipping
/// blacklisted destinations; the stored batch breaks fee ties by ascending
/// id. The batch is rejected unless its total fees strictly exceed the last
/// still-open batch of the same token.
pub fn build_outgoing_batch(
    storage: &mut dyn Storage,
    env: &Env,
    token_contract: EthAddress,
    max_elements: u64,
) -> Result<OutgoingTxBatch, ContractError> {
    let params = PARAMS.load(storage)?;
    if !params.bridge_active {
        return Err(ContractError::BridgePaused);
    }

    // selection follows the index walk: fee descending, newest id first on
    // equal fees
    let mut candidates = pool::unbatched_by_contract(storage, &token_contract)?;
    candidates.retain(|tx| !params.ethereum_blacklist.contains(&tx.dest_address));
    candidates.truncate(max_elements as usize);
    // canonical in-batch order breaks fee ties by ascending id
    candidates.sort_by(|a, b| b.fee.amount.cmp(&a.fee.amount).then(a.id.cmp(&b.id)));

    if candidates.is_empty() {
        return Err(ContractError::EmptyBatch {
            token_contract: token_contract.to_string(),
        });
    }

    if let Some(last) = last_outgoing_batch(storage, &token_contract)? {
        let selected_fees: cosmwasm_std::Uint128 =
            candidates.iter().map(|tx| tx.fee.amount).sum();
        if last.total_fees() >= selected_fees {
            return Err(ContractError::BatchNotProfitable {
                last_nonce: last.batch_nonce,
            });
        }
    }

    for tx in &candidates {
        pool::remove_unbatched(storage, &token_contract, tx.fee.amount, tx.id)?;
    }

    let last_eth_height = LAST_OBSERVED_ETH_HEIGHT
        .may_load(storage)?
        .unwrap_or_default();
    let batch = OutgoingTxBatch {
        batch_nonce: next_id(storage, &LATEST_BATCH_NONCE)?,
        token_contract: token_contract.clone(),
        transactions: candidates,
        block: env.block.height,
        batch_timeout: last_eth_height + params.batch_timeout_blocks,
    };
    BATCHES.save(
        storage,
        (token_contract.as_str(), batch.batch_nonce),
        &batch,
    )?;
    Ok(batch)
}

/// The EVM contract executed a batch.
///
/// Deletes the batch and its confirmations, retires **every earlier
/// still-open batch of the same token** back into the pool at original fee
/// positions, settles the bridged amounts (burn vouchers, or move
/// cosmos-originated coins into settled escrow) and routes the fees to the
/// reward recipient, falling back to the community pool.
///
/// The attestation engine guarantees the batch exists at call time; a
/// missing batch is state corruption.
pub fn outgoing_tx_batch_executed(
    deps: DepsMut,
    token_contract: &EthAddress,
    batch_nonce: u64,
    reward_recipient: &str,
) -> Result<Vec<CosmosMsg<HostMsg>>, ContractError> {
    let executed = BATCHES
        .may_load(deps.storage, (token_contract.as_str(), batch_nonce))?
        .ok_or_else(|| {
            ContractError::invariant(format!(
                "executed batch {batch_nonce} of {token_contract} is not in the store"
            ))
        })?;

    let (cosmos_originated, denom) = pool::erc20_to_denom(deps.storage, token_contract)?;

    // batches the executed one supersedes, lowest nonce first
    let superseded: Vec<OutgoingTxBatch> = BATCHES
        .prefix(token_contract.as_str())
        .range(deps.storage, None, None, cosmwasm_std::Order::Ascending)
        .filter_map(|item| match item {
            Ok((nonce, batch)) if nonce < batch_nonce => Some(Ok(batch)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
        .collect::<Result<_, _>>()?;

    for batch in superseded {
        for tx in &batch.transactions {
            pool::add_unbatched(deps.storage, tx)?;
        }
        delete_batch(deps.storage, token_contract, batch.batch_nonce)?;
    }
    delete_batch(deps.storage, token_contract, batch_nonce)?;

    let mut messages: Vec<CosmosMsg<HostMsg>> = vec![];

    let total_amount: cosmwasm_std::Uint128 = executed
        .transactions
        .iter()
        .map(|tx| tx.erc20_token.amount)
        .sum();
    if !total_amount.is_zero() {
        let settled = cosmwasm_std::Coin {
            denom: denom.clone(),
            amount: total_amount,
        };
        if cosmos_originated {
            // the coins now circulate on the EVM side; they stay escrowed
            // here until a deposit brings them back
            let escrowed = ESCROW.may_load(deps.storage, &denom)?.unwrap_or_default();
            ESCROW.save(deps.storage, &denom, &(escrowed + total_amount))?;
        } else {
            messages.push(BankMsg::Burn {
                amount: vec![settled],
            }
            .into());
        }
    }

    let fee_coins: Vec<cosmwasm_std::Coin> = pool::merge_coins(
        &executed
            .transactions
            .iter()
            .map(|tx| tx.fee.clone())
            .collect::<Vec<_>>(),
    );
    if !fee_coins.is_empty() {
        match deps.api.addr_validate(reward_recipient) {
            Ok(recipient) => messages.push(
                BankMsg::Send {
                    to_address: recipient.into_string(),
                    amount: fee_coins,
                }
                .into(),
            ),
            Err(_) => {
                messages.push(DistributionMsg::FundCommunityPool { amount: fee_coins }.into())
            }
        }
    }

    Ok(messages)
}

/// Remove a batch and its confirmations.
fn delete_batch(
    storage: &mut dyn Storage,
    token_contract: &EthAddress,
    batch_nonce: u64,
) -> Result<(), ContractError> {
    BATCHES.remove(storage, (token_contract.as_str(), batch_nonce));
    let signers: Vec<Addr> = BATCH_CONFIRMS
        .prefix((token_contract.as_str(), batch_nonce))
        .keys(storage, None, None, cosmwasm_std::Order::Ascending)
        .collect::<Result<_, _>>()?;
    for orchestrator in signers {
        BATCH_CONFIRMS.remove(storage, (token_contract.as_str(), batch_nonce, &orchestrator));
    }
    Ok(())
}

/// Block-end GC: a batch whose timeout height has passed on the EVM side
/// can never execute, so its transactions go back to the pool.
pub fn timeout_batches(storage: &mut dyn Storage) -> Result<Vec<Event>, ContractError> {
    let eth_height = LAST_OBSERVED_ETH_HEIGHT
        .may_load(storage)?
        .unwrap_or_default();

    let expired: Vec<OutgoingTxBatch> = BATCHES
        .range(storage, None, None, cosmwasm_std::Order::Ascending)
        .filter_map(|item| match item {
            Ok((_, batch)) if batch.batch_timeout < eth_height => Some(Ok(batch)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
        .collect::<Result<_, _>>()?;

    let mut events = vec![];
    for batch in expired {
        for tx in &batch.transactions {
            pool::add_unbatched(storage, tx)?;
        }
        delete_batch(storage, &batch.token_contract, batch.batch_nonce)?;
        events.push(
            Event::new("batch_timed_out")
                .add_attribute("token_contract", batch.token_contract.to_string())
                .add_attribute("batch_nonce", batch.batch_nonce.to_string())
                .add_attribute("batch_timeout", batch.batch_timeout.to_string()),
        );
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use cosmwasm_std::testing::{mock_dependencies, mock_env};
    use cosmwasm_std::coin;

    use super::*;
    use crate::address::bridge_denom;
    use crate::pool::{add_to_pool, unbatched_by_contract};
    use crate::state::Params;

    const CONTRACT: &str = "0x429881672B9AE42b8EbA0E26cD9C73711b891Ca5";

    fn seed(storage: &mut dyn Storage, fees: &[u128]) -> EthAddress {
        PARAMS.save(storage, &Params::default()).unwrap();
        let contract = EthAddress::new(CONTRACT).unwrap();
        let denom = bridge_denom(&contract);
        for (i, fee) in fees.iter().enumerate() {
            add_to_pool(
                storage,
                cosmwasm_std::Addr::unchecked("sender"),
                EthAddress::new("0xd041c41EA1bf0F006ADBb6d2c9ef9D425dE5eaD7").unwrap(),
                coin(100 + i as u128, denom.clone()),
                coin(*fee, "stake"),
            )
            .unwrap();
        }
        contract
    }

    #[test]
    fn batch_takes_the_index_walk_and_sorts_canonically() {
        let mut deps = mock_dependencies();
        let contract = seed(deps.as_mut().storage, &[2, 3, 2, 1]);

        let batch =
            build_outgoing_batch(deps.as_mut().storage, &mock_env(), contract.clone(), 2)
                .unwrap();
        let ids: Vec<u64> = batch.transactions.iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(batch.batch_nonce, 1);

        let remaining: Vec<u64> = unbatched_by_contract(deps.as_ref().storage, &contract)
            .unwrap()
            .iter()
            .map(|tx| tx.id)
            .collect();
        assert_eq!(remaining, vec![1, 4]);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let mut deps = mock_dependencies();
        PARAMS
            .save(deps.as_mut().storage, &Params::default())
            .unwrap();
        let contract = EthAddress::new(CONTRACT).unwrap();
        assert!(matches!(
            build_outgoing_batch(deps.as_mut().storage, &mock_env(), contract, 2).unwrap_err(),
            ContractError::EmptyBatch { .. }
        ));
    }

    #[test]
    fn expired_batches_refund_into_the_pool() {
        let mut deps = mock_dependencies();
        let contract = seed(deps.as_mut().storage, &[2, 3]);

        let batch =
            build_outgoing_batch(deps.as_mut().storage, &mock_env(), contract.clone(), 2)
                .unwrap();
        assert!(unbatched_by_contract(deps.as_ref().storage, &contract)
            .unwrap()
            .is_empty());

        // the observed EVM chain passes the timeout height
        LAST_OBSERVED_ETH_HEIGHT
            .save(deps.as_mut().storage, &(batch.batch_timeout + 1))
            .unwrap();
        let events = timeout_batches(deps.as_mut().storage).unwrap();
        assert_eq!(events.len(), 1);

        assert!(BATCHES
            .may_load(deps.as_ref().storage, (contract.as_str(), 1))
            .unwrap()
            .is_none());
        let ids: Vec<u64> = unbatched_by_contract(deps.as_ref().storage, &contract)
            .unwrap()
            .iter()
            .map(|tx| tx.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
