//! The outgoing transfer pool.
//!
//! Unbatched withdrawals live under `(token_contract, fee_amount, tx_id)`
//! so a reverse range yields the most profitable transactions first; the
//! same walk backs the fee projections relayers use to decide when a batch
//! is worth requesting.

use std::collections::BTreeMap;

use cosmwasm_std::{Addr, Coin, Order, Storage, Uint128};

use crate::address::{bridge_denom, parse_bridge_denom, Erc20Token, EthAddress};
use crate::error::ContractError;
use crate::msg::BatchFees;
use crate::state::{
    next_id, OutgoingTransferTx, DENOM_TO_ERC20, ERC20_TO_DENOM, LAST_TX_ID, PARAMS,
    UNBATCHED_TXS,
};

/// Resolve a host denom to its ERC-20 contract. Returns whether the asset
/// is cosmos-originated alongside the contract.
pub fn denom_to_erc20(
    storage: &dyn Storage,
    denom: &str,
) -> Result<(bool, EthAddress), ContractError> {
    if let Some(contract) = parse_bridge_denom(denom) {
        return Ok((false, contract));
    }
    match DENOM_TO_ERC20.may_load(storage, denom)? {
        Some(contract) => Ok((true, EthAddress::new(&contract)?)),
        None => Err(ContractError::UnknownDenom {
            denom: denom.to_string(),
        }),
    }
}

/// Resolve an ERC-20 contract to its host denom. EVM-originated tokens
/// always resolve to their voucher denom.
pub fn erc20_to_denom(
    storage: &dyn Storage,
    contract: &EthAddress,
) -> Result<(bool, String), ContractError> {
    match ERC20_TO_DENOM.may_load(storage, contract.as_str())? {
        Some(denom) => Ok((true, denom)),
        None => Ok((false, bridge_denom(contract))),
    }
}

/// Queue a withdrawal: the funds are already locked in the bridge account,
/// this assigns the next monotonic id and files the transaction in the
/// fee-ordered index.
pub fn add_to_pool(
    storage: &mut dyn Storage,
    sender: Addr,
    dest: EthAddress,
    amount: Coin,
    fee: Coin,
) -> Result<u64, ContractError> {
    if amount.amount.is_zero() {
        return Err(ContractError::invalid("amount", "zero"));
    }
    let batch_fee_denom = PARAMS.load(storage)?.batch_fee_denom;
    if !batch_fee_denom.is_empty() && fee.denom != batch_fee_denom {
        return Err(ContractError::WrongFeeDenom {
            denom: batch_fee_denom,
        });
    }

    let (_, token_contract) = denom_to_erc20(storage, &amount.denom)?;

    let id = next_id(storage, &LAST_TX_ID)?;
    let tx = OutgoingTransferTx {
        id,
        sender,
        dest_address: dest,
        erc20_token: Erc20Token::new(amount.amount, token_contract),
        fee,
    };
    add_unbatched(storage, &tx)?;
    Ok(id)
}

/// File a transaction in the unbatched index.
pub fn add_unbatched(
    storage: &mut dyn Storage,
    tx: &OutgoingTransferTx,
) -> Result<(), ContractError> {
    let key = (
        tx.erc20_token.contract.as_str(),
        tx.fee.amount.u128(),
        tx.id,
    );
    if UNBATCHED_TXS.has(storage, key) {
        return Err(ContractError::DuplicatePoolEntry);
    }
    UNBATCHED_TXS.save(storage, key, tx)?;
    Ok(())
}

/// Remove a transaction from the unbatched index.
pub fn remove_unbatched(
    storage: &mut dyn Storage,
    contract: &EthAddress,
    fee_amount: Uint128,
    id: u64,
) -> Result<(), ContractError> {
    let key = (contract.as_str(), fee_amount.u128(), id);
    if !UNBATCHED_TXS.has(storage, key) {
        return Err(ContractError::UnknownPoolTransaction { id });
    }
    UNBATCHED_TXS.remove(storage, key);
    Ok(())
}

/// Find an unbatched transaction knowing only its id. A transaction that is
/// not here is either in a batch or never existed.
pub fn unbatched_by_id(
    storage: &dyn Storage,
    id: u64,
) -> Result<Option<OutgoingTransferTx>, ContractError> {
    for item in UNBATCHED_TXS.range(storage, None, None, Order::Descending) {
        let (_, tx) = item?;
        if tx.id == id {
            return Ok(Some(tx));
        }
    }
    Ok(None)
}

/// All unbatched transactions of one token, most profitable first.
pub fn unbatched_by_contract(
    storage: &dyn Storage,
    contract: &EthAddress,
) -> Result<Vec<OutgoingTransferTx>, ContractError> {
    UNBATCHED_TXS
        .sub_prefix(contract.as_str())
        .range(storage, None, None, Order::Descending)
        .map(|item| item.map(|(_, tx)| tx).map_err(Into::into))
        .collect()
}

/// Drop an unbatched transaction and compute its refund.
///
/// Only the original sender can cancel, and only while the transaction is
/// not riding in a batch.
pub fn remove_from_pool_and_refund(
    storage: &mut dyn Storage,
    id: u64,
    sender: &Addr,
) -> Result<(OutgoingTransferTx, Vec<Coin>), ContractError> {
    let tx = unbatched_by_id(storage, id)?
        .ok_or(ContractError::UnknownPoolTransaction { id })?;

    if tx.sender != *sender {
        return Err(ContractError::NotYourTransaction {
            sender: sender.to_string(),
            id,
        });
    }

    remove_unbatched(storage, &tx.erc20_token.contract, tx.fee.amount, id)?;

    let refund = merge_coins(&[tx.erc20_token.refund_coin(storage)?, tx.fee.clone()]);
    Ok((tx, refund))
}

/// The projected fee of the next batch for one token: walk the fee-ordered
/// index, skip blacklisted destinations, stop at `max_elements`.
pub fn batch_fee_by_token(
    storage: &dyn Storage,
    contract: &EthAddress,
    max_elements: u64,
) -> Result<BatchFees, ContractError> {
    let blacklist = PARAMS.load(storage)?.ethereum_blacklist;
    let mut fees = BatchFees {
        token: contract.to_string(),
        total_fees: Uint128::zero(),
        tx_count: 0,
    };

    for item in UNBATCHED_TXS
        .sub_prefix(contract.as_str())
        .range(storage, None, None, Order::Descending)
    {
        let (_, tx) = item?;
        if blacklist.contains(&tx.dest_address) {
            continue;
        }
        fees.total_fees += tx.fee.amount;
        fees.tx_count += 1;
        if fees.tx_count == max_elements {
            break;
        }
    }
    Ok(fees)
}

/// One fee entry per distinct token with pool content, ascending by token
/// address for deterministic consumption.
pub fn all_batch_fees(
    storage: &dyn Storage,
    max_elements: u64,
) -> Result<Vec<BatchFees>, ContractError> {
    let blacklist = PARAMS.load(storage)?.ethereum_blacklist;
    let mut per_token: BTreeMap<String, BatchFees> = BTreeMap::new();

    for item in UNBATCHED_TXS.range(storage, None, None, Order::Descending) {
        let (_, tx) = item?;
        if blacklist.contains(&tx.dest_address) {
            continue;
        }
        let entry = per_token
            .entry(tx.erc20_token.contract.to_string())
            .or_insert_with(|| BatchFees {
                token: tx.erc20_token.contract.to_string(),
                total_fees: Uint128::zero(),
                tx_count: 0,
            });
        // the walk is fee-descending per token, so the first max_elements
        // seen are exactly the ones the next batch would take
        if entry.tx_count < max_elements {
            entry.total_fees += tx.fee.amount;
            entry.tx_count += 1;
        }
    }

    Ok(per_token.into_values().collect())
}

/// Merge same-denom coins into a bank-valid coin list.
pub fn merge_coins(coins: &[Coin]) -> Vec<Coin> {
    let mut merged: BTreeMap<String, Uint128> = BTreeMap::new();
    for coin in coins {
        if coin.amount.is_zero() {
            continue;
        }
        *merged.entry(coin.denom.clone()).or_default() += coin.amount;
    }
    merged
        .into_iter()
        .map(|(denom, amount)| Coin { denom, amount })
        .collect()
}

impl Erc20Token {
    /// The coin this amount refunds as: the voucher denom for
    /// EVM-originated tokens, the registered denom otherwise.
    fn refund_coin(&self, storage: &dyn Storage) -> Result<Coin, ContractError> {
        let (_, denom) = erc20_to_denom(storage, &self.contract)?;
        Ok(Coin {
            denom,
            amount: self.amount,
        })
    }
}
