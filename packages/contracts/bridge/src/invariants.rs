//! Cross-component balance invariant.
//!
//! Every coin the bridge account holds must be accounted for by exactly one
//! of: an unbatched pool transaction, a transaction riding in an in-flight
//! batch, or the settled escrow of cosmos-originated coins circulating on
//! the EVM side. Anything else means value was created or destroyed inside
//! the bridge, and the bridge halts until governance intervenes.

use std::collections::BTreeMap;

use cosmwasm_std::{Coin, Deps, DepsMut, Env, Event, Order, Uint128};

use crate::error::ContractError;
use crate::msg::InvariantResponse;
use crate::pool::erc20_to_denom;
use crate::state::{OutgoingTransferTx, BATCHES, ESCROW, PARAMS, UNBATCHED_TXS};

/// Compute both sides of the balance invariant.
pub fn module_balance(deps: Deps, env: &Env) -> Result<InvariantResponse, ContractError> {
    let mut expected: BTreeMap<String, Uint128> = BTreeMap::new();

    let tally = |storage: &dyn cosmwasm_std::Storage,
                     tx: &OutgoingTransferTx,
                     expected: &mut BTreeMap<String, Uint128>|
     -> Result<(), ContractError> {
        let (_, denom) = erc20_to_denom(storage, &tx.erc20_token.contract)?;
        *expected.entry(denom).or_default() += tx.erc20_token.amount;
        *expected.entry(tx.fee.denom.clone()).or_default() += tx.fee.amount;
        Ok(())
    };

    for item in UNBATCHED_TXS.range(deps.storage, None, None, Order::Ascending) {
        let (_, tx) = item?;
        tally(deps.storage, &tx, &mut expected)?;
    }
    for item in BATCHES.range(deps.storage, None, None, Order::Ascending) {
        let (_, batch) = item?;
        for tx in &batch.transactions {
            tally(deps.storage, tx, &mut expected)?;
        }
    }
    for item in ESCROW.range(deps.storage, None, None, Order::Ascending) {
        let (denom, amount) = item?;
        *expected.entry(denom).or_default() += amount;
    }

    let mut actual: BTreeMap<String, Uint128> = BTreeMap::new();
    for coin in deps.querier.query_all_balances(&env.contract.address)? {
        if !coin.amount.is_zero() {
            actual.insert(coin.denom, coin.amount);
        }
    }
    expected.retain(|_, amount| !amount.is_zero());

    let to_coins = |map: &BTreeMap<String, Uint128>| -> Vec<Coin> {
        map.iter()
            .map(|(denom, amount)| Coin {
                denom: denom.clone(),
                amount: *amount,
            })
            .collect()
    };

    Ok(InvariantResponse {
        ok: expected == actual,
        expected: to_coins(&expected),
        actual: to_coins(&actual),
    })
}

/// Block-end enforcement: a mismatch is fatal and halts the bridge.
pub fn enforce_module_balance(
    deps: DepsMut,
    env: &Env,
) -> Result<Vec<Event>, ContractError> {
    let result = module_balance(deps.as_ref(), env)?;
    if result.ok {
        return Ok(vec![]);
    }

    let mut params = PARAMS.load(deps.storage)?;
    params.bridge_active = false;
    PARAMS.save(deps.storage, &params)?;

    let fmt = |coins: &[Coin]| {
        coins
            .iter()
            .map(|c| format!("{}{}", c.amount, c.denom))
            .collect::<Vec<_>>()
            .join(",")
    };
    Ok(vec![Event::new("invariant_violation")
        .add_attribute("module", "bridge")
        .add_attribute("invariant", "module_balance")
        .add_attribute("expected", fmt(&result.expected))
        .add_attribute("actual", fmt(&result.actual))])
}
