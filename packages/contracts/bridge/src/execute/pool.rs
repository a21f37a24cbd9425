//! User-facing pool handlers: queue, cancel, batch-request.

use cosmwasm_std::{BankMsg, Coin, DepsMut, Env, Event, MessageInfo, Response};

use crate::address::EthAddress;
use crate::batch::build_outgoing_batch;
use crate::error::ContractError;
use crate::msg::HostMsg;
use crate::pool::{add_to_pool, denom_to_erc20, merge_coins, remove_from_pool_and_refund};
use crate::state::PARAMS;

/// Queue a withdrawal to the EVM side. The attached funds must be exactly
/// `amount + bridge_fee`; they stay locked in the bridge account until the
/// batch executes or the sender cancels.
pub fn execute_send_to_eth(
    deps: DepsMut,
    info: MessageInfo,
    eth_dest: String,
    amount: Coin,
    bridge_fee: Coin,
) -> Result<Response<HostMsg>, ContractError> {
    let dest = EthAddress::new(&eth_dest)?;

    let expected = merge_coins(&[amount.clone(), bridge_fee.clone()]);
    let attached = merge_coins(&info.funds);
    if attached != expected {
        return Err(ContractError::invalid(
            "funds",
            "attached funds must equal amount plus bridge_fee",
        ));
    }

    let tx_id = add_to_pool(deps.storage, info.sender.clone(), dest, amount, bridge_fee)?;

    let bridge_id = PARAMS.load(deps.storage)?.bridge_id;
    Ok(Response::new()
        .add_event(
            Event::new("withdrawal_received")
                .add_attribute("module", "bridge")
                .add_attribute("bridge_id", bridge_id)
                .add_attribute("outgoing_tx_id", tx_id.to_string())
                .add_attribute("nonce", tx_id.to_string())
                .add_attribute("sender", info.sender.to_string())
                .add_attribute("eth_dest", eth_dest),
        )
        .add_attribute("action", "send_to_eth")
        .add_attribute("tx_id", tx_id.to_string()))
}

/// Pull an unbatched withdrawal out of the pool and refund it in full.
pub fn execute_cancel_send_to_eth(
    deps: DepsMut,
    info: MessageInfo,
    transaction_id: u64,
) -> Result<Response<HostMsg>, ContractError> {
    let (tx, refund) = remove_from_pool_and_refund(deps.storage, transaction_id, &info.sender)?;

    let bridge_id = PARAMS.load(deps.storage)?.bridge_id;
    Ok(Response::new()
        .add_message(BankMsg::Send {
            to_address: info.sender.to_string(),
            amount: refund,
        })
        .add_event(
            Event::new("withdrawal_cancelled")
                .add_attribute("module", "bridge")
                .add_attribute("bridge_id", bridge_id)
                .add_attribute("outgoing_tx_id", tx.id.to_string())
                .add_attribute("nonce", tx.id.to_string()),
        )
        .add_attribute("action", "cancel_send_to_eth"))
}

/// Build the next batch for the token behind `denom`. Permissionless:
/// relayers call this when the projected fees cover their gas.
pub fn execute_request_batch(
    deps: DepsMut,
    env: Env,
    denom: String,
) -> Result<Response<HostMsg>, ContractError> {
    let (_, token_contract) = denom_to_erc20(deps.storage, &denom)?;
    let params = PARAMS.load(deps.storage)?;

    let batch = build_outgoing_batch(
        deps.storage,
        &env,
        token_contract,
        params.batch_max_elements,
    )?;

    Ok(Response::new()
        .add_event(
            Event::new("batch_created")
                .add_attribute("module", "bridge")
                .add_attribute("bridge_id", params.bridge_id)
                .add_attribute("token_contract", batch.token_contract.to_string())
                .add_attribute("nonce", batch.batch_nonce.to_string())
                .add_attribute("batch_timeout", batch.batch_timeout.to_string())
                .add_attribute("tx_count", batch.transactions.len().to_string()),
        )
        .add_attribute("action", "request_batch"))
}
