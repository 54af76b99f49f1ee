//! Order transactions: swap, zap-in and cancel.
//!
//! Orders are sent to the order script address with the order datum hash on
//! the output and the datum itself in the witness set. The batcher later
//! applies them against the pool; cancelling spends the order back.

use crate::config::Network;
use crate::dex::cbor::{constr, decode_cbor_bytes};
use crate::error::{Error, Result};
use crate::math::{apply_slippage_down, apply_slippage_up};
use crate::models::{Address, Assets, OrderDatum, OrderStep, PoolDetail, PoolSummary, ProtocolParams, Utxo};
use crate::tx::builder::TxBuilder;
use crate::tx::encode::{datum_hash, ExUnits, Transaction, TxOutput};

pub const ORDER_ADDRESS: &str = "addr1wxn9efv2f6w82hagxqtn62ju4m293tqvw0uhmdl64ch8uwc0h43gt";
pub const ORDER_ADDRESS_TEST: &str = "addr_test1wzn9efv2f6w82hagxqtn62ju4m293tqvw0uhmdl64ch8uwc5lpd8w";

/// The order validator (PlutusV1, flat-encoded inside a CBOR byte string).
pub const ORDER_SCRIPT_HEX: &str = concat!(
    "59014c01000032323232323232322223232325333009300e30070021323233533300b33",
    "70e9000180480109118011bae30100031225001232533300d3300e22533301300114a02a666",
    "01e66ebcc04800400c5288980118070009bac3010300c300c300c300c300c300c300c007149",
    "858dd48008b18060009baa300c300b3754601860166ea80184ccccc0288894ccc0400044008",
    "4c8c94ccc038cd4ccc038c04cc030008488c008dd718098018912800919b8f0014891ce1317",
    "b152faac13426e6a83e06ff88a4d62cce3c1634ab0a5ec133090014a0266008444a00226600",
    "a446004602600a601a00626600a008601a006601e0026ea8c03cc038dd5180798071baa300f",
    "300b300e3754601e00244a0026eb0c03000c92616300a001375400660106ea8c024c020dd50",
    "00aab9d5744ae688c8c0088cc0080080048c0088cc00800800555cf2ba15573e6e1d200201",
);

/// Budget reserved for the cancel path of the order validator.
pub const CANCEL_EX_UNITS: ExUnits = ExUnits {
    mem: 1_000_000,
    steps: 400_000_000,
};

/// `CancelOrder` redeemer alternative.
const CANCEL_REDEEMER: u64 = 1;

pub const DEFAULT_SLIPPAGE: f64 = 0.005;

const MESSAGE_PREFIX: &str = concat!("minswap-rs: ", env!("CARGO_PKG_VERSION"));

pub fn order_address(network: Network) -> Result<Address> {
    let bech32 = if network.is_mainnet() {
        ORDER_ADDRESS
    } else {
        ORDER_ADDRESS_TEST
    };
    Address::from_bech32(bech32)
}

pub fn order_script() -> Result<Vec<u8>> {
    hex::decode(ORDER_SCRIPT_HEX).map_err(|e| Error::Decode(format!("order script: {}", e)))
}

/// The party placing or cancelling an order.
#[derive(Debug, Clone, Copy)]
pub struct OrderAccount<'a> {
    pub address: &'a Address,
    pub network: Network,
    pub utxos: &'a [Utxo],
    pub collateral: Option<&'a Utxo>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwapRequest {
    /// Sell exactly this bundle; receive at least the quoted output minus slippage.
    ExactIn(Assets),
    /// Buy exactly this bundle; pay the quoted input plus slippage.
    ExactOut(Assets),
    /// Sell `give`, receive at least `receive`. No pool or slippage involved.
    Limit { give: Assets, receive: Assets },
}

fn single(assets: &Assets, what: &str) -> Result<(String, u64)> {
    let mut iter = assets.iter();
    match (iter.next(), iter.next()) {
        (Some((unit, qty)), None) => Ok((unit.to_string(), qty)),
        _ => Err(Error::InvalidTransaction(format!(
            "{} must hold exactly one asset, got {}",
            what,
            assets.len()
        ))),
    }
}

pub(crate) fn message_lines(kind: &str, msg: Option<&str>) -> Vec<String> {
    let mut lines = vec![MESSAGE_PREFIX.to_string(), kind.to_string()];
    if let Some(m) = msg {
        lines.push(m.to_string());
    }
    lines
}

/// Order step and funds to lock for a swap request.
pub fn swap_step(
    request: &SwapRequest,
    pool: Option<&PoolSummary>,
    slippage: f64,
) -> Result<(OrderStep, Assets, &'static str)> {
    let need_pool = || {
        pool.ok_or_else(|| Error::InvalidTransaction("a pool is required for this swap".to_string()))
    };
    match request {
        SwapRequest::Limit { give, receive } => {
            single(give, "limit order input")?;
            let (desired_unit, min_receive) = single(receive, "limit order output")?;
            Ok((
                OrderStep::SwapExactIn {
                    desired_unit,
                    min_receive,
                },
                give.clone(),
                "Swap: Limit Order",
            ))
        }
        SwapRequest::ExactIn(give) => {
            let (unit_in, amount_in) = single(give, "swap input")?;
            let (out, _) = need_pool()?.amount_out(&unit_in, amount_in)?;
            let (desired_unit, quoted) = single(&out, "swap output")?;
            Ok((
                OrderStep::SwapExactIn {
                    desired_unit,
                    min_receive: apply_slippage_down(quoted, slippage),
                },
                give.clone(),
                "Swap: Exact In",
            ))
        }
        SwapRequest::ExactOut(want) => {
            let (unit_out, amount_out) = single(want, "swap output")?;
            let (input, _) = need_pool()?.amount_in(&unit_out, amount_out)?;
            let (unit_in, quoted) = single(&input, "swap input")?;
            Ok((
                OrderStep::SwapExactOut {
                    desired_unit: unit_out,
                    expected_receive: amount_out,
                },
                Assets::single(&unit_in, apply_slippage_up(quoted, slippage)),
                "Swap: Exact Out",
            ))
        }
    }
}

/// Lock `in_assets` plus batcher fee and output ADA at the order address.
fn place_order(
    params: &ProtocolParams,
    account: OrderAccount<'_>,
    datum: &OrderDatum,
    in_assets: &Assets,
    lines: &[String],
) -> Result<Transaction> {
    let datum_cbor = datum.to_cbor()?;
    let locked = in_assets.checked_add(&Assets::lovelace(datum.batcher_fee + datum.output_ada))?;
    let output = TxOutput::new(order_address(account.network)?, locked)
        .with_datum_hash(datum_hash(&datum_cbor));

    // The collateral UTxO stays out of selection.
    let spendable = account
        .utxos
        .iter()
        .filter(|u| account.collateral.map_or(true, |c| !c.same_ref(u)))
        .cloned();

    let mut builder = TxBuilder::new(params);
    builder
        .add_wallet_utxos(spendable)
        .add_output(output)
        .add_datum(datum_cbor)
        .change_address(account.address.clone())
        .message(lines);
    builder.build()
}

pub fn swap_tx(
    params: &ProtocolParams,
    account: OrderAccount<'_>,
    request: &SwapRequest,
    pool: Option<&PoolSummary>,
    slippage: f64,
    msg: Option<&str>,
) -> Result<Transaction> {
    let (step, in_assets, kind) = swap_step(request, pool, slippage)?;
    let datum = OrderDatum::new(account.address, step);
    tracing::info!("{} order: {:?}", kind, datum.step);
    place_order(params, account, &datum, &in_assets, &message_lines(kind, msg))
}

/// Single-asset deposit. The minimum LP is an estimate from current reserves
/// reduced by `slippage`.
pub fn zap_in_tx(
    params: &ProtocolParams,
    account: OrderAccount<'_>,
    assets: &Assets,
    pool: &PoolDetail,
    slippage: f64,
    msg: Option<&str>,
) -> Result<Transaction> {
    let (unit_in, amount) = single(assets, "zap-in input")?;
    let estimate = pool.zap_in_lp(&unit_in, amount)?;
    let desired_unit = if unit_in == pool.summary.unit_a {
        pool.summary.unit_b.clone()
    } else {
        pool.summary.unit_a.clone()
    };
    let step = OrderStep::ZapIn {
        desired_unit,
        min_lp: apply_slippage_down(estimate, slippage),
    };
    let datum = OrderDatum::new(account.address, step);
    place_order(params, account, &datum, assets, &message_lines("Deposit: Zap in", msg))
}

/// Spend an open order back to the wallet. `datum_cbor` is the order datum
/// exactly as stored on chain.
pub fn cancel_tx(
    params: &ProtocolParams,
    account: OrderAccount<'_>,
    order: &Utxo,
    datum_cbor: &[u8],
    msg: Option<&str>,
) -> Result<Transaction> {
    let expected = order
        .data_hash
        .as_deref()
        .ok_or_else(|| Error::InvalidTransaction(format!("{} has no datum hash", order.out_ref())))?;
    if hex::encode(datum_hash(datum_cbor)) != expected {
        return Err(Error::InvalidTransaction(format!(
            "datum does not hash to {}",
            expected
        )));
    }

    let datum = OrderDatum::from_plutus(&decode_cbor_bytes(datum_cbor)?, account.network)?;
    if datum.sender.payment != account.address.payment {
        return Err(Error::InvalidTransaction(format!(
            "{} was not placed by this wallet",
            order.out_ref()
        )));
    }
    let signer = *account.address.payment.hash();
    let collateral = account.collateral.ok_or(Error::MissingCollateral)?;

    let mut builder = TxBuilder::new(params);
    builder
        .add_script_input(order.clone(), constr(CANCEL_REDEEMER, vec![]), CANCEL_EX_UNITS)
        .add_wallet_utxos(account.utxos.iter().cloned())
        .add_plutus_v1_script(order_script()?)
        .add_datum(datum_cbor.to_vec())
        .add_collateral(collateral.clone())
        .add_required_signer(signer)
        .change_address(account.address.clone())
        .message(&message_lines("Cancel Order", msg));
    builder.build()
}
