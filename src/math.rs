//! Pool math
//!
//! Constant product (x * y = k) with the fee taken from the input side.
//! Fees are in basis points; `10000 - fee` is the share of the input that
//! reaches the curve.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

pub const FEE_DENOM: u64 = 10_000;

fn big(n: u64) -> BigUint {
    BigUint::from(n)
}

/// Output of an exact-in swap:
///
///   out = r_out * a * (D - f) / (r_in * D + a * (D - f))
///
/// which is `Y * a(1-f) / (X + a(1-f))` with `f` as a fraction. Rounds down.
pub fn amount_out(reserve_in: u64, reserve_out: u64, amount_in: u64, fee_bps: u64) -> u64 {
    if reserve_in == 0 || reserve_out == 0 || amount_in == 0 || fee_bps >= FEE_DENOM {
        return 0;
    }
    let with_fee = big(amount_in) * big(FEE_DENOM - fee_bps);
    let numerator = big(reserve_out) * &with_fee;
    let denominator = big(reserve_in) * big(FEE_DENOM) + with_fee;
    (numerator / denominator).to_u64().unwrap_or(0)
}

/// Input required for an exact-out swap, rounded up. `None` when the pool
/// cannot provide `amount_out`.
///
///   in = r_in * out * D / ((r_out - out) * (D - f)) + 1
pub fn amount_in(reserve_in: u64, reserve_out: u64, amount_out: u64, fee_bps: u64) -> Option<u64> {
    if reserve_in == 0 || reserve_out == 0 || amount_out == 0 || fee_bps >= FEE_DENOM {
        return None;
    }
    if amount_out >= reserve_out {
        return None;
    }
    let numerator = big(reserve_in) * big(amount_out) * big(FEE_DENOM);
    let denominator = big(reserve_out - amount_out) * big(FEE_DENOM - fee_bps);
    (numerator / denominator + big(1)).to_u64()
}

/// Spot price of the input asset in units of the output asset.
pub fn spot_price(reserve_in: u64, reserve_out: u64) -> f64 {
    if reserve_in == 0 {
        return 0.0;
    }
    reserve_out as f64 / reserve_in as f64
}

/// Price impact in percent relative to the spot price.
pub fn price_impact(reserve_in: u64, reserve_out: u64, amount_in: u64, amount_out: u64) -> f64 {
    if amount_in == 0 || amount_out == 0 {
        return 0.0;
    }
    let spot = spot_price(reserve_in, reserve_out);
    if spot == 0.0 {
        return 0.0;
    }
    let execution = amount_out as f64 / amount_in as f64;
    ((spot - execution) / spot).abs() * 100.0
}

/// Portion of a single-sided deposit that is swapped so the remainder
/// matches the post-swap pool ratio.
///
///   s = (sqrt((r (D + g))^2 + 4 a r g D) - r (D + g)) / (2 g),  g = D - f
pub fn zap_in_swap_amount(reserve_in: u64, amount_in: u64, fee_bps: u64) -> u64 {
    if reserve_in == 0 || amount_in == 0 || fee_bps >= FEE_DENOM {
        return 0;
    }
    let g = big(FEE_DENOM - fee_bps);
    let r = big(reserve_in);
    let b = &r * (big(FEE_DENOM) + &g);
    let disc = &b * &b + big(4) * big(amount_in) * &r * &g * big(FEE_DENOM);
    let root = disc.sqrt();
    if root <= b {
        return 0;
    }
    ((root - b) / (big(2) * g)).to_u64().unwrap_or(0)
}

/// LP tokens expected from zapping `amount_in` into the pool.
///
/// This is an estimate: the batcher applies the order against whatever the
/// reserves are at execution time.
pub fn zap_in_lp(
    reserve_in: u64,
    reserve_out: u64,
    total_lp: u64,
    amount_in: u64,
    fee_bps: u64,
) -> u64 {
    if reserve_in == 0 || reserve_out == 0 || total_lp == 0 || amount_in == 0 {
        return 0;
    }
    let swap = zap_in_swap_amount(reserve_in, amount_in, fee_bps);
    let received = amount_out(reserve_in, reserve_out, swap, fee_bps);
    let new_in = big(reserve_in) + big(swap);
    let new_out = big(reserve_out.saturating_sub(received));
    if new_out.is_zero() {
        return 0;
    }

    let lp_from_in = big(amount_in.saturating_sub(swap)) * big(total_lp) / new_in;
    let lp_from_out = big(received) * big(total_lp) / new_out;
    lp_from_in.min(lp_from_out).to_u64().unwrap_or(0)
}

const SLIPPAGE_SCALE: u64 = 1_000_000;

fn slippage_ppm(slippage: f64) -> u64 {
    ((slippage * SLIPPAGE_SCALE as f64).round().max(0.0) as u64).min(SLIPPAGE_SCALE)
}

/// Reduce an amount by a slippage fraction (0.005 = 0.5%). Rounds down.
pub fn apply_slippage_down(amount: u64, slippage: f64) -> u64 {
    let keep = SLIPPAGE_SCALE - slippage_ppm(slippage);
    (big(amount) * big(keep) / big(SLIPPAGE_SCALE))
        .to_u64()
        .unwrap_or(0)
}

/// Increase an amount by a slippage fraction. Rounds down.
pub fn apply_slippage_up(amount: u64, slippage: f64) -> u64 {
    let grow = SLIPPAGE_SCALE + slippage_ppm(slippage);
    (big(amount) * big(grow) / big(SLIPPAGE_SCALE))
        .to_u64()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_out_matches_formula() {
        // Y * a(1-f) / (X + a(1-f)) = 2e6 * 997 / (1e6 + 997) = 1992.01..
        let out = amount_out(1_000_000, 2_000_000, 1_000, 30);
        let direct: f64 = (2_000_000.0 * 1_000.0 * 0.997) / (1_000_000.0 + 1_000.0 * 0.997);
        assert_eq!(out, direct.floor() as u64);
        assert_eq!(out, 1992);
    }

    #[test]
    fn test_amount_out_edge_cases() {
        assert_eq!(amount_out(0, 2_000_000, 1_000, 30), 0);
        assert_eq!(amount_out(1_000_000, 2_000_000, 0, 30), 0);
        assert_eq!(amount_out(1_000_000, 2_000_000, 1_000, FEE_DENOM), 0);
        // No fee: exact constant product
        assert_eq!(amount_out(1_000, 1_000, 1_000, 0), 500);
    }

    #[test]
    fn test_amount_in_inverts_amount_out() {
        let needed = amount_in(1_000_000, 2_000_000, 1992, 30).unwrap();
        assert_eq!(needed, 1000);
        assert!(amount_out(1_000_000, 2_000_000, needed, 30) >= 1992);
        assert!(amount_in(1_000_000, 2_000_000, 2_000_000, 30).is_none());
    }

    #[test]
    fn test_large_reserves_do_not_overflow() {
        let out = amount_out(u64::MAX / 2, u64::MAX / 2, u64::MAX / 4, 30);
        assert!(out > 0);
    }

    #[test]
    fn test_price_impact() {
        let impact = price_impact(1000, 2000, 100, 180);
        assert!((impact - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_zap_in() {
        let swap = zap_in_swap_amount(1_000_000, 1_000, 30);
        assert_eq!(swap, 500);
        let lp = zap_in_lp(1_000_000, 2_000_000, 1_414_213, 1_000, 30);
        assert_eq!(lp, 704);
    }

    #[test]
    fn test_slippage() {
        assert_eq!(apply_slippage_down(1000, 0.005), 995);
        assert_eq!(apply_slippage_up(1000, 0.005), 1005);
    }
}
