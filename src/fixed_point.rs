//! Fixed-point price and quantity representation.
//!
//! Prices and quantities are 64-bit integers scaled by a shared factor
//! (`SCALE`, 10^8 by default) rather than floats, so that matching
//! arithmetic is exact. `price_to_float`/`price_from_float` exist only for
//! the boundary with the outside world (seeding a book from human-readable
//! quotes, formatting for logs).

/// Default fixed-point scale: 10^8, giving 8 decimal digits of precision.
pub const DEFAULT_SCALE: i64 = 100_000_000;

pub type ScaledPrice = i64;
pub type ScaledQuantity = i64;

/// Convert a floating-point price/quantity to its scaled integer form.
#[inline]
pub fn to_scaled(value: f64, scale: i64) -> i64 {
    (value * scale as f64).round() as i64
}

/// Convert a scaled integer back to floating point.
#[inline]
pub fn to_float(value: i64, scale: i64) -> f64 {
    value as f64 / scale as f64
}

/// Widening multiply used for notional accounting (`price * qty`), which can
/// overflow 64 bits at realistic scale/size combinations (e.g. scaled price
/// 10^13 times quantity 10^6 is 10^19, above i64::MAX). The result is kept
/// in i128 throughout the adapter's cumulative-fill tracking.
#[inline]
pub fn notional(price: ScaledPrice, qty: ScaledQuantity) -> i128 {
    price as i128 * qty as i128
}

/// Average price from accumulated notional and quantity, in scaled-integer
/// terms, rounding to the nearest scaled price.
#[inline]
pub fn average_price(notional_sum: i128, qty_sum: ScaledQuantity) -> ScaledPrice {
    if qty_sum == 0 {
        return 0;
    }
    (notional_sum / qty_sum as i128) as ScaledPrice
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_scale() {
        let scaled = to_scaled(100.15, DEFAULT_SCALE);
        assert_eq!(scaled, 10_015_000_000);
        assert!((to_float(scaled, DEFAULT_SCALE) - 100.15).abs() < 1e-9);
    }

    #[test]
    fn notional_does_not_overflow_i64_range() {
        let price: i64 = 10_000_000_000_000; // 10^13
        let qty: i64 = 1_000_000; // 10^6
        let n = notional(price, qty);
        assert_eq!(n, 10_000_000_000_000_000_000i128);
    }

    #[test]
    fn average_price_weights_by_quantity() {
        let mut notional_sum: i128 = 0;
        let mut qty_sum: i64 = 0;
        for (p, q) in [(100i64, 5i64), (102i64, 5i64)] {
            notional_sum += notional(p, q);
            qty_sum += q;
        }
        assert_eq!(average_price(notional_sum, qty_sum), 101);
    }
}
