//! Cumulative fill accounting for one order.
//!
//! The engine only ever reports a single fill's price and quantity; the
//! adapter is what turns a sequence of those into the cumulative-quantity
//! and volume-weighted-average-price figures every fill message carries
//! downstream. Notional is accumulated in `i128` (see
//! [`crate::fixed_point`]) so a long-lived heavily-filled order can't
//! overflow the running total the way a naive `i64` accumulator would.

use crate::fixed_point::{self, ScaledPrice, ScaledQuantity};

#[derive(Debug, Clone, Copy, Default)]
pub struct PartialFillState {
    qty_so_far: ScaledQuantity,
    notional_so_far: i128,
}

impl PartialFillState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fill(&mut self, price: ScaledPrice, qty: ScaledQuantity) {
        self.qty_so_far += qty;
        self.notional_so_far += fixed_point::notional(price, qty);
    }

    pub fn cumulative_qty(&self) -> ScaledQuantity {
        self.qty_so_far
    }

    pub fn average_price(&self) -> ScaledPrice {
        fixed_point::average_price(self.notional_so_far, self.qty_so_far)
    }
}
