//! Price-time-priority limit order book for one symbol.
//!
//! Bids and asks are each a `BTreeMap<ScaledPrice, VecDeque<RestingOrder>>`:
//! the map gives price priority (best bid is the highest key, best ask the
//! lowest), the deque gives time priority within a level (FIFO). Every
//! operation talks to the outside world exclusively through
//! `&mut dyn EngineCallbacks` - the book itself never returns a fill list or
//! a `Result`.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::engine::callbacks::EngineCallbacks;
use crate::fixed_point::{ScaledPrice, ScaledQuantity};
use crate::message::{EngineOrderId, OrderKind, RejectReason, Side};

#[derive(Debug, Clone)]
struct RestingOrder {
    order_id: EngineOrderId,
    qty: ScaledQuantity,
}

/// One symbol's book. Order ids are allocated by the caller (the exchange
/// adapter owns the single `IdGenerator` shared across every symbol) and
/// passed in already-minted - the book never invents an id, so the adapter
/// can register an id's owner/client-order-id mapping before the book has a
/// chance to fire a fill callback against it.
pub struct OrderBook {
    symbol: String,
    bids: BTreeMap<ScaledPrice, VecDeque<RestingOrder>>,
    asks: BTreeMap<ScaledPrice, VecDeque<RestingOrder>>,
    by_id: HashMap<EngineOrderId, (Side, ScaledPrice)>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn place_limit(
        &mut self,
        order_id: EngineOrderId,
        side: Side,
        price: ScaledPrice,
        qty: ScaledQuantity,
        timeout: i64,
        callbacks: &mut dyn EngineCallbacks,
    ) {
        if qty <= 0 {
            callbacks.on_limit_rejected(RejectReason::InvalidQuantity);
            return;
        }
        if price <= 0 {
            callbacks.on_limit_rejected(RejectReason::InvalidPrice);
            return;
        }

        let remaining = self.match_against(side, order_id, OrderKind::Limit, qty, Some(price), callbacks);
        if remaining > 0 {
            self.rest(side, order_id, price, remaining);
        }
        callbacks.on_limit_accepted(order_id, side, price, qty, remaining, timeout);
    }

    pub fn place_market(
        &mut self,
        order_id: EngineOrderId,
        side: Side,
        qty: ScaledQuantity,
        callbacks: &mut dyn EngineCallbacks,
    ) {
        if qty <= 0 {
            callbacks.on_market_rejected(RejectReason::InvalidQuantity);
            return;
        }

        let remaining = self.match_against(side, order_id, OrderKind::Market, qty, None, callbacks);
        let executed = qty - remaining;
        callbacks.on_market_result(order_id, qty, executed, remaining);
    }

    pub fn cancel_full(&mut self, order_id: EngineOrderId, callbacks: &mut dyn EngineCallbacks) {
        match self.remove_resting(order_id) {
            Some((side, _price, qty)) => callbacks.on_full_cancel(order_id, side, qty),
            None => callbacks.on_full_cancel_rejected(RejectReason::UnknownEngineOrderId),
        }
    }

    /// Reduce a resting order's quantity in place. Rejects a cancel that
    /// would take the order to (or past) zero - use `cancel_full` for that.
    pub fn partial_cancel(
        &mut self,
        order_id: EngineOrderId,
        cancel_qty: ScaledQuantity,
        callbacks: &mut dyn EngineCallbacks,
    ) {
        if cancel_qty <= 0 {
            callbacks.on_partial_cancel_rejected(RejectReason::InvalidQuantity);
            return;
        }
        let Some(&(side, price)) = self.by_id.get(&order_id) else {
            callbacks.on_partial_cancel_rejected(RejectReason::UnknownEngineOrderId);
            return;
        };
        let queue = self
            .side_map_mut(side)
            .get_mut(&price)
            .expect("by_id entry without a matching book level");
        let Some(order) = queue.iter_mut().find(|o| o.order_id == order_id) else {
            callbacks.on_partial_cancel_rejected(RejectReason::UnknownEngineOrderId);
            return;
        };
        if cancel_qty >= order.qty {
            callbacks.on_partial_cancel_rejected(RejectReason::ExceedsRemainingQuantity);
            return;
        }
        order.qty -= cancel_qty;
        let remaining = order.qty;
        callbacks.on_partial_cancel(order_id, side, cancel_qty, remaining);
    }

    /// Pull a single resting order out of the book on expiration. Shares
    /// `remove_resting` with `cancel_full` but reports through a distinct
    /// callback, since an expiry and an agent-requested cancel are different
    /// events downstream even though the book-side effect is identical.
    pub fn expire(&mut self, order_id: EngineOrderId, callbacks: &mut dyn EngineCallbacks) {
        match self.remove_resting(order_id) {
            Some((side, price, qty)) => callbacks.on_expired(order_id, side, price, qty),
            None => callbacks.on_expire_rejected(order_id, RejectReason::UnknownEngineOrderId),
        }
    }

    pub fn flush(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.by_id.clear();
    }

    pub fn snapshot(&self, depth: usize, callbacks: &mut dyn EngineCallbacks) {
        let bids: Vec<(ScaledPrice, ScaledQuantity)> = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(&price, level)| (price, level.iter().map(|o| o.qty).sum()))
            .collect();
        let asks: Vec<(ScaledPrice, ScaledQuantity)> = self
            .asks
            .iter()
            .take(depth)
            .map(|(&price, level)| (price, level.iter().map(|o| o.qty).sum()))
            .collect();
        callbacks.on_l2_snapshot(&bids, &asks);
    }

    /// Quantity still resting for `order_id`, or `None` if it isn't on the
    /// book (already filled, cancelled, or never existed). Lets a caller
    /// decide, before mutating anything, whether a partial-cancel would
    /// reduce the order to zero and should be routed to `cancel_full`
    /// instead.
    pub fn remaining_qty(&self, order_id: EngineOrderId) -> Option<ScaledQuantity> {
        let &(side, price) = self.by_id.get(&order_id)?;
        let queue = match side {
            Side::Buy => self.bids.get(&price),
            Side::Sell => self.asks.get(&price),
        }?;
        queue.iter().find(|o| o.order_id == order_id).map(|o| o.qty)
    }

    /// Re-key a resting order from `old_id` to `new_id` in place, without
    /// disturbing its position in the book. Used when an order is minted a
    /// provisional id before matching runs and only earns its permanent id
    /// once it's known to rest.
    pub fn rename_resting(&mut self, old_id: EngineOrderId, new_id: EngineOrderId) {
        let Some(&(side, price)) = self.by_id.get(&old_id) else {
            return;
        };
        let queue = self
            .side_map_mut(side)
            .get_mut(&price)
            .expect("by_id entry without a matching book level");
        if let Some(order) = queue.iter_mut().find(|o| o.order_id == old_id) {
            order.order_id = new_id;
        }
        self.by_id.remove(&old_id);
        self.by_id.insert(new_id, (side, price));
    }

    pub fn best_bid(&self) -> Option<ScaledPrice> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<ScaledPrice> {
        self.asks.keys().next().copied()
    }

    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<ScaledPrice, VecDeque<RestingOrder>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn rest(&mut self, side: Side, order_id: EngineOrderId, price: ScaledPrice, qty: ScaledQuantity) {
        self.side_map_mut(side)
            .entry(price)
            .or_default()
            .push_back(RestingOrder { order_id, qty });
        self.by_id.insert(order_id, (side, price));
    }

    fn remove_resting(
        &mut self,
        order_id: EngineOrderId,
    ) -> Option<(Side, ScaledPrice, ScaledQuantity)> {
        let (side, price) = *self.by_id.get(&order_id)?;
        let book_side = self.side_map_mut(side);
        let queue = book_side.get_mut(&price)?;
        let pos = queue.iter().position(|o| o.order_id == order_id)?;
        let removed = queue.remove(pos)?;
        if queue.is_empty() {
            book_side.remove(&price);
        }
        self.by_id.remove(&order_id);
        Some((side, price, removed.qty))
    }

    /// Walk the opposite side's book crossing every level that `limit_price`
    /// allows (or every level, for a market taker with `limit_price ==
    /// None`), firing maker/taker fill callbacks and a trade callback for
    /// each match, until `qty` is exhausted or no more liquidity crosses.
    /// Returns whatever quantity is left unmatched.
    fn match_against(
        &mut self,
        taker_side: Side,
        taker_id: EngineOrderId,
        taker_kind: OrderKind,
        mut qty: ScaledQuantity,
        limit_price: Option<ScaledPrice>,
        callbacks: &mut dyn EngineCallbacks,
    ) -> ScaledQuantity {
        loop {
            if qty == 0 {
                break;
            }
            let best_price = match taker_side {
                Side::Buy => self.asks.keys().next().copied(),
                Side::Sell => self.bids.keys().next_back().copied(),
            };
            let Some(level_price) = best_price else {
                break;
            };
            if let Some(limit) = limit_price {
                let crosses = match taker_side {
                    Side::Buy => level_price <= limit,
                    Side::Sell => level_price >= limit,
                };
                if !crosses {
                    break;
                }
            }

            let maker_side = taker_side.opposite();
            let queue = self.side_map_mut(maker_side).get_mut(&level_price).expect(
                "best_price was just read from this same map - it must still have a level there",
            );

            while qty > 0 {
                let Some(maker) = queue.front_mut() else {
                    break;
                };
                let traded_qty = qty.min(maker.qty);
                maker.qty -= traded_qty;
                qty -= traded_qty;
                let maker_id = maker.order_id;
                let maker_leaves = maker.qty;

                if maker_leaves == 0 {
                    callbacks.on_full_fill(maker_id, OrderKind::Limit, maker_side, true, level_price, traded_qty);
                    queue.pop_front();
                    self.by_id.remove(&maker_id);
                } else {
                    callbacks.on_partial_fill(
                        maker_id,
                        OrderKind::Limit,
                        maker_side,
                        true,
                        level_price,
                        traded_qty,
                        maker_leaves,
                    );
                }

                if qty == 0 {
                    callbacks.on_full_fill(taker_id, taker_kind, taker_side, false, level_price, traded_qty);
                } else {
                    callbacks.on_partial_fill(
                        taker_id,
                        taker_kind,
                        taker_side,
                        false,
                        level_price,
                        traded_qty,
                        qty,
                    );
                }

                callbacks.on_trade(level_price, traded_qty, maker_id, taker_id, maker_side);

                if queue.is_empty() {
                    break;
                }
            }

            let level_empty = self
                .side_map_mut(maker_side)
                .get(&level_price)
                .map_or(true, |q| q.is_empty());
            if level_empty {
                self.side_map_mut(maker_side).remove(&level_price);
            }
        }
        qty
    }
}
