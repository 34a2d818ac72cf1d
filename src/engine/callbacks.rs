//! The matching engine's output boundary.
//!
//! The book never returns a `Result` or a `Vec<Event>` from its operations;
//! instead every operation takes `&mut dyn EngineCallbacks` and calls
//! straight into it as events occur, in the order they occur. This keeps a
//! single taker order's cascade of callbacks (zero or more fills, then a
//! full-or-partial ack, then the resulting trades) in their natural order
//! without the book building up an intermediate event list first.

use crate::fixed_point::{ScaledPrice, ScaledQuantity};
use crate::message::{EngineOrderId, OrderKind, RejectReason, Side};

pub trait EngineCallbacks {
    /// A limit order rested (in full or in part, after any immediate fills).
    fn on_limit_accepted(
        &mut self,
        order_id: EngineOrderId,
        side: Side,
        price: ScaledPrice,
        original_qty: ScaledQuantity,
        resting_qty: ScaledQuantity,
        timeout_nanos: i64,
    );

    /// A limit order was rejected before ever touching the book (bad price,
    /// non-positive quantity, unknown symbol).
    fn on_limit_rejected(&mut self, reason: RejectReason);

    /// A market order was rejected before any matching was attempted.
    fn on_market_rejected(&mut self, reason: RejectReason);

    /// A market order finished matching. `unfilled_qty` is whatever could
    /// not be matched against available liquidity; market orders never
    /// rest, so that remainder is simply dropped.
    fn on_market_result(
        &mut self,
        order_id: EngineOrderId,
        requested_qty: ScaledQuantity,
        executed_qty: ScaledQuantity,
        unfilled_qty: ScaledQuantity,
    );

    /// One order was partially filled and has quantity left (`leaves_qty`).
    fn on_partial_fill(
        &mut self,
        order_id: EngineOrderId,
        kind: OrderKind,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        fill_qty: ScaledQuantity,
        leaves_qty: ScaledQuantity,
    );

    /// One order was filled down to zero remaining quantity, by this final
    /// segment of size `fill_qty`.
    fn on_full_fill(
        &mut self,
        order_id: EngineOrderId,
        kind: OrderKind,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        fill_qty: ScaledQuantity,
    );

    /// One match between a resting (maker) order and an incoming (taker)
    /// order, fired once per price level crossed per taker.
    fn on_trade(
        &mut self,
        price: ScaledPrice,
        qty: ScaledQuantity,
        maker_order_id: EngineOrderId,
        taker_order_id: EngineOrderId,
        maker_side: Side,
    );

    fn on_full_cancel(&mut self, order_id: EngineOrderId, side: Side, cancelled_qty: ScaledQuantity);

    fn on_full_cancel_rejected(&mut self, reason: RejectReason);

    /// An expire attempt (via `OrderBook::expire`) found no matching resting
    /// order. Kept distinct from `on_full_cancel_rejected` so the adapter
    /// can tell an expired-already-gone order apart from an ordinary
    /// unknown-id cancel and route the reject back through the
    /// trigger/ack handshake instead of the plain cancel-reject message.
    fn on_expire_rejected(&mut self, order_id: EngineOrderId, reason: RejectReason);

    fn on_partial_cancel(
        &mut self,
        order_id: EngineOrderId,
        side: Side,
        cancelled_qty: ScaledQuantity,
        remaining_qty: ScaledQuantity,
    );

    fn on_partial_cancel_rejected(&mut self, reason: RejectReason);

    /// An order was swept out of the book by `cancel_expired` directly,
    /// bypassing the trigger/ack handshake (used by the watchdog's own
    /// book-side expiration sweep, not ordinary agent-driven cancels).
    fn on_expired(
        &mut self,
        order_id: EngineOrderId,
        side: Side,
        price: ScaledPrice,
        qty: ScaledQuantity,
    );

    fn on_l2_snapshot(&mut self, bids: &[(ScaledPrice, ScaledQuantity)], asks: &[(ScaledPrice, ScaledQuantity)]);
}
