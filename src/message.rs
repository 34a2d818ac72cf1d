//! The canonical message model.
//!
//! The ~30 message kinds the bus ever routes, closed over in a single
//! `Message` enum (a tagged variant instead of a class hierarchy — there is
//! no polymorphism among exchange simulators, so a `match` replaces virtual
//! dispatch everywhere an agent needs to branch on message kind).

use crate::clock::Nanos;
use crate::fixed_point::{ScaledPrice, ScaledQuantity};
use serde::{Deserialize, Serialize};

/// Identifier for a registered bus agent (strategy, adapter, watchdog, ...).
pub type AgentId = u64;
/// Agent id reserved for "no agent"/"not yet registered".
pub const INVALID_AGENT_ID: AgentId = 0;

/// Client-chosen identifier for one order, scoped to its owning agent.
pub type ClientOrderId = u64;
/// Engine-assigned identifier for one order ("XID" in the original system).
pub type EngineOrderId = u64;

pub type Symbol = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Kind of order an engine id refers to, as tracked by the adapter so it can
/// reject operations typed against the wrong kind (e.g. partial-cancel on a
/// market order id, which never rests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    Market,
}

/// A single `(price, aggregate quantity)` level of an L2 book.
pub type L2Level = (ScaledPrice, ScaledQuantity);

/// Reasons a reject message can carry. Kept as a small closed enum rather
/// than a free-form string so tests can match on it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    UnknownClientOrderId,
    UnknownEngineOrderId,
    WrongOrderKind,
    MarketOrdersDoNotRest,
    AlreadyTerminated,
    InvalidQuantity,
    InvalidPrice,
    ExceedsRemainingQuantity,
}

/// The full closed set of messages the bus ever carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // ---- market data -----------------------------------------------------
    L2OrderBook {
        timestamp: Nanos,
        symbol: Symbol,
        bids: Vec<L2Level>,
        asks: Vec<L2Level>,
    },

    // ---- order intents -----------------------------------------------------
    LimitOrder {
        timestamp: Nanos,
        symbol: Symbol,
        side: Side,
        owner: AgentId,
        client_order_id: ClientOrderId,
        price: ScaledPrice,
        qty: ScaledQuantity,
        timeout: Nanos,
    },
    MarketOrder {
        timestamp: Nanos,
        symbol: Symbol,
        side: Side,
        owner: AgentId,
        client_order_id: ClientOrderId,
        qty: ScaledQuantity,
    },
    PartialCancelLimitOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        cancel_qty: ScaledQuantity,
    },
    FullCancelLimitOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
    },
    PartialCancelMarketOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        cancel_qty: ScaledQuantity,
    },
    FullCancelMarketOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
    },

    // ---- acknowledgments -----------------------------------------------------
    LimitOrderAck {
        timestamp: Nanos,
        symbol: Symbol,
        side: Side,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        price: ScaledPrice,
        original_qty: ScaledQuantity,
        resting_qty: ScaledQuantity,
        timeout: Nanos,
    },
    MarketOrderAck {
        timestamp: Nanos,
        symbol: Symbol,
        side: Side,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        requested_qty: ScaledQuantity,
        executed_qty: ScaledQuantity,
        unfilled_qty: ScaledQuantity,
    },
    FullCancelLimitOrderAck {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        side: Side,
        cancelled_qty: ScaledQuantity,
    },
    FullCancelMarketOrderAck {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        cancelled_qty: ScaledQuantity,
    },
    PartialCancelLimitAck {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        side: Side,
        cancelled_qty: ScaledQuantity,
        remaining_qty: ScaledQuantity,
    },
    PartialCancelMarketAck {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        cancelled_qty: ScaledQuantity,
    },

    // ---- rejections -----------------------------------------------------
    PartialCancelLimitOrderReject {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        reason: RejectReason,
    },
    FullCancelLimitOrderReject {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        reason: RejectReason,
    },
    PartialCancelMarketOrderReject {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        reason: RejectReason,
    },
    FullCancelMarketOrderReject {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        reason: RejectReason,
    },
    LimitOrderReject {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        reason: RejectReason,
    },
    MarketOrderReject {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        reason: RejectReason,
    },

    // ---- expirations that bypassed the trigger handshake -----------------
    MarketOrderExpired {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        order_id: EngineOrderId,
    },
    LimitOrderExpired {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        order_id: EngineOrderId,
        side: Side,
        price: ScaledPrice,
        qty: ScaledQuantity,
    },

    // ---- fills -----------------------------------------------------
    PartialFillLimitOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        fill_qty: ScaledQuantity,
        leaves_qty: ScaledQuantity,
        cumulative_qty: ScaledQuantity,
        avg_price: ScaledPrice,
    },
    PartialFillMarketOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        fill_qty: ScaledQuantity,
        leaves_qty: ScaledQuantity,
        cumulative_qty: ScaledQuantity,
        avg_price: ScaledPrice,
    },
    FullFillLimitOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        cumulative_qty: ScaledQuantity,
        avg_price: ScaledPrice,
    },
    FullFillMarketOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        client_order_id: ClientOrderId,
        order_id: EngineOrderId,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        cumulative_qty: ScaledQuantity,
        avg_price: ScaledPrice,
    },
    Trade {
        timestamp: Nanos,
        symbol: Symbol,
        price: ScaledPrice,
        qty: ScaledQuantity,
        maker_order_id: EngineOrderId,
        taker_order_id: EngineOrderId,
        maker_side: Side,
    },

    // ---- expiration control -----------------------------------------------------
    CheckLimitOrderExpiration {
        timestamp: Nanos,
        order_id: EngineOrderId,
        timeout: Nanos,
    },
    TriggerExpiredLimitOrder {
        timestamp: Nanos,
        symbol: Symbol,
        order_id: EngineOrderId,
        timeout: Nanos,
        original_placer: AgentId,
    },
    AckTriggerExpiredLimitOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        order_id: EngineOrderId,
        side: Side,
        cancelled_qty: ScaledQuantity,
    },
    RejectTriggerExpiredLimitOrder {
        timestamp: Nanos,
        symbol: Symbol,
        owner: AgentId,
        order_id: EngineOrderId,
    },

    // ---- global reset -----------------------------------------------------
    Bang {
        timestamp: Nanos,
    },
}

impl Message {
    /// The name used as the non-scoped half of a topic string, e.g.
    /// `"LimitOrderEvent"` for `Message::LimitOrder`. Mirrors the original
    /// system's event class names so the topic grammar in the spec
    /// (`<MessageName>` / `<MessageName>.<scope>`) reads the same way.
    pub fn name(&self) -> &'static str {
        match self {
            Message::L2OrderBook { .. } => "LTwoOrderBookEvent",
            Message::LimitOrder { .. } => "LimitOrderEvent",
            Message::MarketOrder { .. } => "MarketOrderEvent",
            Message::PartialCancelLimitOrder { .. } => "PartialCancelLimitOrderEvent",
            Message::FullCancelLimitOrder { .. } => "FullCancelLimitOrderEvent",
            Message::PartialCancelMarketOrder { .. } => "PartialCancelMarketOrderEvent",
            Message::FullCancelMarketOrder { .. } => "FullCancelMarketOrderEvent",
            Message::LimitOrderAck { .. } => "LimitOrderAckEvent",
            Message::MarketOrderAck { .. } => "MarketOrderAckEvent",
            Message::FullCancelLimitOrderAck { .. } => "FullCancelLimitOrderAckEvent",
            Message::FullCancelMarketOrderAck { .. } => "FullCancelMarketOrderAckEvent",
            Message::PartialCancelLimitAck { .. } => "PartialCancelLimitAckEvent",
            Message::PartialCancelMarketAck { .. } => "PartialCancelMarketAckEvent",
            Message::PartialCancelLimitOrderReject { .. } => "PartialCancelLimitOrderRejectEvent",
            Message::FullCancelLimitOrderReject { .. } => "FullCancelLimitOrderRejectEvent",
            Message::PartialCancelMarketOrderReject { .. } => "PartialCancelMarketOrderRejectEvent",
            Message::FullCancelMarketOrderReject { .. } => "FullCancelMarketOrderRejectEvent",
            Message::LimitOrderReject { .. } => "LimitOrderRejectEvent",
            Message::MarketOrderReject { .. } => "MarketOrderRejectEvent",
            Message::MarketOrderExpired { .. } => "MarketOrderExpiredEvent",
            Message::LimitOrderExpired { .. } => "LimitOrderExpiredEvent",
            Message::PartialFillLimitOrder { .. } => "PartialFillLimitOrderEvent",
            Message::PartialFillMarketOrder { .. } => "PartialFillMarketOrderEvent",
            Message::FullFillLimitOrder { .. } => "FullFillLimitOrderEvent",
            Message::FullFillMarketOrder { .. } => "FullFillMarketOrderEvent",
            Message::Trade { .. } => "TradeEvent",
            Message::CheckLimitOrderExpiration { .. } => "CheckLimitOrderExpirationEvent",
            Message::TriggerExpiredLimitOrder { .. } => "TriggerExpiredLimitOrderEvent",
            Message::AckTriggerExpiredLimitOrder { .. } => "AckTriggerExpiredLimitOrderEvent",
            Message::RejectTriggerExpiredLimitOrder { .. } => "RejectTriggerExpiredLimitOrderEvent",
            Message::Bang { .. } => "Bang",
        }
    }

    /// The symbol a message pertains to, if any. Used to build
    /// symbol-scoped topic names (`"<MessageName>.<symbol>"`); messages with
    /// no natural symbol (`Bang`, the watchdog's self-timer) return `None`.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Message::L2OrderBook { symbol, .. }
            | Message::LimitOrder { symbol, .. }
            | Message::MarketOrder { symbol, .. }
            | Message::PartialCancelLimitOrder { symbol, .. }
            | Message::FullCancelLimitOrder { symbol, .. }
            | Message::PartialCancelMarketOrder { symbol, .. }
            | Message::FullCancelMarketOrder { symbol, .. }
            | Message::LimitOrderAck { symbol, .. }
            | Message::MarketOrderAck { symbol, .. }
            | Message::FullCancelLimitOrderAck { symbol, .. }
            | Message::FullCancelMarketOrderAck { symbol, .. }
            | Message::PartialCancelLimitAck { symbol, .. }
            | Message::PartialCancelMarketAck { symbol, .. }
            | Message::PartialCancelLimitOrderReject { symbol, .. }
            | Message::FullCancelLimitOrderReject { symbol, .. }
            | Message::PartialCancelMarketOrderReject { symbol, .. }
            | Message::FullCancelMarketOrderReject { symbol, .. }
            | Message::LimitOrderReject { symbol, .. }
            | Message::MarketOrderReject { symbol, .. }
            | Message::MarketOrderExpired { symbol, .. }
            | Message::LimitOrderExpired { symbol, .. }
            | Message::PartialFillLimitOrder { symbol, .. }
            | Message::PartialFillMarketOrder { symbol, .. }
            | Message::FullFillLimitOrder { symbol, .. }
            | Message::FullFillMarketOrder { symbol, .. }
            | Message::Trade { symbol, .. }
            | Message::TriggerExpiredLimitOrder { symbol, .. }
            | Message::AckTriggerExpiredLimitOrder { symbol, .. }
            | Message::RejectTriggerExpiredLimitOrder { symbol, .. } => Some(symbol),
            Message::CheckLimitOrderExpiration { .. } | Message::Bang { .. } => None,
        }
    }

    /// The agent a message is addressed to or originates from, if any. Used
    /// to build the per-trader topic (`"<MessageName>.<owner_id>"`); pure
    /// market data (`L2OrderBook`, `Trade`) and bus-internal control messages
    /// (`CheckLimitOrderExpiration`, `Bang`) have no single owner and return
    /// `None`.
    pub fn owner(&self) -> Option<AgentId> {
        match self {
            Message::LimitOrder { owner, .. }
            | Message::MarketOrder { owner, .. }
            | Message::PartialCancelLimitOrder { owner, .. }
            | Message::FullCancelLimitOrder { owner, .. }
            | Message::PartialCancelMarketOrder { owner, .. }
            | Message::FullCancelMarketOrder { owner, .. }
            | Message::LimitOrderAck { owner, .. }
            | Message::MarketOrderAck { owner, .. }
            | Message::FullCancelLimitOrderAck { owner, .. }
            | Message::FullCancelMarketOrderAck { owner, .. }
            | Message::PartialCancelLimitAck { owner, .. }
            | Message::PartialCancelMarketAck { owner, .. }
            | Message::PartialCancelLimitOrderReject { owner, .. }
            | Message::FullCancelLimitOrderReject { owner, .. }
            | Message::PartialCancelMarketOrderReject { owner, .. }
            | Message::FullCancelMarketOrderReject { owner, .. }
            | Message::LimitOrderReject { owner, .. }
            | Message::MarketOrderReject { owner, .. }
            | Message::MarketOrderExpired { owner, .. }
            | Message::LimitOrderExpired { owner, .. }
            | Message::PartialFillLimitOrder { owner, .. }
            | Message::PartialFillMarketOrder { owner, .. }
            | Message::FullFillLimitOrder { owner, .. }
            | Message::FullFillMarketOrder { owner, .. }
            | Message::AckTriggerExpiredLimitOrder { owner, .. }
            | Message::RejectTriggerExpiredLimitOrder { owner, .. } => Some(*owner),
            Message::TriggerExpiredLimitOrder { original_placer, .. } => Some(*original_placer),
            Message::L2OrderBook { .. }
            | Message::Trade { .. }
            | Message::CheckLimitOrderExpiration { .. }
            | Message::Bang { .. } => None,
        }
    }

    /// Label grouping every message belonging to one logical lifecycle -
    /// one order's intent/ack/fill/cancel history, one symbol's L2 feed, or
    /// one expiration timer's check/trigger/ack/reject handshake - so a
    /// downstream consumer can reconstruct a stream without re-deriving it
    /// from the message's own fields. The bus stamps this on every
    /// `ScheduledMessage`; it never interprets it itself.
    pub fn stream_id(&self) -> String {
        match self {
            Message::L2OrderBook { symbol, .. } => format!("l2_stream_{symbol}"),
            Message::CheckLimitOrderExpiration { order_id, .. }
            | Message::TriggerExpiredLimitOrder { order_id, .. }
            | Message::AckTriggerExpiredLimitOrder { order_id, .. }
            | Message::RejectTriggerExpiredLimitOrder { order_id, .. } => {
                format!("expire_check_{order_id}")
            }
            Message::MarketOrderExpired { owner, order_id, .. }
            | Message::LimitOrderExpired { owner, order_id, .. } => format!("order_{owner}_{order_id}"),
            Message::Trade {
                maker_order_id,
                taker_order_id,
                ..
            } => format!("trade_{maker_order_id}_{taker_order_id}"),
            Message::Bang { .. } => "bang".to_string(),
            Message::LimitOrder { owner, client_order_id, .. }
            | Message::MarketOrder { owner, client_order_id, .. }
            | Message::PartialCancelLimitOrder { owner, client_order_id, .. }
            | Message::FullCancelLimitOrder { owner, client_order_id, .. }
            | Message::PartialCancelMarketOrder { owner, client_order_id, .. }
            | Message::FullCancelMarketOrder { owner, client_order_id, .. }
            | Message::LimitOrderAck { owner, client_order_id, .. }
            | Message::MarketOrderAck { owner, client_order_id, .. }
            | Message::FullCancelLimitOrderAck { owner, client_order_id, .. }
            | Message::FullCancelMarketOrderAck { owner, client_order_id, .. }
            | Message::PartialCancelLimitAck { owner, client_order_id, .. }
            | Message::PartialCancelMarketAck { owner, client_order_id, .. }
            | Message::PartialCancelLimitOrderReject { owner, client_order_id, .. }
            | Message::FullCancelLimitOrderReject { owner, client_order_id, .. }
            | Message::PartialCancelMarketOrderReject { owner, client_order_id, .. }
            | Message::FullCancelMarketOrderReject { owner, client_order_id, .. }
            | Message::LimitOrderReject { owner, client_order_id, .. }
            | Message::MarketOrderReject { owner, client_order_id, .. }
            | Message::PartialFillLimitOrder { owner, client_order_id, .. }
            | Message::PartialFillMarketOrder { owner, client_order_id, .. }
            | Message::FullFillLimitOrder { owner, client_order_id, .. }
            | Message::FullFillMarketOrder { owner, client_order_id, .. } => {
                format!("order_{owner}_{client_order_id}")
            }
        }
    }

    pub fn timestamp(&self) -> Nanos {
        match self {
            Message::L2OrderBook { timestamp, .. }
            | Message::LimitOrder { timestamp, .. }
            | Message::MarketOrder { timestamp, .. }
            | Message::PartialCancelLimitOrder { timestamp, .. }
            | Message::FullCancelLimitOrder { timestamp, .. }
            | Message::PartialCancelMarketOrder { timestamp, .. }
            | Message::FullCancelMarketOrder { timestamp, .. }
            | Message::LimitOrderAck { timestamp, .. }
            | Message::MarketOrderAck { timestamp, .. }
            | Message::FullCancelLimitOrderAck { timestamp, .. }
            | Message::FullCancelMarketOrderAck { timestamp, .. }
            | Message::PartialCancelLimitAck { timestamp, .. }
            | Message::PartialCancelMarketAck { timestamp, .. }
            | Message::PartialCancelLimitOrderReject { timestamp, .. }
            | Message::FullCancelLimitOrderReject { timestamp, .. }
            | Message::PartialCancelMarketOrderReject { timestamp, .. }
            | Message::FullCancelMarketOrderReject { timestamp, .. }
            | Message::LimitOrderReject { timestamp, .. }
            | Message::MarketOrderReject { timestamp, .. }
            | Message::MarketOrderExpired { timestamp, .. }
            | Message::LimitOrderExpired { timestamp, .. }
            | Message::PartialFillLimitOrder { timestamp, .. }
            | Message::PartialFillMarketOrder { timestamp, .. }
            | Message::FullFillLimitOrder { timestamp, .. }
            | Message::FullFillMarketOrder { timestamp, .. }
            | Message::Trade { timestamp, .. }
            | Message::CheckLimitOrderExpiration { timestamp, .. }
            | Message::TriggerExpiredLimitOrder { timestamp, .. }
            | Message::AckTriggerExpiredLimitOrder { timestamp, .. }
            | Message::RejectTriggerExpiredLimitOrder { timestamp, .. }
            | Message::Bang { timestamp } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_matches_topic_grammar() {
        let msg = Message::Bang { timestamp: 0 };
        assert_eq!(msg.name(), "Bang");
    }

    #[test]
    fn side_opposite_is_involutive() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite().opposite(), Side::Sell);
    }

    #[test]
    fn stream_id_groups_an_orders_whole_lifecycle() {
        let ack = Message::LimitOrderAck {
            timestamp: 0,
            symbol: "BTC/USD".to_string(),
            side: Side::Buy,
            owner: 7,
            client_order_id: 3,
            order_id: 500,
            price: 100_00000000,
            original_qty: 1_00000000,
            resting_qty: 1_00000000,
            timeout: 0,
        };
        let fill = Message::FullFillLimitOrder {
            timestamp: 0,
            symbol: "BTC/USD".to_string(),
            owner: 7,
            client_order_id: 3,
            order_id: 500,
            side: Side::Buy,
            is_maker: true,
            fill_price: 100_00000000,
            cumulative_qty: 1_00000000,
            avg_price: 100_00000000,
        };
        assert_eq!(ack.stream_id(), fill.stream_id());
    }

    #[test]
    fn stream_id_is_distinct_per_category() {
        let l2 = Message::L2OrderBook {
            timestamp: 0,
            symbol: "BTC/USD".to_string(),
            bids: vec![],
            asks: vec![],
        };
        let check = Message::CheckLimitOrderExpiration {
            timestamp: 0,
            order_id: 1,
            timeout: 0,
        };
        assert_eq!(l2.stream_id(), "l2_stream_BTC/USD");
        assert_eq!(check.stream_id(), "expire_check_1");
        assert_eq!(Message::Bang { timestamp: 0 }.stream_id(), "bang");
    }
}
