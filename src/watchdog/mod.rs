//! Expiration watchdog: drives the timeout handshake for resting limit orders.
//!
//! Grounded on `CancelFairyApp` in the teacher's latency-sim ancestor: a
//! timer is scheduled the moment an order starts resting, and firing that
//! timer only ever *asks* the adapter to cancel - it never removes the book
//! entry itself. The tracking entry is kept across the check/trigger round
//! trip and erased only once the trigger's outcome (ack or reject) or some
//! other terminal event for the order is known. This is deliberate: the
//! check and the trigger's answer can straddle an intervening fill, and
//! erasing eagerly on the check would let a second, stale check for the same
//! order re-trigger after the order is already gone.

use std::collections::HashMap;

use crate::bus::{BusHandle, Processor};
use crate::clock::Nanos;
use crate::message::{AgentId, EngineOrderId, Message, Symbol};

#[derive(Debug, Clone)]
struct Tracked {
    symbol: Symbol,
    placer: AgentId,
    lifetime: Nanos,
}

/// Tracks every resting limit order's time-of-life and asks the adapter to
/// expire it once that lifetime elapses.
pub struct ExpirationWatchdog {
    tracked: HashMap<EngineOrderId, Tracked>,
}

impl ExpirationWatchdog {
    pub fn new() -> Self {
        Self {
            tracked: HashMap::new(),
        }
    }

    fn untrack(&mut self, order_id: EngineOrderId) {
        self.tracked.remove(&order_id);
    }
}

impl Default for ExpirationWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for ExpirationWatchdog {
    fn setup_subscriptions(&self, bus: &mut dyn BusHandle, self_id: AgentId) {
        for topic in [
            "LimitOrderAckEvent",
            "FullFillLimitOrderEvent",
            "FullCancelLimitOrderAckEvent",
            "LimitOrderExpiredEvent",
            "AckTriggerExpiredLimitOrderEvent",
            "RejectTriggerExpiredLimitOrderEvent",
            "Bang",
        ] {
            bus.subscribe(self_id, topic);
        }
        let _ = self_id;
    }

    fn on_message(
        &mut self,
        bus: &mut dyn BusHandle,
        self_id: AgentId,
        _topic: &str,
        _publisher_id: AgentId,
        _stream_id: &str,
        _sequence_number: u64,
        message: &Message,
    ) {
        match message {
            // A new resting order: start its clock. A fully-filled-on-arrival
            // limit order never reaches here as a *resting* order in the
            // first place - `resting_qty == 0` still produces this ack, but
            // `self.tracked.insert` below simply tracks a ghost entry that is
            // immediately untracked by the matching full-fill event that
            // fires in the very same `step()`, so no timer ever fires for it.
            Message::LimitOrderAck {
                symbol,
                owner,
                order_id,
                timeout,
                ..
            } => {
                self.tracked.insert(
                    *order_id,
                    Tracked {
                        symbol: symbol.clone(),
                        placer: *owner,
                        lifetime: *timeout,
                    },
                );
                bus.schedule_for_self_at(
                    bus.now() + *timeout,
                    &format!("CheckLimitOrderExpirationEvent.{self_id}"),
                    Message::CheckLimitOrderExpiration {
                        timestamp: bus.now(),
                        order_id: *order_id,
                        timeout: *timeout,
                    },
                );
            }

            // The timer fired. If the order is still tracked, ask the
            // adapter to expire it - but keep tracking it until the trigger
            // comes back one way or the other, since the order is not yet
            // known to be gone.
            Message::CheckLimitOrderExpiration { order_id, timeout, .. } => {
                let Some(entry) = self.tracked.get(order_id) else {
                    return;
                };
                let trigger = Message::TriggerExpiredLimitOrder {
                    timestamp: bus.now(),
                    symbol: entry.symbol.clone(),
                    order_id: *order_id,
                    timeout: *timeout,
                    original_placer: entry.placer,
                };
                // Published on both the bare topic (what the adapter
                // subscribes to, since one adapter instance serves every
                // symbol) and the symbol-scoped one, for any per-symbol
                // observer.
                bus.publish(
                    &format!("TriggerExpiredLimitOrderEvent.{}", entry.symbol),
                    trigger.clone(),
                );
                bus.publish("TriggerExpiredLimitOrderEvent", trigger);
            }

            // Terminal for the order one way or another: stop tracking it.
            Message::FullFillLimitOrder { order_id, .. }
            | Message::FullCancelLimitOrderAck { order_id, .. }
            | Message::LimitOrderExpired { order_id, .. }
            | Message::AckTriggerExpiredLimitOrder { order_id, .. }
            | Message::RejectTriggerExpiredLimitOrder { order_id, .. } => {
                self.untrack(*order_id);
            }

            Message::Bang { .. } => {
                self.tracked.clear();
            }

            _ => {}
        }
    }
}
