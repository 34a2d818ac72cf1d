//! Exchange adapter: the boundary between the matching engine and the bus.
//!
//! Three jobs live here, mirrored from how a real exchange gateway is
//! structured: map between a client's own order identifiers and the
//! engine's internal ones, accumulate per-order fill state into
//! cumulative-quantity/average-price figures, and translate engine
//! callbacks (which only ever know a bare engine id) into bus messages
//! (which need to be addressed back to an owning agent).
//!
//! The adapter never calls the engine's callbacks and the bus in the same
//! breath. A book operation first fills `self.outbox` with
//! [`PendingEvent`]s bearing only engine-level facts; once the operation
//! returns, `drain_outbox` walks that list, looks up owner/client-order-id
//! context for each engine id, and publishes the fully addressed
//! `Message`s. This keeps `EngineCallbacks` (engine-facing) and `BusHandle`
//! (bus-facing) from ever needing to be borrowed at the same time.

pub mod fill_state;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::bus::{BusHandle, Processor};
use crate::engine::{EngineCallbacks, IdGenerator, OrderBook};
use crate::fixed_point::{ScaledPrice, ScaledQuantity};
use crate::message::{
    AgentId, ClientOrderId, EngineOrderId, L2Level, Message, OrderKind, RejectReason, Side, Symbol,
};

use fill_state::PartialFillState;

#[derive(Debug, Clone)]
struct OrderRecord {
    owner: AgentId,
    client_order_id: ClientOrderId,
    symbol: Symbol,
    kind: OrderKind,
    side: Side,
}

#[derive(Debug, Clone)]
enum PendingEvent {
    LimitAccepted {
        order_id: EngineOrderId,
        side: Side,
        price: ScaledPrice,
        original_qty: ScaledQuantity,
        resting_qty: ScaledQuantity,
        timeout: i64,
    },
    LimitRejected {
        reason: RejectReason,
    },
    MarketRejected {
        reason: RejectReason,
    },
    MarketResult {
        order_id: EngineOrderId,
        requested_qty: ScaledQuantity,
        executed_qty: ScaledQuantity,
        unfilled_qty: ScaledQuantity,
    },
    PartialFill {
        order_id: EngineOrderId,
        kind: OrderKind,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        fill_qty: ScaledQuantity,
        leaves_qty: ScaledQuantity,
    },
    FullFill {
        order_id: EngineOrderId,
        kind: OrderKind,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        fill_qty: ScaledQuantity,
    },
    Trade {
        price: ScaledPrice,
        qty: ScaledQuantity,
        maker_order_id: EngineOrderId,
        taker_order_id: EngineOrderId,
        maker_side: Side,
    },
    FullCancel {
        order_id: EngineOrderId,
        side: Side,
        cancelled_qty: ScaledQuantity,
    },
    FullCancelRejected {
        reason: RejectReason,
    },
    PartialCancel {
        order_id: EngineOrderId,
        side: Side,
        cancelled_qty: ScaledQuantity,
        remaining_qty: ScaledQuantity,
    },
    PartialCancelRejected {
        reason: RejectReason,
    },
    Expired {
        order_id: EngineOrderId,
        side: Side,
        price: ScaledPrice,
        qty: ScaledQuantity,
    },
    ExpireRejected {
        order_id: EngineOrderId,
        reason: RejectReason,
    },
    L2Snapshot {
        bids: Vec<(ScaledPrice, ScaledQuantity)>,
        asks: Vec<(ScaledPrice, ScaledQuantity)>,
    },
}

impl EngineCallbacks for ExchangeAdapter {
    fn on_limit_accepted(
        &mut self,
        order_id: EngineOrderId,
        side: Side,
        price: ScaledPrice,
        original_qty: ScaledQuantity,
        resting_qty: ScaledQuantity,
        timeout_nanos: i64,
    ) {
        self.outbox.push(PendingEvent::LimitAccepted {
            order_id,
            side,
            price,
            original_qty,
            resting_qty,
            timeout: timeout_nanos,
        });
    }

    fn on_limit_rejected(&mut self, reason: RejectReason) {
        self.outbox.push(PendingEvent::LimitRejected { reason });
    }

    fn on_market_rejected(&mut self, reason: RejectReason) {
        self.outbox.push(PendingEvent::MarketRejected { reason });
    }

    fn on_market_result(
        &mut self,
        order_id: EngineOrderId,
        requested_qty: ScaledQuantity,
        executed_qty: ScaledQuantity,
        unfilled_qty: ScaledQuantity,
    ) {
        self.outbox.push(PendingEvent::MarketResult {
            order_id,
            requested_qty,
            executed_qty,
            unfilled_qty,
        });
    }

    fn on_partial_fill(
        &mut self,
        order_id: EngineOrderId,
        kind: OrderKind,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        fill_qty: ScaledQuantity,
        leaves_qty: ScaledQuantity,
    ) {
        self.outbox.push(PendingEvent::PartialFill {
            order_id,
            kind,
            side,
            is_maker,
            fill_price,
            fill_qty,
            leaves_qty,
        });
    }

    fn on_full_fill(
        &mut self,
        order_id: EngineOrderId,
        kind: OrderKind,
        side: Side,
        is_maker: bool,
        fill_price: ScaledPrice,
        fill_qty: ScaledQuantity,
    ) {
        self.outbox.push(PendingEvent::FullFill {
            order_id,
            kind,
            side,
            is_maker,
            fill_price,
            fill_qty,
        });
    }

    fn on_trade(
        &mut self,
        price: ScaledPrice,
        qty: ScaledQuantity,
        maker_order_id: EngineOrderId,
        taker_order_id: EngineOrderId,
        maker_side: Side,
    ) {
        self.outbox.push(PendingEvent::Trade {
            price,
            qty,
            maker_order_id,
            taker_order_id,
            maker_side,
        });
    }

    fn on_full_cancel(&mut self, order_id: EngineOrderId, side: Side, cancelled_qty: ScaledQuantity) {
        self.outbox.push(PendingEvent::FullCancel {
            order_id,
            side,
            cancelled_qty,
        });
    }

    fn on_full_cancel_rejected(&mut self, reason: RejectReason) {
        self.outbox.push(PendingEvent::FullCancelRejected { reason });
    }

    fn on_partial_cancel(
        &mut self,
        order_id: EngineOrderId,
        side: Side,
        cancelled_qty: ScaledQuantity,
        remaining_qty: ScaledQuantity,
    ) {
        self.outbox.push(PendingEvent::PartialCancel {
            order_id,
            side,
            cancelled_qty,
            remaining_qty,
        });
    }

    fn on_partial_cancel_rejected(&mut self, reason: RejectReason) {
        self.outbox.push(PendingEvent::PartialCancelRejected { reason });
    }

    fn on_expired(&mut self, order_id: EngineOrderId, side: Side, price: ScaledPrice, qty: ScaledQuantity) {
        self.outbox.push(PendingEvent::Expired {
            order_id,
            side,
            price,
            qty,
        });
    }

    fn on_expire_rejected(&mut self, order_id: EngineOrderId, reason: RejectReason) {
        self.outbox.push(PendingEvent::ExpireRejected { order_id, reason });
    }

    fn on_l2_snapshot(&mut self, bids: &[(ScaledPrice, ScaledQuantity)], asks: &[(ScaledPrice, ScaledQuantity)]) {
        self.outbox.push(PendingEvent::L2Snapshot {
            bids: bids.to_vec(),
            asks: asks.to_vec(),
        });
    }
}

/// Translates engine output into bus messages and tracks per-order state.
pub struct ExchangeAdapter {
    books: HashMap<Symbol, OrderBook>,
    ids: IdGenerator,
    by_engine_id: HashMap<EngineOrderId, OrderRecord>,
    by_client: HashMap<(AgentId, ClientOrderId), EngineOrderId>,
    terminated: HashSet<EngineOrderId>,
    fill_states: HashMap<EngineOrderId, PartialFillState>,
    outbox: Vec<PendingEvent>,
    l2_depth: usize,
    /// Owner/client-order-id/symbol for whatever inbound message is
    /// currently being handled; reject events that never get a minted
    /// engine id (bad price, bad quantity) are addressed using this rather
    /// than an `by_engine_id` lookup.
    current: Option<(AgentId, ClientOrderId, Symbol)>,
    /// Symbol a snapshot call is being taken for; decoupled from `current`
    /// because a snapshot has no owner/client-order-id of its own.
    current_symbol: Option<Symbol>,
    /// Last L2 book published per symbol, so a book operation that leaves
    /// the visible top levels unchanged (e.g. a cancel deep in the book,
    /// or a partial cancel that doesn't move a level's aggregate quantity
    /// within the published depth) doesn't re-publish an identical snapshot.
    last_snapshot: HashMap<Symbol, (Vec<L2Level>, Vec<L2Level>)>,
    /// Symbols this adapter instance serves, used to scope its inbound
    /// subscriptions per symbol instead of listening to every trader's
    /// order intents on every symbol through one bare topic.
    served_symbols: Vec<Symbol>,
}

impl ExchangeAdapter {
    pub fn new(l2_depth: usize, served_symbols: Vec<Symbol>) -> Self {
        Self {
            books: HashMap::new(),
            ids: IdGenerator::new(),
            by_engine_id: HashMap::new(),
            by_client: HashMap::new(),
            terminated: HashSet::new(),
            fill_states: HashMap::new(),
            outbox: Vec::new(),
            l2_depth,
            current: None,
            current_symbol: None,
            last_snapshot: HashMap::new(),
            served_symbols,
        }
    }

    /// Pull a symbol's book out of the map so it can be operated on while
    /// `self` is simultaneously borrowed as `&mut dyn EngineCallbacks` -
    /// `HashMap::get_mut` would alias that same `self` borrow, which
    /// borrowck rejects. The book is always put back with `put_book` before
    /// `on_message` returns.
    fn take_book(&mut self, symbol: &str) -> OrderBook {
        self.books
            .remove(symbol)
            .unwrap_or_else(|| OrderBook::new(symbol))
    }

    fn put_book(&mut self, book: OrderBook) {
        self.books.insert(book.symbol().to_string(), book);
    }

    fn register(
        &mut self,
        order_id: EngineOrderId,
        owner: AgentId,
        client_order_id: ClientOrderId,
        symbol: &str,
        kind: OrderKind,
        side: Side,
    ) {
        self.by_engine_id.insert(
            order_id,
            OrderRecord {
                owner,
                client_order_id,
                symbol: symbol.to_string(),
                kind,
                side,
            },
        );
        self.by_client.insert((owner, client_order_id), order_id);
    }

    fn record_of(&self, order_id: EngineOrderId) -> Option<&OrderRecord> {
        self.by_engine_id.get(&order_id)
    }

    fn accumulate_fill(&mut self, order_id: EngineOrderId, price: ScaledPrice, qty: ScaledQuantity) -> PartialFillState {
        let state = self.fill_states.entry(order_id).or_default();
        state.record_fill(price, qty);
        *state
    }

    /// Resting quantity the just-completed `place_limit` call recorded for
    /// `order_id` in its `LimitAccepted` outbox entry, or `0` if there is
    /// none (the order was rejected before ever being accepted).
    fn resting_qty_in_outbox(&self, order_id: EngineOrderId) -> ScaledQuantity {
        self.outbox
            .iter()
            .find_map(|event| match event {
                PendingEvent::LimitAccepted {
                    order_id: id,
                    resting_qty,
                    ..
                } if *id == order_id => Some(*resting_qty),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Re-key every piece of bookkeeping that still refers to `old_id` - the
    /// book's own index and the adapter's owner/client-order-id map and
    /// not-yet-drained outbox entries from the same book call - to `new_id`.
    /// Used once a provisionally transient-id'd limit order is found to rest
    /// and earns a permanent one.
    fn rename_order(&mut self, symbol: &str, old_id: EngineOrderId, new_id: EngineOrderId) {
        let mut book = self.take_book(symbol);
        book.rename_resting(old_id, new_id);
        self.put_book(book);

        if let Some(record) = self.by_engine_id.remove(&old_id) {
            self.by_client.insert((record.owner, record.client_order_id), new_id);
            self.by_engine_id.insert(new_id, record);
        }
        for event in self.outbox.iter_mut() {
            rename_pending_event_id(event, old_id, new_id);
        }
    }

    fn handle_limit_order(
        &mut self,
        bus: &mut dyn BusHandle,
        owner: AgentId,
        client_order_id: ClientOrderId,
        symbol: Symbol,
        side: Side,
        price: ScaledPrice,
        qty: ScaledQuantity,
        timeout: i64,
    ) {
        if self.by_client.contains_key(&(owner, client_order_id)) {
            self.publish(
                bus,
                Message::LimitOrderReject {
                    timestamp: bus.now(),
                    symbol,
                    owner,
                    client_order_id,
                    reason: RejectReason::UnknownClientOrderId,
                },
            );
            return;
        }

        // A limit order's final id can't be decided until `place_limit`
        // reports whether it rests, so it starts out transient like a
        // market order's id and is only promoted to a persistent one once
        // it's known to rest - mirroring the default-then-assign id pattern
        // this adapter's minting is modeled on.
        let provisional_id = self.ids.next_transient();
        self.register(provisional_id, owner, client_order_id, &symbol, OrderKind::Limit, side);
        self.current = Some((owner, client_order_id, symbol.clone()));

        let mut book = self.take_book(&symbol);
        book.place_limit(provisional_id, side, price, qty, timeout, self);
        self.put_book(book);

        self.current = None;

        if self.resting_qty_in_outbox(provisional_id) > 0 {
            let persistent_id = self.ids.next_persistent();
            self.rename_order(&symbol, provisional_id, persistent_id);
        }

        self.drain_outbox(bus);
        self.publish_l2_if_changed(bus, &symbol);
    }

    fn handle_market_order(
        &mut self,
        bus: &mut dyn BusHandle,
        owner: AgentId,
        client_order_id: ClientOrderId,
        symbol: Symbol,
        side: Side,
        qty: ScaledQuantity,
    ) {
        if self.by_client.contains_key(&(owner, client_order_id)) {
            self.publish(
                bus,
                Message::MarketOrderReject {
                    timestamp: bus.now(),
                    symbol,
                    owner,
                    client_order_id,
                    reason: RejectReason::UnknownClientOrderId,
                },
            );
            return;
        }

        let order_id = self.ids.next_transient();
        self.register(order_id, owner, client_order_id, &symbol, OrderKind::Market, side);
        self.current = Some((owner, client_order_id, symbol.clone()));

        let mut book = self.take_book(&symbol);
        book.place_market(order_id, side, qty, self);
        self.put_book(book);

        self.current = None;
        self.drain_outbox(bus);
        self.publish_l2_if_changed(bus, &symbol);
    }

    fn handle_full_cancel_limit(
        &mut self,
        bus: &mut dyn BusHandle,
        owner: AgentId,
        client_order_id: ClientOrderId,
        symbol: Symbol,
    ) {
        let Some(&order_id) = self.by_client.get(&(owner, client_order_id)) else {
            self.publish(
                bus,
                Message::FullCancelLimitOrderReject {
                    timestamp: bus.now(),
                    symbol,
                    owner,
                    client_order_id,
                    reason: RejectReason::UnknownClientOrderId,
                },
            );
            return;
        };
        if self.record_of(order_id).map(|r| r.kind) != Some(OrderKind::Limit) {
            self.publish(
                bus,
                Message::FullCancelLimitOrderReject {
                    timestamp: bus.now(),
                    symbol,
                    owner,
                    client_order_id,
                    reason: RejectReason::WrongOrderKind,
                },
            );
            return;
        }
        if self.terminated.contains(&order_id) {
            self.publish(
                bus,
                Message::FullCancelLimitOrderReject {
                    timestamp: bus.now(),
                    symbol,
                    owner,
                    client_order_id,
                    reason: RejectReason::AlreadyTerminated,
                },
            );
            return;
        }

        self.current = Some((owner, client_order_id, symbol.clone()));
        let mut book = self.take_book(&symbol);
        book.cancel_full(order_id, self);
        self.put_book(book);
        self.current = None;
        self.drain_outbox(bus);
        self.publish_l2_if_changed(bus, &symbol);
    }

    fn handle_partial_cancel_limit(
        &mut self,
        bus: &mut dyn BusHandle,
        owner: AgentId,
        client_order_id: ClientOrderId,
        symbol: Symbol,
        cancel_qty: ScaledQuantity,
    ) {
        let Some(&order_id) = self.by_client.get(&(owner, client_order_id)) else {
            self.publish(
                bus,
                Message::PartialCancelLimitOrderReject {
                    timestamp: bus.now(),
                    symbol,
                    owner,
                    client_order_id,
                    reason: RejectReason::UnknownClientOrderId,
                },
            );
            return;
        };
        if self.record_of(order_id).map(|r| r.kind) != Some(OrderKind::Limit) {
            self.publish(
                bus,
                Message::PartialCancelLimitOrderReject {
                    timestamp: bus.now(),
                    symbol,
                    owner,
                    client_order_id,
                    reason: RejectReason::WrongOrderKind,
                },
            );
            return;
        }
        if self.terminated.contains(&order_id) {
            self.publish(
                bus,
                Message::PartialCancelLimitOrderReject {
                    timestamp: bus.now(),
                    symbol,
                    owner,
                    client_order_id,
                    reason: RejectReason::AlreadyTerminated,
                },
            );
            return;
        }

        self.current = Some((owner, client_order_id, symbol.clone()));
        let mut book = self.take_book(&symbol);
        // A cancel that would reduce the order to zero (or past it) is a
        // full cancel, not a partial one - same as the original system's
        // `new_qty = max(0, current - cancel_qty)` rule.
        match book.remaining_qty(order_id) {
            Some(remaining) if cancel_qty >= remaining => book.cancel_full(order_id, self),
            Some(_) => book.partial_cancel(order_id, cancel_qty, self),
            None => book.partial_cancel(order_id, cancel_qty, self),
        }
        self.put_book(book);
        self.current = None;
        self.drain_outbox(bus);
        self.publish_l2_if_changed(bus, &symbol);
    }

    /// Market orders never rest, so there is never anything to cancel -
    /// both the full and partial variants are unconditionally rejected.
    fn handle_cancel_market(
        &mut self,
        bus: &mut dyn BusHandle,
        owner: AgentId,
        client_order_id: ClientOrderId,
        symbol: Symbol,
        partial: bool,
    ) {
        let reason = if self.by_client.contains_key(&(owner, client_order_id)) {
            RejectReason::MarketOrdersDoNotRest
        } else {
            RejectReason::UnknownClientOrderId
        };
        let message = if partial {
            Message::PartialCancelMarketOrderReject {
                timestamp: bus.now(),
                symbol,
                owner,
                client_order_id,
                reason,
            }
        } else {
            Message::FullCancelMarketOrderReject {
                timestamp: bus.now(),
                symbol,
                owner,
                client_order_id,
                reason,
            }
        };
        self.publish(bus, message);
    }

    fn handle_trigger_expired(
        &mut self,
        bus: &mut dyn BusHandle,
        symbol: Symbol,
        order_id: EngineOrderId,
        original_placer: AgentId,
    ) {
        if self.terminated.contains(&order_id) {
            self.publish(
                bus,
                Message::RejectTriggerExpiredLimitOrder {
                    timestamp: bus.now(),
                    symbol,
                    owner: original_placer,
                    order_id,
                },
            );
            return;
        }
        let Some(record) = self.record_of(order_id).cloned() else {
            self.publish(
                bus,
                Message::RejectTriggerExpiredLimitOrder {
                    timestamp: bus.now(),
                    symbol,
                    owner: original_placer,
                    order_id,
                },
            );
            return;
        };

        self.current = Some((record.owner, record.client_order_id, record.symbol.clone()));
        let mut book = self.take_book(&symbol);
        book.expire(order_id, self);
        self.put_book(book);
        self.current = None;
        self.drain_outbox(bus);
        self.publish_l2_if_changed(bus, &symbol);
    }

    /// Takes a fresh L2 snapshot for `symbol` and publishes it only if the
    /// visible levels differ from the last one published for that symbol.
    fn publish_l2_if_changed(&mut self, bus: &mut dyn BusHandle, symbol: &str) {
        self.current_symbol = Some(symbol.to_string());
        let book = self.take_book(symbol);
        book.snapshot(self.l2_depth, self);
        self.put_book(book);
        self.current_symbol = None;
        self.drain_outbox(bus);
    }

    /// Publishes on the per-trader topic (`<EventName>.<owner_id>`, for
    /// targeted delivery to the agent the message concerns) and always also
    /// on the bare `<EventName>` topic, so a single-subscription listener
    /// (the watchdog, a test harness) can see every instance of an event
    /// without knowing every owner id in advance. Pure market data
    /// (`L2OrderBook`, `Trade`) has no single owner and is instead scoped by
    /// symbol, the dimension traders actually subscribe to it by.
    fn publish(&mut self, bus: &mut dyn BusHandle, message: Message) {
        let topic = message.name();
        if let Some(owner) = message.owner() {
            bus.publish(&format!("{topic}.{owner}"), message.clone());
        } else if let Some(symbol) = message.symbol() {
            bus.publish(&format!("{topic}.{symbol}"), message.clone());
        }
        bus.publish(topic, message);
    }

    fn drain_outbox(&mut self, bus: &mut dyn BusHandle) {
        let events = std::mem::take(&mut self.outbox);
        for event in events {
            self.translate_and_publish(bus, event);
        }
    }

    fn translate_and_publish(&mut self, bus: &mut dyn BusHandle, event: PendingEvent) {
        let now = bus.now();
        match event {
            PendingEvent::LimitAccepted {
                order_id,
                side,
                price,
                original_qty,
                resting_qty,
                timeout,
            } => {
                let Some(record) = self.record_of(order_id).cloned() else {
                    return;
                };
                if resting_qty == 0 {
                    self.terminated.insert(order_id);
                }
                self.publish(
                    bus,
                    Message::LimitOrderAck {
                        timestamp: now,
                        symbol: record.symbol,
                        side,
                        owner: record.owner,
                        client_order_id: record.client_order_id,
                        order_id,
                        price,
                        original_qty,
                        resting_qty,
                        timeout,
                    },
                );
            }
            PendingEvent::LimitRejected { reason } => {
                if let Some((owner, client_order_id, symbol)) = self.current.clone() {
                    self.publish(
                        bus,
                        Message::LimitOrderReject {
                            timestamp: now,
                            symbol,
                            owner,
                            client_order_id,
                            reason,
                        },
                    );
                }
            }
            PendingEvent::MarketRejected { reason } => {
                if let Some((owner, client_order_id, symbol)) = self.current.clone() {
                    self.publish(
                        bus,
                        Message::MarketOrderReject {
                            timestamp: now,
                            symbol,
                            owner,
                            client_order_id,
                            reason,
                        },
                    );
                }
            }
            PendingEvent::MarketResult {
                order_id,
                requested_qty,
                executed_qty,
                unfilled_qty,
            } => {
                self.terminated.insert(order_id);
                let Some(record) = self.record_of(order_id).cloned() else {
                    return;
                };
                self.publish(
                    bus,
                    Message::MarketOrderAck {
                        timestamp: now,
                        symbol: record.symbol,
                        side: record.side,
                        owner: record.owner,
                        client_order_id: record.client_order_id,
                        order_id,
                        requested_qty,
                        executed_qty,
                        unfilled_qty,
                    },
                );
            }
            PendingEvent::PartialFill {
                order_id,
                kind,
                side,
                is_maker,
                fill_price,
                fill_qty,
                leaves_qty,
            } => {
                let Some(record) = self.record_of(order_id).cloned() else {
                    return;
                };
                let state = self.accumulate_fill(order_id, fill_price, fill_qty);
                let message = match kind {
                    OrderKind::Limit => Message::PartialFillLimitOrder {
                        timestamp: now,
                        symbol: record.symbol,
                        owner: record.owner,
                        client_order_id: record.client_order_id,
                        order_id,
                        side,
                        is_maker,
                        fill_price,
                        fill_qty,
                        leaves_qty,
                        cumulative_qty: state.cumulative_qty(),
                        avg_price: state.average_price(),
                    },
                    OrderKind::Market => Message::PartialFillMarketOrder {
                        timestamp: now,
                        symbol: record.symbol,
                        owner: record.owner,
                        client_order_id: record.client_order_id,
                        order_id,
                        side,
                        is_maker,
                        fill_price,
                        fill_qty,
                        leaves_qty,
                        cumulative_qty: state.cumulative_qty(),
                        avg_price: state.average_price(),
                    },
                };
                self.publish(bus, message);
            }
            PendingEvent::FullFill {
                order_id,
                kind,
                side,
                is_maker,
                fill_price,
                fill_qty,
            } => {
                let Some(record) = self.record_of(order_id).cloned() else {
                    return;
                };
                self.terminated.insert(order_id);
                let state = self.accumulate_fill(order_id, fill_price, fill_qty);
                let message = match kind {
                    OrderKind::Limit => Message::FullFillLimitOrder {
                        timestamp: now,
                        symbol: record.symbol,
                        owner: record.owner,
                        client_order_id: record.client_order_id,
                        order_id,
                        side,
                        is_maker,
                        fill_price,
                        cumulative_qty: state.cumulative_qty(),
                        avg_price: state.average_price(),
                    },
                    OrderKind::Market => Message::FullFillMarketOrder {
                        timestamp: now,
                        symbol: record.symbol,
                        owner: record.owner,
                        client_order_id: record.client_order_id,
                        order_id,
                        side,
                        is_maker,
                        fill_price,
                        cumulative_qty: state.cumulative_qty(),
                        avg_price: state.average_price(),
                    },
                };
                self.publish(bus, message);
            }
            PendingEvent::Trade {
                price,
                qty,
                maker_order_id,
                taker_order_id,
                maker_side,
            } => {
                let Some(symbol) = self
                    .record_of(maker_order_id)
                    .map(|r| r.symbol.clone())
                    .or_else(|| self.record_of(taker_order_id).map(|r| r.symbol.clone()))
                else {
                    return;
                };
                self.publish(
                    bus,
                    Message::Trade {
                        timestamp: now,
                        symbol,
                        price,
                        qty,
                        maker_order_id,
                        taker_order_id,
                        maker_side,
                    },
                );
            }
            PendingEvent::FullCancel {
                order_id,
                side,
                cancelled_qty,
            } => {
                self.terminated.insert(order_id);
                let Some(record) = self.record_of(order_id).cloned() else {
                    return;
                };
                self.publish(
                    bus,
                    Message::FullCancelLimitOrderAck {
                        timestamp: now,
                        symbol: record.symbol,
                        owner: record.owner,
                        client_order_id: record.client_order_id,
                        order_id,
                        side,
                        cancelled_qty,
                    },
                );
            }
            PendingEvent::FullCancelRejected { reason } => {
                if let Some((owner, client_order_id, symbol)) = self.current.clone() {
                    self.publish(
                        bus,
                        Message::FullCancelLimitOrderReject {
                            timestamp: now,
                            symbol,
                            owner,
                            client_order_id,
                            reason,
                        },
                    );
                }
            }
            PendingEvent::PartialCancel {
                order_id,
                side,
                cancelled_qty,
                remaining_qty,
            } => {
                let Some(record) = self.record_of(order_id).cloned() else {
                    return;
                };
                self.publish(
                    bus,
                    Message::PartialCancelLimitAck {
                        timestamp: now,
                        symbol: record.symbol,
                        owner: record.owner,
                        client_order_id: record.client_order_id,
                        order_id,
                        side,
                        cancelled_qty,
                        remaining_qty,
                    },
                );
            }
            PendingEvent::PartialCancelRejected { reason } => {
                if let Some((owner, client_order_id, symbol)) = self.current.clone() {
                    self.publish(
                        bus,
                        Message::PartialCancelLimitOrderReject {
                            timestamp: now,
                            symbol,
                            owner,
                            client_order_id,
                            reason,
                        },
                    );
                }
            }
            PendingEvent::Expired {
                order_id,
                side,
                price: _,
                qty,
            } => {
                self.terminated.insert(order_id);
                let Some(record) = self.record_of(order_id).cloned() else {
                    return;
                };
                self.publish(
                    bus,
                    Message::AckTriggerExpiredLimitOrder {
                        timestamp: now,
                        symbol: record.symbol,
                        owner: record.owner,
                        order_id,
                        side,
                        cancelled_qty: qty,
                    },
                );
            }
            PendingEvent::ExpireRejected { order_id, .. } => {
                if let Some((owner, _client_order_id, symbol)) = self.current.clone() {
                    self.publish(
                        bus,
                        Message::RejectTriggerExpiredLimitOrder {
                            timestamp: now,
                            symbol,
                            owner,
                            order_id,
                        },
                    );
                }
            }
            PendingEvent::L2Snapshot { bids, asks } => {
                let Some(symbol) = self.current_symbol.clone() else {
                    return;
                };
                let unchanged = self
                    .last_snapshot
                    .get(&symbol)
                    .is_some_and(|(b, a)| *b == bids && *a == asks);
                if unchanged {
                    return;
                }
                self.last_snapshot.insert(symbol.clone(), (bids.clone(), asks.clone()));
                self.publish(
                    bus,
                    Message::L2OrderBook {
                        timestamp: now,
                        symbol,
                        bids,
                        asks,
                    },
                );
            }
        }
    }
}

/// Re-point whichever order-id field(s) `event` carries from `old_id` to
/// `new_id`, leaving every other field untouched. `Trade` carries two ids
/// and only the one that matches is renamed; every other variant carries at
/// most one.
fn rename_pending_event_id(event: &mut PendingEvent, old_id: EngineOrderId, new_id: EngineOrderId) {
    let slot = match event {
        PendingEvent::LimitAccepted { order_id, .. }
        | PendingEvent::MarketResult { order_id, .. }
        | PendingEvent::PartialFill { order_id, .. }
        | PendingEvent::FullFill { order_id, .. }
        | PendingEvent::FullCancel { order_id, .. }
        | PendingEvent::PartialCancel { order_id, .. }
        | PendingEvent::Expired { order_id, .. }
        | PendingEvent::ExpireRejected { order_id, .. } => Some(order_id),
        PendingEvent::Trade {
            maker_order_id,
            taker_order_id,
            ..
        } => {
            if *maker_order_id == old_id {
                *maker_order_id = new_id;
            }
            if *taker_order_id == old_id {
                *taker_order_id = new_id;
            }
            None
        }
        PendingEvent::LimitRejected { .. }
        | PendingEvent::MarketRejected { .. }
        | PendingEvent::FullCancelRejected { .. }
        | PendingEvent::PartialCancelRejected { .. }
        | PendingEvent::L2Snapshot { .. } => None,
    };
    if let Some(slot) = slot {
        if *slot == old_id {
            *slot = new_id;
        }
    }
}

impl Processor for ExchangeAdapter {
    fn setup_subscriptions(&self, bus: &mut dyn BusHandle, self_id: AgentId) {
        const PER_SYMBOL_EVENTS: [&str; 7] = [
            "LimitOrderEvent",
            "MarketOrderEvent",
            "PartialCancelLimitOrderEvent",
            "FullCancelLimitOrderEvent",
            "PartialCancelMarketOrderEvent",
            "FullCancelMarketOrderEvent",
            "TriggerExpiredLimitOrderEvent",
        ];
        for symbol in &self.served_symbols {
            for event in PER_SYMBOL_EVENTS {
                bus.subscribe(self_id, &format!("{event}.{symbol}"));
            }
        }
        // Bang has no symbol of its own - it flushes every book this
        // instance holds at once - so it stays on the bare, global topic.
        bus.subscribe(self_id, "Bang");
    }

    fn on_message(
        &mut self,
        bus: &mut dyn BusHandle,
        _self_id: AgentId,
        _topic: &str,
        _publisher_id: AgentId,
        _stream_id: &str,
        _sequence_number: u64,
        message: &Message,
    ) {
        match message.clone() {
            Message::LimitOrder {
                symbol,
                side,
                owner,
                client_order_id,
                price,
                qty,
                timeout,
                ..
            } => self.handle_limit_order(bus, owner, client_order_id, symbol, side, price, qty, timeout),
            Message::MarketOrder {
                symbol,
                side,
                owner,
                client_order_id,
                qty,
                ..
            } => self.handle_market_order(bus, owner, client_order_id, symbol, side, qty),
            Message::FullCancelLimitOrder {
                symbol,
                owner,
                client_order_id,
                ..
            } => self.handle_full_cancel_limit(bus, owner, client_order_id, symbol),
            Message::PartialCancelLimitOrder {
                symbol,
                owner,
                client_order_id,
                cancel_qty,
                ..
            } => self.handle_partial_cancel_limit(bus, owner, client_order_id, symbol, cancel_qty),
            Message::FullCancelMarketOrder {
                symbol,
                owner,
                client_order_id,
                ..
            } => self.handle_cancel_market(bus, owner, client_order_id, symbol, false),
            Message::PartialCancelMarketOrder {
                symbol,
                owner,
                client_order_id,
                ..
            } => self.handle_cancel_market(bus, owner, client_order_id, symbol, true),
            Message::TriggerExpiredLimitOrder {
                symbol,
                order_id,
                original_placer,
                ..
            } => self.handle_trigger_expired(bus, symbol, order_id, original_placer),
            Message::Bang { .. } => {
                let symbols: Vec<Symbol> = self.books.keys().cloned().collect();
                for book in self.books.values_mut() {
                    book.flush();
                }
                debug!("adapter flushed all books on Bang");
                for symbol in symbols {
                    self.publish_l2_if_changed(bus, &symbol);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every message delivered to it. Subscribed to whatever topics
    /// the test wires up via `bus.subscribe`.
    struct Recorder {
        received: Rc<RefCell<Vec<Message>>>,
    }

    impl Processor for Recorder {
        fn setup_subscriptions(&self, _bus: &mut dyn BusHandle, _self_id: AgentId) {}

        fn on_message(
            &mut self,
            _bus: &mut dyn BusHandle,
            _self_id: AgentId,
            _topic: &str,
            _publisher_id: AgentId,
            _stream_id: &str,
            _sequence_number: u64,
            message: &Message,
        ) {
            self.received.borrow_mut().push(message.clone());
        }
    }

    /// Stands in for a trader agent that only ever sends, never a real
    /// registered `Processor` - `publish_as` just needs *an* id to attribute
    /// the send to.
    const TRADER: AgentId = 9_000;

    fn new_bus_with_adapter() -> (EventBus, AgentId) {
        let mut bus = EventBus::new(7);
        let adapter_id = bus.register_entity(Box::new(ExchangeAdapter::new(10, vec!["BTC/USD".to_string()])));
        (bus, adapter_id)
    }

    fn recorder_on(bus: &mut EventBus, topic: &str) -> Rc<RefCell<Vec<Message>>> {
        let received = Rc::new(RefCell::new(Vec::new()));
        let recorder_id = bus.register_entity(Box::new(Recorder {
            received: received.clone(),
        }));
        bus.subscribe(recorder_id, topic);
        received
    }

    #[test]
    fn limit_order_ack_is_delivered_on_the_owner_scoped_topic() {
        let (mut bus, _adapter_id) = new_bus_with_adapter();
        let received = recorder_on(&mut bus, "LimitOrderAckEvent.42");

        bus.publish_as(
            TRADER,
            "LimitOrderEvent.BTC/USD",
            Message::LimitOrder {
                timestamp: 0,
                symbol: "BTC/USD".to_string(),
                side: Side::Buy,
                owner: 42,
                client_order_id: 1,
                price: 100_00000000,
                qty: 5_00000000,
                timeout: 5_000_000_000,
            },
        );
        bus.run_to_completion(100);

        let delivered = received.borrow();
        assert_eq!(delivered.len(), 1);
        assert!(matches!(delivered[0], Message::LimitOrderAck { owner: 42, .. }));
    }

    #[test]
    fn bare_topic_also_receives_every_ack_regardless_of_owner() {
        let (mut bus, _adapter_id) = new_bus_with_adapter();
        let received = recorder_on(&mut bus, "LimitOrderAckEvent");

        for (owner, cid) in [(1u64, 1u64), (2u64, 1u64)] {
            bus.publish_as(
                TRADER,
                "LimitOrderEvent.BTC/USD",
                Message::LimitOrder {
                    timestamp: 0,
                    symbol: "BTC/USD".to_string(),
                    side: Side::Buy,
                    owner,
                    client_order_id: cid,
                    price: 100_00000000,
                    qty: 5_00000000,
                    timeout: 5_000_000_000,
                },
            );
            bus.run_to_completion(100);
        }

        assert_eq!(received.borrow().len(), 2, "bare topic sees both owners' acks");
    }

    #[test]
    fn partial_cancel_reducing_to_zero_is_routed_to_full_cancel() {
        let (mut bus, _adapter_id) = new_bus_with_adapter();
        let full_ack = recorder_on(&mut bus, "FullCancelLimitOrderAckEvent");
        let partial_ack = recorder_on(&mut bus, "PartialCancelLimitAckEvent");

        bus.publish_as(
            TRADER,
            "LimitOrderEvent.BTC/USD",
            Message::LimitOrder {
                timestamp: 0,
                symbol: "BTC/USD".to_string(),
                side: Side::Sell,
                owner: 7,
                client_order_id: 1,
                price: 101_00000000,
                qty: 5_00000000,
                timeout: 5_000_000_000,
            },
        );
        bus.run_to_completion(100);

        bus.publish_as(
            TRADER,
            "PartialCancelLimitOrderEvent.BTC/USD",
            Message::PartialCancelLimitOrder {
                timestamp: bus.get_current_time(),
                symbol: "BTC/USD".to_string(),
                owner: 7,
                client_order_id: 1,
                cancel_qty: 5_00000000,
            },
        );
        bus.run_to_completion(100);

        assert_eq!(full_ack.borrow().len(), 1, "cancel_qty == remaining must produce a full cancel ack");
        assert!(partial_ack.borrow().is_empty(), "must not also produce a partial-cancel ack");
    }

    #[test]
    fn l2_snapshot_is_only_republished_when_the_visible_book_changes() {
        let (mut bus, _adapter_id) = new_bus_with_adapter();
        let received = recorder_on(&mut bus, "LTwoOrderBookEvent.BTC/USD");

        bus.publish_as(
            TRADER,
            "LimitOrderEvent.BTC/USD",
            Message::LimitOrder {
                timestamp: 0,
                symbol: "BTC/USD".to_string(),
                side: Side::Buy,
                owner: 1,
                client_order_id: 1,
                price: 99_00000000,
                qty: 1_00000000,
                timeout: 5_000_000_000,
            },
        );
        bus.run_to_completion(100);
        assert_eq!(received.borrow().len(), 1);

        // The only resting order is within the published depth, so
        // cancelling it changes the visible book and must republish.
        bus.publish_as(
            TRADER,
            "FullCancelLimitOrderEvent.BTC/USD",
            Message::FullCancelLimitOrder {
                timestamp: bus.get_current_time(),
                symbol: "BTC/USD".to_string(),
                owner: 1,
                client_order_id: 1,
            },
        );
        bus.run_to_completion(100);
        assert_eq!(received.borrow().len(), 2);
    }

    #[test]
    fn unknown_client_order_id_on_cancel_is_rejected_not_panicked() {
        let (mut bus, _adapter_id) = new_bus_with_adapter();
        let received = recorder_on(&mut bus, "FullCancelLimitOrderRejectEvent");

        bus.publish_as(
            TRADER,
            "FullCancelLimitOrderEvent.BTC/USD",
            Message::FullCancelLimitOrder {
                timestamp: 0,
                symbol: "BTC/USD".to_string(),
                owner: 99,
                client_order_id: 1,
            },
        );
        bus.run_to_completion(100);

        let delivered = received.borrow();
        assert_eq!(delivered.len(), 1);
        assert!(matches!(
            delivered[0],
            Message::FullCancelLimitOrderReject {
                reason: RejectReason::UnknownClientOrderId,
                ..
            }
        ));
    }
}
