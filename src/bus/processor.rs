//! The agent-facing trait boundary.
//!
//! Every participant in the simulation - the matching engine adapter, the
//! expiration watchdog, a strategy, the harness's market-data seeder -
//! implements `Processor` and is driven exclusively by the bus calling
//! `on_message`. Nothing holds a pointer back to the bus; an agent that
//! needs to publish does so through the `&mut dyn BusHandle` it is handed,
//! which keeps ownership one-directional (bus owns agents, agents borrow the
//! bus only for the duration of one callback) instead of the reference-cycle
//! shape a C++ port of this system would reach for.

use crate::clock::Nanos;
use crate::message::{AgentId, Message};

/// What an agent can do to the bus from inside a callback. A trait object
/// rather than a concrete `&mut EventBus` so `bus::mod` can intercept every
/// publish (for latency injection and pre-publish hooks) without agents
/// needing to know that happens.
pub trait BusHandle {
    fn publish(&mut self, topic: &str, message: Message);
    fn schedule_for_self_at(&mut self, at: Nanos, topic: &str, message: Message);
    fn subscribe(&mut self, agent: AgentId, topic: &str);
    fn unsubscribe(&mut self, agent: AgentId, topic: &str);
    fn now(&self) -> Nanos;
}

/// One participant in the simulation.
pub trait Processor {
    /// Topics this agent should be subscribed to as soon as it is
    /// registered. Called once, immediately after registration.
    fn setup_subscriptions(&self, bus: &mut dyn BusHandle, self_id: AgentId);

    /// Handle one delivered message. `self_id` is passed so an agent can
    /// distinguish `schedule_for_self_at` deliveries (addressed to itself)
    /// from ordinary topic fan-out without keeping its own id cached
    /// somewhere that could drift from what the bus assigned. `topic` and
    /// `publisher_id` identify where the delivery came from, `stream_id`
    /// groups it with the rest of its logical lifecycle (see
    /// `Message::stream_id`), and `sequence_number` is the queue's
    /// insertion-order tiebreaker for this delivery.
    #[allow(clippy::too_many_arguments)]
    fn on_message(
        &mut self,
        bus: &mut dyn BusHandle,
        self_id: AgentId,
        topic: &str,
        publisher_id: AgentId,
        stream_id: &str,
        sequence_number: u64,
        message: &Message,
    );
}

/// A side-effect-observing hook invoked once per publish, before fan-out to
/// subscribers. Used for recording/metrics taps that must see every message
/// exactly once regardless of how many subscribers a topic ends up with.
pub trait PrePublishHook {
    fn on_publish(&mut self, topic: &str, message: &Message, publisher_id: AgentId, publish_time: Nanos);
}
