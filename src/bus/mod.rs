//! The deterministic, latency-injecting, topic-based event bus.
//!
//! `EventBus` owns every registered agent and the priority queue of
//! in-flight deliveries. Nothing outside this module ever calls an agent's
//! `on_message` directly - the bus is the sole scheduler, and `step()` is
//! the only way simulated time moves forward.

pub mod latency;
pub mod processor;
pub mod queue;
pub mod topic;

use std::collections::HashMap;

use crate::clock::{Nanos, VirtualClock};
use crate::message::{AgentId, Message, INVALID_AGENT_ID};

pub use latency::{LatencyParameters, LatencySampler};
pub use processor::{BusHandle, PrePublishHook, Processor};
pub use queue::{EventQueue, ScheduledMessage};
pub use topic::TopicRegistry;

type HookId = u32;

pub struct EventBus {
    clock: VirtualClock,
    queue: EventQueue,
    topics: TopicRegistry,
    agents: HashMap<AgentId, Box<dyn Processor>>,
    next_agent_id: AgentId,
    /// The agent currently executing inside `step()`, used as the publisher
    /// half of a latency lookup and as the recipient of
    /// `schedule_for_self_at`. `INVALID_AGENT_ID` outside of a callback.
    current_agent: AgentId,
    latency_table: HashMap<(AgentId, AgentId), LatencyParameters>,
    default_latency: LatencyParameters,
    sampler: LatencySampler,
    hooks: HashMap<HookId, Box<dyn PrePublishHook>>,
    next_hook_id: HookId,
}

impl EventBus {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: VirtualClock::default(),
            queue: EventQueue::new(),
            topics: TopicRegistry::new(),
            agents: HashMap::new(),
            next_agent_id: INVALID_AGENT_ID + 1,
            current_agent: INVALID_AGENT_ID,
            latency_table: HashMap::new(),
            default_latency: LatencyParameters::fixed(0),
            sampler: LatencySampler::new(seed),
            hooks: HashMap::new(),
            next_hook_id: 0,
        }
    }

    pub fn with_default_latency(mut self, default_latency: LatencyParameters) -> Self {
        self.default_latency = default_latency;
        self
    }

    /// Register a new agent, immediately calling its `setup_subscriptions`.
    pub fn register_entity(&mut self, mut processor: Box<dyn Processor>) -> AgentId {
        let id = self.next_agent_id;
        self.next_agent_id += 1;

        self.current_agent = id;
        processor.setup_subscriptions(self, id);
        self.current_agent = INVALID_AGENT_ID;

        self.agents.insert(id, processor);
        id
    }

    /// Remove an agent, every subscription it held, and every message
    /// already queued for delivery to it - a deregistered agent should
    /// behave as if it never existed, not linger as a silent drop the next
    /// time the queue happens to pop one of its stale deliveries.
    pub fn deregister_entity(&mut self, agent: AgentId) {
        self.agents.remove(&agent);
        self.topics.unsubscribe_all(agent);
        self.latency_table
            .retain(|&(pub_id, sub_id), _| pub_id != agent && sub_id != agent);
        self.queue.purge_recipient(agent);
    }

    pub fn set_inter_agent_latency(
        &mut self,
        publisher: AgentId,
        subscriber: AgentId,
        params: LatencyParameters,
    ) {
        self.latency_table.insert((publisher, subscriber), params);
    }

    pub fn register_pre_publish_hook(&mut self, hook: Box<dyn PrePublishHook>) -> HookId {
        let id = self.next_hook_id;
        self.next_hook_id += 1;
        self.hooks.insert(id, hook);
        id
    }

    pub fn deregister_pre_publish_hook(&mut self, id: HookId) {
        self.hooks.remove(&id);
    }

    pub fn get_current_time(&self) -> Nanos {
        self.clock.now()
    }

    pub fn get_event_queue_size(&self) -> usize {
        self.queue.len()
    }

    pub fn peek(&self) -> Option<&ScheduledMessage> {
        self.queue.peek()
    }

    /// Pop and deliver the single earliest-scheduled message. Returns
    /// `false` once the queue is empty, which is how callers know a
    /// simulation has run to completion.
    pub fn step(&mut self) -> bool {
        let Some(scheduled) = self.queue.pop() else {
            return false;
        };
        self.clock.advance_to(scheduled.scheduled_time);

        let recipient = scheduled.recipient;
        if let Some(mut agent) = self.agents.remove(&recipient) {
            let topic = self.topics.name_of(scheduled.topic_id).to_string();
            self.current_agent = recipient;
            agent.on_message(
                self,
                recipient,
                &topic,
                scheduled.publisher_id,
                &scheduled.stream_id,
                scheduled.sequence_number,
                &scheduled.message,
            );
            self.current_agent = INVALID_AGENT_ID;
            self.agents.insert(recipient, agent);
        } else {
            tracing::debug!(recipient, "dropping message for deregistered agent");
        }
        true
    }

    /// Run `step()` until the queue drains or `max_steps` is exhausted.
    /// Returns the number of steps actually taken.
    pub fn run_to_completion(&mut self, max_steps: u64) -> u64 {
        let mut taken = 0;
        while taken < max_steps && self.step() {
            taken += 1;
        }
        taken
    }

    fn latency_for(&self, publisher: AgentId, subscriber: AgentId) -> &LatencyParameters {
        self.latency_table
            .get(&(publisher, subscriber))
            .unwrap_or(&self.default_latency)
    }

    fn publish_impl(&mut self, topic: &str, message: Message) {
        let publisher = self.current_agent;
        let now = self.clock.now();

        for (_, hook) in self.hooks.iter_mut() {
            hook.on_publish(topic, &message, publisher, now);
        }

        let topic_id = self.topics.intern(topic);
        let subscribers: Vec<AgentId> = self.topics.subscribers_of(topic).collect();
        let stream_id = message.stream_id();
        for subscriber in subscribers {
            let delay = self
                .sampler
                .sample(self.latency_for(publisher, subscriber));
            self.queue.push(
                now + delay,
                publisher,
                subscriber,
                topic_id,
                stream_id.clone(),
                message.clone(),
            );
        }
    }

    fn schedule_for_self_at_impl(&mut self, at: Nanos, topic: &str, message: Message) {
        let at = at.max(self.clock.now());
        let topic_id = self.topics.intern(topic);
        let stream_id = message.stream_id();
        let self_id = self.current_agent;
        self.queue.push(at, self_id, self_id, topic_id, stream_id, message);
    }

    /// Publish as if `agent` were the currently-executing callback, for
    /// callers outside of `step()` - namely the harness seeding an initial
    /// market-data snapshot from the environment agent's identity before any
    /// `step()` has run.
    pub fn publish_as(&mut self, agent: AgentId, topic: &str, message: Message) {
        let previous = self.current_agent;
        self.current_agent = agent;
        self.publish_impl(topic, message);
        self.current_agent = previous;
    }
}

impl BusHandle for EventBus {
    fn publish(&mut self, topic: &str, message: Message) {
        self.publish_impl(topic, message);
    }

    fn schedule_for_self_at(&mut self, at: Nanos, topic: &str, message: Message) {
        self.schedule_for_self_at_impl(at, topic, message);
    }

    fn subscribe(&mut self, agent: AgentId, topic: &str) {
        self.topics.subscribe(topic, agent);
    }

    fn unsubscribe(&mut self, agent: AgentId, topic: &str) {
        self.topics.unsubscribe(topic, agent);
    }

    fn now(&self) -> Nanos {
        self.clock.now()
    }
}
