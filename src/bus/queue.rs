//! Deterministic priority queue of scheduled deliveries.
//!
//! Ordered by `(scheduled_time, sequence_number)` so that messages scheduled
//! for the same instant are delivered in the order they were enqueued, never
//! in whatever order a `BinaryHeap` would otherwise break the tie - this is
//! what makes two runs with the same seed produce byte-identical event
//! traces.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::topic::TopicId;
use crate::clock::Nanos;
use crate::message::{AgentId, Message};

/// One message in flight between a publish and its delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledMessage {
    pub scheduled_time: Nanos,
    pub sequence_number: u64,
    pub publisher_id: AgentId,
    pub recipient: AgentId,
    pub topic_id: TopicId,
    pub stream_id: String,
    pub message: Message,
}

impl Eq for ScheduledMessage {}

/// Reverse order: `BinaryHeap` is a max-heap, and we want the earliest
/// `(time, sequence_number)` pair popped first.
impl Ord for ScheduledMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_time
            .cmp(&self.scheduled_time)
            .then_with(|| other.sequence_number.cmp(&self.sequence_number))
    }
}

impl PartialOrd for ScheduledMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Thin wrapper over `BinaryHeap<ScheduledMessage>` that also hands out
/// monotonically increasing sequence numbers, so callers never construct a
/// `ScheduledMessage` with a racy or duplicate sequence number.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledMessage>,
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        scheduled_time: Nanos,
        publisher_id: AgentId,
        recipient: AgentId,
        topic_id: TopicId,
        stream_id: String,
        message: Message,
    ) -> u64 {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledMessage {
            scheduled_time,
            sequence_number,
            publisher_id,
            recipient,
            topic_id,
            stream_id,
            message,
        });
        sequence_number
    }

    pub fn pop(&mut self) -> Option<ScheduledMessage> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&ScheduledMessage> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every scheduled delivery addressed to `recipient`. Used when an
    /// agent deregisters so messages already in flight to it don't linger in
    /// the queue until popped and silently dropped at delivery time.
    pub fn purge_recipient(&mut self, recipient: AgentId) {
        self.heap.retain(|scheduled| scheduled.recipient != recipient);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn bang(t: Nanos) -> Message {
        Message::Bang { timestamp: t }
    }

    #[test]
    fn pops_in_time_order() {
        let mut q = EventQueue::new();
        q.push(300, 0, 1, 0, "s".to_string(), bang(300));
        q.push(100, 0, 1, 0, "s".to_string(), bang(100));
        q.push(200, 0, 1, 0, "s".to_string(), bang(200));

        assert_eq!(q.pop().unwrap().scheduled_time, 100);
        assert_eq!(q.pop().unwrap().scheduled_time, 200);
        assert_eq!(q.pop().unwrap().scheduled_time, 300);
        assert!(q.pop().is_none());
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut q = EventQueue::new();
        q.push(100, 0, 1, 0, "s".to_string(), bang(100));
        q.push(100, 0, 2, 0, "s".to_string(), bang(100));
        q.push(100, 0, 3, 0, "s".to_string(), bang(100));

        assert_eq!(q.pop().unwrap().recipient, 1);
        assert_eq!(q.pop().unwrap().recipient, 2);
        assert_eq!(q.pop().unwrap().recipient, 3);
    }

    #[test]
    fn purge_recipient_drops_only_that_recipients_messages() {
        let mut q = EventQueue::new();
        q.push(100, 0, 1, 0, "s".to_string(), bang(100));
        q.push(100, 0, 2, 0, "s".to_string(), bang(100));
        q.push(200, 0, 1, 0, "s".to_string(), bang(200));

        q.purge_recipient(1);

        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().unwrap().recipient, 2);
    }
}
