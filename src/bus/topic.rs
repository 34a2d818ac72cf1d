//! Topic registry and subscription bookkeeping.
//!
//! A topic is just a string (`"LimitOrderEvent"`, `"LimitOrderEvent.AAPL"`,
//! ...); the registry exists so the hot path - looking up subscribers for a
//! publish - works against small integer ids instead of hashing a string on
//! every message.

use std::collections::{HashMap, HashSet};

use crate::message::AgentId;

pub type TopicId = u32;

#[derive(Debug, Default)]
pub struct TopicRegistry {
    ids_by_name: HashMap<String, TopicId>,
    names_by_id: Vec<String>,
    subscribers: Vec<HashSet<AgentId>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the id for `topic`.
    pub fn intern(&mut self, topic: &str) -> TopicId {
        if let Some(&id) = self.ids_by_name.get(topic) {
            return id;
        }
        let id = self.names_by_id.len() as TopicId;
        self.ids_by_name.insert(topic.to_string(), id);
        self.names_by_id.push(topic.to_string());
        self.subscribers.push(HashSet::new());
        id
    }

    /// Look up the id for `topic` without creating it.
    pub fn lookup(&self, topic: &str) -> Option<TopicId> {
        self.ids_by_name.get(topic).copied()
    }

    pub fn name_of(&self, id: TopicId) -> &str {
        &self.names_by_id[id as usize]
    }

    pub fn subscribe(&mut self, topic: &str, agent: AgentId) {
        let id = self.intern(topic);
        self.subscribers[id as usize].insert(agent);
    }

    pub fn unsubscribe(&mut self, topic: &str, agent: AgentId) {
        if let Some(id) = self.lookup(topic) {
            self.subscribers[id as usize].remove(&agent);
        }
    }

    /// Remove `agent` from every topic it is subscribed to, used when an
    /// agent deregisters from the bus entirely.
    pub fn unsubscribe_all(&mut self, agent: AgentId) {
        for set in &mut self.subscribers {
            set.remove(&agent);
        }
    }

    pub fn subscribers_of(&self, topic: &str) -> impl Iterator<Item = AgentId> + '_ {
        self.lookup(topic)
            .into_iter()
            .flat_map(move |id| self.subscribers[id as usize].iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_see_only_their_topic() {
        let mut reg = TopicRegistry::new();
        reg.subscribe("LimitOrderEvent", 1);
        reg.subscribe("LimitOrderEvent", 2);
        reg.subscribe("TradeEvent", 3);

        let mut subs: Vec<_> = reg.subscribers_of("LimitOrderEvent").collect();
        subs.sort();
        assert_eq!(subs, vec![1, 2]);

        let trade_subs: Vec<_> = reg.subscribers_of("TradeEvent").collect();
        assert_eq!(trade_subs, vec![3]);
    }

    #[test]
    fn unknown_topic_has_no_subscribers() {
        let reg = TopicRegistry::new();
        assert_eq!(reg.subscribers_of("Nothing").count(), 0);
    }

    #[test]
    fn unsubscribe_all_clears_every_topic() {
        let mut reg = TopicRegistry::new();
        reg.subscribe("LimitOrderEvent", 1);
        reg.subscribe("TradeEvent", 1);
        reg.unsubscribe_all(1);
        assert_eq!(reg.subscribers_of("LimitOrderEvent").count(), 0);
        assert_eq!(reg.subscribers_of("TradeEvent").count(), 0);
    }
}
