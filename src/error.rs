//! Construction-time error types.
//!
//! Everything that happens once the simulation is running communicates
//! failure as a message on the bus (a `*Reject` variant), never as a `Result`
//! - an agent's `on_message` has nowhere to propagate a `Result` to, since
//! the bus drives it by callback. `SimError` exists only for the narrow band
//! of setup-time failures: a bad config file, a duplicate agent
//! registration, a malformed latency profile. It is surfaced through
//! `anyhow::Result` at the harness boundary rather than threaded through
//! `?` everywhere, matching how construction errors are handled in the
//! system this was adapted from.

use std::fmt;

#[derive(Debug)]
pub enum SimError {
    DuplicateAgent(u64),
    UnknownAgent(u64),
    UnknownTopic(String),
    InvalidLatencyProfile { reason: String },
    InvalidConfig { reason: String },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::DuplicateAgent(id) => write!(f, "agent {id} is already registered"),
            SimError::UnknownAgent(id) => write!(f, "agent {id} is not registered"),
            SimError::UnknownTopic(topic) => write!(f, "no such topic: {topic}"),
            SimError::InvalidLatencyProfile { reason } => {
                write!(f, "invalid latency profile: {reason}")
            }
            SimError::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
        }
    }
}

impl std::error::Error for SimError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_human_readable() {
        let err = SimError::DuplicateAgent(7);
        assert_eq!(err.to_string(), "agent 7 is already registered");
    }
}
