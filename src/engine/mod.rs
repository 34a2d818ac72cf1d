//! Price-time-priority matching engine.

pub mod book;
pub mod callbacks;
pub mod ids;

pub use book::OrderBook;
pub use callbacks::EngineCallbacks;
pub use ids::{is_transient, IdGenerator, TRANSIENT_START};
