//! Discrete-event simulator for a single-venue limit-order-book market.
//!
//! A seeded, latency-injecting [`bus`] carries messages between a
//! price-time-priority matching [`engine`], the [`adapter`] that translates
//! engine output into addressed bus traffic, and an [`watchdog`] that drives
//! resting-order expiration. [`harness`] wires the three together into one
//! runnable simulation; [`config`] is how a caller shapes a run without
//! touching code.

pub mod adapter;
pub mod bus;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixed_point;
pub mod harness;
pub mod message;
pub mod watchdog;

pub use adapter::ExchangeAdapter;
pub use config::SimConfig;
pub use error::SimError;
pub use harness::SimulationHarness;
pub use watchdog::ExpirationWatchdog;
