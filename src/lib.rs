//! # queue-connector
//!
//! Queue control connector: the boundary through which a queue controller
//! submits, removes and reorders beans on a broker queue, broadcasts beans
//! and commands on topics, and opens topic subscribers, without knowing how
//! the broker is reached.
//!
//! Broker access goes through the [`broker::EventService`] facade. An
//! in-memory implementation ships in [`broker::memory`] for tests and
//! single-process wiring.

pub mod broker;
pub mod config;
pub mod connector;
pub mod error;
pub mod model;
pub mod telemetry;

pub use connector::{ConnectorConfig, QueueConnector};
pub use error::{Error, Result};
