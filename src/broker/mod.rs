//! Broker facade: the event-service abstraction the connector consumes.
//!
//! An [`EventService`] turns a [`BrokerEndpoint`] and a channel name into a
//! connection handle. Submitters talk to a named queue (point-to-point),
//! publishers and subscribers talk to a named topic (fan-out).
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  QueueConnector                      │
//! │   submit / remove / reorder / publish / subscribe    │
//! └──────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌──────────────────────────────────────────────────────┐
//! │                 EventService trait                   │
//! │   create_submitter / create_publisher /              │
//! │   create_subscriber                                  │
//! └──────────────────────────────────────────────────────┘
//!          │                               │
//!          ▼                               ▼
//! ┌─────────────────┐            ┌─────────────────────┐
//! │ InMemoryBroker  │            │  Real transports    │
//! │   (included)    │            │    (external)       │
//! └─────────────────┘            └─────────────────────┘
//! ```
//!
//! Every handle is a [`Connection`]: it must be disconnected exactly once by
//! whoever owns it.

pub mod memory;

pub use memory::{ConnectionStats, FailurePoint, InMemoryBroker};

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::model::Queueable;

/// Errors reported by a broker facade.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("rejected by broker: {0}")]
    Rejected(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("handle is already disconnected")]
    Disconnected,

    #[error("timed out waiting for broker")]
    Timeout,
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Address of the messaging service, plus optional credentials.
///
/// Configured once and shared read-only by every operation.
#[derive(Clone)]
pub struct BrokerEndpoint {
    uri: String,
    credentials: Option<Arc<SecretString>>,
}

impl BrokerEndpoint {
    /// Create an endpoint. The URI must carry a scheme (`tcp://host:61616`).
    pub fn new(uri: impl Into<String>) -> crate::error::Result<Self> {
        let uri = uri.into();
        let valid = uri
            .split_once("://")
            .is_some_and(|(scheme, rest)| !scheme.is_empty() && !rest.is_empty());
        if !valid {
            return Err(crate::error::Error::Config(format!(
                "broker URI '{uri}' must have the form scheme://address"
            )));
        }
        Ok(Self {
            uri,
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, token: SecretString) -> Self {
        self.credentials = Some(Arc::new(token));
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn scheme(&self) -> &str {
        self.uri.split_once("://").map_or("", |(scheme, _)| scheme)
    }

    pub fn credentials(&self) -> Option<&SecretString> {
        self.credentials.as_deref()
    }
}

impl std::fmt::Debug for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerEndpoint")
            .field("uri", &self.uri)
            .field(
                "credentials",
                &self.credentials.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl std::fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uri)
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// A broker connection that must be released by its owner.
pub trait Connection: Send {
    /// Release the connection. Calling this twice is an error.
    fn disconnect(&mut self) -> Result<(), BrokerError>;
}

/// Queue-directed handle: one named queue, point-to-point.
pub trait Submitter<T: Queueable>: Connection {
    /// Append a bean to the back of the queue.
    fn submit(&mut self, bean: &T) -> Result<(), BrokerError>;

    /// Remove the entry with the bean's identity. False if there was none.
    fn remove(&mut self, bean: &T) -> Result<bool, BrokerError>;

    /// Shift the entry with the bean's identity by `amount` positions.
    ///
    /// Negative amounts move toward the front of the queue (next to run),
    /// positive toward the back. False if the bean is absent or the move
    /// leaves it where it was.
    fn reorder(&mut self, bean: &T, amount: i32) -> Result<bool, BrokerError>;
}

/// Topic-directed handle for broadcasting to every current listener.
pub trait Publisher<M: Serialize>: Connection {
    fn broadcast(&mut self, message: &M) -> Result<(), BrokerError>;
}

/// Long-lived topic listener. Owned and closed by whoever opened it.
pub trait Subscriber<M: DeserializeOwned>: Connection {
    /// Topic this subscriber listens on.
    fn topic(&self) -> &str;

    /// Wait up to `timeout` for the next message.
    fn poll(&mut self, timeout: Duration) -> Result<Option<M>, BrokerError>;

    /// Take every message already delivered without waiting.
    fn drain(&mut self) -> Result<Vec<M>, BrokerError> {
        let mut messages = Vec::new();
        while let Some(message) = self.poll(Duration::ZERO)? {
            messages.push(message);
        }
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Factory for broker handles. The connector treats it as opaque.
pub trait EventService: Send + Sync {
    fn create_submitter<T: Queueable>(
        &self,
        endpoint: &BrokerEndpoint,
        queue: &str,
    ) -> Result<Box<dyn Submitter<T>>, BrokerError>;

    fn create_publisher<M: Serialize + Send + Sync + 'static>(
        &self,
        endpoint: &BrokerEndpoint,
        topic: &str,
    ) -> Result<Box<dyn Publisher<M>>, BrokerError>;

    fn create_subscriber<M: DeserializeOwned + Send + 'static>(
        &self,
        endpoint: &BrokerEndpoint,
        topic: &str,
    ) -> Result<Box<dyn Subscriber<M>>, BrokerError>;
}
