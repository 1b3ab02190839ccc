//! Error types for queue-connector.

use thiserror::Error;

use crate::broker::BrokerError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to resolve local host name: {0}")]
    HostResolution(String),

    #[error("channel name must not be empty")]
    InvalidChannel,

    #[error("failed to submit bean to queue '{queue}': {source}")]
    Submission {
        queue: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to remove bean from queue '{queue}': {source}")]
    Removal {
        queue: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to reorder bean in queue '{queue}': {source}")]
    Reorder {
        queue: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to publish to topic '{topic}': {source}")]
    Publication {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to subscribe to topic '{topic}': {source}")]
    Subscription {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The underlying broker failure, if this error came from the broker.
    pub fn broker_error(&self) -> Option<&BrokerError> {
        match self {
            Error::Submission { source, .. }
            | Error::Removal { source, .. }
            | Error::Reorder { source, .. }
            | Error::Publication { source, .. }
            | Error::Subscription { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
