//! Queue control connector: the boundary between a queue controller and the
//! broker.
//!
//! Every submit, remove, reorder and publish opens its own short-lived
//! handle, performs one operation and releases the handle before returning.
//! Subscriptions are the exception: the caller receives a live subscriber
//! and owns it from then on.
//!
//! # Example
//!
//! ```
//! use queue_connector::broker::{BrokerEndpoint, InMemoryBroker};
//! use queue_connector::connector::{ConnectorConfig, FixedHostResolver, QueueConnector};
//! use queue_connector::model::{QueueBean, Queueable, Status};
//!
//! let broker = InMemoryBroker::new("memory://local");
//! let config = ConnectorConfig::new(BrokerEndpoint::new("memory://local").unwrap());
//! let connector = QueueConnector::new(broker.clone(), config)
//!     .with_host_resolver(FixedHostResolver::new("ws-01"));
//!
//! let mut bean = QueueBean::new("grid scan");
//! connector.submit(&mut bean, "scan.submit").unwrap();
//!
//! assert_eq!(bean.status(), Status::Submitted);
//! assert_eq!(bean.host_name(), Some("ws-01"));
//! assert_eq!(broker.queue_len("scan.submit"), 1);
//! ```

mod handle;
pub mod host;

pub use host::{FixedHostResolver, HostResolver, SystemHostResolver};

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info, trace};

use crate::broker::{BrokerEndpoint, BrokerError, EventService, Subscriber};
use crate::error::{Error, Result};
use crate::model::{BeanId, CommandBean, Queueable, Status};
use crate::telemetry::connector::{record_outcome, start_operation_span};
use crate::telemetry::metrics;
use handle::{HandleKind, scoped};
use opentelemetry::KeyValue;

/// Immutable connector configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub endpoint: BrokerEndpoint,
}

impl ConnectorConfig {
    pub fn new(endpoint: BrokerEndpoint) -> Self {
        Self { endpoint }
    }
}

/// How an operation ended, for spans and metrics.
trait OutcomeLabel {
    fn label(&self) -> &'static str;
}

impl OutcomeLabel for () {
    fn label(&self) -> &'static str {
        "ok"
    }
}

impl OutcomeLabel for bool {
    fn label(&self) -> &'static str {
        if *self { "ok" } else { "not_found" }
    }
}

impl<M: DeserializeOwned> OutcomeLabel for Box<dyn Subscriber<M>> {
    fn label(&self) -> &'static str {
        "ok"
    }
}

/// The queue control connector.
///
/// Fully configured once constructed and safe to share across threads:
/// every field is read-only, and each call opens handles of its own.
pub struct QueueConnector<S> {
    service: Arc<S>,
    endpoint: Arc<BrokerEndpoint>,
    host_resolver: Arc<dyn HostResolver>,
}

impl<S> Clone for QueueConnector<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            endpoint: Arc::clone(&self.endpoint),
            host_resolver: Arc::clone(&self.host_resolver),
        }
    }
}

impl<S: EventService> QueueConnector<S> {
    pub fn new(service: S, config: ConnectorConfig) -> Self {
        Self {
            service: Arc::new(service),
            endpoint: Arc::new(config.endpoint),
            host_resolver: Arc::new(SystemHostResolver),
        }
    }

    /// Replace the source of the local host name stamped on submitted beans.
    pub fn with_host_resolver(mut self, resolver: impl HostResolver + 'static) -> Self {
        self.host_resolver = Arc::new(resolver);
        self
    }

    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Submit a bean to the back of a queue.
    ///
    /// Sets the status to [`Status::Submitted`] and, if the bean has no
    /// origin host, stamps the local host name. The host name is resolved
    /// before the bean or the broker is touched, so a resolution failure
    /// leaves no trace anywhere.
    pub fn submit<T: Queueable>(&self, bean: &mut T, queue: &str) -> Result<()> {
        let id = bean.id();
        self.instrumented("submit", queue, Some(id), || {
            let local_host = match bean.host_name() {
                Some(host) if !host.trim().is_empty() => None,
                _ => Some(self.host_resolver.local_host_name()?),
            };

            bean.set_status(Status::Submitted);
            if let Some(host) = local_host {
                trace!(%host, "host name on bean not set, using local host");
                bean.set_host_name(host);
            }

            let submission = |source| Error::Submission {
                queue: queue.to_string(),
                source,
            };
            let submitter = self
                .service
                .create_submitter::<T>(&self.endpoint, queue)
                .map_err(submission)?;
            scoped(submitter, HandleKind::Submitter, |s| s.submit(bean)).map_err(submission)
        })
    }

    /// Remove a bean from a queue. Returns false if it was not there.
    pub fn remove<T: Queueable>(&self, bean: &T, queue: &str) -> Result<bool> {
        self.instrumented("remove", queue, Some(bean.id()), || {
            let removal = |source| Error::Removal {
                queue: queue.to_string(),
                source,
            };
            let submitter = self
                .service
                .create_submitter::<T>(&self.endpoint, queue)
                .map_err(removal)?;
            scoped(submitter, HandleKind::Submitter, |s| s.remove(bean)).map_err(removal)
        })
    }

    /// Move a bean `amount` places within a queue.
    ///
    /// The amount goes to the broker untouched. Negative moves toward the
    /// front. Returns false if the bean is not queued or did not move.
    pub fn reorder<T: Queueable>(&self, bean: &T, amount: i32, queue: &str) -> Result<bool> {
        self.instrumented("reorder", queue, Some(bean.id()), || {
            let reorder = |source| Error::Reorder {
                queue: queue.to_string(),
                source,
            };
            let submitter = self
                .service
                .create_submitter::<T>(&self.endpoint, queue)
                .map_err(reorder)?;
            scoped(submitter, HandleKind::Submitter, |s| s.reorder(bean, amount)).map_err(reorder)
        })
    }

    /// Broadcast a bean's current state on a topic without modifying it.
    pub fn publish_bean<T: Queueable>(&self, bean: &T, topic: &str) -> Result<()> {
        self.instrumented("publish_bean", topic, Some(bean.id()), || {
            self.broadcast(bean, topic)
        })
    }

    /// Broadcast a command to every consumer listening on a topic.
    pub fn publish_command_bean<C: CommandBean>(&self, command: &C, topic: &str) -> Result<()> {
        self.instrumented("publish_command_bean", topic, None, || {
            trace!(command = command.command_name(), "broadcasting command");
            self.broadcast(command, topic)
        })
    }

    /// Open a persistent subscriber on a topic.
    ///
    /// The caller owns the subscriber and must disconnect it when done.
    pub fn create_queue_subscriber<M>(&self, topic: &str) -> Result<Box<dyn Subscriber<M>>>
    where
        M: DeserializeOwned + Send + 'static,
    {
        self.instrumented("create_queue_subscriber", topic, None, || {
            let subscriber = self
                .service
                .create_subscriber::<M>(&self.endpoint, topic)
                .map_err(|source| Error::Subscription {
                    topic: topic.to_string(),
                    source,
                })?;
            metrics::subscribers_created().add(1, &[KeyValue::new("topic", topic.to_string())]);
            info!(topic, "subscriber handed to caller");
            Ok(subscriber)
        })
    }

    fn broadcast<M: Serialize + Send + Sync + 'static>(&self, message: &M, topic: &str) -> Result<()> {
        let publication = |source: BrokerError| Error::Publication {
            topic: topic.to_string(),
            source,
        };
        let publisher = self
            .service
            .create_publisher::<M>(&self.endpoint, topic)
            .map_err(publication)?;
        scoped(publisher, HandleKind::Publisher, |p| p.broadcast(message)).map_err(publication)
    }

    /// Validate the channel, then run `op` inside an operation span.
    fn instrumented<R: OutcomeLabel>(
        &self,
        operation: &'static str,
        channel: &str,
        bean: Option<BeanId>,
        op: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let span = start_operation_span(operation, channel, bean);
        let _enter = span.enter();
        let started = Instant::now();

        let result = if channel.trim().is_empty() {
            Err(Error::InvalidChannel)
        } else {
            op()
        };

        let label = match &result {
            Ok(value) => value.label(),
            Err(e) => {
                error!(error = %e, "{operation} failed");
                "error"
            }
        };
        record_outcome(&span, operation, label, started.elapsed());
        result
    }
}
