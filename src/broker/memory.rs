//! In-memory broker for testing and single-process wiring.
//!
//! Implements [`EventService`] over shared in-process state:
//! - queues are ordered lists of serialized beans keyed by bean identity
//! - topics fan out to every subscriber open at the time of the broadcast;
//!   nothing is kept unless a history limit is set with
//!   [`InMemoryBroker::with_history`]
//! - every handle open and close is counted, so callers can check that
//!   connections are balanced
//! - failures can be injected at any broker call
//!
//! ## Example
//!
//! ```
//! use queue_connector::broker::{BrokerEndpoint, Connection, EventService, InMemoryBroker};
//! use queue_connector::model::QueueBean;
//!
//! let broker = InMemoryBroker::new("memory://local");
//! let endpoint = BrokerEndpoint::new("memory://local").unwrap();
//!
//! let mut submitter = broker
//!     .create_submitter::<QueueBean>(&endpoint, "scan.submit")
//!     .unwrap();
//! submitter.submit(&QueueBean::new("grid scan")).unwrap();
//! submitter.disconnect().unwrap();
//!
//! assert_eq!(broker.queue_len("scan.submit"), 1);
//! assert!(broker.connection_stats().is_balanced());
//! ```

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{BrokerEndpoint, BrokerError, Connection, EventService, Publisher, Submitter, Subscriber};
use crate::model::{BeanId, Queueable};

/// A broker call that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// Opening any handle.
    Open,
    Submit,
    Remove,
    Reorder,
    Broadcast,
    Disconnect,
}

/// Snapshot of handle bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStats {
    pub submitters_opened: usize,
    pub submitters_closed: usize,
    pub publishers_opened: usize,
    pub publishers_closed: usize,
    /// Subscribers currently attached to a topic.
    pub live_subscribers: usize,
}

impl ConnectionStats {
    /// Every submitter and publisher that was opened has been closed.
    pub fn is_balanced(&self) -> bool {
        self.submitters_opened == self.submitters_closed
            && self.publishers_opened == self.publishers_closed
    }
}

#[derive(Default)]
struct Counters {
    submitters_opened: AtomicUsize,
    submitters_closed: AtomicUsize,
    publishers_opened: AtomicUsize,
    publishers_closed: AtomicUsize,
    live_subscribers: AtomicUsize,
}

struct QueueEntry {
    id: BeanId,
    body: serde_json::Value,
}

struct TopicListener {
    id: u64,
    tx: Sender<serde_json::Value>,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, Vec<QueueEntry>>,
    topics: HashMap<String, Vec<TopicListener>>,
    history: HashMap<String, VecDeque<serde_json::Value>>,
    history_limit: usize,
    failures: Vec<FailurePoint>,
    next_listener: u64,
}

/// Thread-safe in-memory broker. Clones share the same state.
#[derive(Clone)]
pub struct InMemoryBroker {
    uri: Arc<str>,
    state: Arc<Mutex<BrokerState>>,
    counters: Arc<Counters>,
}

impl InMemoryBroker {
    /// Create a broker reachable at `uri`. Handles requested for any other
    /// endpoint fail to connect.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: Arc::from(uri.into()),
            state: Arc::new(Mutex::new(BrokerState::default())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Keep the last `limit` payloads broadcast on each topic for
    /// [`published`](Self::published). Older payloads are evicted.
    pub fn with_history(self, limit: usize) -> Self {
        {
            let mut state = self.lock();
            state.history_limit = limit;
            for retained in state.history.values_mut() {
                let excess = retained.len().saturating_sub(limit);
                retained.drain(..excess);
            }
        }
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Make the next call matching `point` fail. Injections queue up.
    pub fn inject_failure(&self, point: FailurePoint) {
        self.lock().failures.push(point);
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        ConnectionStats {
            submitters_opened: self.counters.submitters_opened.load(Ordering::SeqCst),
            submitters_closed: self.counters.submitters_closed.load(Ordering::SeqCst),
            publishers_opened: self.counters.publishers_opened.load(Ordering::SeqCst),
            publishers_closed: self.counters.publishers_closed.load(Ordering::SeqCst),
            live_subscribers: self.counters.live_subscribers.load(Ordering::SeqCst),
        }
    }

    /// Bean IDs on a queue, front first.
    pub fn queue_ids(&self, queue: &str) -> Vec<BeanId> {
        self.lock()
            .queues
            .get(queue)
            .map(|entries| entries.iter().map(|e| e.id).collect())
            .unwrap_or_default()
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, Vec::len)
    }

    /// Decode every bean on a queue, front first.
    pub fn queue_contents<T: DeserializeOwned>(&self, queue: &str) -> Result<Vec<T>, BrokerError> {
        let state = self.lock();
        let Some(entries) = state.queues.get(queue) else {
            return Ok(Vec::new());
        };
        entries
            .iter()
            .map(|e| serde_json::from_value(e.body.clone()).map_err(BrokerError::from))
            .collect()
    }

    /// Retained payloads broadcast on a topic, oldest first. Empty unless
    /// the broker was built [`with_history`](Self::with_history).
    pub fn published(&self, topic: &str) -> Vec<serde_json::Value> {
        self.lock()
            .history
            .get(topic)
            .map(|retained| retained.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failure(&self, point: FailurePoint) -> Result<(), BrokerError> {
        let mut state = self.lock();
        if let Some(pos) = state.failures.iter().position(|p| *p == point) {
            state.failures.remove(pos);
            return Err(BrokerError::Rejected(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn connect(&self, endpoint: &BrokerEndpoint) -> Result<(), BrokerError> {
        if endpoint.uri() != &*self.uri {
            return Err(BrokerError::ConnectionFailed(format!(
                "no broker listening at {}",
                endpoint.uri()
            )));
        }
        self.check_failure(FailurePoint::Open)
    }

    fn detach_listener(&self, topic: &str, id: u64) {
        let mut state = self.lock();
        if let Some(listeners) = state.topics.get_mut(topic) {
            listeners.retain(|l| l.id != id);
        }
        self.counters.live_subscribers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EventService for InMemoryBroker {
    fn create_submitter<T: Queueable>(
        &self,
        endpoint: &BrokerEndpoint,
        queue: &str,
    ) -> Result<Box<dyn Submitter<T>>, BrokerError> {
        self.connect(endpoint)?;
        self.counters.submitters_opened.fetch_add(1, Ordering::SeqCst);
        debug!(queue, "submitter opened");
        Ok(Box::new(MemorySubmitter {
            broker: self.clone(),
            queue: queue.to_string(),
            connected: true,
            _bean: PhantomData,
        }))
    }

    fn create_publisher<M: Serialize + Send + Sync + 'static>(
        &self,
        endpoint: &BrokerEndpoint,
        topic: &str,
    ) -> Result<Box<dyn Publisher<M>>, BrokerError> {
        self.connect(endpoint)?;
        self.counters.publishers_opened.fetch_add(1, Ordering::SeqCst);
        debug!(topic, "publisher opened");
        Ok(Box::new(MemoryPublisher {
            broker: self.clone(),
            topic: topic.to_string(),
            connected: true,
            _message: PhantomData,
        }))
    }

    fn create_subscriber<M: DeserializeOwned + Send + 'static>(
        &self,
        endpoint: &BrokerEndpoint,
        topic: &str,
    ) -> Result<Box<dyn Subscriber<M>>, BrokerError> {
        self.connect(endpoint)?;
        let (tx, rx) = mpsc::channel();
        let id = {
            let mut state = self.lock();
            state.next_listener += 1;
            let id = state.next_listener;
            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .push(TopicListener { id, tx });
            id
        };
        self.counters.live_subscribers.fetch_add(1, Ordering::SeqCst);
        debug!(topic, listener = id, "subscriber attached");
        Ok(Box::new(MemorySubscriber {
            broker: self.clone(),
            topic: topic.to_string(),
            listener: id,
            rx,
            connected: true,
            _message: PhantomData,
        }))
    }
}

// ---------------------------------------------------------------------------
// Submitter
// ---------------------------------------------------------------------------

struct MemorySubmitter<T> {
    broker: InMemoryBroker,
    queue: String,
    connected: bool,
    _bean: PhantomData<fn(T)>,
}

impl<T> MemorySubmitter<T> {
    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::Disconnected)
        }
    }
}

impl<T: Queueable> Connection for MemorySubmitter<T> {
    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        // The handle is gone even if the broker reports a failure.
        self.connected = false;
        self.broker
            .counters
            .submitters_closed
            .fetch_add(1, Ordering::SeqCst);
        self.broker.check_failure(FailurePoint::Disconnect)
    }
}

impl<T: Queueable> Submitter<T> for MemorySubmitter<T> {
    fn submit(&mut self, bean: &T) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        self.broker.check_failure(FailurePoint::Submit)?;
        let body = serde_json::to_value(bean)?;
        let id = bean.id();

        let mut state = self.broker.lock();
        let entries = state.queues.entry(self.queue.clone()).or_default();
        if entries.iter().any(|e| e.id == id) {
            return Err(BrokerError::Rejected(format!(
                "bean {id} is already on queue {}",
                self.queue
            )));
        }
        entries.push(QueueEntry { id, body });
        Ok(())
    }

    fn remove(&mut self, bean: &T) -> Result<bool, BrokerError> {
        self.ensure_connected()?;
        self.broker.check_failure(FailurePoint::Remove)?;
        let id = bean.id();

        let mut state = self.broker.lock();
        let Some(entries) = state.queues.get_mut(&self.queue) else {
            return Ok(false);
        };
        match entries.iter().position(|e| e.id == id) {
            Some(pos) => {
                entries.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn reorder(&mut self, bean: &T, amount: i32) -> Result<bool, BrokerError> {
        self.ensure_connected()?;
        self.broker.check_failure(FailurePoint::Reorder)?;
        let id = bean.id();

        let mut state = self.broker.lock();
        let Some(entries) = state.queues.get_mut(&self.queue) else {
            return Ok(false);
        };
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return Ok(false);
        };

        // Moves past either end stop at the end.
        let last = entries.len() as i64 - 1;
        let target = (pos as i64 + i64::from(amount)).clamp(0, last) as usize;
        if target == pos {
            return Ok(false);
        }
        let entry = entries.remove(pos);
        entries.insert(target, entry);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

struct MemoryPublisher<M> {
    broker: InMemoryBroker,
    topic: String,
    connected: bool,
    _message: PhantomData<fn(M)>,
}

impl<M: Serialize + Send + Sync + 'static> Connection for MemoryPublisher<M> {
    fn disconnect(&mut self) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::Disconnected);
        }
        self.connected = false;
        self.broker
            .counters
            .publishers_closed
            .fetch_add(1, Ordering::SeqCst);
        self.broker.check_failure(FailurePoint::Disconnect)
    }
}

impl<M: Serialize + Send + Sync + 'static> Publisher<M> for MemoryPublisher<M> {
    fn broadcast(&mut self, message: &M) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::Disconnected);
        }
        self.broker.check_failure(FailurePoint::Broadcast)?;
        let body = serde_json::to_value(message)?;

        let mut state = self.broker.lock();
        if let Some(listeners) = state.topics.get_mut(&self.topic) {
            // Receivers dropped without disconnecting are pruned here.
            listeners.retain(|l| l.tx.send(body.clone()).is_ok());
        }
        let limit = state.history_limit;
        if limit > 0 {
            let retained = state.history.entry(self.topic.clone()).or_default();
            if retained.len() == limit {
                retained.pop_front();
            }
            retained.push_back(body);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

struct MemorySubscriber<M> {
    broker: InMemoryBroker,
    topic: String,
    listener: u64,
    rx: Receiver<serde_json::Value>,
    connected: bool,
    _message: PhantomData<fn() -> M>,
}

impl<M: DeserializeOwned + Send + 'static> Connection for MemorySubscriber<M> {
    fn disconnect(&mut self) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::Disconnected);
        }
        self.connected = false;
        self.broker.detach_listener(&self.topic, self.listener);
        debug!(topic = %self.topic, listener = self.listener, "subscriber detached");
        self.broker.check_failure(FailurePoint::Disconnect)
    }
}

impl<M: DeserializeOwned + Send + 'static> Subscriber<M> for MemorySubscriber<M> {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<M>, BrokerError> {
        if !self.connected {
            return Err(BrokerError::Disconnected);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(body) => Ok(Some(serde_json::from_value(body)?)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BrokerError::Disconnected),
        }
    }
}

impl<M> Drop for MemorySubscriber<M> {
    fn drop(&mut self) {
        if self.connected {
            self.broker.detach_listener(&self.topic, self.listener);
        }
    }
}
