//! Queueable beans: the capability the connector needs from a work item,
//! and a general-purpose bean that carries an opaque payload.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{BeanId, Status};

/// A unit of work that can be placed on a submission queue.
///
/// The connector only reads the identity and only ever writes the status and
/// origin host. Everything else a bean carries is opaque to it.
pub trait Queueable: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> BeanId;

    fn status(&self) -> Status;

    fn set_status(&mut self, status: Status);

    /// Machine the bean was submitted from, if known.
    fn host_name(&self) -> Option<&str>;

    fn set_host_name(&mut self, host_name: String);
}

/// A queued bean carrying an arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueBean {
    pub id: BeanId,

    /// Human-readable name (e.g. "grid scan 12").
    pub name: String,

    pub status: Status,

    /// Status before the last transition, as recorded by consumers.
    pub previous_status: Option<Status>,

    pub host_name: Option<String>,

    pub user_name: Option<String>,

    /// Latest progress message from the consumer.
    pub message: Option<String>,

    pub percent_complete: f64,

    /// Arbitrary parameters for the consumer. The connector doesn't interpret these.
    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl QueueBean {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BeanId::new(),
            name: name.into(),
            status: Status::None,
            previous_status: None,
            host_name: None,
            user_name: None,
            message: None,
            percent_complete: 0.0,
            payload: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: BeanId) -> Self {
        self.id = id;
        self
    }

    pub fn host(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = Some(host_name.into());
        self
    }

    pub fn user(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

impl Queueable for QueueBean {
    fn id(&self) -> BeanId {
        self.id
    }

    fn status(&self) -> Status {
        self.status
    }

    fn set_status(&mut self, status: Status) {
        if status != self.status {
            self.previous_status = Some(self.status);
        }
        self.status = status;
    }

    fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    fn set_host_name(&mut self, host_name: String) {
        self.host_name = Some(host_name);
    }
}
