//! Core data model.
//!
//! A bean is a unit of queued work. It has identity (assigned upstream),
//! a lifecycle status and the host it was submitted from. Command beans are
//! control instructions for running consumers and are only ever broadcast.

pub mod bean;
pub mod command;

pub use bean::{QueueBean, Queueable};
pub use command::{Command, CommandBean, ConsumerCommand};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Newtype for bean IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeanId(pub Uuid);

impl BeanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for BeanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for BeanId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a bean.
///
/// The connector only ever writes [`Status::Submitted`]. Every later status
/// is set by consumers downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Not yet handed to a queue.
    #[default]
    None,
    /// Handed to a submission queue.
    Submitted,
    /// Accepted by a consumer and waiting for its turn.
    Queued,
    Running,
    Paused,
    RequestPause,
    RequestResume,
    Resumed,
    RequestTerminate,
    Terminated,
    Failed,
    Complete,
    /// Ended without completing (e.g. consumer shut down mid-run).
    Unfinished,
    /// Held back in the queue until explicitly released.
    Deferred,
}

impl Status {
    /// Is this a terminal status?
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Status::Terminated | Status::Failed | Status::Complete | Status::Unfinished
        )
    }

    /// Is a consumer currently working on the bean?
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Status::Running
                | Status::Resumed
                | Status::RequestPause
                | Status::RequestResume
                | Status::RequestTerminate
        )
    }

    pub fn is_paused(self) -> bool {
        matches!(self, Status::Paused | Status::RequestPause)
    }

    /// Is this a request that a consumer has not acted on yet?
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Status::RequestPause | Status::RequestResume | Status::RequestTerminate
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Status::None => "NONE",
            Status::Submitted => "SUBMITTED",
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::Paused => "PAUSED",
            Status::RequestPause => "REQUEST_PAUSE",
            Status::RequestResume => "REQUEST_RESUME",
            Status::Resumed => "RESUMED",
            Status::RequestTerminate => "REQUEST_TERMINATE",
            Status::Terminated => "TERMINATED",
            Status::Failed => "FAILED",
            Status::Complete => "COMPLETE",
            Status::Unfinished => "UNFINISHED",
            Status::Deferred => "DEFERRED",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [Status; 14] = [
            Status::None,
            Status::Submitted,
            Status::Queued,
            Status::Running,
            Status::Paused,
            Status::RequestPause,
            Status::RequestResume,
            Status::Resumed,
            Status::RequestTerminate,
            Status::Terminated,
            Status::Failed,
            Status::Complete,
            Status::Unfinished,
            Status::Deferred,
        ];
        ALL.into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::error::Error::Other(format!("unknown status: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_display() {
        for name in ["SUBMITTED", "REQUEST_PAUSE", "COMPLETE", "DEFERRED"] {
            let status: Status = name.parse().unwrap();
            assert_eq!(status.to_string(), name);
        }
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!("running".parse::<Status>().unwrap(), Status::Running);
        assert!("sleeping".parse::<Status>().is_err());
    }

    #[test]
    fn status_serializes_in_screaming_snake_case() {
        let json = serde_json::to_string(&Status::RequestTerminate).unwrap();
        assert_eq!(json, "\"REQUEST_TERMINATE\"");
    }

    #[test]
    fn final_and_active_are_disjoint() {
        for status in [Status::Complete, Status::Failed, Status::Terminated] {
            assert!(status.is_final());
            assert!(!status.is_active());
        }
        assert!(Status::Running.is_active());
        assert!(!Status::Submitted.is_final());
        assert!(Status::RequestPause.is_paused());
        assert!(Status::RequestPause.is_request());
    }

    #[test]
    fn bean_id_displays_short_prefix() {
        let id = BeanId::new();
        assert_eq!(id.to_string().len(), 8);
        assert!(id.0.to_string().starts_with(&id.to_string()));
    }
}
