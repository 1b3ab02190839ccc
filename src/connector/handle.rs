//! Scoped ownership of ephemeral broker handles.
//!
//! A handle opened for one operation is wrapped in an [`Ephemeral`] guard.
//! The guard disconnects it exactly once: explicitly through
//! [`Ephemeral::release`], or on drop if the operation unwound first.

use tracing::warn;

use crate::broker::{BrokerError, Connection};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Which kind of handle a guard holds. Used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Submitter,
    Publisher,
}

impl HandleKind {
    fn as_str(self) -> &'static str {
        match self {
            HandleKind::Submitter => "submitter",
            HandleKind::Publisher => "publisher",
        }
    }
}

fn record_handle_event(kind: HandleKind, event: &'static str) {
    metrics::handle_events().add(
        1,
        &[
            KeyValue::new("kind", kind.as_str()),
            KeyValue::new("event", event),
        ],
    );
}

/// Guard that owns a handle for the duration of one operation.
pub(crate) struct Ephemeral<H: Connection + ?Sized> {
    handle: Box<H>,
    kind: HandleKind,
    released: bool,
}

impl<H: Connection + ?Sized> Ephemeral<H> {
    pub(crate) fn new(handle: Box<H>, kind: HandleKind) -> Self {
        record_handle_event(kind, "open");
        Self {
            handle,
            kind,
            released: false,
        }
    }

    pub(crate) fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }

    /// Disconnect now and report the outcome.
    pub(crate) fn release(mut self) -> Result<(), BrokerError> {
        self.close()
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        self.released = true;
        let result = self.handle.disconnect();
        record_handle_event(
            self.kind,
            if result.is_ok() { "close" } else { "close_failed" },
        );
        result
    }
}

impl<H: Connection + ?Sized> Drop for Ephemeral<H> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.close() {
                warn!(kind = self.kind.as_str(), error = %e, "handle release failed during unwind");
            }
        }
    }
}

/// Run `op` against a freshly opened handle, then release the handle.
///
/// The handle is released on every path. A release failure never masks the
/// operation's own error, and never turns a completed operation into a
/// failed one: the operation already took effect on the broker.
pub(crate) fn scoped<H, R>(
    handle: Box<H>,
    kind: HandleKind,
    op: impl FnOnce(&mut H) -> Result<R, BrokerError>,
) -> Result<R, BrokerError>
where
    H: Connection + ?Sized,
{
    let mut guard = Ephemeral::new(handle, kind);
    let outcome = op(guard.handle_mut());
    let released = guard.release();

    match (outcome, released) {
        (outcome, Ok(())) => outcome,
        (Ok(value), Err(e)) => {
            warn!(kind = kind.as_str(), error = %e, "handle release failed after completed operation");
            Ok(value)
        }
        (Err(op_err), Err(e)) => {
            warn!(kind = kind.as_str(), error = %e, "handle release failed after failed operation");
            Err(op_err)
        }
    }
}
