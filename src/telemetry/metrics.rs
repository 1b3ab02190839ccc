//! Metric instrument factories for queue-connector.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"queue-connector"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for queue-connector instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("queue-connector")
}

/// Counter: connector operations.
/// Labels: `operation`, `result` ("ok" | "not_found" | "error").
pub fn connector_operations() -> Counter<u64> {
    meter()
        .u64_counter("qcc.connector.operations")
        .with_description("Number of connector operations")
        .build()
}

/// Counter: ephemeral handle lifecycle events.
/// Labels: `kind` ("submitter" | "publisher"), `event` ("open" | "close" | "close_failed").
pub fn handle_events() -> Counter<u64> {
    meter()
        .u64_counter("qcc.handle.events")
        .with_description("Number of ephemeral broker handle opens and closes")
        .build()
}

/// Counter: persistent subscribers handed to callers.
/// Labels: `topic`.
pub fn subscribers_created() -> Counter<u64> {
    meter()
        .u64_counter("qcc.subscribers.created")
        .with_description("Number of topic subscribers created")
        .build()
}

/// Histogram: operation duration in milliseconds, broker round-trip included.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("qcc.operation.duration_ms")
        .with_description("Connector operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
