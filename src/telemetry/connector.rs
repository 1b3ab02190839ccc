//! Connector operation span helpers.

use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::Span;

use super::metrics;
use crate::model::BeanId;

/// Start a span for one connector operation.
///
/// `bean.id` is recorded when the operation targets a bean. The
/// `connector.result` field is declared empty and filled by
/// [`record_outcome`].
pub fn start_operation_span(operation: &'static str, channel: &str, bean: Option<BeanId>) -> Span {
    let span = tracing::info_span!(
        "connector.operation",
        "connector.operation" = operation,
        "connector.channel" = channel,
        "bean.id" = tracing::field::Empty,
        "connector.result" = tracing::field::Empty,
    );
    if let Some(id) = bean {
        span.record("bean.id", tracing::field::display(id.0));
    }
    span
}

/// Record how an operation ended on its span and in the metrics.
pub fn record_outcome(span: &Span, operation: &'static str, result: &'static str, elapsed: Duration) {
    span.record("connector.result", result);
    metrics::connector_operations().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("result", result),
        ],
    );
    metrics::operation_duration_ms().record(
        elapsed.as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", operation)],
    );
}
