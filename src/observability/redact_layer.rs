use std::fmt;

use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::core::redact::is_sensitive_field;

// ---------------------------------------------------------------------------
// Log redaction layer
// ---------------------------------------------------------------------------

/// A tracing layer that keeps raw secrets out of log output.
///
/// Sensitive fields (token, secret, password, authorization, signature) must
/// be logged through `Redacted<T>` or one of the `redact_*` helpers. Events
/// that carry a sensitive field with any other value are dropped before
/// they reach the wrapped layer; everything else passes through untouched.
pub struct RedactingLayer<S> {
    inner: S,
}

impl<S> RedactingLayer<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S, Sub> Layer<Sub> for RedactingLayer<S>
where
    S: Layer<Sub>,
    Sub: tracing::Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, Sub>) {
        self.inner.on_new_span(attrs, id, ctx);
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, Sub>) {
        self.inner.on_record(id, values, ctx);
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, Sub>) {
        let detector = check_event_for_sensitive_fields(event);
        if detector.leaked() {
            return;
        }
        self.inner.on_event(event, ctx);
    }

    fn on_close(&self, id: span::Id, ctx: Context<'_, Sub>) {
        self.inner.on_close(id, ctx);
    }

    fn on_enter(&self, id: &span::Id, ctx: Context<'_, Sub>) {
        self.inner.on_enter(id, ctx);
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, Sub>) {
        self.inner.on_exit(id, ctx);
    }
}

/// Visitor that records which sensitive fields an event carries and
/// whether any of them hold an unredacted value.
#[derive(Debug, Default)]
pub struct SensitiveFieldDetector {
    pub field_names: Vec<String>,
    pub unredacted: Vec<String>,
}

impl SensitiveFieldDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn found_sensitive(&self) -> bool {
        !self.field_names.is_empty()
    }

    pub fn leaked(&self) -> bool {
        !self.unredacted.is_empty()
    }

    fn inspect(&mut self, field: &Field, rendered: &str) {
        if !is_sensitive_field(field.name()) {
            return;
        }
        self.field_names.push(field.name().to_string());
        if !rendered.contains("[REDACTED]") {
            self.unredacted.push(field.name().to_string());
        }
    }
}

impl Visit for SensitiveFieldDetector {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        self.inspect(field, &rendered);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.inspect(field, value);
    }
}

/// Inspect a tracing event for sensitive fields.
pub fn check_event_for_sensitive_fields(event: &tracing::Event<'_>) -> SensitiveFieldDetector {
    let mut detector = SensitiveFieldDetector::new();
    event.record(&mut detector);
    detector
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::redact::Redacted;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    /// Counts events that reach it.
    struct CountingLayer(Arc<Mutex<usize>>);

    impl<Sub: tracing::Subscriber> Layer<Sub> for CountingLayer {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, Sub>) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_empty_detector() {
        let detector = SensitiveFieldDetector::new();
        assert!(!detector.found_sensitive());
        assert!(!detector.leaked());
    }

    #[test]
    fn test_raw_secret_event_is_dropped() {
        let seen = Arc::new(Mutex::new(0));
        let subscriber = tracing_subscriber::registry()
            .with(RedactingLayer::new(CountingLayer(seen.clone())));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(token = "eyJhbGciOi.raw", "leaky");
            tracing::info!(token = %Redacted::new("eyJhbGciOi.raw"), "safe");
            tracing::info!(video_id = "abc", "plain");
        });

        assert_eq!(*seen.lock().unwrap(), 2);
    }
}
