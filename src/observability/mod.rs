pub mod metrics;
pub mod redact_layer;
