//! Statistics and metrics for streams

pub mod metrics;

pub use metrics::StreamStats;
