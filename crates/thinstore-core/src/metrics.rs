//! Metrics collaborator
//!
//! The manager reports through [`MetricsSink::record`]. [`RecorderSink`]
//! forwards every sample to the `metrics` facade as a gauge named
//! `thinstore_<name>` and labelled with its unit and category; whichever
//! recorder the process installs (e.g. the Prometheus exporter in the
//! daemon) receives them.
//!
//! # Recorded metrics
//!
//! - `overcommit_coefficient`, `virtual_limit_bytes` (category `capacity`)
//! - `physical_used_bytes`, `virtual_used_bytes` (category `capacity`)
//! - `tier_moves`, `offloaded_files`, `offloaded_bytes` (category `tiering`)
//! - `cache_bytes`, `cache_evictions`, `cache_hit_ratio` (category `cache`)

/// Metrics collaborator
pub trait MetricsSink: Send + Sync {
    /// Record one sample
    fn record(&self, name: &str, value: f64, unit: &str, category: &str);
}

/// Forwards samples to the `metrics` facade
#[derive(Debug, Clone)]
pub struct RecorderSink {
    prefix: String,
}

impl Default for RecorderSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderSink {
    pub fn new() -> Self {
        Self {
            prefix: "thinstore".to_string(),
        }
    }

    /// Use a different metric name prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.prefix, name)
        }
    }
}

impl MetricsSink for RecorderSink {
    fn record(&self, name: &str, value: f64, unit: &str, category: &str) {
        metrics::gauge!(
            self.metric_name(name),
            "unit" => unit.to_string(),
            "category" => category.to_string()
        )
        .set(value);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::MetricsSink;
    use parking_lot::Mutex;

    /// Sink that keeps every sample for assertions
    #[derive(Default)]
    pub struct CapturingSink {
        pub samples: Mutex<Vec<(String, f64, String, String)>>,
    }

    impl CapturingSink {
        pub fn last(&self, name: &str) -> Option<f64> {
            self.samples
                .lock()
                .iter()
                .rev()
                .find(|(n, ..)| n == name)
                .map(|(_, v, ..)| *v)
        }
    }

    impl MetricsSink for CapturingSink {
        fn record(&self, name: &str, value: f64, unit: &str, category: &str) {
            self.samples
                .lock()
                .push((name.into(), value, unit.into(), category.into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_name_prefix() {
        assert_eq!(RecorderSink::new().metric_name("cache_bytes"), "thinstore_cache_bytes");
        assert_eq!(RecorderSink::with_prefix("").metric_name("x"), "x");
        assert_eq!(RecorderSink::default().metric_name("x"), "thinstore_x");
    }

    #[test]
    fn test_record_without_recorder_is_harmless() {
        RecorderSink::new().record("tier_moves", 3.0, "count", "tiering");
    }

    #[test]
    fn test_capturing_sink() {
        let sink = testing::CapturingSink::default();
        sink.record("a", 1.0, "count", "x");
        sink.record("a", 2.0, "count", "x");
        assert_eq!(sink.last("a"), Some(2.0));
        assert_eq!(sink.last("b"), None);
    }
}
