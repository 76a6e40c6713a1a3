use crate::backoff::{BackoffPolicy, RetryLimit};
use crate::client::HealthStatus;
use crate::env::{
    env_or, ES_SINK_BUFFERING_ENV, ES_SINK_BUFFER_LIMIT_ENV, ES_SINK_ES_VERSION_ENV,
    ES_SINK_FLUSH_INTERVAL_MS_ENV, ES_SINK_INDEX_ENV, ES_SINK_INDEX_PREFIX_ENV, ES_SINK_PIPELINE_ENV,
    ES_SINK_RETRY_LIMIT_ENV,
};
use crate::error::WriterError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Prefix used for daily index names and for the template name.
#[derive(Clone)]
pub enum IndexPrefix {
    Fixed(String),
    /// Evaluated every time an index name or template name is needed.
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

impl IndexPrefix {
    pub fn computed(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        IndexPrefix::Computed(Arc::new(f))
    }

    pub fn resolve(&self) -> String {
        match self {
            IndexPrefix::Fixed(prefix) => prefix.clone(),
            IndexPrefix::Computed(f) => f(),
        }
    }
}

impl fmt::Debug for IndexPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexPrefix::Fixed(prefix) => f.debug_tuple("Fixed").field(prefix).finish(),
            IndexPrefix::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for IndexPrefix {
    fn from(prefix: &str) -> Self {
        IndexPrefix::Fixed(prefix.to_string())
    }
}

impl From<String> for IndexPrefix {
    fn from(prefix: String) -> Self {
        IndexPrefix::Fixed(prefix)
    }
}

/// Settings for the readiness check run before any write.
#[derive(Clone, Debug)]
pub struct HealthCheckConfig {
    pub timeout: Duration,
    pub wait_for_status: HealthStatus,
    pub wait_for_nodes: String,
    pub backoff: BackoffPolicy,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            wait_for_status: HealthStatus::Yellow,
            wait_for_nodes: ">=1".to_string(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Configuration of a [`crate::writer::BulkWriter`].
///
/// **Fields**
/// - `interval`: pause between two flushes while records keep arriving.
/// - `buffering`: when `false`, every record is sent on its own right away
///   and dropped if the writer is not ready yet.
/// - `buffer_limit`: maximum number of pending records; the oldest are
///   discarded beyond it.
/// - `retry_limit`: failed sends tolerated per record before it is dropped.
/// - `index`: fixed index name; otherwise `<prefix>-<date>` is used.
/// - `mapping_template`: explicit template document replacing the built-in one.
/// - `verification_mode`: bound the connection retries by `retry_limit`
///   so automated checks terminate.
#[derive(Clone, Debug)]
pub struct WriterConfig {
    pub interval: Duration,
    pub buffering: bool,
    pub buffer_limit: Option<usize>,
    pub retry_limit: u32,
    pub wait_for_active_shards: String,
    pub pipeline: Option<String>,
    pub index_prefix: IndexPrefix,
    pub index: Option<String>,
    pub index_suffix_pattern: String,
    pub doc_type: Option<String>,
    pub ensure_mapping_template: bool,
    pub mapping_template: Option<serde_json::Value>,
    pub elasticsearch_version: u32,
    pub request_timeout: Duration,
    pub health_check: HealthCheckConfig,
    pub verification_mode: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            buffering: true,
            buffer_limit: None,
            retry_limit: 5,
            wait_for_active_shards: "1".to_string(),
            pipeline: None,
            index_prefix: IndexPrefix::Fixed("logs".to_string()),
            index: None,
            index_suffix_pattern: "%Y.%m.%d".to_string(),
            doc_type: None,
            ensure_mapping_template: true,
            mapping_template: None,
            elasticsearch_version: 7,
            request_timeout: Duration::from_secs(30),
            health_check: HealthCheckConfig::default(),
            verification_mode: false,
        }
    }
}

impl WriterConfig {
    /// Build a configuration from `ES_SINK_*` environment variables,
    /// falling back to [`WriterConfig::default`] for anything unset.
    pub fn from_env() -> Result<Self, WriterError> {
        let defaults = WriterConfig::default();

        let interval_ms: u64 = parse_env(
            ES_SINK_FLUSH_INTERVAL_MS_ENV,
            &defaults.interval.as_millis().to_string(),
        )?;
        let buffering: bool = parse_env(ES_SINK_BUFFERING_ENV, "true")?;
        let retry_limit: u32 = parse_env(ES_SINK_RETRY_LIMIT_ENV, &defaults.retry_limit.to_string())?;
        let elasticsearch_version: u32 = parse_env(
            ES_SINK_ES_VERSION_ENV,
            &defaults.elasticsearch_version.to_string(),
        )?;
        let buffer_limit = match std::env::var(ES_SINK_BUFFER_LIMIT_ENV) {
            Ok(raw) => Some(raw.parse::<usize>().map_err(|e| {
                WriterError::Config(format!("{ES_SINK_BUFFER_LIMIT_ENV}={raw}: {e}"))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            interval: Duration::from_millis(interval_ms),
            buffering,
            buffer_limit,
            retry_limit,
            elasticsearch_version,
            index_prefix: IndexPrefix::Fixed(env_or(ES_SINK_INDEX_PREFIX_ENV, "logs")),
            index: std::env::var(ES_SINK_INDEX_ENV).ok(),
            pipeline: std::env::var(ES_SINK_PIPELINE_ENV).ok(),
            ..defaults
        })
    }

    /// Retry policy for the readiness check, bounded in verification mode.
    pub fn connection_backoff(&self) -> BackoffPolicy {
        let limit = if self.verification_mode {
            RetryLimit::Bounded(self.retry_limit)
        } else {
            RetryLimit::Unbounded
        };
        self.health_check.backoff.clone().with_limit(limit)
    }

    /// Index a record created at `at` should be written to.
    pub fn index_name(&self, at: DateTime<Utc>) -> String {
        match &self.index {
            Some(index) => index.clone(),
            None => format!(
                "{}-{}",
                self.index_prefix.resolve(),
                at.format(&self.index_suffix_pattern)
            ),
        }
    }

    /// Document type sent in bulk metadata; typeless endpoints (7+) get none.
    pub fn effective_doc_type(&self) -> Option<String> {
        if self.elasticsearch_version >= 7 {
            None
        } else {
            Some(self.doc_type.clone().unwrap_or_else(|| "_doc".to_string()))
        }
    }

    pub(crate) fn validate(&self) -> Result<(), WriterError> {
        if self.interval.is_zero() {
            return Err(WriterError::Config("interval must be greater than zero".into()));
        }
        if self.index.is_none() && self.index_prefix.resolve().is_empty() {
            return Err(WriterError::Config("index prefix must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, WriterError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let raw = env_or(key, default);
    raw.parse::<T>()
        .map_err(|e| WriterError::Config(format!("{key}={raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_index_from_prefix() {
        let config = WriterConfig {
            index_prefix: "app".into(),
            ..Default::default()
        };
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(config.index_name(at), "app-2024.03.09");
    }

    #[test]
    fn explicit_index_wins_over_prefix() {
        let config = WriterConfig {
            index: Some("fixed".into()),
            ..Default::default()
        };
        assert_eq!(config.index_name(Utc::now()), "fixed");
    }

    #[test]
    fn computed_prefix_is_evaluated_per_call() {
        let config = WriterConfig {
            index_prefix: IndexPrefix::computed(|| "tenant-a".to_string()),
            index_suffix_pattern: "%Y".into(),
            ..Default::default()
        };
        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(config.index_name(at), "tenant-a-2023");
    }

    #[test]
    fn doc_type_only_for_legacy_endpoints() {
        let mut config = WriterConfig::default();
        assert_eq!(config.effective_doc_type(), None);
        config.elasticsearch_version = 6;
        assert_eq!(config.effective_doc_type().as_deref(), Some("_doc"));
        config.doc_type = Some("log".into());
        assert_eq!(config.effective_doc_type().as_deref(), Some("log"));
    }

    #[test]
    fn verification_mode_bounds_connection_retries() {
        let mut config = WriterConfig::default();
        assert_eq!(config.connection_backoff().limit, RetryLimit::Unbounded);
        config.verification_mode = true;
        config.retry_limit = 3;
        assert_eq!(config.connection_backoff().limit, RetryLimit::Bounded(3));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = WriterConfig {
            interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
