use std::str::FromStr;
use std::time::Duration;

use querygate_core::QueryError;
use serde::{Deserialize, Serialize};

use crate::normalize::NormalizerConfig;

pub const DEFAULT_MAX_SIZE: usize = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_SCHEMA_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Construction parameters of a [`QueryGate`](crate::QueryGate).
///
/// Durations serialize as fractional seconds (`admission_timeout` as
/// milliseconds), matching the environment variables read by
/// [`from_env`](QueryGateConfig::from_env).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryGateConfig {
    pub max_size: usize,
    #[serde(with = "secs")]
    pub default_ttl: Duration,
    #[serde(with = "secs")]
    pub schema_ttl: Duration,
    pub max_concurrent: usize,
    /// Default cap on admission waits; per-call options override it.
    #[serde(with = "opt_millis")]
    pub admission_timeout: Option<Duration>,
    pub cache_enabled: bool,
    pub coalescing_enabled: bool,
    pub normalizer: NormalizerConfig,
}

impl Default for QueryGateConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            default_ttl: DEFAULT_TTL,
            schema_ttl: DEFAULT_SCHEMA_TTL,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            admission_timeout: None,
            cache_enabled: true,
            coalescing_enabled: true,
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl QueryGateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_schema_ttl(mut self, ttl: Duration) -> Self {
        self.schema_ttl = ttl;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = Some(timeout);
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_coalescing_enabled(mut self, enabled: bool) -> Self {
        self.coalescing_enabled = enabled;
        self
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.max_size == 0 {
            return Err(QueryError::Configuration(
                "max_size must be greater than zero".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(QueryError::Configuration(
                "default_ttl must be greater than zero".to_string(),
            ));
        }
        if self.schema_ttl.is_zero() {
            return Err(QueryError::Configuration(
                "schema_ttl must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(QueryError::Configuration(
                "max_concurrent must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Read overrides from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `QUERY_CACHE_ENABLED` | `cache_enabled` |
    /// | `QUERY_CACHE_MAX_SIZE` | `max_size` |
    /// | `QUERY_CACHE_TTL` | `default_ttl` (seconds) |
    /// | `SCHEMA_CACHE_TTL` | `schema_ttl` (seconds) |
    /// | `MAX_CONCURRENT_LLM` | `max_concurrent` |
    /// | `COALESCING_ENABLED` | `coalescing_enabled` |
    /// | `ADMISSION_TIMEOUT_MS` | `admission_timeout` |
    pub fn from_env() -> Result<Self, QueryError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, QueryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(enabled) = parse_var(&lookup, "QUERY_CACHE_ENABLED", parse_bool)? {
            config.cache_enabled = enabled;
        }
        if let Some(max_size) = parse_var(&lookup, "QUERY_CACHE_MAX_SIZE", usize::from_str)? {
            config.max_size = max_size;
        }
        if let Some(ttl) = parse_var(&lookup, "QUERY_CACHE_TTL", parse_secs)? {
            config.default_ttl = ttl;
        }
        if let Some(ttl) = parse_var(&lookup, "SCHEMA_CACHE_TTL", parse_secs)? {
            config.schema_ttl = ttl;
        }
        if let Some(max) = parse_var(&lookup, "MAX_CONCURRENT_LLM", usize::from_str)? {
            config.max_concurrent = max;
        }
        if let Some(enabled) = parse_var(&lookup, "COALESCING_ENABLED", parse_bool)? {
            config.coalescing_enabled = enabled;
        }
        if let Some(ms) = parse_var(&lookup, "ADMISSION_TIMEOUT_MS", u64::from_str)? {
            config.admission_timeout = Some(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<F, T, E, P>(lookup: &F, name: &str, parse: P) -> Result<Option<T>, QueryError>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, E>,
    E: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => parse(raw.trim())
            .map(Some)
            .map_err(|e| QueryError::Configuration(format!("{name}={raw:?}: {e}"))),
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err("expected a boolean".to_string()),
    }
}

fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs = f64::from_str(raw).map_err(|e| e.to_string())?;
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
