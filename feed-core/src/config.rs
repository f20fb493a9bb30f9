//! Configuration types

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::{FeedCachePolicy, DEFAULT_MAX_CACHE_AGE_DAYS};

/// Which concrete store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Single JSON document on disk.
    #[default]
    Json,
    /// LMDB environment with a cache record and ordered image records.
    Lmdb,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "lmdb" => Ok(Self::Lmdb),
            other => Err(ConfigError::UnknownBackend {
                backend: other.to_string(),
            }),
        }
    }
}

/// Feed cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedCacheConfig {
    pub backend: StoreBackend,
    /// File path for [`StoreBackend::Json`], environment directory for
    /// [`StoreBackend::Lmdb`].
    pub store_path: PathBuf,
    /// Maximum age in seconds before a snapshot is stale.
    pub max_age_secs: i64,
    pub lmdb_map_size_mb: usize,
}

impl Default for FeedCacheConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            store_path: std::env::temp_dir().join("feed-cache").join("feed.store"),
            max_age_secs: DEFAULT_MAX_CACHE_AGE_DAYS * 86_400,
            lmdb_map_size_mb: 16,
        }
    }
}

impl FeedCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `FEED_CACHE_*` environment variables.
    ///
    /// Absent variables fall back to defaults; present but unparseable ones
    /// are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(backend) = lookup("FEED_CACHE_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(path) = lookup("FEED_CACHE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("FEED_CACHE_MAX_AGE_SECS") {
            config.max_age_secs = parse_field("FEED_CACHE_MAX_AGE_SECS", &raw)?;
        }
        if let Some(raw) = lookup("FEED_CACHE_LMDB_MAP_SIZE_MB") {
            config.lmdb_map_size_mb = parse_field("FEED_CACHE_LMDB_MAP_SIZE_MB", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_secs = max_age.num_seconds();
        self
    }

    pub fn with_lmdb_map_size_mb(mut self, size: usize) -> Self {
        self.lmdb_map_size_mb = size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_age_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_age_secs".to_string(),
                value: self.max_age_secs.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if Duration::try_seconds(self.max_age_secs).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "max_age_secs".to_string(),
                value: self.max_age_secs.to_string(),
                reason: "out of range".to_string(),
            });
        }
        if self.lmdb_map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lmdb_map_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.lmdb_map_size_bytes().is_none() {
            return Err(ConfigError::InvalidValue {
                field: "lmdb_map_size_mb".to_string(),
                value: self.lmdb_map_size_mb.to_string(),
                reason: "map size in bytes overflows".to_string(),
            });
        }
        Ok(())
    }

    /// LMDB map size in bytes, or `None` if it does not fit in `usize`.
    pub fn lmdb_map_size_bytes(&self) -> Option<usize> {
        self.lmdb_map_size_mb.checked_mul(1024 * 1024)
    }

    /// The freshness policy this configuration describes.
    ///
    /// An out-of-range age saturates to the largest representable duration.
    pub fn policy(&self) -> FeedCachePolicy {
        let max_age = Duration::try_seconds(self.max_age_secs).unwrap_or(Duration::MAX);
        FeedCachePolicy::new().with_max_age(max_age)
    }
}

fn parse_field<T: FromStr>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_is_empty() {
        let config = FeedCacheConfig::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config, FeedCacheConfig::default());
        assert_eq!(config.policy().max_age(), Duration::days(7));
    }

    #[test]
    fn test_env_overrides() {
        let config = FeedCacheConfig::from_lookup(lookup_from(&[
            ("FEED_CACHE_BACKEND", "LMDB"),
            ("FEED_CACHE_PATH", "/var/cache/feed"),
            ("FEED_CACHE_MAX_AGE_SECS", "3600"),
            ("FEED_CACHE_LMDB_MAP_SIZE_MB", "64"),
        ]))
        .expect("valid config");

        assert_eq!(config.backend, StoreBackend::Lmdb);
        assert_eq!(config.store_path, PathBuf::from("/var/cache/feed"));
        assert_eq!(config.policy().max_age(), Duration::hours(1));
        assert_eq!(config.lmdb_map_size_mb, 64);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = FeedCacheConfig::from_lookup(lookup_from(&[("FEED_CACHE_BACKEND", "sqlite")]))
            .expect_err("unknown backend");
        assert!(matches!(err, ConfigError::UnknownBackend { .. }));
    }

    #[test]
    fn test_unparseable_and_invalid_values_rejected() {
        let err = FeedCacheConfig::from_lookup(lookup_from(&[("FEED_CACHE_MAX_AGE_SECS", "soon")]))
            .expect_err("not a number");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = FeedCacheConfig::from_lookup(lookup_from(&[("FEED_CACHE_MAX_AGE_SECS", "0")]))
            .expect_err("zero max age");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_age_secs"));

        assert!(FeedCacheConfig::new().with_lmdb_map_size_mb(0).validate().is_err());
    }

    #[test]
    fn test_max_age_beyond_duration_range_rejected() {
        let max = i64::MAX.to_string();
        let err = FeedCacheConfig::from_lookup(lookup_from(&[("FEED_CACHE_MAX_AGE_SECS", &max)]))
            .expect_err("max age out of range");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_age_secs"));
    }

    #[test]
    fn test_policy_saturates_out_of_range_max_age() {
        let config = FeedCacheConfig {
            max_age_secs: i64::MAX,
            ..FeedCacheConfig::default()
        };
        assert_eq!(config.policy().max_age(), Duration::MAX);
    }

    #[test]
    fn test_map_size_overflow_rejected() {
        let config = FeedCacheConfig::new().with_lmdb_map_size_mb(usize::MAX);
        assert_eq!(config.lmdb_map_size_bytes(), None);
        let err = config.validate().expect_err("map size overflows");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "lmdb_map_size_mb"));

        assert_eq!(
            FeedCacheConfig::new().with_lmdb_map_size_mb(4).lmdb_map_size_bytes(),
            Some(4 * 1024 * 1024)
        );
    }
}
