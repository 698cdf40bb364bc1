//! Gate configuration.
//!
//! [`GateConfig`] can be built in code, deserialized from any serde format
//! using the `CACHE_TTL_MS`-style option names, or read from the process
//! environment with [`GateConfig::from_env`].

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Error returned when a configuration value is missing its mark.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Cache must hold at least one entry
    ZeroCacheSize,
    /// Eviction fraction must be in (0, 1]
    InvalidEvictionFraction(f64),
    /// Sampling rate must be in [0, 1]
    InvalidSamplingRate(f64),
    /// Sweep probability must be in [0, 1]
    InvalidSweepProbability(f64),
    /// Loop detection needs at least one allowed call
    ZeroBurstMaxCalls,
    /// An environment value could not be parsed
    InvalidValue {
        /// Option name
        name: &'static str,
        /// The raw value
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroCacheSize => write!(f, "cache max size must be greater than 0"),
            ConfigError::InvalidEvictionFraction(v) => {
                write!(f, "eviction fraction must be in (0, 1], got {}", v)
            }
            ConfigError::InvalidSamplingRate(v) => {
                write!(f, "sampling rate must be in [0, 1], got {}", v)
            }
            ConfigError::InvalidSweepProbability(v) => {
                write!(f, "sweep probability must be in [0, 1], got {}", v)
            }
            ConfigError::ZeroBurstMaxCalls => write!(f, "burst max calls must be greater than 0"),
            ConfigError::InvalidValue { name, value } => {
                write!(f, "invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Tunables for an admission gate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Freshness window for cached successful outcomes
    #[serde(rename = "CACHE_TTL_MS", with = "duration_ms")]
    pub cache_ttl: Duration,
    /// Freshness window for cached failed outcomes; `None` uses `cache_ttl`
    #[serde(rename = "CACHE_FAILURE_TTL_MS", with = "optional_duration_ms")]
    pub failure_ttl: Option<Duration>,
    /// Cache size that triggers eviction
    #[serde(rename = "CACHE_MAX_SIZE")]
    pub cache_max_size: usize,
    /// Share of the cache removed per eviction
    #[serde(rename = "CACHE_EVICTION_FRACTION")]
    pub eviction_fraction: f64,
    /// Admitted calls per identity per hour
    #[serde(rename = "RATE_LIMIT_PER_IDENTITY_PER_HOUR")]
    pub rate_limit_per_identity: u64,
    /// Admitted calls per instance per hour
    #[serde(rename = "RATE_LIMIT_GLOBAL_PER_HOUR")]
    pub rate_limit_global: u64,
    /// Gap under which consecutive calls count as fast
    #[serde(rename = "BURST_FAST_THRESHOLD_MS", with = "duration_ms")]
    pub burst_fast_threshold: Duration,
    /// Fast calls in a row tolerated before a loop is declared
    #[serde(rename = "BURST_MAX_CALLS")]
    pub burst_max_calls: u32,
    /// Probability that a call passes sampling
    #[serde(rename = "SAMPLING_RATE")]
    pub sampling_rate: f64,
    /// Freshness window for durable records; `None` uses `cache_ttl`
    #[serde(rename = "DEDUPE_TTL_MS", with = "optional_duration_ms")]
    pub dedupe_ttl: Option<Duration>,
    /// Probability that an evaluation also runs housekeeping
    #[serde(rename = "SWEEP_PROBABILITY")]
    pub sweep_probability: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5 * 60),
            failure_ttl: None,
            cache_max_size: 1000,
            eviction_fraction: 0.3,
            rate_limit_per_identity: 100,
            rate_limit_global: 10_000,
            burst_fast_threshold: Duration::from_millis(1000),
            burst_max_calls: 5,
            sampling_rate: 1.0,
            dedupe_ttl: None,
            sweep_probability: 0.01,
        }
    }
}

impl GateConfig {
    /// Failure freshness window after defaulting.
    pub fn effective_failure_ttl(&self) -> Duration {
        self.failure_ttl.unwrap_or(self.cache_ttl)
    }

    /// Durable freshness window after defaulting.
    pub fn effective_dedupe_ttl(&self) -> Duration {
        self.dedupe_ttl.unwrap_or(self.cache_ttl)
    }

    /// Check every value is in range.
    ///
    /// # Errors
    /// Returns the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_max_size == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(ConfigError::InvalidEvictionFraction(self.eviction_fraction));
        }
        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(ConfigError::InvalidSamplingRate(self.sampling_rate));
        }
        if !(0.0..=1.0).contains(&self.sweep_probability) {
            return Err(ConfigError::InvalidSweepProbability(self.sweep_probability));
        }
        if self.burst_max_calls == 0 {
            return Err(ConfigError::ZeroBurstMaxCalls);
        }
        Ok(())
    }

    /// Read overrides from the process environment.
    ///
    /// Unset or blank variables keep their defaults.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for unparsable values and any
    /// range error from [`GateConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through `lookup`, which maps option names to raw values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &'static str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        if let Some(ms) = parse::<u64>(get("CACHE_TTL_MS"), "CACHE_TTL_MS")? {
            config.cache_ttl = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(get("CACHE_FAILURE_TTL_MS"), "CACHE_FAILURE_TTL_MS")? {
            config.failure_ttl = Some(Duration::from_millis(ms));
        }
        if let Some(size) = parse(get("CACHE_MAX_SIZE"), "CACHE_MAX_SIZE")? {
            config.cache_max_size = size;
        }
        if let Some(fraction) = parse(get("CACHE_EVICTION_FRACTION"), "CACHE_EVICTION_FRACTION")? {
            config.eviction_fraction = fraction;
        }
        if let Some(limit) = parse(
            get("RATE_LIMIT_PER_IDENTITY_PER_HOUR"),
            "RATE_LIMIT_PER_IDENTITY_PER_HOUR",
        )? {
            config.rate_limit_per_identity = limit;
        }
        if let Some(limit) = parse(get("RATE_LIMIT_GLOBAL_PER_HOUR"), "RATE_LIMIT_GLOBAL_PER_HOUR")? {
            config.rate_limit_global = limit;
        }
        if let Some(ms) = parse::<u64>(get("BURST_FAST_THRESHOLD_MS"), "BURST_FAST_THRESHOLD_MS")? {
            config.burst_fast_threshold = Duration::from_millis(ms);
        }
        if let Some(calls) = parse(get("BURST_MAX_CALLS"), "BURST_MAX_CALLS")? {
            config.burst_max_calls = calls;
        }
        if let Some(rate) = parse(get("SAMPLING_RATE"), "SAMPLING_RATE")? {
            config.sampling_rate = rate;
        }
        if let Some(ms) = parse::<u64>(get("DEDUPE_TTL_MS"), "DEDUPE_TTL_MS")? {
            config.dedupe_ttl = Some(Duration::from_millis(ms));
        }
        if let Some(p) = parse(get("SWEEP_PROBABILITY"), "SWEEP_PROBABILITY")? {
            config.sweep_probability = p;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { name, value })
    })
    .transpose()
}

mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
