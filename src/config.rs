//! Configuration management for Tollgate.
//!
//! Policies are named rate limits that can be kept in a YAML file instead of
//! being built in code:
//!
//! ```yaml
//! policies:
//!   login:
//!     algorithm: sliding_window_log
//!     limit: 5
//!     unit: minute
//!   api:
//!     limit: 100
//!     unit: second
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::algorithm::{Algorithm, AlgorithmKind};
use crate::error::{Result, TollgateError};
use crate::ratelimit::RateLimitConfig;

/// Environment variable prefix recognized by [`TollgateConfig::load`].
pub const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for Tollgate.
///
/// Policy names are case-insensitive and stored lowercased, matching the
/// keys the environment layer of [`TollgateConfig::load`] produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Named rate limit policies
    #[serde(default)]
    pub policies: HashMap<String, PolicyConfig>,
}

/// A single named rate limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Algorithm enforcing the limit
    #[serde(default)]
    pub algorithm: AlgorithmKind,

    /// Maximum requests per window
    pub limit: u64,

    /// Time unit of the window
    pub unit: TimeUnit,

    /// Number of units in the window
    #[serde(default = "default_units")]
    pub units: u32,
}

fn default_units() -> u32 {
    1
}

/// Time unit for policy windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(60 * 60),
            TimeUnit::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl PolicyConfig {
    /// Window length, `unit × units`.
    pub fn window(&self) -> Result<Duration> {
        self.unit.duration().checked_mul(self.units).ok_or_else(|| {
            TollgateError::Config(format!("{} x {:?} overflows", self.units, self.unit))
        })
    }

    /// Validated limit for this policy.
    pub fn rate_limit(&self) -> Result<RateLimitConfig> {
        RateLimitConfig::new(self.limit, self.window()?)
    }

    /// Algorithm instance for this policy.
    pub fn algorithm(&self) -> Box<dyn Algorithm> {
        self.algorithm.build()
    }
}

impl TollgateConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig =
            serde_yaml::from_str(yaml).map_err(|e| TollgateError::Config(e.to_string()))?;
        config.normalized()
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;

        info!(
            path = %path.display(),
            policies = config.policies.len(),
            "Loaded rate limit policies"
        );
        Ok(config)
    }

    /// Load a YAML file layered with `TOLLGATE__`-prefixed environment
    /// variables, e.g. `TOLLGATE__POLICIES__API__LIMIT=200`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: TollgateConfig = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TollgateError::Config(e.to_string()))?;
        let config = config.normalized()?;

        info!(
            path = %path.display(),
            policies = config.policies.len(),
            "Loaded rate limit policies with environment overrides"
        );
        Ok(config)
    }

    /// Look up a policy by name, ignoring case.
    pub fn policy(&self, name: &str) -> Option<&PolicyConfig> {
        let policy = self.policies.get(&name.to_lowercase());
        if policy.is_none() {
            debug!(policy = name, "No such rate limit policy");
        }
        policy
    }

    /// Lowercase policy names, rejecting names that differ only in case.
    fn normalized(self) -> Result<Self> {
        let mut policies = HashMap::with_capacity(self.policies.len());
        for (name, policy) in self.policies {
            let lowered = name.to_lowercase();
            if policies.insert(lowered.clone(), policy).is_some() {
                return Err(TollgateError::Config(format!(
                    "policy '{}' is defined more than once (names are case-insensitive)",
                    lowered
                )));
            }
        }
        Ok(Self { policies })
    }
}
