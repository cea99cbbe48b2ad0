use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::env::EnvConfig;
use crate::error::Result;
use crate::utils::ConfigValidator;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_MAX_STEPS: u32 = 50;
pub const DEFAULT_UPLOAD_DRAIN_SECS: u64 = 30;

/// Budgets and knobs for one planning loop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    pub max_iterations: u32,
    /// Run-wide browser step budget unless the TaskRun overrides it.
    pub max_steps: u32,
    #[serde(with = "duration_secs")]
    pub upload_drain_timeout: Duration,
    #[serde(with = "optional_duration_secs")]
    pub run_timeout: Option<Duration>,
    #[serde(skip_serializing)]
    pub webhook_api_key: Option<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_steps: DEFAULT_MAX_STEPS,
            upload_drain_timeout: Duration::from_secs(DEFAULT_UPLOAD_DRAIN_SECS),
            run_timeout: None,
            webhook_api_key: None,
        }
    }
}

impl PlannerConfig {
    /// Defaults overlaid with `TASKFLOW_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = EnvConfig::get_parsed::<u32>("TASKFLOW_MAX_ITERATIONS")? {
            config.max_iterations = value;
        }
        if let Some(value) = EnvConfig::get_parsed::<u32>("TASKFLOW_MAX_STEPS")? {
            config.max_steps = value;
        }
        if let Some(secs) = EnvConfig::get_parsed::<u64>("TASKFLOW_UPLOAD_TIMEOUT_SECS")? {
            config.upload_drain_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = EnvConfig::get_parsed::<u64>("TASKFLOW_RUN_TIMEOUT_SECS")? {
            config.run_timeout = Some(Duration::from_secs(secs));
        }
        config.webhook_api_key = EnvConfig::get_env_optional("TASKFLOW_WEBHOOK_API_KEY");
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ConfigValidator::validate_budget("max_iterations", self.max_iterations)?;
        ConfigValidator::validate_budget("max_steps", self.max_steps)?;
        Ok(())
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn with_webhook_api_key(mut self, key: impl Into<String>) -> Self {
        self.webhook_api_key = Some(key.into());
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

mod optional_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
