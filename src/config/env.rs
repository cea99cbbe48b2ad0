use std::env;
use std::str::FromStr;

use crate::error::{Result, TaskFlowError};

/// 环境变量配置管理
pub struct EnvConfig;

impl EnvConfig {
    /// Resolves an API key.
    ///
    /// `${VAR}` reads `VAR`, an empty string or a `your_` placeholder reads
    /// `default_env_var`, anything else is taken literally.
    pub fn get_api_key(api_key: &str, default_env_var: &str) -> Result<String> {
        if let Some(name) = api_key
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            Self::get_env(name)
        } else if api_key.is_empty() || api_key.starts_with("your_") {
            Self::get_env(default_env_var)
        } else {
            Ok(api_key.to_string())
        }
    }

    pub fn get_env(key: &str) -> Result<String> {
        env::var(key).map_err(|_| {
            TaskFlowError::Config(format!("environment variable `{key}` is not set"))
        })
    }

    pub fn get_env_optional(key: &str) -> Option<String> {
        env::var(key).ok().filter(|value| !value.trim().is_empty())
    }

    /// Parses an optional variable; a present but malformed value is an error.
    pub fn get_parsed<T>(key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match Self::get_env_optional(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                TaskFlowError::Config(format!("`{key}` has invalid value `{raw}`: {e}"))
            }),
        }
    }

    pub fn is_debug_mode() -> bool {
        env::var("TASKFLOW_DEBUG").is_ok()
    }
}
