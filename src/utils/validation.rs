use url::Url;

use crate::error::{Result, TaskFlowError};

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    /// Accepts absolute `http`/`https` URLs with a host.
    pub fn validate_url(raw: &str) -> Result<Url> {
        if raw.trim().is_empty() {
            return Err(TaskFlowError::Config("url must not be empty".into()));
        }
        let url = Url::parse(raw.trim())
            .map_err(|e| TaskFlowError::Config(format!("invalid url `{raw}`: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TaskFlowError::Config(format!(
                "url `{raw}` must start with http:// or https://"
            )));
        }
        if url.host_str().is_none() {
            return Err(TaskFlowError::Config(format!("url `{raw}` has no host")));
        }
        Ok(url)
    }

    pub fn validate_prompt(prompt: &str) -> Result<()> {
        if prompt.trim().is_empty() {
            return Err(TaskFlowError::Config("prompt must not be empty".into()));
        }
        Ok(())
    }

    pub fn validate_budget(name: &str, value: u32) -> Result<()> {
        if value == 0 {
            return Err(TaskFlowError::Config(format!("{name} must be greater than 0")));
        }
        Ok(())
    }

    /// Block labels double as parameter key prefixes.
    pub fn validate_label(label: &str) -> Result<()> {
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(TaskFlowError::Config(format!(
                "block label `{label}` may only contain letters, digits, `_` and `-`"
            )));
        }
        Ok(())
    }
}
