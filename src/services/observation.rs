use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::browser::BrowserSession;

/// LLM-consumable snapshot of the current page.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Observation {
    pub element_tree_html: String,
    #[serde(default, skip_serializing)]
    pub screenshots: Vec<Vec<u8>>,
    pub current_url: String,
}

#[async_trait]
pub trait PageObserver: Send + Sync {
    async fn observe(&self, browser: &dyn BrowserSession, url: Option<&str>) -> Result<Observation>;
}
