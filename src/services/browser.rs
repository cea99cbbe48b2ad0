use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::WorkflowRun;

pub const BLANK_PAGE: &str = "about:blank";

/// Live browser scoped to one run.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Re-read on every call: navigation can swap the active page.
    async fn current_url(&self) -> Result<String>;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn open(&self, workflow_run: &WorkflowRun) -> Result<Arc<dyn BrowserSession>>;
}
