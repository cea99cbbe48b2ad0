use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::block::{Block, BlockResult};
use crate::error::Result;

use super::browser::BrowserSession;

/// Everything a browser-facing executor needs to run one leaf block.
pub struct BlockInvocation<'a> {
    pub block: &'a Block,
    /// Block URL with parameter references already resolved.
    pub url: Option<String>,
    pub parameters: HashMap<String, Value>,
    pub workflow_run_id: &'a str,
    pub organization_id: &'a str,
    /// Steps this block may still spend before the run budget is gone.
    pub max_steps: u32,
    pub browser: Arc<dyn BrowserSession>,
}

/// Runs GoToUrl, Navigate, Extract and Task blocks against the browser.
#[async_trait]
pub trait BlockExecutor: Send + Sync {
    async fn execute(&self, invocation: BlockInvocation<'_>) -> Result<BlockResult>;
}
