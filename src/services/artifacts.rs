use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}
