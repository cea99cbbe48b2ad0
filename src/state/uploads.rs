use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
    /// Still running when the drain deadline passed; left detached.
    pub abandoned: usize,
}

/// Fire-and-forget uploads owned by one run.
#[derive(Clone, Default)]
pub struct UploadTracker {
    tasks: Arc<Mutex<JoinSet<Result<()>>>>,
}

impl UploadTracker {
    pub fn track<F>(&self, label: impl Into<String>, upload: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let label = label.into();
        self.tasks.lock().spawn(async move {
            let result = upload.await;
            if let Err(error) = &result {
                warn!(artifact = %label, error = %error, "artifact upload failed");
            }
            result
        });
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Waits for tracked uploads, giving up after `timeout`.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        let mut set = std::mem::take(&mut *self.tasks.lock());
        let mut report = DrainReport::default();

        let waited = tokio::time::timeout(timeout, async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(Ok(())) => report.completed += 1,
                    _ => report.failed += 1,
                }
            }
        })
        .await;

        if waited.is_err() {
            report.abandoned = set.len();
            warn!(
                abandoned = report.abandoned,
                timeout_secs = timeout.as_secs(),
                "artifact uploads still running at drain deadline"
            );
            set.detach_all();
        } else {
            debug!(completed = report.completed, failed = report.failed, "artifact uploads drained");
        }
        report
    }
}
