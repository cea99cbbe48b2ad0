use tracing::{info, warn};

use super::model::Block;
use super::outcome::Outcome;
use super::result::{BlockResult, BlockStatus};

/// Maps a finished block onto what the planning loop does next.
///
/// Failures never stop the loop here; they land in the task history and the
/// next planning step decides. Only a canceled block ends the run.
pub fn handle_block_result(block: &Block, result: &BlockResult, is_last_block: bool) -> Outcome<()> {
    match result.status {
        BlockStatus::Canceled => {
            info!(block_label = %block.label, "block canceled, stopping run");
            Outcome::Canceled
        }
        BlockStatus::Failed | BlockStatus::Terminated => {
            let reason = result
                .failure_reason
                .clone()
                .unwrap_or_else(|| format!("block `{}` {}", block.label, result.status));
            if block.continue_on_failure && !is_last_block {
                info!(
                    block_label = %block.label,
                    status = %result.status,
                    reason = %reason,
                    "block failed but continue_on_failure is set"
                );
            } else {
                warn!(
                    block_label = %block.label,
                    status = %result.status,
                    reason = %reason,
                    "block did not complete"
                );
            }
            Outcome::RetryableFailure(reason)
        }
        BlockStatus::Completed => Outcome::Success(()),
        BlockStatus::Created | BlockStatus::Running => {
            warn!(block_label = %block.label, status = %result.status, "executor returned a non-terminal status");
            Outcome::RetryableFailure(format!(
                "block `{}` returned non-terminal status `{}`",
                block.label, result.status
            ))
        }
    }
}
