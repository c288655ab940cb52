//! Queued like commands pushed by other services.

use apalis::prelude::{Data, Error as ApalisError};
use tracing::{info, warn};

use crate::application::likes::{LikeError, LikeService};
use crate::domain::likes::LikeCommand;

use super::context::{IntakeContext, job_failed};

/// What became of one queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    Applied,
    /// Rejected for good; retrying cannot change the answer.
    Dropped,
}

/// Applies `command`. Only failures that left nothing applied are returned,
/// so the queue retries those and acknowledges everything else.
pub async fn handle_like_command(
    likes: &LikeService,
    command: &LikeCommand,
) -> Result<IntakeOutcome, LikeError> {
    match likes
        .like(
            command.actor_id,
            command.target_id,
            command.action_type,
            command.is_cancel,
        )
        .await
    {
        Ok(()) => Ok(IntakeOutcome::Applied),
        Err(err) if err.is_retryable() => Err(err),
        Err(err) if err.is_noop() => {
            info!(
                target = "kudos::application::jobs::intake",
                actor_id = command.actor_id,
                target_id = command.target_id,
                action_type = %command.action_type,
                reason = %err,
                "Redundant like command dropped"
            );
            Ok(IntakeOutcome::Dropped)
        }
        Err(err) => {
            warn!(
                target = "kudos::application::jobs::intake",
                actor_id = command.actor_id,
                target_id = command.target_id,
                action_type = %command.action_type,
                error = %err,
                "Like command dropped"
            );
            Ok(IntakeOutcome::Dropped)
        }
    }
}

pub async fn process_like_command_job(
    command: LikeCommand,
    ctx: Data<IntakeContext>,
) -> Result<(), ApalisError> {
    handle_like_command(&ctx.likes, &command)
        .await
        .map_err(job_failed)?;
    Ok(())
}
