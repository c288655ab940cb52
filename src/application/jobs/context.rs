use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::application::likes::LikeService;
use crate::application::repos::CounterWriteRepo;

use super::flush::BatchFlushTask;

/// Shared state of the cron-driven flush worker.
#[derive(Clone)]
pub struct FlushContext {
    pub task: Arc<BatchFlushTask>,
}

/// Shared state of the batch-count consumers.
#[derive(Clone)]
pub struct ConsumerContext {
    pub counters: Arc<dyn CounterWriteRepo>,
}

/// Shared state of the like-command intake worker.
#[derive(Clone)]
pub struct IntakeContext {
    pub likes: LikeService,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
