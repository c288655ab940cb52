mod consumers;
mod context;
mod flush;
mod intake;
mod monitor;

pub use consumers::{apply_batch_count, process_batch_count_job};
pub use context::{ConsumerContext, FlushContext, IntakeContext, job_failed};
pub use flush::{BatchFlushTask, FlushLikeCountsJob, FlushReport, process_flush_job};
pub use intake::{IntakeOutcome, handle_like_command, process_like_command_job};
pub use monitor::{JobMonitor, MonitorOptions};
