// Render scheduler - jobs, worker pool and the pass graph

pub mod graph;
pub mod host_semaphore;
pub mod job;
pub mod pass;
pub mod thread_pool;

pub use graph::{FrameGraph, GraphError, PassGraph, PassId};
pub use host_semaphore::{HostSemaphore, OrderingError, OrderingStats, SubmissionOrdering};
pub use job::{JobWiring, Recording, RenderJob};
pub use pass::{FrameContext, PassRecorder, RenderPass};
pub use thread_pool::{RenderThreadPool, DEFAULT_COMMAND_BUFFERS_PER_WORKER};

/// Failure on a render worker. The frame can neither be retried nor
/// skipped once part of it reached the queue, so the process goes down.
pub(crate) fn fatal(err: &anyhow::Error) -> ! {
    log::error!("Fatal render error: {:#}", err);
    log::logger().flush();
    std::process::abort()
}
