// Render pass - one node of the frame graph
//
// A pass owns one persistent job per buffer slot. Each frame it installs a
// closure over its recorder into the slot's job and hands the job to the
// thread pool. The job's waits and signals were fixed when the graph was
// built.

use super::graph::{GraphError, PassId};
use super::job::RenderJob;
use super::thread_pool::RenderThreadPool;
use crate::device::Device;
use std::fmt;
use std::sync::Arc;

/// Per-frame values handed to every pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Monotonic frame counter.
    pub frame: u64,
    /// Buffer slot: selects the pass's in-flight resource copy.
    pub slot: usize,
    /// Presentable target image acquired for this frame.
    pub target: u32,
    /// Seconds since the previous frame.
    pub dt: f32,
}

/// Pass-specific command recording.
///
/// Called on a render worker with a command buffer that is already in the
/// recording state. Implementations must not block and must not touch the
/// job queue or any semaphore.
pub trait PassRecorder<D: Device>: Send + Sync {
    fn record(&self, command_buffer: D::CommandBuffer, frame: &FrameContext);
}

pub struct RenderPass<D: Device> {
    id: PassId,
    name: String,
    recorder: Arc<dyn PassRecorder<D>>,
    dependencies: Vec<PassId>,
    jobs: Vec<Arc<RenderJob<D>>>,
    // Semaphores this pass signals; destroyed with the pass.
    owned_semaphores: Vec<D::Semaphore>,
    device: Arc<D>,
}

impl<D: Device> RenderPass<D> {
    pub(crate) fn new(
        id: PassId,
        name: String,
        recorder: Arc<dyn PassRecorder<D>>,
        dependencies: Vec<PassId>,
        jobs: Vec<Arc<RenderJob<D>>>,
        owned_semaphores: Vec<D::Semaphore>,
        device: Arc<D>,
    ) -> Self {
        Self {
            id,
            name,
            recorder,
            dependencies,
            jobs,
            owned_semaphores,
            device,
        }
    }

    pub fn id(&self) -> PassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[PassId] {
        &self.dependencies
    }

    pub fn job(&self, slot: usize) -> Option<&Arc<RenderJob<D>>> {
        self.jobs.get(slot)
    }

    /// Queues this frame's job for `frame.slot`.
    pub fn render(
        &self,
        pool: &RenderThreadPool<D>,
        frame: &FrameContext,
    ) -> Result<(), GraphError> {
        let job = self.prepare(frame)?;
        pool.submit(Arc::clone(job));
        Ok(())
    }

    /// Installs this frame's recording into the job for `frame.slot` without
    /// queuing it. The caller hands the returned job to the pool.
    pub fn prepare(&self, frame: &FrameContext) -> Result<&Arc<RenderJob<D>>, GraphError> {
        let job = self.jobs.get(frame.slot).ok_or(GraphError::SlotOutOfRange {
            slot: frame.slot,
            slots: self.jobs.len(),
        })?;

        let recorder = Arc::clone(&self.recorder);
        let frame = *frame;
        job.set_recording(Box::new(move |command_buffer| {
            recorder.record(command_buffer, &frame);
        }))?;
        Ok(job)
    }
}

impl<D: Device> Drop for RenderPass<D> {
    fn drop(&mut self) {
        for semaphore in self.owned_semaphores.drain(..) {
            self.device.destroy_semaphore(semaphore);
        }
    }
}

impl<D: Device> fmt::Debug for RenderPass<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("jobs", &self.jobs)
            .finish()
    }
}
