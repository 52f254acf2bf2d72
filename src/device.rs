// Device seam - what the scheduler needs from a GPU
//
// The thread pool, pass graph and frame loop only ever talk to the GPU
// through this trait. `backend::VulkanDevice` implements it on top of ash,
// `headless::HeadlessDevice` implements it in software for tests and
// GPU-less runs.

use anyhow::Result;
use std::fmt::Debug;

/// GPU device operations used by the render scheduler.
///
/// Handles are small `Copy` values (raw Vulkan handles or integer ids).
/// Queues are owned values: every worker thread gets its own from
/// [`Device::submission_queue`] and is the only thread submitting through it,
/// unless the implementation documents otherwise.
pub trait Device: Sized + Send + Sync + 'static {
    type CommandPool: Send;
    type CommandBuffer: Copy + Debug + Send + 'static;
    type Semaphore: Copy + PartialEq + Debug + Send + Sync + 'static;
    type Fence: Copy + PartialEq + Debug + Send + Sync + 'static;
    type Queue: Send + 'static;

    // Synchronization objects
    fn create_semaphore(&self) -> Result<Self::Semaphore>;
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);
    fn create_fence(&self, signaled: bool) -> Result<Self::Fence>;
    fn destroy_fence(&self, fence: Self::Fence);

    /// Non-blocking status query. `true` means the fence is signaled.
    fn fence_signaled(&self, fence: Self::Fence) -> Result<bool>;
    fn wait_for_fence(&self, fence: Self::Fence) -> Result<()>;
    fn reset_fence(&self, fence: Self::Fence) -> Result<()>;

    // Command recording
    fn create_command_pool(&self) -> Result<Self::CommandPool>;
    fn allocate_command_buffers(
        &self,
        pool: &Self::CommandPool,
        count: usize,
    ) -> Result<Vec<Self::CommandBuffer>>;
    /// Destroys the pool and every command buffer allocated from it.
    fn destroy_command_pool(&self, pool: Self::CommandPool);
    /// Resets the buffer and puts it into the recording state.
    fn begin_recording(&self, command_buffer: Self::CommandBuffer) -> Result<()>;
    fn end_recording(&self, command_buffer: Self::CommandBuffer) -> Result<()>;

    // Submission
    /// Queue used by render worker `worker`.
    fn submission_queue(&self, worker: usize) -> Self::Queue;
    fn submit(&self, queue: &Self::Queue, submission: &Submission<'_, Self>) -> Result<()>;
    /// Empty submission that only signals `fence` once all earlier work on
    /// `queue` has completed.
    fn signal_fence(&self, queue: &Self::Queue, fence: Self::Fence) -> Result<()>;

    fn wait_idle(&self) -> Result<()>;
}

/// One command buffer submission with its device-side waits and signals.
pub struct Submission<'a, D: Device> {
    /// Debug label, usually `pass[slot]`.
    pub label: &'a str,
    pub command_buffer: D::CommandBuffer,
    pub wait_semaphores: &'a [D::Semaphore],
    pub signal_semaphores: &'a [D::Semaphore],
    /// Signaled when the command buffer has finished executing.
    pub fence: D::Fence,
}
