// Render job - unit of work for the render thread pool
//
// The wait/signal wiring of a job is fixed when the pass graph is built and
// reused every frame. Only the recording closure changes per frame.

use super::graph::GraphError;
use super::host_semaphore::SubmissionOrdering;
use crate::device::Device;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Per-frame recording closure. Receives the command buffer the worker has
/// already put into the recording state.
pub type Recording<D> = Box<dyn FnOnce(<D as Device>::CommandBuffer) + Send>;

/// Synchronization wiring of a job.
pub struct JobWiring<D: Device> {
    pub device_waits: Vec<D::Semaphore>,
    pub device_signals: Vec<D::Semaphore>,
    pub host_waits: Vec<Arc<dyn SubmissionOrdering>>,
    pub host_signals: Vec<Arc<dyn SubmissionOrdering>>,
    /// CPU-visible fence signaled after the job's submission (frame-terminal jobs).
    pub fence: Option<D::Fence>,
}

impl<D: Device> Default for JobWiring<D> {
    fn default() -> Self {
        Self {
            device_waits: Vec::new(),
            device_signals: Vec::new(),
            host_waits: Vec::new(),
            host_signals: Vec::new(),
            fence: None,
        }
    }
}

pub struct RenderJob<D: Device> {
    label: String,
    slot: usize,
    recording: Mutex<Option<Recording<D>>>,
    wiring: JobWiring<D>,
}

impl<D: Device> RenderJob<D> {
    pub fn new(label: impl Into<String>, slot: usize, wiring: JobWiring<D>) -> Self {
        Self {
            label: label.into(),
            slot,
            recording: Mutex::new(None),
            wiring,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn wiring(&self) -> &JobWiring<D> {
        &self.wiring
    }

    /// Installs this frame's recording.
    ///
    /// Fails if the previous recording was never picked up by a worker,
    /// which means the slot was reused while the job was still queued.
    pub fn set_recording(&self, recording: Recording<D>) -> Result<(), GraphError> {
        let mut current = self.recording.lock();
        if current.is_some() {
            return Err(GraphError::RecordingPending {
                job: self.label.clone(),
            });
        }
        *current = Some(recording);
        Ok(())
    }

    pub(crate) fn take_recording(&self) -> Option<Recording<D>> {
        self.recording.lock().take()
    }
}

impl<D: Device> fmt::Debug for RenderJob<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderJob")
            .field("label", &self.label)
            .field("slot", &self.slot)
            .field("device_waits", &self.wiring.device_waits)
            .field("device_signals", &self.wiring.device_signals)
            .field("host_waits", &self.wiring.host_waits.len())
            .field("host_signals", &self.wiring.host_signals.len())
            .field("fence", &self.wiring.fence)
            .finish()
    }
}
