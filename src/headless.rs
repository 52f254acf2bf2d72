// Headless device - software GPU for tests and GPU-less runs
//
// Submissions go into per-queue FIFOs and are executed by a single
// simulated GPU thread after a configurable latency. The device enforces the
// binary semaphore submission rules (a wait must be submitted after its
// signal, a semaphore cannot be signaled twice without a wait in between)
// and never lets a command buffer be re-recorded while it is still pending.
// Breaking a rule is recorded as a `Violation` instead of hanging.

use crate::device::{Device, Submission};
use crate::renderer::Presenter;
use crate::scheduler::{FrameContext, PassRecorder};
use anyhow::{anyhow, bail, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Queue index used for presentation.
pub const PRESENT_QUEUE: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessSemaphore(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessFence(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessCommandBuffer(u32);

#[derive(Debug)]
pub struct HeadlessCommandPool(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessQueue(usize);

impl HeadlessQueue {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Broken submission rule observed by the device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("`{label}` waits on {semaphore:?} before any signal was submitted")]
    WaitBeforeSignal {
        label: String,
        semaphore: HeadlessSemaphore,
    },
    #[error("`{label}` signals {semaphore:?} whose previous signal was never waited on")]
    DoubleSignal {
        label: String,
        semaphore: HeadlessSemaphore,
    },
    #[error("{command_buffer:?} re-recorded while still pending on the device")]
    CommandBufferInFlight {
        command_buffer: HeadlessCommandBuffer,
    },
    #[error("`{label}` submitted with an already signaled {fence:?}")]
    FenceAlreadySignaled { label: String, fence: HeadlessFence },
}

/// One entry of the submission (or execution) timeline.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub label: String,
    pub queue: usize,
    /// Global submission order.
    pub seq: u64,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct SemaphoreState {
    // Submitted signals not yet matched by a submitted wait.
    unwaited: u32,
    // Signals executed on the device and not yet consumed by an executed wait.
    available: u32,
}

#[derive(Debug, Default)]
struct FenceState {
    signaled: bool,
    // Submitted, not yet executed.
    pending: bool,
    signals: u64,
}

#[derive(Debug, Default)]
struct CommandBufferState {
    pool: u32,
    recording: bool,
    executable: bool,
    pending: u32,
}

#[derive(Debug)]
struct Operation {
    record: SubmissionRecord,
    command_buffer: Option<HeadlessCommandBuffer>,
    waits: Vec<HeadlessSemaphore>,
    signals: Vec<HeadlessSemaphore>,
    fence: Option<HeadlessFence>,
    logged: bool,
}

#[derive(Default)]
struct DeviceState {
    next_handle: u32,
    semaphores: HashMap<HeadlessSemaphore, SemaphoreState>,
    fences: HashMap<HeadlessFence, FenceState>,
    command_buffers: HashMap<HeadlessCommandBuffer, CommandBufferState>,
    pools: HashMap<u32, Vec<HeadlessCommandBuffer>>,
    queues: BTreeMap<usize, VecDeque<Operation>>,
    executing: usize,
    next_seq: u64,
    // Off for long runs: the timelines grow with every submission.
    keep_timeline: bool,
    submissions: Vec<SubmissionRecord>,
    executions: Vec<SubmissionRecord>,
    violations: Vec<Violation>,
    shutdown: bool,
}

impl DeviceState {
    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn semaphore(&mut self, semaphore: HeadlessSemaphore) -> Result<&mut SemaphoreState> {
        self.semaphores
            .get_mut(&semaphore)
            .ok_or_else(|| anyhow!("Unknown semaphore {:?}", semaphore))
    }

    fn fence(&mut self, fence: HeadlessFence) -> Result<&mut FenceState> {
        self.fences
            .get_mut(&fence)
            .ok_or_else(|| anyhow!("Unknown fence {:?}", fence))
    }

    fn command_buffer(
        &mut self,
        command_buffer: HeadlessCommandBuffer,
    ) -> Result<&mut CommandBufferState> {
        self.command_buffers
            .get_mut(&command_buffer)
            .ok_or_else(|| anyhow!("Unknown command buffer {:?}", command_buffer))
    }

    /// Applies the submit-time semaphore and fence rules and queues `op`.
    fn enqueue(&mut self, queue: usize, mut op: Operation) -> Result<()> {
        let mut waits = Vec::with_capacity(op.waits.len());
        for &semaphore in &op.waits {
            if self.semaphore(semaphore)?.unwaited == 0 {
                self.violations.push(Violation::WaitBeforeSignal {
                    label: op.record.label.clone(),
                    semaphore,
                });
                // Dropped so the queue does not stall forever.
                continue;
            }
            self.semaphore(semaphore)?.unwaited -= 1;
            waits.push(semaphore);
        }
        op.waits = waits;

        for &semaphore in &op.signals {
            let state = self.semaphore(semaphore)?;
            state.unwaited += 1;
            if state.unwaited > 1 {
                self.violations.push(Violation::DoubleSignal {
                    label: op.record.label.clone(),
                    semaphore,
                });
            }
        }

        if let Some(fence) = op.fence {
            let state = self.fence(fence)?;
            let busy = state.signaled || state.pending;
            state.pending = true;
            if busy {
                self.violations.push(Violation::FenceAlreadySignaled {
                    label: op.record.label.clone(),
                    fence,
                });
            }
        }

        if let Some(command_buffer) = op.command_buffer {
            let state = self.command_buffer(command_buffer)?;
            if !state.executable {
                bail!(
                    "`{}` submitted {:?} which is not in the executable state",
                    op.record.label,
                    command_buffer
                );
            }
            state.pending += 1;
        }

        if op.logged {
            op.record.seq = self.next_seq;
            self.next_seq += 1;
            if self.keep_timeline {
                self.submissions.push(op.record.clone());
            }
        }
        self.queues.entry(queue).or_default().push_back(op);
        Ok(())
    }

    /// First queue whose head operation has all of its waits satisfied.
    fn runnable_queue(&self) -> Option<usize> {
        self.queues.iter().find_map(|(&index, ops)| {
            let head = ops.front()?;
            let ready = head.waits.iter().all(|semaphore| {
                self.semaphores
                    .get(semaphore)
                    .map_or(true, |state| state.available > 0)
            });
            ready.then_some(index)
        })
    }

    fn complete(&mut self, op: Operation) {
        for semaphore in &op.signals {
            if let Some(state) = self.semaphores.get_mut(semaphore) {
                state.available += 1;
            }
        }
        if let Some(fence) = op.fence {
            if let Some(state) = self.fences.get_mut(&fence) {
                state.signaled = true;
                state.pending = false;
                state.signals += 1;
            }
        }
        if let Some(command_buffer) = op.command_buffer {
            if let Some(state) = self.command_buffers.get_mut(&command_buffer) {
                state.pending = state.pending.saturating_sub(1);
            }
        }
        if op.logged && self.keep_timeline {
            self.executions.push(SubmissionRecord {
                at: Instant::now(),
                ..op.record
            });
        }
    }

    fn idle(&self) -> bool {
        self.executing == 0 && self.queues.values().all(VecDeque::is_empty)
    }
}

struct Inner {
    state: Mutex<DeviceState>,
    cv: Condvar,
    latency: Duration,
}

/// Software device. Every submission takes `latency` to execute.
pub struct HeadlessDevice {
    inner: Arc<Inner>,
    gpu: Mutex<Option<JoinHandle<()>>>,
}

impl HeadlessDevice {
    /// Device that keeps the full submission and execution timelines.
    pub fn new(latency: Duration) -> Arc<Self> {
        Self::with_timeline(latency, true)
    }

    /// Device for long runs: submissions are counted and checked, but not
    /// kept in the timelines.
    pub fn without_timeline(latency: Duration) -> Arc<Self> {
        Self::with_timeline(latency, false)
    }

    fn with_timeline(latency: Duration, keep_timeline: bool) -> Arc<Self> {
        let inner = Arc::new(Inner {
            state: Mutex::new(DeviceState {
                keep_timeline,
                ..DeviceState::default()
            }),
            cv: Condvar::new(),
            latency,
        });
        let gpu = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("headless-gpu".to_string())
                .spawn(move || gpu_loop(&inner))
                .ok()
        };
        if gpu.is_none() {
            log::error!("Failed to spawn headless GPU thread, submissions will never complete");
        }
        log::info!("Headless device created (latency {:?})", latency);
        Arc::new(Self {
            inner,
            gpu: Mutex::new(gpu),
        })
    }

    pub fn latency(&self) -> Duration {
        self.inner.latency
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.inner.state.lock()
    }

    /// Host-side signal, as done by the presentation engine on acquire.
    pub fn signal_from_host(&self, semaphore: HeadlessSemaphore, label: &str) -> Result<()> {
        let mut state = self.state();
        let entry = state.semaphore(semaphore)?;
        entry.unwaited += 1;
        entry.available += 1;
        if entry.unwaited > 1 {
            state.violations.push(Violation::DoubleSignal {
                label: label.to_string(),
                semaphore,
            });
        }
        drop(state);
        self.inner.cv.notify_all();
        Ok(())
    }

    /// Queues a presentation on the present queue that waits on `wait`.
    pub fn present(&self, wait: HeadlessSemaphore, label: &str) -> Result<()> {
        let mut state = self.state();
        state.enqueue(
            PRESENT_QUEUE,
            Operation {
                record: SubmissionRecord {
                    label: label.to_string(),
                    queue: PRESENT_QUEUE,
                    seq: 0,
                    at: Instant::now(),
                },
                command_buffer: None,
                waits: vec![wait],
                signals: Vec::new(),
                fence: None,
                logged: true,
            },
        )?;
        drop(state);
        self.inner.cv.notify_all();
        Ok(())
    }

    /// Queue submissions in host submission order.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state().submissions.clone()
    }

    /// Completed submissions in device execution order.
    pub fn executions(&self) -> Vec<SubmissionRecord> {
        self.state().executions.clone()
    }

    /// Logged queue submissions so far, with or without a timeline.
    pub fn submission_count(&self) -> u64 {
        self.state().next_seq
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.state().violations.clone()
    }

    /// How many times `fence` has been signaled on the device.
    pub fn fence_signals(&self, fence: HeadlessFence) -> u64 {
        self.state().fences.get(&fence).map_or(0, |f| f.signals)
    }

    pub fn live_semaphores(&self) -> usize {
        self.state().semaphores.len()
    }

    pub fn live_fences(&self) -> usize {
        self.state().fences.len()
    }
}

fn gpu_loop(inner: &Inner) {
    let mut state = inner.state.lock();
    loop {
        if let Some(queue) = state.runnable_queue() {
            let Some(op) = state.queues.get_mut(&queue).and_then(VecDeque::pop_front) else {
                continue;
            };
            for semaphore in &op.waits {
                if let Some(entry) = state.semaphores.get_mut(semaphore) {
                    entry.available = entry.available.saturating_sub(1);
                }
            }
            state.executing += 1;
            if op.command_buffer.is_some() && !inner.latency.is_zero() {
                MutexGuard::unlocked(&mut state, || thread::sleep(inner.latency));
            }
            state.complete(op);
            state.executing -= 1;
            inner.cv.notify_all();
            continue;
        }
        if state.shutdown {
            break;
        }
        inner.cv.wait(&mut state);
    }
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        self.state().shutdown = true;
        self.inner.cv.notify_all();
        if let Some(handle) = self.gpu.lock().take() {
            if handle.join().is_err() {
                log::error!("Headless GPU thread panicked");
            }
        }
    }
}

impl Device for HeadlessDevice {
    type CommandPool = HeadlessCommandPool;
    type CommandBuffer = HeadlessCommandBuffer;
    type Semaphore = HeadlessSemaphore;
    type Fence = HeadlessFence;
    type Queue = HeadlessQueue;

    fn create_semaphore(&self) -> Result<HeadlessSemaphore> {
        let mut state = self.state();
        let semaphore = HeadlessSemaphore(state.next_handle());
        state.semaphores.insert(semaphore, SemaphoreState::default());
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: HeadlessSemaphore) {
        self.state().semaphores.remove(&semaphore);
    }

    fn create_fence(&self, signaled: bool) -> Result<HeadlessFence> {
        let mut state = self.state();
        let fence = HeadlessFence(state.next_handle());
        state.fences.insert(
            fence,
            FenceState {
                signaled,
                ..Default::default()
            },
        );
        Ok(fence)
    }

    fn destroy_fence(&self, fence: HeadlessFence) {
        self.state().fences.remove(&fence);
    }

    fn fence_signaled(&self, fence: HeadlessFence) -> Result<bool> {
        Ok(self.state().fence(fence)?.signaled)
    }

    fn wait_for_fence(&self, fence: HeadlessFence) -> Result<()> {
        let mut state = self.state();
        while !state.fence(fence)?.signaled {
            self.inner.cv.wait(&mut state);
        }
        Ok(())
    }

    fn reset_fence(&self, fence: HeadlessFence) -> Result<()> {
        self.state().fence(fence)?.signaled = false;
        Ok(())
    }

    fn create_command_pool(&self) -> Result<HeadlessCommandPool> {
        let mut state = self.state();
        let id = state.next_handle();
        state.pools.insert(id, Vec::new());
        Ok(HeadlessCommandPool(id))
    }

    fn allocate_command_buffers(
        &self,
        pool: &HeadlessCommandPool,
        count: usize,
    ) -> Result<Vec<HeadlessCommandBuffer>> {
        let mut state = self.state();
        if !state.pools.contains_key(&pool.0) {
            bail!("Unknown command pool {:?}", pool);
        }
        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            let command_buffer = HeadlessCommandBuffer(state.next_handle());
            state.command_buffers.insert(
                command_buffer,
                CommandBufferState {
                    pool: pool.0,
                    ..Default::default()
                },
            );
            buffers.push(command_buffer);
        }
        if let Some(owned) = state.pools.get_mut(&pool.0) {
            owned.extend(buffers.iter().copied());
        }
        Ok(buffers)
    }

    fn destroy_command_pool(&self, pool: HeadlessCommandPool) {
        let mut state = self.state();
        if let Some(buffers) = state.pools.remove(&pool.0) {
            for command_buffer in buffers {
                state.command_buffers.remove(&command_buffer);
            }
        }
    }

    fn begin_recording(&self, command_buffer: HeadlessCommandBuffer) -> Result<()> {
        let mut state = self.state();
        let entry = state.command_buffer(command_buffer)?;
        let in_flight = entry.pending > 0;
        entry.recording = true;
        entry.executable = false;
        if in_flight {
            state
                .violations
                .push(Violation::CommandBufferInFlight { command_buffer });
        }
        Ok(())
    }

    fn end_recording(&self, command_buffer: HeadlessCommandBuffer) -> Result<()> {
        let mut state = self.state();
        let entry = state.command_buffer(command_buffer)?;
        if !entry.recording {
            bail!(
                "{:?} (pool {}) ended without being recorded",
                command_buffer,
                entry.pool
            );
        }
        entry.recording = false;
        entry.executable = true;
        Ok(())
    }

    fn submission_queue(&self, worker: usize) -> HeadlessQueue {
        HeadlessQueue(worker + 1)
    }

    fn submit(&self, queue: &HeadlessQueue, submission: &Submission<'_, Self>) -> Result<()> {
        let mut state = self.state();
        state.enqueue(
            queue.0,
            Operation {
                record: SubmissionRecord {
                    label: submission.label.to_string(),
                    queue: queue.0,
                    seq: 0,
                    at: Instant::now(),
                },
                command_buffer: Some(submission.command_buffer),
                waits: submission.wait_semaphores.to_vec(),
                signals: submission.signal_semaphores.to_vec(),
                fence: Some(submission.fence),
                logged: true,
            },
        )?;
        drop(state);
        self.inner.cv.notify_all();
        Ok(())
    }

    fn signal_fence(&self, queue: &HeadlessQueue, fence: HeadlessFence) -> Result<()> {
        let mut state = self.state();
        state.enqueue(
            queue.0,
            Operation {
                record: SubmissionRecord {
                    label: format!("{:?}", fence),
                    queue: queue.0,
                    seq: 0,
                    at: Instant::now(),
                },
                command_buffer: None,
                waits: Vec::new(),
                signals: Vec::new(),
                fence: Some(fence),
                logged: false,
            },
        )?;
        drop(state);
        self.inner.cv.notify_all();
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state();
        while !state.idle() {
            if state.runnable_queue().is_none() && state.executing == 0 {
                bail!("Headless device stalled: queued work waits on semaphores that are never signaled");
            }
            self.inner.cv.wait(&mut state);
        }
        Ok(())
    }
}

/// Presenter over a fixed set of `image_count` virtual targets, handed out
/// round-robin.
pub struct HeadlessPresenter {
    device: Arc<HeadlessDevice>,
    image_count: u32,
    next_image: u32,
    out_of_date: bool,
    presented: Vec<u32>,
}

impl HeadlessPresenter {
    pub fn new(device: Arc<HeadlessDevice>, image_count: u32) -> Self {
        Self {
            device,
            image_count: image_count.max(1),
            next_image: 0,
            out_of_date: false,
            presented: Vec::new(),
        }
    }

    /// Makes the next acquire report an out-of-date target.
    pub fn invalidate(&mut self) {
        self.out_of_date = true;
    }

    /// Target indices in presentation order.
    pub fn presented(&self) -> &[u32] {
        &self.presented
    }
}

impl Presenter<HeadlessDevice> for HeadlessPresenter {
    fn acquire(&mut self, signal: HeadlessSemaphore) -> Result<Option<u32>> {
        if self.out_of_date {
            self.out_of_date = false;
            return Ok(None);
        }
        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        self.device
            .signal_from_host(signal, &format!("acquire[{image}]"))?;
        Ok(Some(image))
    }

    fn present(&mut self, target: u32, wait: HeadlessSemaphore) -> Result<()> {
        self.device.present(wait, &format!("present[{target}]"))?;
        self.presented.push(target);
        Ok(())
    }
}

type CostFn = dyn Fn(&FrameContext) -> Duration + Send + Sync;

/// Pass recorder that only burns host time, standing in for real command
/// recording.
pub struct SimulatedPass {
    cost: Box<CostFn>,
}

impl SimulatedPass {
    pub fn new(cost: Duration) -> Self {
        Self::with_cost(move |_| cost)
    }

    /// Recording cost computed per frame.
    pub fn with_cost(cost: impl Fn(&FrameContext) -> Duration + Send + Sync + 'static) -> Self {
        Self {
            cost: Box::new(cost),
        }
    }
}

impl PassRecorder<HeadlessDevice> for SimulatedPass {
    fn record(&self, _command_buffer: HeadlessCommandBuffer, frame: &FrameContext) {
        let cost = (self.cost)(frame);
        if !cost.is_zero() {
            thread::sleep(cost);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(device: &HeadlessDevice, pool: &HeadlessCommandPool) -> HeadlessCommandBuffer {
        let command_buffer = device.allocate_command_buffers(pool, 1).unwrap()[0];
        device.begin_recording(command_buffer).unwrap();
        device.end_recording(command_buffer).unwrap();
        command_buffer
    }

    fn submit(
        device: &HeadlessDevice,
        queue: usize,
        label: &str,
        command_buffer: HeadlessCommandBuffer,
        waits: &[HeadlessSemaphore],
        signals: &[HeadlessSemaphore],
    ) -> HeadlessFence {
        let fence = device.create_fence(false).unwrap();
        device
            .submit(
                &HeadlessQueue(queue),
                &Submission {
                    label,
                    command_buffer,
                    wait_semaphores: waits,
                    signal_semaphores: signals,
                    fence,
                },
            )
            .unwrap();
        fence
    }

    #[test]
    fn executes_waits_after_their_signals_across_queues() {
        let device = HeadlessDevice::new(Duration::from_millis(2));
        let pool = device.create_command_pool().unwrap();
        let semaphore = device.create_semaphore().unwrap();

        let producer = recorded(&device, &pool);
        let consumer = recorded(&device, &pool);
        submit(&device, 1, "producer", producer, &[], &[semaphore]);
        let done = submit(&device, 2, "consumer", consumer, &[semaphore], &[]);

        device.wait_for_fence(done).unwrap();
        let order: Vec<String> = device.executions().into_iter().map(|e| e.label).collect();
        assert_eq!(order, vec!["producer", "consumer"]);
        assert!(device.violations().is_empty());
    }

    #[test]
    fn long_runs_count_submissions_without_keeping_them() {
        let device = HeadlessDevice::without_timeline(Duration::ZERO);
        let pool = device.create_command_pool().unwrap();
        let semaphore = device.create_semaphore().unwrap();

        let producer = recorded(&device, &pool);
        let consumer = recorded(&device, &pool);
        submit(&device, 1, "producer", producer, &[], &[semaphore]);
        let done = submit(&device, 2, "consumer", consumer, &[semaphore], &[]);
        device.wait_for_fence(done).unwrap();

        assert_eq!(device.submission_count(), 2);
        assert!(device.submissions().is_empty());
        assert!(device.executions().is_empty());
        assert!(device.violations().is_empty());
    }

    #[test]
    fn reports_wait_submitted_before_signal() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let pool = device.create_command_pool().unwrap();
        let semaphore = device.create_semaphore().unwrap();

        let consumer = recorded(&device, &pool);
        submit(&device, 1, "consumer", consumer, &[semaphore], &[]);
        device.wait_idle().unwrap();

        assert_eq!(
            device.violations(),
            vec![Violation::WaitBeforeSignal {
                label: "consumer".into(),
                semaphore
            }]
        );
    }

    #[test]
    fn reports_double_signal_and_in_flight_rerecording() {
        let device = HeadlessDevice::new(Duration::from_millis(20));
        let pool = device.create_command_pool().unwrap();
        let semaphore = device.create_semaphore().unwrap();

        let first = recorded(&device, &pool);
        submit(&device, 1, "first", first, &[], &[semaphore]);
        // Still executing: re-recording is a violation.
        device.begin_recording(first).unwrap();
        device.end_recording(first).unwrap();

        let second = recorded(&device, &pool);
        submit(&device, 1, "second", second, &[], &[semaphore]);
        device.wait_idle().unwrap();

        let violations = device.violations();
        assert!(violations.contains(&Violation::CommandBufferInFlight { command_buffer: first }));
        assert!(violations.contains(&Violation::DoubleSignal {
            label: "second".into(),
            semaphore
        }));
    }

    #[test]
    fn fence_signal_waits_for_earlier_queue_work() {
        let device = HeadlessDevice::new(Duration::from_millis(10));
        let pool = device.create_command_pool().unwrap();
        let frame_fence = device.create_fence(false).unwrap();

        let work = recorded(&device, &pool);
        let work_fence = submit(&device, 3, "work", work, &[], &[]);
        device
            .signal_fence(&HeadlessQueue(3), frame_fence)
            .unwrap();

        device.wait_for_fence(frame_fence).unwrap();
        assert!(device.fence_signaled(work_fence).unwrap());
        assert_eq!(device.fence_signals(frame_fence), 1);
    }

    #[test]
    fn presenter_cycles_targets_and_can_go_out_of_date() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let mut presenter = HeadlessPresenter::new(Arc::clone(&device), 3);
        let semaphore = device.create_semaphore().unwrap();

        let mut acquired = Vec::new();
        for _ in 0..4 {
            let image = presenter.acquire(semaphore).unwrap().unwrap();
            presenter.present(image, semaphore).unwrap();
            acquired.push(image);
        }
        presenter.invalidate();
        assert_eq!(presenter.acquire(semaphore).unwrap(), None);

        device.wait_idle().unwrap();
        assert_eq!(acquired, vec![0, 1, 2, 0]);
        assert_eq!(presenter.presented(), &[0, 1, 2, 0]);
        assert!(device.violations().is_empty(), "{:?}", device.violations());
    }
}
