// Render thread pool - concurrent recording and submission of render jobs
//
// Every worker owns a command pool, a small ring of command buffers with one
// completion fence each, and its own submission queue. Jobs come from a
// shared FIFO. Cross-pass submission order is enforced by each job's host
// waits, right before the queue submit.

use super::fatal;
use super::job::RenderJob;
use crate::device::{Device, Submission};
use anyhow::{anyhow, Context, Result};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

/// Command buffers per worker ring.
pub const DEFAULT_COMMAND_BUFFERS_PER_WORKER: usize = 5;

struct JobQueue<D: Device> {
    jobs: VecDeque<Arc<RenderJob<D>>>,
    running: bool,
}

struct Shared<D: Device> {
    queue: Mutex<JobQueue<D>>,
    job_available: Condvar,
}

impl<D: Device> Shared<D> {
    /// Blocks until a job is available. `None` once the pool stops, even if
    /// jobs are still queued.
    fn next_job(&self) -> Option<Arc<RenderJob<D>>> {
        let mut queue = self.queue.lock();
        loop {
            if !queue.running {
                return None;
            }
            if let Some(job) = queue.jobs.pop_front() {
                return Some(job);
            }
            self.job_available.wait(&mut queue);
        }
    }
}

pub struct RenderThreadPool<D: Device> {
    shared: Arc<Shared<D>>,
    workers: Vec<JoinHandle<()>>,
    thread_count: usize,
}

impl<D: Device> RenderThreadPool<D> {
    /// Spawns `thread_count` workers, each with `command_buffers_per_worker`
    /// command buffers. Returns once every worker has created its resources.
    pub fn new(
        device: Arc<D>,
        thread_count: usize,
        command_buffers_per_worker: usize,
    ) -> Result<Self> {
        if thread_count == 0 {
            anyhow::bail!("Render thread pool needs at least one worker");
        }
        if command_buffers_per_worker == 0 {
            anyhow::bail!("Render workers need at least one command buffer");
        }

        let mut pool = Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(JobQueue {
                    jobs: VecDeque::new(),
                    running: true,
                }),
                job_available: Condvar::new(),
            }),
            workers: Vec::with_capacity(thread_count),
            thread_count,
        };

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        for index in 0..thread_count {
            let shared = Arc::clone(&pool.shared);
            let device = Arc::clone(&device);
            let ready = ready_tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("render-worker-{index}"))
                .spawn(move || {
                    match Worker::new(device, index, command_buffers_per_worker) {
                        Ok(worker) => {
                            let _ = ready.send(Ok(()));
                            worker.run(&shared);
                        }
                        Err(err) => {
                            let _ = ready.send(Err(err));
                        }
                    }
                });

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(err) => {
                    pool.clean();
                    return Err(err).context("Failed to spawn render worker");
                }
            }
        }
        drop(ready_tx);

        for _ in 0..thread_count {
            let status = ready_rx
                .recv()
                .map_err(|_| anyhow!("Render worker exited during initialization"))
                .and_then(|status| status);
            if let Err(err) = status {
                pool.clean();
                return Err(err.context("Failed to initialize render worker"));
            }
        }

        log::info!(
            "Render thread pool started: {} workers, {} command buffers each",
            thread_count,
            command_buffers_per_worker
        );
        Ok(pool)
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Queues a job. The job must carry this frame's recording.
    pub fn submit(&self, job: Arc<RenderJob<D>>) {
        {
            let mut queue = self.shared.queue.lock();
            if !queue.running {
                log::warn!("Dropping job `{}`: thread pool is shut down", job.label());
                return;
            }
            log::trace!("Queued job `{}`", job.label());
            queue.jobs.push_back(job);
        }
        self.shared.job_available.notify_one();
    }

    /// Stops and joins every worker. Queued jobs are dropped without running;
    /// jobs a worker already dequeued finish their submission first.
    ///
    /// The caller must have waited for the device to go idle.
    pub fn clean(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        let dropped = self.stop();
        self.join();
        log::info!(
            "Render thread pool shut down ({} queued jobs dropped)",
            dropped
        );
    }

    fn stop(&self) -> usize {
        let dropped = {
            let mut queue = self.shared.queue.lock();
            queue.running = false;
            let dropped = queue.jobs.len();
            for job in queue.jobs.drain(..) {
                drop(job.take_recording());
            }
            dropped
        };
        self.shared.job_available.notify_all();
        dropped
    }

    fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Render worker panicked");
            }
        }
    }
}

impl<D: Device> Drop for RenderThreadPool<D> {
    fn drop(&mut self) {
        self.clean();
    }
}

struct RingEntry<D: Device> {
    command_buffer: D::CommandBuffer,
    fence: D::Fence,
}

struct Worker<D: Device> {
    index: usize,
    device: Arc<D>,
    queue: D::Queue,
    command_pool: Option<D::CommandPool>,
    ring: Vec<RingEntry<D>>,
    cursor: usize,
}

impl<D: Device> Worker<D> {
    fn new(device: Arc<D>, index: usize, ring_size: usize) -> Result<Self> {
        let queue = device.submission_queue(index);
        let command_pool = device
            .create_command_pool()
            .context("Failed to create command pool")?;
        let command_buffers = match device.allocate_command_buffers(&command_pool, ring_size) {
            Ok(buffers) => buffers,
            Err(err) => {
                device.destroy_command_pool(command_pool);
                return Err(err.context("Failed to allocate command buffers"));
            }
        };

        let mut worker = Self {
            index,
            device,
            queue,
            command_pool: Some(command_pool),
            ring: Vec::with_capacity(ring_size),
            cursor: 0,
        };
        for command_buffer in command_buffers {
            // Start signaled: a fresh buffer is not in flight.
            let fence = worker
                .device
                .create_fence(true)
                .context("Failed to create fence")?;
            worker.ring.push(RingEntry {
                command_buffer,
                fence,
            });
        }
        Ok(worker)
    }

    fn run(mut self, shared: &Shared<D>) {
        log::debug!("Render worker {} started", self.index);
        while let Some(job) = shared.next_job() {
            log::trace!("Worker {} picked up `{}`", self.index, job.label());
            // A panicking job must not leave consumers parked on its host signals.
            let result = contain_panic(|| self.execute(&job));
            if let Err(err) = result {
                fatal(&err.context(format!("Render job `{}` failed", job.label())));
            }
        }
        log::debug!("Render worker {} exiting", self.index);
    }

    /// Round-robin poll for a command buffer whose fence is signaled. Stalls
    /// while every buffer of the ring is still in flight.
    fn next_free_entry(&mut self) -> Result<usize> {
        let len = self.ring.len();
        let mut polled = 0usize;
        loop {
            let idx = self.cursor;
            self.cursor = (self.cursor + 1) % len;
            if self.device.fence_signaled(self.ring[idx].fence)? {
                return Ok(idx);
            }
            polled += 1;
            if polled % len == 0 {
                thread::yield_now();
            }
        }
    }

    fn execute(&mut self, job: &RenderJob<D>) -> Result<()> {
        let recording = job
            .take_recording()
            .ok_or_else(|| anyhow!("queued without a recording"))?;

        let entry = self.next_free_entry()?;
        let command_buffer = self.ring[entry].command_buffer;
        let fence = self.ring[entry].fence;

        self.device.reset_fence(fence)?;
        self.device.begin_recording(command_buffer)?;
        recording(command_buffer);
        self.device.end_recording(command_buffer)?;

        let wiring = job.wiring();

        // Producers of our device waits must have submitted before we do.
        for host_wait in &wiring.host_waits {
            host_wait.wait();
        }

        self.device.submit(
            &self.queue,
            &Submission {
                label: job.label(),
                command_buffer,
                wait_semaphores: &wiring.device_waits,
                signal_semaphores: &wiring.device_signals,
                fence,
            },
        )?;

        if let Some(frame_fence) = wiring.fence {
            self.device.signal_fence(&self.queue, frame_fence)?;
        }

        for host_signal in &wiring.host_signals {
            host_signal.signal()?;
        }
        log::trace!("Worker {} submitted `{}`", self.index, job.label());
        Ok(())
    }
}

/// Runs `f`, turning a panic into an error carrying the panic message.
fn contain_panic<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl<D: Device> Drop for Worker<D> {
    fn drop(&mut self) {
        for entry in self.ring.drain(..) {
            self.device.destroy_fence(entry.fence);
        }
        if let Some(command_pool) = self.command_pool.take() {
            self.device.destroy_command_pool(command_pool);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use crate::scheduler::host_semaphore::{HostSemaphore, SubmissionOrdering};
    use crate::scheduler::job::JobWiring;
    use std::time::{Duration, Instant};

    fn job(
        label: &str,
        wiring: JobWiring<HeadlessDevice>,
        recording: impl FnOnce() + Send + 'static,
    ) -> Arc<RenderJob<HeadlessDevice>> {
        let job = Arc::new(RenderJob::new(label, 0, wiring));
        job.set_recording(Box::new(move |_| recording())).unwrap();
        job
    }

    fn done_signal(label: &str) -> Arc<HostSemaphore> {
        Arc::new(HostSemaphore::new(format!("{label}-done")))
    }

    #[test]
    fn executes_every_queued_job() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let pool = RenderThreadPool::new(Arc::clone(&device), 3, 2).unwrap();
        let executed = Arc::new(Mutex::new(Vec::new()));

        let mut done = Vec::new();
        for i in 0..8 {
            let label = format!("job{i}");
            let signal = done_signal(&label);
            let executed = Arc::clone(&executed);
            let wiring = JobWiring {
                host_signals: vec![signal.clone() as Arc<dyn SubmissionOrdering>],
                ..Default::default()
            };
            pool.submit(job(&label, wiring, move || executed.lock().push(i)));
            done.push(signal);
        }
        for signal in &done {
            signal.wait();
        }

        let mut executed = executed.lock().clone();
        executed.sort_unstable();
        assert_eq!(executed, (0..8).collect::<Vec<_>>());
        assert_eq!(device.submissions().len(), 8);
        assert!(device.violations().is_empty());
    }

    #[test]
    fn host_wait_delays_consumer_submission_until_producer_submitted() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let pool = RenderThreadPool::new(Arc::clone(&device), 2, 2).unwrap();

        let semaphore = device.create_semaphore().unwrap();
        let handshake = Arc::new(HostSemaphore::new("producer[0]"));
        let consumer_done = done_signal("consumer");

        let producer = job(
            "producer",
            JobWiring {
                device_signals: vec![semaphore],
                host_signals: vec![handshake.clone() as Arc<dyn SubmissionOrdering>],
                ..Default::default()
            },
            // Recorded slowly so the consumer finishes recording first.
            || thread::sleep(Duration::from_millis(40)),
        );
        let consumer = job(
            "consumer",
            JobWiring {
                device_waits: vec![semaphore],
                host_waits: vec![handshake.clone() as Arc<dyn SubmissionOrdering>],
                host_signals: vec![consumer_done.clone() as Arc<dyn SubmissionOrdering>],
                ..Default::default()
            },
            || {},
        );
        pool.submit(producer);
        pool.submit(consumer);
        consumer_done.wait();

        let order: Vec<String> = device.submissions().into_iter().map(|s| s.label).collect();
        assert_eq!(order, vec!["producer", "consumer"]);
        assert_eq!(handshake.stats().signals, 1);
        assert_eq!(handshake.stats().waits, 1);
        assert!(device.violations().is_empty(), "{:?}", device.violations());
    }

    #[test]
    fn worker_never_rerecords_a_buffer_still_in_flight() {
        let latency = Duration::from_millis(15);
        let device = HeadlessDevice::new(latency);
        // One worker with a ring of two: the third job must wait for the first
        // buffer to retire.
        let pool = RenderThreadPool::new(Arc::clone(&device), 1, 2).unwrap();

        let start = Instant::now();
        let mut done = Vec::new();
        for i in 0..6 {
            let label = format!("job{i}");
            let signal = done_signal(&label);
            let wiring = JobWiring {
                host_signals: vec![signal.clone() as Arc<dyn SubmissionOrdering>],
                ..Default::default()
            };
            pool.submit(job(&label, wiring, || {}));
            done.push(signal);
        }
        for signal in &done {
            signal.wait();
        }
        let elapsed = start.elapsed();
        device.wait_idle().unwrap();

        assert!(device.violations().is_empty(), "{:?}", device.violations());
        // job5 can only be submitted after job3 retired: four serial executions.
        assert!(elapsed >= latency * 4, "ring did not apply backpressure: {elapsed:?}");
    }

    #[test]
    fn shutdown_drops_jobs_that_are_still_queued() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let mut pool = RenderThreadPool::new(Arc::clone(&device), 1, 2).unwrap();
        let executed = Arc::new(Mutex::new(Vec::new()));

        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        {
            let executed = Arc::clone(&executed);
            pool.submit(job("job0", JobWiring::default(), move || {
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
                executed.lock().push(0);
            }));
        }
        for i in 1..5 {
            let executed = Arc::clone(&executed);
            pool.submit(job(&format!("job{i}"), JobWiring::default(), move || {
                executed.lock().push(i)
            }));
        }

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let start = Instant::now();
        assert_eq!(pool.stop(), 4);
        gate_tx.send(()).unwrap();
        pool.join();

        assert!(start.elapsed() < Duration::from_secs(5));
        // The dequeued job ran to its submission, the queued ones never ran.
        assert_eq!(*executed.lock(), vec![0]);
        assert_eq!(device.submissions().len(), 1);
    }

    #[test]
    fn panicking_recording_takes_the_fatal_path() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let mut worker = Worker::new(Arc::clone(&device), 0, 2).unwrap();
        let consumer_handshake = done_signal("shadow");
        let failing = job(
            "shadow[0]",
            JobWiring {
                host_signals: vec![consumer_handshake.clone() as Arc<dyn SubmissionOrdering>],
                ..Default::default()
            },
            || panic!("recorder failed"),
        );

        let err = contain_panic(|| worker.execute(&failing)).unwrap_err();
        assert!(format!("{err:#}").contains("recorder failed"), "{err:#}");
        assert!(device.submissions().is_empty());
        assert_eq!(consumer_handshake.stats().signals, 0);

        // Errors pass through untouched.
        let err = contain_panic(|| -> Result<()> { Err(anyhow!("submit failed")) }).unwrap_err();
        assert_eq!(err.to_string(), "submit failed");
    }

    #[test]
    fn clean_joins_all_workers_promptly() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let mut pool = RenderThreadPool::new(Arc::clone(&device), 4, 5).unwrap();
        for i in 0..5 {
            pool.submit(job(&format!("job{i}"), JobWiring::default(), || {}));
        }

        let start = Instant::now();
        pool.clean();
        assert!(start.elapsed() < Duration::from_secs(2));

        // Submitting after shutdown is ignored.
        pool.submit(job("late", JobWiring::default(), || {}));
        assert!(device.submissions().iter().all(|s| s.label != "late"));
    }

    #[test]
    fn rejects_empty_configurations() {
        let device = HeadlessDevice::new(Duration::ZERO);
        assert!(RenderThreadPool::new(Arc::clone(&device), 0, 5).is_err());
        assert!(RenderThreadPool::new(device, 2, 0).is_err());
    }
}
