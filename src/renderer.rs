// Renderer - frame orchestration
//
// Ties presentation, scene update and pass dispatch together on the control
// thread. Ordering between passes comes entirely from the frame graph; the
// renderer only paces slots and hands the finished frame to the presenter.

use crate::device::Device;
use crate::frame_sync::FrameSync;
use crate::scheduler::{FrameContext, FrameGraph, GraphError, PassId, RenderThreadPool};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

/// Presentation collaborator (swapchain or a stand-in).
pub trait Presenter<D: Device> {
    /// Acquires the next target image and arranges for `signal` to be
    /// signaled once it is available. `Ok(None)` means the target set is out
    /// of date and must be recreated; `signal` is left untouched then.
    fn acquire(&mut self, signal: D::Semaphore) -> Result<Option<u32>>;

    /// Presents `target` once `wait` is signaled.
    fn present(&mut self, target: u32, wait: D::Semaphore) -> Result<()>;
}

/// Scene collaborator, updated once per frame before dispatch.
pub trait Scene {
    type Input;

    /// Prepares the per-slot data the passes of this frame will read. Must not
    /// submit GPU work.
    fn update(&mut self, input: &Self::Input, slot: usize, dt: f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { frame: u64, slot: usize, target: u32 },
    /// Nothing was dispatched; recreate the presentation targets and retry.
    TargetOutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Dispatching,
    Presenting,
}

pub struct Renderer<D: Device, P: Presenter<D>> {
    // Dropped in this order after `Drop::drop` idled the device.
    graph: FrameGraph<D>,
    sync: FrameSync<D>,
    pool: RenderThreadPool<D>,
    presenter: P,
    device: Arc<D>,

    dispatch_order: Vec<PassId>,
    slot: usize,
    frame: u64,
    state: FrameState,
    last_frame: Option<Instant>,
}

impl<D: Device, P: Presenter<D>> Renderer<D, P> {
    /// `graph` must have been built with `sync`'s frame fences as its
    /// terminal fences.
    pub fn new(
        device: Arc<D>,
        pool: RenderThreadPool<D>,
        sync: FrameSync<D>,
        graph: FrameGraph<D>,
        presenter: P,
    ) -> Result<Self> {
        if graph.slot_count() != sync.slot_count() {
            anyhow::bail!(
                "Frame graph has {} slots but frame sync has {}",
                graph.slot_count(),
                sync.slot_count()
            );
        }
        if graph.frame_fences() != sync.in_flight_fences() {
            anyhow::bail!("Frame graph does not signal the frame sync fences");
        }

        let dispatch_order = graph.topological_order().to_vec();
        log::info!(
            "Renderer ready: {} passes, {} slots, {} workers",
            graph.passes().len(),
            graph.slot_count(),
            pool.thread_count()
        );
        Ok(Self {
            graph,
            sync,
            pool,
            presenter,
            device,
            dispatch_order,
            slot: 0,
            frame: 0,
            state: FrameState::Idle,
            last_frame: None,
        })
    }

    /// Renders one frame: acquire, update, dispatch, present.
    pub fn frame<S: Scene>(&mut self, scene: &mut S, input: &S::Input) -> Result<FrameStatus> {
        let slot = self.slot;
        let now = Instant::now();

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait for this slot's previous frame, then acquire a target
        // ─────────────────────────────────────────────────────────────────────
        self.transition(FrameState::Acquiring);
        let fence = self.sync.in_flight_fence(slot);
        self.device
            .wait_for_fence(fence)
            .with_context(|| format!("Failed to wait for frame fence of slot {slot}"))?;

        let Some(target) = self
            .presenter
            .acquire(self.sync.image_available(slot))
            .context("Failed to acquire target image")?
        else {
            // The fence stays signaled so the retry does not block on it.
            log::debug!("Frame {}: target out of date", self.frame);
            self.transition(FrameState::Idle);
            return Ok(FrameStatus::TargetOutOfDate);
        };
        self.device.reset_fence(fence)?;

        let dt = self
            .last_frame
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_frame = Some(now);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Update scene data for this slot
        // ─────────────────────────────────────────────────────────────────────
        scene.update(input, slot, dt);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Dispatch every pass
        // ─────────────────────────────────────────────────────────────────────
        self.transition(FrameState::Dispatching);
        let context = FrameContext {
            frame: self.frame,
            slot,
            target,
            dt,
        };
        for &id in &self.dispatch_order {
            let pass = self.graph.pass(id).ok_or(GraphError::UnknownPass(id))?;
            pass.prepare(&context)
                .with_context(|| format!("Failed to dispatch pass `{}`", pass.name()))?;
        }
        // Queue producers first: a worker parked on a host wait then always
        // waits for a job another worker already holds.
        for &id in self.graph.topological_order() {
            let job = self
                .graph
                .pass(id)
                .and_then(|pass| pass.job(slot))
                .ok_or(GraphError::UnknownPass(id))?;
            self.pool.submit(Arc::clone(job));
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Present once the terminal pass has been submitted
        // ─────────────────────────────────────────────────────────────────────
        self.transition(FrameState::Presenting);
        self.graph.present_ordering(slot).wait();
        self.presenter
            .present(target, self.graph.present_semaphore(slot))
            .context("Failed to present frame")?;

        let status = FrameStatus::Presented {
            frame: self.frame,
            slot,
            target,
        };
        self.slot = (slot + 1) % self.graph.slot_count();
        self.frame += 1;
        self.transition(FrameState::Idle);
        Ok(status)
    }

    fn transition(&mut self, next: FrameState) {
        log::trace!("Frame {}: {:?} -> {:?}", self.frame, self.state, next);
        self.state = next;
    }

    /// Replaces the order in which passes record their frame. Must name every
    /// pass exactly once. Jobs still reach the pool in topological order, so
    /// any permutation works with any number of workers.
    pub fn set_dispatch_order(&mut self, order: Vec<PassId>) -> Result<(), GraphError> {
        let passes = self.graph.passes().len();
        let mut seen = vec![false; passes];
        for &id in &order {
            self.graph.pass(id).ok_or(GraphError::UnknownPass(id))?;
            if std::mem::replace(&mut seen[id.index()], true) {
                return Err(GraphError::DispatchOrder { passes });
            }
        }
        if order.len() != passes {
            return Err(GraphError::DispatchOrder { passes });
        }
        self.dispatch_order = order;
        Ok(())
    }

    pub fn dispatch_order(&self) -> &[PassId] {
        &self.dispatch_order
    }

    /// Slot the next frame will use.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of frames presented so far.
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn graph(&self) -> &FrameGraph<D> {
        &self.graph
    }

    pub fn frame_sync(&self) -> &FrameSync<D> {
        &self.sync
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl<D: Device, P: Presenter<D>> Drop for Renderer<D, P> {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {:#}", err);
        }
        self.pool.clean();
        log::info!("Renderer shut down after {} frames", self.frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessDevice, HeadlessPresenter, SimulatedPass};
    use crate::scheduler::PassGraph;
    use std::time::Duration;

    struct Counter(Vec<usize>);

    impl Scene for Counter {
        type Input = ();

        fn update(&mut self, _: &(), slot: usize, _: f32) {
            self.0.push(slot);
        }
    }

    fn two_pass_renderer(slots: usize) -> Renderer<HeadlessDevice, HeadlessPresenter> {
        let device = HeadlessDevice::new(Duration::ZERO);
        let sync = FrameSync::new(&device, slots).unwrap();
        let mut graph = PassGraph::new(slots);
        let first = graph.add_pass("first", Arc::new(SimulatedPass::new(Duration::ZERO)));
        let last = graph.add_pass("last", Arc::new(SimulatedPass::new(Duration::ZERO)));
        graph.depends_on_external(first, sync.image_available_all()).unwrap();
        graph.depends_on(last, first).unwrap();
        graph.signal_cpu(last, sync.in_flight_fences()).unwrap();
        let graph = graph.build(&device).unwrap();

        let pool = RenderThreadPool::new(Arc::clone(&device), 2, 3).unwrap();
        let presenter = HeadlessPresenter::new(Arc::clone(&device), 3);
        Renderer::new(device, pool, sync, graph, presenter).unwrap()
    }

    #[test]
    fn cycles_slots_and_presents_every_frame() {
        let mut renderer = two_pass_renderer(3);
        let mut scene = Counter(Vec::new());
        for expected in 0..7u64 {
            let status = renderer.frame(&mut scene, &()).unwrap();
            assert!(matches!(status, FrameStatus::Presented { frame, .. } if frame == expected));
        }
        renderer.wait_idle().unwrap();

        assert_eq!(scene.0, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(renderer.presenter().presented().len(), 7);
        assert_eq!(renderer.state(), FrameState::Idle);
        assert!(renderer.device().violations().is_empty());
    }

    #[test]
    fn out_of_date_target_skips_the_frame_without_advancing() {
        let mut renderer = two_pass_renderer(2);
        let mut scene = Counter(Vec::new());
        renderer.frame(&mut scene, &()).unwrap();

        renderer.presenter_mut().invalidate();
        assert_eq!(
            renderer.frame(&mut scene, &()).unwrap(),
            FrameStatus::TargetOutOfDate
        );
        assert_eq!(renderer.slot(), 1);
        assert_eq!(renderer.frame_index(), 1);

        // The skipped slot is still usable.
        assert!(matches!(
            renderer.frame(&mut scene, &()).unwrap(),
            FrameStatus::Presented { slot: 1, .. }
        ));
        assert_eq!(scene.0, vec![0, 1]);
    }

    #[test]
    fn dispatch_order_must_be_a_permutation() {
        let mut renderer = two_pass_renderer(2);
        let order = renderer.dispatch_order().to_vec();
        let (first, last) = (order[0], order[1]);

        assert_eq!(
            renderer.set_dispatch_order(vec![first]),
            Err(GraphError::DispatchOrder { passes: 2 })
        );
        assert_eq!(
            renderer.set_dispatch_order(vec![first, first]),
            Err(GraphError::DispatchOrder { passes: 2 })
        );
        renderer.set_dispatch_order(vec![last, first]).unwrap();
        assert_eq!(renderer.dispatch_order(), &[last, first]);
    }

    #[test]
    fn consumer_first_order_runs_on_a_single_worker() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let sync = FrameSync::new(&device, 2).unwrap();
        let mut graph = PassGraph::new(2);
        let first = graph.add_pass("first", Arc::new(SimulatedPass::new(Duration::ZERO)));
        let last = graph.add_pass("last", Arc::new(SimulatedPass::new(Duration::ZERO)));
        graph.depends_on_external(first, sync.image_available_all()).unwrap();
        graph.depends_on(last, first).unwrap();
        graph.signal_cpu(last, sync.in_flight_fences()).unwrap();
        let graph = graph.build(&device).unwrap();
        let pool = RenderThreadPool::new(Arc::clone(&device), 1, 3).unwrap();
        let presenter = HeadlessPresenter::new(Arc::clone(&device), 2);
        let mut renderer = Renderer::new(device, pool, sync, graph, presenter).unwrap();

        renderer.set_dispatch_order(vec![last, first]).unwrap();
        let mut scene = Counter(Vec::new());
        for _ in 0..4 {
            renderer.frame(&mut scene, &()).unwrap();
        }
        renderer.wait_idle().unwrap();

        let labels: Vec<String> = renderer
            .device()
            .submissions()
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels.len(), 8);
        for pair in labels.chunks(2) {
            assert!(pair[0].starts_with("first") && pair[1].starts_with("last"), "{pair:?}");
        }
        assert!(renderer.device().violations().is_empty());
    }

    #[test]
    fn rejects_graph_built_for_other_fences() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let sync = FrameSync::new(&device, 2).unwrap();
        let mut graph = PassGraph::new(2);
        let only = graph.add_pass("only", Arc::new(SimulatedPass::new(Duration::ZERO)));
        let other = [
            device.create_fence(true).unwrap(),
            device.create_fence(true).unwrap(),
        ];
        graph.signal_cpu(only, &other).unwrap();
        let graph = graph.build(&device).unwrap();
        let pool = RenderThreadPool::new(Arc::clone(&device), 1, 1).unwrap();
        let presenter = HeadlessPresenter::new(Arc::clone(&device), 2);

        assert!(Renderer::new(device, pool, sync, graph, presenter).is_err());
    }
}
