// Pass graph - static dependency wiring between render passes
//
// Passes live in an arena and refer to each other through `PassId`s. The
// builder collects edges; `build` validates the graph, creates one device
// semaphore and one host semaphore per edge and slot, and freezes everything
// into a `FrameGraph`. No edge can be added once the frame loop owns it.

use super::host_semaphore::{HostSemaphore, OrderingStats, SubmissionOrdering};
use super::job::{JobWiring, RenderJob};
use super::pass::{PassRecorder, RenderPass};
use crate::device::Device;
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Handle of a pass inside its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(usize);

impl PassId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown pass {0}")]
    UnknownPass(PassId),
    #[error("pass `{0}` cannot depend on itself")]
    SelfDependency(String),
    #[error("pass `{consumer}` already depends on `{producer}`")]
    DuplicateDependency { consumer: String, producer: String },
    #[error("pass `{pass}` got {actual} per-slot handles, expected {expected}")]
    SlotCountMismatch {
        pass: String,
        expected: usize,
        actual: usize,
    },
    #[error("ring size must be at least one slot")]
    NoSlots,
    #[error("graph has no passes")]
    Empty,
    #[error("no pass signals the frame fence")]
    NoTerminal,
    #[error("passes `{first}` and `{second}` both signal the frame fence")]
    MultipleTerminals { first: String, second: String },
    #[error("dependency cycle through pass `{0}`")]
    Cycle(String),
    #[error("pass `{pass}` does not lead to the terminal pass `{terminal}`")]
    Unreachable { pass: String, terminal: String },
    #[error("job `{job}` still holds a recording that no worker picked up")]
    RecordingPending { job: String },
    #[error("slot {slot} out of range ({slots} slots)")]
    SlotOutOfRange { slot: usize, slots: usize },
    #[error("dispatch order must name each of the {passes} passes exactly once")]
    DispatchOrder { passes: usize },
}

struct PassNode<D: Device> {
    name: String,
    recorder: Arc<dyn PassRecorder<D>>,
    dependencies: Vec<PassId>,
    // One per-slot array per external dependency.
    external_waits: Vec<Vec<D::Semaphore>>,
    fences: Option<Vec<D::Fence>>,
}

/// Graph builder.
pub struct PassGraph<D: Device> {
    slot_count: usize,
    nodes: Vec<PassNode<D>>,
}

impl<D: Device> PassGraph<D> {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slot_count,
            nodes: Vec::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn add_pass(
        &mut self,
        name: impl Into<String>,
        recorder: Arc<dyn PassRecorder<D>>,
    ) -> PassId {
        let id = PassId(self.nodes.len());
        self.nodes.push(PassNode {
            name: name.into(),
            recorder,
            dependencies: Vec::new(),
            external_waits: Vec::new(),
            fences: None,
        });
        id
    }

    /// `pass` waits for `producer` in every slot, on the device and on the host.
    pub fn depends_on(&mut self, pass: PassId, producer: PassId) -> Result<(), GraphError> {
        self.check(producer)?;
        self.check(pass)?;
        if pass == producer {
            return Err(GraphError::SelfDependency(self.nodes[pass.0].name.clone()));
        }
        if self.nodes[pass.0].dependencies.contains(&producer) {
            return Err(GraphError::DuplicateDependency {
                consumer: self.nodes[pass.0].name.clone(),
                producer: self.nodes[producer.0].name.clone(),
            });
        }
        self.nodes[pass.0].dependencies.push(producer);
        Ok(())
    }

    /// `pass` waits on an externally signaled semaphore, one per slot. No host
    /// handshake: the producer is not a render job.
    pub fn depends_on_external(
        &mut self,
        pass: PassId,
        semaphores: &[D::Semaphore],
    ) -> Result<(), GraphError> {
        self.check(pass)?;
        self.check_slot_count(pass, semaphores.len())?;
        self.nodes[pass.0].external_waits.push(semaphores.to_vec());
        Ok(())
    }

    /// Marks `pass` as frame-terminal: its job also signals the slot's CPU fence.
    pub fn signal_cpu(&mut self, pass: PassId, fences: &[D::Fence]) -> Result<(), GraphError> {
        self.check(pass)?;
        self.check_slot_count(pass, fences.len())?;
        if let Some(other) = self
            .nodes
            .iter()
            .enumerate()
            .find(|(idx, node)| *idx != pass.0 && node.fences.is_some())
            .map(|(_, node)| node.name.clone())
        {
            return Err(GraphError::MultipleTerminals {
                first: other,
                second: self.nodes[pass.0].name.clone(),
            });
        }
        self.nodes[pass.0].fences = Some(fences.to_vec());
        Ok(())
    }

    fn check(&self, pass: PassId) -> Result<(), GraphError> {
        if pass.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownPass(pass))
        }
    }

    fn check_slot_count(&self, pass: PassId, actual: usize) -> Result<(), GraphError> {
        if actual == self.slot_count {
            Ok(())
        } else {
            Err(GraphError::SlotCountMismatch {
                pass: self.nodes[pass.0].name.clone(),
                expected: self.slot_count,
                actual,
            })
        }
    }

    /// Topological order (Kahn, ties broken by insertion order) and the
    /// terminal pass.
    fn validate(&self) -> Result<(Vec<PassId>, PassId), GraphError> {
        if self.slot_count == 0 {
            return Err(GraphError::NoSlots);
        }
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }
        let terminal = self
            .nodes
            .iter()
            .position(|node| node.fences.is_some())
            .map(PassId)
            .ok_or(GraphError::NoTerminal)?;

        let mut consumers = vec![Vec::new(); self.nodes.len()];
        let mut pending: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        for (idx, node) in self.nodes.iter().enumerate() {
            for producer in &node.dependencies {
                consumers[producer.0].push(idx);
            }
        }

        let mut ready: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(idx) = ready.pop_front() {
            order.push(PassId(idx));
            for &consumer in &consumers[idx] {
                pending[consumer] -= 1;
                if pending[consumer] == 0 {
                    ready.push_back(consumer);
                }
            }
        }
        if order.len() < self.nodes.len() {
            let stuck = pending.iter().position(|&p| p > 0).unwrap_or(0);
            return Err(GraphError::Cycle(self.nodes[stuck].name.clone()));
        }

        // Every pass must feed the terminal pass, otherwise its signals are
        // never consumed and the frame fence does not cover its work.
        let mut reaches = vec![false; self.nodes.len()];
        let mut stack = vec![terminal.0];
        while let Some(idx) = stack.pop() {
            if !reaches[idx] {
                reaches[idx] = true;
                stack.extend(self.nodes[idx].dependencies.iter().map(|p| p.0));
            }
        }
        if let Some(idx) = reaches.iter().position(|&r| !r) {
            return Err(GraphError::Unreachable {
                pass: self.nodes[idx].name.clone(),
                terminal: self.nodes[terminal.0].name.clone(),
            });
        }

        Ok((order, terminal))
    }

    /// Validates the graph and creates its per-slot jobs and semaphores.
    pub fn build(self, device: &Arc<D>) -> Result<FrameGraph<D>> {
        let (order, terminal) = self.validate()?;
        let slots = self.slot_count;

        let mut edges = Vec::new();
        for (consumer, node) in self.nodes.iter().enumerate() {
            for &producer in &node.dependencies {
                edges.push(EdgeSpec {
                    producer: producer.0,
                    consumer: Some(consumer),
                });
            }
        }
        edges.push(EdgeSpec {
            producer: terminal.0,
            consumer: None,
        });

        // semaphores[edge][slot]
        let mut semaphores: Vec<Vec<D::Semaphore>> = Vec::with_capacity(edges.len());
        for edge in &edges {
            let mut per_slot = Vec::with_capacity(slots);
            for _ in 0..slots {
                match device.create_semaphore() {
                    Ok(semaphore) => per_slot.push(semaphore),
                    Err(err) => {
                        for semaphore in semaphores.iter().flatten().chain(per_slot.iter()) {
                            device.destroy_semaphore(*semaphore);
                        }
                        return Err(err).with_context(|| {
                            format!(
                                "Failed to create semaphore for `{}`",
                                self.edge_name(edge)
                            )
                        });
                    }
                }
            }
            semaphores.push(per_slot);
        }

        let mut orderings: Vec<Vec<Arc<dyn SubmissionOrdering>>> = Vec::with_capacity(edges.len());
        let mut named_orderings = Vec::new();
        for edge in &edges {
            let name = self.edge_name(edge);
            let per_slot: Vec<Arc<dyn SubmissionOrdering>> = (0..slots)
                .map(|slot| {
                    Arc::new(HostSemaphore::new(format!("{name}[{slot}]")))
                        as Arc<dyn SubmissionOrdering>
                })
                .collect();
            for (slot, ordering) in per_slot.iter().enumerate() {
                named_orderings.push((format!("{name}[{slot}]"), Arc::clone(ordering)));
            }
            orderings.push(per_slot);
        }

        let mut wirings: Vec<Vec<JobWiring<D>>> = self
            .nodes
            .iter()
            .map(|node| {
                (0..slots)
                    .map(|slot| JobWiring {
                        device_waits: node.external_waits.iter().map(|w| w[slot]).collect(),
                        fence: node.fences.as_ref().map(|f| f[slot]),
                        ..Default::default()
                    })
                    .collect()
            })
            .collect();
        let mut owned: Vec<Vec<D::Semaphore>> = vec![Vec::new(); self.nodes.len()];

        for (edge_idx, edge) in edges.iter().enumerate() {
            owned[edge.producer].extend(semaphores[edge_idx].iter().copied());
            for slot in 0..slots {
                let semaphore = semaphores[edge_idx][slot];
                let ordering = &orderings[edge_idx][slot];
                let producer = &mut wirings[edge.producer][slot];
                producer.device_signals.push(semaphore);
                producer.host_signals.push(Arc::clone(ordering));
                if let Some(consumer) = edge.consumer {
                    let consumer = &mut wirings[consumer][slot];
                    consumer.device_waits.push(semaphore);
                    consumer.host_waits.push(Arc::clone(ordering));
                }
            }
        }

        let present = (0..slots)
            .map(|slot| PresentLink {
                semaphore: semaphores[edges.len() - 1][slot],
                ordering: Arc::clone(&orderings[edges.len() - 1][slot]),
            })
            .collect();
        let fences = self.nodes[terminal.0].fences.clone().unwrap_or_default();

        let passes: Vec<RenderPass<D>> = self
            .nodes
            .into_iter()
            .zip(wirings)
            .zip(owned)
            .enumerate()
            .map(|(idx, ((node, wirings), owned))| {
                let jobs = wirings
                    .into_iter()
                    .enumerate()
                    .map(|(slot, wiring)| {
                        Arc::new(RenderJob::new(format!("{}[{slot}]", node.name), slot, wiring))
                    })
                    .collect();
                RenderPass::new(
                    PassId(idx),
                    node.name,
                    node.recorder,
                    node.dependencies,
                    jobs,
                    owned,
                    Arc::clone(device),
                )
            })
            .collect();

        log::info!(
            "Built pass graph: {} passes, {} edges, {} slots, terminal `{}`",
            passes.len(),
            edges.len() - 1,
            slots,
            passes[terminal.0].name()
        );
        log::debug!(
            "Dispatch order: {:?}",
            order.iter().map(|id| passes[id.0].name()).collect::<Vec<_>>()
        );

        Ok(FrameGraph {
            passes,
            order,
            terminal,
            present,
            fences,
            orderings: named_orderings,
            slot_count: slots,
        })
    }

    fn edge_name(&self, edge: &EdgeSpec) -> String {
        let producer = &self.nodes[edge.producer].name;
        match edge.consumer {
            Some(consumer) => format!("{producer}->{}", self.nodes[consumer].name),
            None => format!("{producer}->present"),
        }
    }
}

struct EdgeSpec {
    producer: usize,
    // None: the frame driver's presentation.
    consumer: Option<usize>,
}

struct PresentLink<D: Device> {
    semaphore: D::Semaphore,
    ordering: Arc<dyn SubmissionOrdering>,
}

/// Frozen pass graph, owned by the frame driver.
pub struct FrameGraph<D: Device> {
    passes: Vec<RenderPass<D>>,
    order: Vec<PassId>,
    terminal: PassId,
    present: Vec<PresentLink<D>>,
    fences: Vec<D::Fence>,
    orderings: Vec<(String, Arc<dyn SubmissionOrdering>)>,
    slot_count: usize,
}

impl<D: Device> FrameGraph<D> {
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn passes(&self) -> &[RenderPass<D>] {
        &self.passes
    }

    pub fn pass(&self, id: PassId) -> Option<&RenderPass<D>> {
        self.passes.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<PassId> {
        self.passes.iter().find(|p| p.name() == name).map(|p| p.id())
    }

    /// Dependencies before dependents.
    pub fn topological_order(&self) -> &[PassId] {
        &self.order
    }

    pub fn terminal(&self) -> PassId {
        self.terminal
    }

    pub fn frame_fences(&self) -> &[D::Fence] {
        &self.fences
    }

    /// Semaphore the terminal pass signals for presentation in `slot`.
    pub fn present_semaphore(&self, slot: usize) -> D::Semaphore {
        self.present[slot].semaphore
    }

    /// Host handshake the frame driver waits on before presenting `slot`.
    pub fn present_ordering(&self, slot: usize) -> &dyn SubmissionOrdering {
        self.present[slot].ordering.as_ref()
    }

    /// Counters of every host handshake, by `producer->consumer[slot]` name.
    pub fn ordering_stats(&self) -> Vec<(String, OrderingStats)> {
        self.orderings
            .iter()
            .map(|(name, ordering)| (name.clone(), ordering.stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::headless::{HeadlessDevice, HeadlessSemaphore};
    use crate::scheduler::pass::FrameContext;
    use std::time::Duration;

    struct Noop;

    impl PassRecorder<HeadlessDevice> for Noop {
        fn record(&self, _: <HeadlessDevice as Device>::CommandBuffer, _: &FrameContext) {}
    }

    fn noop() -> Arc<dyn PassRecorder<HeadlessDevice>> {
        Arc::new(Noop)
    }

    struct Deferred {
        graph: PassGraph<HeadlessDevice>,
        sky: PassId,
        gbuffer: PassId,
        shadow: PassId,
        lighting: PassId,
        ui: PassId,
        acquired: Vec<HeadlessSemaphore>,
    }

    fn deferred(device: &Arc<HeadlessDevice>) -> Deferred {
        let mut graph = PassGraph::new(2);
        let sky = graph.add_pass("sky", noop());
        let gbuffer = graph.add_pass("gbuffer", noop());
        let shadow = graph.add_pass("shadow", noop());
        let lighting = graph.add_pass("lighting", noop());
        let ui = graph.add_pass("ui", noop());

        let acquired = vec![
            device.create_semaphore().unwrap(),
            device.create_semaphore().unwrap(),
        ];
        let fences = vec![
            device.create_fence(true).unwrap(),
            device.create_fence(true).unwrap(),
        ];
        graph.depends_on_external(sky, &acquired).unwrap();
        graph.depends_on(gbuffer, sky).unwrap();
        graph.depends_on(lighting, gbuffer).unwrap();
        graph.depends_on(lighting, shadow).unwrap();
        graph.depends_on(ui, lighting).unwrap();
        graph.signal_cpu(ui, &fences).unwrap();

        Deferred {
            graph,
            sky,
            gbuffer,
            shadow,
            lighting,
            ui,
            acquired,
        }
    }

    fn graph_error(result: Result<FrameGraph<HeadlessDevice>>) -> GraphError {
        match result {
            Ok(_) => panic!("graph unexpectedly built"),
            Err(err) => err.downcast::<GraphError>().expect("not a graph error"),
        }
    }

    #[test]
    fn rendered_passes_queue_their_slot_jobs() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let d = deferred(&device);
        let graph = d.graph.build(&device).unwrap();
        let pool = crate::scheduler::RenderThreadPool::new(Arc::clone(&device), 1, 2).unwrap();
        device.signal_from_host(d.acquired[0], "acquire").unwrap();
        let frame_fence = graph.pass(d.ui).unwrap().job(0).unwrap().wiring().fence.unwrap();
        device.reset_fence(frame_fence).unwrap();

        let frame = FrameContext {
            frame: 0,
            slot: 0,
            target: 0,
            dt: 0.0,
        };
        for &id in graph.topological_order() {
            graph.pass(id).unwrap().render(&pool, &frame).unwrap();
        }
        graph.present_ordering(0).wait();

        let labels: Vec<String> = device.submissions().into_iter().map(|s| s.label).collect();
        assert_eq!(labels.len(), 5);
        assert!(labels.iter().all(|label| label.ends_with("[0]")), "{labels:?}");
        assert!(device.violations().is_empty(), "{:?}", device.violations());

        // A job can hold one recording at a time.
        let next = FrameContext { slot: 1, ..frame };
        let shadow = graph.pass(d.shadow).unwrap();
        shadow.prepare(&next).unwrap();
        assert!(matches!(
            shadow.prepare(&next),
            Err(GraphError::RecordingPending { .. })
        ));
    }

    #[test]
    fn wires_waits_and_signals_per_slot() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let d = deferred(&device);
        let graph = d.graph.build(&device).unwrap();

        for slot in 0..2 {
            let sky = graph.pass(d.sky).unwrap().job(slot).unwrap().wiring();
            assert_eq!(sky.device_waits, vec![d.acquired[slot]]);
            assert!(sky.host_waits.is_empty());
            assert_eq!(sky.device_signals.len(), 1);

            let lighting = graph.pass(d.lighting).unwrap().job(slot).unwrap().wiring();
            assert_eq!(lighting.device_waits.len(), 2);
            assert_eq!(lighting.host_waits.len(), 2);

            let gbuffer = graph.pass(d.gbuffer).unwrap().job(slot).unwrap().wiring();
            let shadow = graph.pass(d.shadow).unwrap().job(slot).unwrap().wiring();
            assert!(lighting.device_waits.contains(&gbuffer.device_signals[0]));
            assert!(lighting.device_waits.contains(&shadow.device_signals[0]));
            assert!(shadow.device_waits.is_empty());

            let ui = graph.pass(d.ui).unwrap().job(slot).unwrap().wiring();
            assert_eq!(ui.fence, Some(graph.frame_fences()[slot]));
            assert_eq!(ui.device_signals, vec![graph.present_semaphore(slot)]);
            assert!(gbuffer.fence.is_none());
        }

        // Slots never share a semaphore.
        let sky = graph.pass(d.sky).unwrap();
        assert_ne!(
            sky.job(0).unwrap().wiring().device_signals,
            sky.job(1).unwrap().wiring().device_signals
        );
        assert_eq!(graph.terminal(), d.ui);
        assert_eq!(graph.ordering_stats().len(), 5 * 2);
    }

    #[test]
    fn topological_order_puts_producers_first() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let d = deferred(&device);
        let graph = d.graph.build(&device).unwrap();

        let order = graph.topological_order();
        let position = |id: PassId| order.iter().position(|&p| p == id).unwrap();
        for pass in graph.passes() {
            for &dependency in pass.dependencies() {
                assert!(position(dependency) < position(pass.id()));
            }
        }
        assert_eq!(order.len(), 5);
        assert_eq!(graph.find("shadow"), Some(d.shadow));
    }

    #[test]
    fn fan_out_gets_one_semaphore_pair_per_consumer() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let mut graph = PassGraph::new(1);
        let source = graph.add_pass("source", noop());
        let left = graph.add_pass("left", noop());
        let right = graph.add_pass("right", noop());
        let sink = graph.add_pass("sink", noop());
        graph.depends_on(left, source).unwrap();
        graph.depends_on(right, source).unwrap();
        graph.depends_on(sink, left).unwrap();
        graph.depends_on(sink, right).unwrap();
        graph
            .signal_cpu(sink, &[device.create_fence(true).unwrap()])
            .unwrap();
        let graph = graph.build(&device).unwrap();

        let source = graph.pass(source).unwrap().job(0).unwrap().wiring();
        assert_eq!(source.device_signals.len(), 2);
        assert_eq!(source.host_signals.len(), 2);
        assert_ne!(source.device_signals[0], source.device_signals[1]);
    }

    #[test]
    fn rejects_invalid_edges() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let mut graph: PassGraph<HeadlessDevice> = PassGraph::new(2);
        let a = graph.add_pass("a", noop());
        let b = graph.add_pass("b", noop());

        assert_eq!(
            graph.depends_on(a, a),
            Err(GraphError::SelfDependency("a".into()))
        );
        graph.depends_on(b, a).unwrap();
        assert!(matches!(
            graph.depends_on(b, a),
            Err(GraphError::DuplicateDependency { .. })
        ));
        assert_eq!(
            graph.depends_on(b, PassId(7)),
            Err(GraphError::UnknownPass(PassId(7)))
        );

        let one = [device.create_semaphore().unwrap()];
        assert_eq!(
            graph.depends_on_external(a, &one),
            Err(GraphError::SlotCountMismatch {
                pass: "a".into(),
                expected: 2,
                actual: 1
            })
        );

        let fences = [
            device.create_fence(true).unwrap(),
            device.create_fence(true).unwrap(),
        ];
        graph.signal_cpu(b, &fences).unwrap();
        assert!(matches!(
            graph.signal_cpu(a, &fences),
            Err(GraphError::MultipleTerminals { .. })
        ));
    }

    #[test]
    fn rejects_cycles() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let mut graph = PassGraph::new(1);
        let a = graph.add_pass("a", noop());
        let b = graph.add_pass("b", noop());
        let c = graph.add_pass("c", noop());
        graph.depends_on(b, a).unwrap();
        graph.depends_on(c, b).unwrap();
        graph.depends_on(a, c).unwrap();
        graph.signal_cpu(c, &[device.create_fence(true).unwrap()]).unwrap();

        assert!(matches!(graph_error(graph.build(&device)), GraphError::Cycle(_)));
    }

    #[test]
    fn rejects_passes_that_do_not_feed_the_terminal() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let mut graph = PassGraph::new(1);
        let a = graph.add_pass("a", noop());
        let _orphan = graph.add_pass("orphan", noop());
        graph.signal_cpu(a, &[device.create_fence(true).unwrap()]).unwrap();

        assert_eq!(
            graph_error(graph.build(&device)),
            GraphError::Unreachable {
                pass: "orphan".into(),
                terminal: "a".into()
            }
        );
    }

    #[test]
    fn rejects_graphs_without_terminal_or_slots() {
        let device = HeadlessDevice::new(Duration::ZERO);

        let empty: PassGraph<HeadlessDevice> = PassGraph::new(2);
        assert_eq!(graph_error(empty.build(&device)), GraphError::Empty);

        let mut no_terminal = PassGraph::new(2);
        no_terminal.add_pass("a", noop());
        assert_eq!(graph_error(no_terminal.build(&device)), GraphError::NoTerminal);

        let mut no_slots = PassGraph::new(0);
        no_slots.add_pass("a", noop());
        assert_eq!(graph_error(no_slots.build(&device)), GraphError::NoSlots);
    }

    #[test]
    fn dropping_the_graph_destroys_its_semaphores() {
        let device = HeadlessDevice::new(Duration::ZERO);
        let d = deferred(&device);
        let external = device.live_semaphores();

        let graph = d.graph.build(&device).unwrap();
        // Five edges (four dependencies plus presentation), two slots each.
        assert_eq!(device.live_semaphores(), external + 10);

        drop(graph);
        assert_eq!(device.live_semaphores(), external);
    }
}
