// Deferred frame passes
//
// The frame graph used by the binary:
//
//   sky ──► gbuffer ──┐
//                     ├──► lighting ──► ui (signals the frame fence)
//   shadow ───────────┘
//
// sky also waits on the slot's "target available" semaphore. The graph is
// backend-agnostic; the recorders in this module are the Vulkan ones.

pub mod context;
pub mod gbuffer;
pub mod lighting;
pub mod shadow;
pub mod sky;
pub mod ui;

pub use context::PassContext;
pub use gbuffer::GBufferPass;
pub use lighting::LightingPass;
pub use shadow::ShadowPass;
pub use sky::SkyPass;
pub use ui::UiPass;

use crate::device::Device;
use crate::frame_sync::FrameSync;
use crate::scheduler::{FrameGraph, PassGraph, PassId, PassRecorder};
use anyhow::Result;
use std::sync::Arc;

pub const SKY: &str = "sky";
pub const GBUFFER: &str = "gbuffer";
pub const SHADOW: &str = "shadow";
pub const LIGHTING: &str = "lighting";
pub const UI: &str = "ui";

/// Recorders for the five deferred passes.
pub struct DeferredPasses<D: Device> {
    pub sky: Arc<dyn PassRecorder<D>>,
    pub gbuffer: Arc<dyn PassRecorder<D>>,
    pub shadow: Arc<dyn PassRecorder<D>>,
    pub lighting: Arc<dyn PassRecorder<D>>,
    pub ui: Arc<dyn PassRecorder<D>>,
}

impl<D: Device> DeferredPasses<D> {
    /// Same recorder for every pass.
    pub fn uniform(recorder: Arc<dyn PassRecorder<D>>) -> Self {
        Self {
            sky: Arc::clone(&recorder),
            gbuffer: Arc::clone(&recorder),
            shadow: Arc::clone(&recorder),
            lighting: Arc::clone(&recorder),
            ui: recorder,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredIds {
    pub sky: PassId,
    pub gbuffer: PassId,
    pub shadow: PassId,
    pub lighting: PassId,
    pub ui: PassId,
}

/// Wires the deferred graph against `sync`'s acquire semaphores and frame
/// fences and builds it.
pub fn deferred_graph<D: Device>(
    device: &Arc<D>,
    sync: &FrameSync<D>,
    passes: DeferredPasses<D>,
) -> Result<(FrameGraph<D>, DeferredIds)> {
    let mut graph = PassGraph::new(sync.slot_count());
    let ids = DeferredIds {
        sky: graph.add_pass(SKY, passes.sky),
        gbuffer: graph.add_pass(GBUFFER, passes.gbuffer),
        shadow: graph.add_pass(SHADOW, passes.shadow),
        lighting: graph.add_pass(LIGHTING, passes.lighting),
        ui: graph.add_pass(UI, passes.ui),
    };

    graph.depends_on_external(ids.sky, sync.image_available_all())?;
    graph.depends_on(ids.gbuffer, ids.sky)?;
    graph.depends_on(ids.lighting, ids.gbuffer)?;
    graph.depends_on(ids.lighting, ids.shadow)?;
    graph.depends_on(ids.ui, ids.lighting)?;
    graph.signal_cpu(ids.ui, sync.in_flight_fences())?;

    Ok((graph.build(device)?, ids))
}
