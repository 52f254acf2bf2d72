// Shared pass resources
//
// Everything the Vulkan recorders read while recording on the workers. The
// render and present targets sit behind read-write locks: workers take read
// locks while recording, the control thread swaps them after a resize once
// the device is idle and no frame is in flight.

use super::{DeferredPasses, GBufferPass, LightingPass, ShadowPass, SkyPass, UiPass};
use crate::backend::{PresentTargets, RenderTargets, VulkanDevice};
use crate::scene::SceneState;
use crate::scheduler::{self, FrameContext};
use parking_lot::RwLock;
use std::sync::Arc;

pub struct PassContext {
    pub device: Arc<VulkanDevice>,
    pub targets: Arc<RwLock<RenderTargets>>,
    pub present: Arc<RwLock<PresentTargets>>,
    pub scene: Arc<SceneState>,
}

impl PassContext {
    pub fn new(
        device: Arc<VulkanDevice>,
        targets: Arc<RwLock<RenderTargets>>,
        present: Arc<RwLock<PresentTargets>>,
        scene: Arc<SceneState>,
    ) -> Arc<Self> {
        Arc::new(Self {
            device,
            targets,
            present,
            scene,
        })
    }

    /// The five Vulkan recorders over this context.
    pub fn deferred_passes(self: &Arc<Self>) -> DeferredPasses<VulkanDevice> {
        DeferredPasses {
            sky: Arc::new(SkyPass::new(Arc::clone(self))),
            gbuffer: Arc::new(GBufferPass::new(Arc::clone(self))),
            shadow: Arc::new(ShadowPass::new(Arc::clone(self))),
            lighting: Arc::new(LightingPass::new(Arc::clone(self))),
            ui: Arc::new(UiPass::new(Arc::clone(self))),
        }
    }
}

/// A recorder found no resource for the frame it was handed.
pub(crate) fn missing(pass: &str, what: &str, frame: &FrameContext) -> ! {
    scheduler::fatal(&anyhow::anyhow!(
        "{}: no {} for slot {} / target {}",
        pass,
        what,
        frame.slot,
        frame.target
    ))
}
