// GBuffer pass - draws the scene object over the sky
//
// Leaves the albedo image ready to be read by lighting.

use super::context::{missing, PassContext};
use crate::backend::{commands, VulkanDevice};
use crate::scheduler::{FrameContext, PassRecorder};
use ash::vk;
use std::sync::Arc;

pub struct GBufferPass {
    context: Arc<PassContext>,
}

impl GBufferPass {
    pub fn new(context: Arc<PassContext>) -> Self {
        Self { context }
    }
}

impl PassRecorder<VulkanDevice> for GBufferPass {
    fn record(&self, cmd: vk::CommandBuffer, frame: &FrameContext) {
        let uniforms = self.context.scene.read(frame.slot);
        let targets = self.context.targets.read();
        let Some(slot) = targets.slot(frame.slot) else {
            missing(super::GBUFFER, "render targets", frame)
        };
        let device = &self.context.device.device;

        commands::fill_rect(
            device,
            cmd,
            slot.albedo.view,
            slot.albedo.extent,
            &uniforms.object_rect,
            uniforms.object_color.to_array(),
        );
        commands::transition(
            device,
            cmd,
            slot.albedo.image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
    }
}
