// Shadow pass - fills the slot's shadow map with the light's intensity
//
// Independent of sky and gbuffer, so it may run on another worker at the
// same time.

use super::context::{missing, PassContext};
use crate::backend::{commands, VulkanDevice};
use crate::scheduler::{FrameContext, PassRecorder};
use ash::vk;
use std::sync::Arc;

pub struct ShadowPass {
    context: Arc<PassContext>,
}

impl ShadowPass {
    pub fn new(context: Arc<PassContext>) -> Self {
        Self { context }
    }
}

impl PassRecorder<VulkanDevice> for ShadowPass {
    fn record(&self, cmd: vk::CommandBuffer, frame: &FrameContext) {
        let uniforms = self.context.scene.read(frame.slot);
        let targets = self.context.targets.read();
        let Some(slot) = targets.slot(frame.slot) else {
            missing(super::SHADOW, "render targets", frame)
        };
        let device = &self.context.device.device;
        let shadow = slot.shadow.image;

        commands::transition(
            device,
            cmd,
            shadow,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        commands::clear(device, cmd, shadow, uniforms.light_tint.to_array());
        commands::transition(
            device,
            cmd,
            shadow,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
    }
}
