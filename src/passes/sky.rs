// Sky pass - clears the slot's albedo image to the sky color

use super::context::{missing, PassContext};
use crate::backend::{commands, VulkanDevice};
use crate::scheduler::{FrameContext, PassRecorder};
use ash::vk;
use std::sync::Arc;

pub struct SkyPass {
    context: Arc<PassContext>,
}

impl SkyPass {
    pub fn new(context: Arc<PassContext>) -> Self {
        Self { context }
    }
}

impl PassRecorder<VulkanDevice> for SkyPass {
    fn record(&self, cmd: vk::CommandBuffer, frame: &FrameContext) {
        let uniforms = self.context.scene.read(frame.slot);
        let targets = self.context.targets.read();
        let Some(slot) = targets.slot(frame.slot) else {
            missing(super::SKY, "render targets", frame)
        };
        let device = &self.context.device.device;
        let albedo = slot.albedo.image;

        // Previous contents are discarded
        commands::transition(
            device,
            cmd,
            albedo,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        commands::clear(device, cmd, albedo, uniforms.sky_color.to_array());
        commands::transition(
            device,
            cmd,
            albedo,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
    }
}
