// UI pass - status bar overlay, then hands the image to presentation
//
// Terminal pass of the frame: signals the frame fence and the present
// semaphore.

use super::context::{missing, PassContext};
use crate::backend::{commands, VulkanDevice};
use crate::scheduler::{FrameContext, PassRecorder};
use ash::vk;
use std::sync::Arc;

pub struct UiPass {
    context: Arc<PassContext>,
}

impl UiPass {
    pub fn new(context: Arc<PassContext>) -> Self {
        Self { context }
    }
}

impl PassRecorder<VulkanDevice> for UiPass {
    fn record(&self, cmd: vk::CommandBuffer, frame: &FrameContext) {
        let uniforms = self.context.scene.read(frame.slot);
        let present = self.context.present.read();
        let Some((image, view)) = present.get(frame.target) else {
            missing(super::UI, "swapchain image", frame)
        };
        let device = &self.context.device.device;

        commands::fill_rect(
            device,
            cmd,
            view,
            present.extent,
            &uniforms.overlay_rect,
            uniforms.overlay_color.to_array(),
        );
        commands::transition(
            device,
            cmd,
            image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
    }
}
