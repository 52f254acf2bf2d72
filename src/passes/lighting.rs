// Lighting pass - composites albedo and shadow into the swapchain image
//
// First pass to touch the acquired image. Waits on gbuffer and shadow.

use super::context::{missing, PassContext};
use crate::backend::{commands, VulkanDevice};
use crate::scheduler::{FrameContext, PassRecorder};
use ash::vk;
use std::sync::Arc;

/// Shadow map preview size as a fraction of the screen height.
const INSET_SCALE: f32 = 0.2;
const INSET_MARGIN: u32 = 16;

pub struct LightingPass {
    context: Arc<PassContext>,
}

impl LightingPass {
    pub fn new(context: Arc<PassContext>) -> Self {
        Self { context }
    }
}

impl PassRecorder<VulkanDevice> for LightingPass {
    fn record(&self, cmd: vk::CommandBuffer, frame: &FrameContext) {
        let targets = self.context.targets.read();
        let present = self.context.present.read();
        let Some(slot) = targets.slot(frame.slot) else {
            missing(super::LIGHTING, "render targets", frame)
        };
        let Some((image, _)) = present.get(frame.target) else {
            missing(super::LIGHTING, "swapchain image", frame)
        };
        let device = &self.context.device.device;

        commands::transition(
            device,
            cmd,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        commands::blit(
            device,
            cmd,
            slot.albedo.image,
            slot.albedo.extent,
            image,
            vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: present.extent,
            },
        );
        if let Some(inset) = shadow_inset(present.extent) {
            commands::blit(device, cmd, slot.shadow.image, slot.shadow.extent, image, inset);
        }
        commands::transition(
            device,
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
    }
}

/// Bottom-right square the shadow map is shown in. `None` on screens too
/// small to fit it.
fn shadow_inset(extent: vk::Extent2D) -> Option<vk::Rect2D> {
    let size = (extent.height as f32 * INSET_SCALE) as u32;
    if size == 0 || size + INSET_MARGIN > extent.width || size + INSET_MARGIN > extent.height {
        return None;
    }
    Some(vk::Rect2D {
        offset: vk::Offset2D {
            x: (extent.width - size - INSET_MARGIN) as i32,
            y: (extent.height - size - INSET_MARGIN) as i32,
        },
        extent: vk::Extent2D {
            width: size,
            height: size,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inset_sits_in_the_bottom_right_corner() {
        let inset = shadow_inset(vk::Extent2D {
            width: 1280,
            height: 720,
        })
        .unwrap();
        assert_eq!(inset.extent.width, 144);
        assert_eq!(inset.offset.x, 1280 - 144 - 16);
        assert_eq!(inset.offset.y, 720 - 144 - 16);
    }

    #[test]
    fn tiny_screens_get_no_inset() {
        assert!(shadow_inset(vk::Extent2D { width: 4, height: 4 }).is_none());
        assert!(shadow_inset(vk::Extent2D {
            width: 20,
            height: 200
        })
        .is_none());
    }
}
