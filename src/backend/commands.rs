// Command helpers
//
// Small recording building blocks shared by the pass recorders: layout
// transitions, full-image clears, blits and solid rectangles. All of them
// record into a command buffer that is already in the recording state.

use crate::scene::ScreenRect;
use ash::vk;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

const COLOR_LAYERS: vk::ImageSubresourceLayers = vk::ImageSubresourceLayers {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    mip_level: 0,
    base_array_layer: 0,
    layer_count: 1,
};

/// Stage and access of the last/next use of an image in `layout`.
fn layout_usage(layout: vk::ImageLayout) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE)
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_READ)
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => {
            (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty())
        }
        // UNDEFINED: contents are discarded, only wait for earlier work
        _ => (vk::PipelineStageFlags::ALL_COMMANDS, vk::AccessFlags::empty()),
    }
}

/// Image layout transition. Work from other queues is already ordered by
/// the submission's semaphore waits.
pub fn transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_stage, src_access) = layout_usage(old_layout);
    let (dst_stage, dst_access) = layout_usage(new_layout);
    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(COLOR_RANGE)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Clears the whole image. `image` must be in TRANSFER_DST layout.
pub fn clear(device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image, color: [f32; 4]) {
    let clear_color = vk::ClearColorValue { float32: color };
    unsafe {
        device.cmd_clear_color_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &clear_color,
            &[COLOR_RANGE],
        );
    }
}

/// Copies all of `src` (TRANSFER_SRC) into `dst_region` of `dst`
/// (TRANSFER_DST), scaling as needed.
pub fn blit(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    src_extent: vk::Extent2D,
    dst: vk::Image,
    dst_region: vk::Rect2D,
) {
    let region = vk::ImageBlit::builder()
        .src_subresource(COLOR_LAYERS)
        .src_offsets([vk::Offset3D::default(), corner(vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: src_extent,
        })])
        .dst_subresource(COLOR_LAYERS)
        .dst_offsets([
            vk::Offset3D {
                x: dst_region.offset.x,
                y: dst_region.offset.y,
                z: 0,
            },
            corner(dst_region),
        ])
        .build();

    unsafe {
        device.cmd_blit_image(
            cmd,
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
            vk::Filter::NEAREST,
        );
    }
}

fn corner(rect: vk::Rect2D) -> vk::Offset3D {
    vk::Offset3D {
        x: rect.offset.x + rect.extent.width as i32,
        y: rect.offset.y + rect.extent.height as i32,
        z: 1,
    }
}

/// Fills `rect` of the attachment behind `view` with `color`, keeping the
/// rest of the image. The image must be in COLOR_ATTACHMENT layout.
pub fn fill_rect(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    view: vk::ImageView,
    extent: vk::Extent2D,
    rect: &ScreenRect,
    color: [f32; 4],
) {
    let Some(area) = pixel_rect(rect, extent) else {
        return;
    };

    let attachment = vk::RenderingAttachmentInfo::builder()
        .image_view(view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::LOAD)
        .store_op(vk::AttachmentStoreOp::STORE)
        .build();
    let rendering_info = vk::RenderingInfo::builder()
        .render_area(vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        })
        .layer_count(1)
        .color_attachments(std::slice::from_ref(&attachment));

    let clear = vk::ClearAttachment {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        color_attachment: 0,
        clear_value: vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
    };
    let clear_rect = vk::ClearRect {
        rect: area,
        base_array_layer: 0,
        layer_count: 1,
    };

    unsafe {
        device.cmd_begin_rendering(cmd, &rendering_info);
        device.cmd_clear_attachments(cmd, &[clear], &[clear_rect]);
        device.cmd_end_rendering(cmd);
    }
}

/// Pixel rectangle covered by `rect` in an image of `extent`. `None` when
/// it covers no pixel.
pub fn pixel_rect(rect: &ScreenRect, extent: vk::Extent2D) -> Option<vk::Rect2D> {
    if rect.is_empty() {
        return None;
    }
    let to_pixels = |value: f32, size: u32| (value.clamp(0.0, 1.0) * size as f32).round() as u32;
    let x0 = to_pixels(rect.min.x, extent.width);
    let y0 = to_pixels(rect.min.y, extent.height);
    let x1 = to_pixels(rect.max.x, extent.width);
    let y1 = to_pixels(rect.max.y, extent.height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(vk::Rect2D {
        offset: vk::Offset2D {
            x: x0 as i32,
            y: y0 as i32,
        },
        extent: vk::Extent2D {
            width: x1 - x0,
            height: y1 - y0,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    const HD: vk::Extent2D = vk::Extent2D {
        width: 1280,
        height: 720,
    };

    #[test]
    fn maps_normalized_rects_to_pixels() {
        let rect = ScreenRect {
            min: Vec2::new(0.25, 0.5),
            max: Vec2::new(0.5, 1.0),
        };
        let area = pixel_rect(&rect, HD).unwrap();
        assert_eq!((area.offset.x, area.offset.y), (320, 360));
        assert_eq!((area.extent.width, area.extent.height), (320, 360));
    }

    #[test]
    fn clamps_to_the_image() {
        let rect = ScreenRect {
            min: Vec2::new(-1.0, -1.0),
            max: Vec2::new(2.0, 2.0),
        };
        let area = pixel_rect(&rect, HD).unwrap();
        assert_eq!((area.offset.x, area.offset.y), (0, 0));
        assert_eq!(area.extent, HD);
    }

    #[test]
    fn empty_and_subpixel_rects_cover_nothing() {
        assert!(pixel_rect(&ScreenRect::default(), HD).is_none());
        let sliver = ScreenRect {
            min: Vec2::new(0.5, 0.5),
            max: Vec2::new(0.5001, 0.6),
        };
        assert!(pixel_rect(&sliver, HD).is_none());
    }

    #[test]
    fn transitions_out_of_undefined_only_wait_for_earlier_work() {
        let (stage, access) = layout_usage(vk::ImageLayout::UNDEFINED);
        assert_eq!(stage, vk::PipelineStageFlags::ALL_COMMANDS);
        assert!(access.is_empty());
        let (_, access) = layout_usage(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(access, vk::AccessFlags::TRANSFER_WRITE);
    }
}
