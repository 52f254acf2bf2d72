// Render targets - per-slot offscreen images
//
// Every buffer slot owns its own albedo and shadow image so a frame being
// recorded never writes an image that an older frame still reads. Memory
// comes from gpu-allocator; images are recreated with the swapchain.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::{Swapchain, VulkanDevice};

pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const SHADOW_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// Shadow map edge length in pixels.
pub const SHADOW_SIZE: u32 = 256;

/// Device-local 2D color image with its view.
pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl Image {
    pub fn new(
        device: &Arc<VulkanDevice>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        if extent.width == 0 || extent.height == 0 {
            anyhow::bail!("Image `{}` must not be empty", name);
        }

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .with_context(|| format!("Failed to create image `{}`", name))?;

        // From here on Drop cleans up whatever was created
        let mut target = Self {
            image,
            view: vk::ImageView::null(),
            extent,
            format,
            allocation: None,
            device: Arc::clone(device),
        };

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let allocation = device
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false, // Optimal tiling is not linear
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for `{}`", name))?;

        unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        }
        .with_context(|| format!("Failed to bind memory of `{}`", name))?;
        target.allocation = Some(allocation);

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        target.view = unsafe { device.device.create_image_view(&view_info, None) }
            .with_context(|| format!("Failed to create view of `{}`", name))?;

        Ok(target)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.device.destroy_image_view(self.view, None);
            }
            self.device.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(err) = self.device.allocator.lock().free(allocation) {
                log::error!("Failed to free image memory: {}", err);
            }
        }
    }
}

/// Offscreen images of one buffer slot.
pub struct SlotTargets {
    /// Sky and geometry, blitted to the screen by lighting.
    pub albedo: Image,
    /// Light visibility, composited into a corner by lighting.
    pub shadow: Image,
}

pub struct RenderTargets {
    slots: Vec<SlotTargets>,
    extent: vk::Extent2D,
}

impl RenderTargets {
    pub fn new(device: &Arc<VulkanDevice>, slot_count: usize, extent: vk::Extent2D) -> Result<Self> {
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST;
        let shadow_extent = vk::Extent2D {
            width: SHADOW_SIZE,
            height: SHADOW_SIZE,
        };

        let slots = (0..slot_count)
            .map(|slot| {
                Ok(SlotTargets {
                    albedo: Image::new(
                        device,
                        &format!("albedo[{slot}]"),
                        extent,
                        ALBEDO_FORMAT,
                        usage,
                    )?,
                    shadow: Image::new(
                        device,
                        &format!("shadow[{slot}]"),
                        shadow_extent,
                        SHADOW_FORMAT,
                        usage,
                    )?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Created render targets: {} slots at {}x{}",
            slot_count,
            extent.width,
            extent.height
        );
        Ok(Self { slots, extent })
    }

    pub fn slot(&self, slot: usize) -> Option<&SlotTargets> {
        self.slots.get(slot)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Swapchain handles the lighting and UI passes write to. Copied out of the
/// swapchain so workers never touch the swapchain object itself.
#[derive(Debug, Clone, Default)]
pub struct PresentTargets {
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

impl PresentTargets {
    pub fn from_swapchain(swapchain: &Swapchain) -> Self {
        Self {
            images: swapchain.images.clone(),
            views: swapchain.image_views.clone(),
            extent: swapchain.extent,
            format: swapchain.format,
        }
    }

    pub fn get(&self, target: u32) -> Option<(vk::Image, vk::ImageView)> {
        let index = target as usize;
        Some((*self.images.get(index)?, *self.views.get(index)?))
    }
}
