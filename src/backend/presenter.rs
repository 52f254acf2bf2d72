// Vulkan presenter - swapchain side of the frame loop
//
// Acquires swapchain images for the renderer and presents them on the
// present queue. Out-of-date and suboptimal results only raise a flag; the
// owner recreates the swapchain between frames once the device is idle.

use anyhow::{Context, Result};
use ash::vk;
use parking_lot::RwLock;
use std::sync::Arc;

use super::{PresentTargets, Surface, Swapchain, VulkanDevice};
use crate::renderer::Presenter;

pub struct VulkanPresenter {
    // Swapchain before surface: it must go first
    swapchain: Option<Swapchain>,
    surface: Surface,
    targets: Arc<RwLock<PresentTargets>>,
    present_mode: vk::PresentModeKHR,
    needs_recreate: bool,
    device: Arc<VulkanDevice>,
}

impl VulkanPresenter {
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: Surface,
        width: u32,
        height: u32,
        present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let mut presenter = Self {
            swapchain: None,
            surface,
            targets: Arc::new(RwLock::new(PresentTargets::default())),
            present_mode,
            needs_recreate: false,
            device,
        };
        presenter.recreate(width, height)?;
        Ok(presenter)
    }

    /// Swapchain images as the passes see them.
    pub fn targets(&self) -> &Arc<RwLock<PresentTargets>> {
        &self.targets
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(|swapchain| swapchain.extent)
    }

    pub fn needs_recreate(&self) -> bool {
        self.needs_recreate || self.swapchain.is_none()
    }

    pub fn mark_outdated(&mut self) {
        self.needs_recreate = true;
    }

    /// Rebuilds the swapchain for a `width` x `height` window. The device
    /// must be idle. A zero-sized (minimized) window leaves no swapchain, so
    /// every acquire reports out of date until the next call.
    pub fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            log::debug!("Window minimized, dropping swapchain");
            self.targets.write().images.clear();
            self.swapchain = None;
            self.needs_recreate = true;
            return Ok(());
        }

        let swapchain = Swapchain::new(
            Arc::clone(&self.device),
            &self.surface,
            width,
            height,
            self.present_mode,
            self.swapchain.as_ref(),
        )
        .context("Failed to recreate swapchain")?;

        *self.targets.write() = PresentTargets::from_swapchain(&swapchain);
        // Old swapchain is retired by the new one and can go now
        self.swapchain = Some(swapchain);
        self.needs_recreate = false;
        Ok(())
    }
}

impl Presenter<VulkanDevice> for VulkanPresenter {
    fn acquire(&mut self, signal: vk::Semaphore) -> Result<Option<u32>> {
        let Some(swapchain) = self.swapchain.as_ref() else {
            return Ok(None);
        };

        match swapchain.acquire_next_image(signal)? {
            Some((index, suboptimal)) => {
                // Suboptimal means swapchain still works but should be recreated
                if suboptimal {
                    log::warn!("Swapchain suboptimal, recreating after this frame");
                    self.needs_recreate = true;
                }
                Ok(Some(index))
            }
            None => {
                self.needs_recreate = true;
                Ok(None)
            }
        }
    }

    fn present(&mut self, target: u32, wait: vk::Semaphore) -> Result<()> {
        let swapchain = self
            .swapchain
            .as_ref()
            .context("Presenting without a swapchain")?;

        if swapchain.present(self.device.present_queue(), target, &[wait])? {
            self.needs_recreate = true;
        }
        Ok(())
    }
}
