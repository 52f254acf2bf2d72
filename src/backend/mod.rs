// Backend module - Vulkan implementation of the render scheduler's device
//
// Design: Thin wrapper around ash with safety and ergonomics
// Performance: Zero-cost abstractions, explicit control

pub mod commands;
pub mod device;
pub mod presenter;
pub mod surface;
pub mod swapchain;
pub mod targets;

pub use device::{SharedQueue, VulkanDevice};
pub use presenter::VulkanPresenter;
pub use surface::Surface;
pub use swapchain::Swapchain;
pub use targets::{PresentTargets, RenderTargets};
