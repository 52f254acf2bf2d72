// Surface - window connection
//
// Creates the presentation surface straight from raw window handles.
// Supported: Win32, Xlib, Xcb and Wayland.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::c_char;
use std::sync::Arc;

use super::VulkanDevice;

/// Instance extensions needed to create a surface on `display`.
pub fn required_extensions(display: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => anyhow::bail!("Unsupported display handle: {:?}", other),
    };
    Ok(vec![khr::Surface::name().as_ptr(), platform.as_ptr()])
}

pub struct Surface {
    pub loader: khr::Surface,
    pub handle: vk::SurfaceKHR,
    // Keeps the instance alive until the surface is gone.
    _device: Arc<VulkanDevice>,
}

impl Surface {
    pub fn new<W>(device: &Arc<VulkanDevice>, window: &W) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();
        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        let entry = &device.entry;
        let instance = &device.instance;
        let handle = unsafe {
            match (display_handle, window_handle) {
                (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                    let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0)
                        as *const std::ffi::c_void;
                    let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
                    let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                        .hinstance(hinstance)
                        .hwnd(hwnd);
                    khr::Win32Surface::new(entry, instance).create_win32_surface(&create_info, None)?
                }
                (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
                    let dpy = display
                        .display
                        .context("Xlib display handle without a display")?;
                    let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                        .dpy(dpy.as_ptr() as *mut _)
                        .window(window.window);
                    khr::XlibSurface::new(entry, instance).create_xlib_surface(&create_info, None)?
                }
                (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
                    let connection = display
                        .connection
                        .context("Xcb display handle without a connection")?;
                    let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                        .connection(connection.as_ptr())
                        .window(window.window.get());
                    khr::XcbSurface::new(entry, instance).create_xcb_surface(&create_info, None)?
                }
                (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
                    let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                        .display(display.display.as_ptr())
                        .surface(window.surface.as_ptr());
                    khr::WaylandSurface::new(entry, instance)
                        .create_wayland_surface(&create_info, None)?
                }
                _ => anyhow::bail!("Unsupported window handle type"),
            }
        };

        let loader = khr::Surface::new(entry, instance);

        // Verify the GPU supports presenting to this surface
        let supported = unsafe {
            loader.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                handle,
            )
        };
        match supported {
            Ok(true) => {}
            Ok(false) => {
                unsafe { loader.destroy_surface(handle, None) };
                anyhow::bail!("GPU doesn't support presenting to this surface");
            }
            Err(err) => {
                unsafe { loader.destroy_surface(handle, None) };
                return Err(err).context("Failed to query surface support");
            }
        }

        Ok(Self {
            loader,
            handle,
            _device: Arc::clone(device),
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
        log::debug!("Surface destroyed");
    }
}
