// Window surface - connection between the Vulkan instance and a native window

use crate::error::{RenderError, RenderResult, VkResultExt};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle};
use std::ffi::CStr;
use std::sync::Arc;
use super::DeviceContext;

pub struct WindowSurface {
    pub surface: vk::SurfaceKHR,
    pub loader: khr::Surface,
    ctx: Arc<DeviceContext>,
}

impl WindowSurface {
    /// Instance extensions needed to create a surface on this display
    pub fn required_extensions(display: RawDisplayHandle) -> RenderResult<Vec<&'static CStr>> {
        let names = ash_window::enumerate_required_extensions(display)
            .vk_context("vkEnumerateInstanceExtensionProperties")?;
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect())
    }

    pub fn new<W>(ctx: Arc<DeviceContext>, window: &W) -> RenderResult<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let loader = khr::Surface::new(ctx.entry(), &ctx.instance);

        let surface = unsafe {
            ash_window::create_surface(
                ctx.entry(),
                &ctx.instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .vk_context("vkCreateSurfaceKHR")?;

        let this = Self { surface, loader, ctx };

        // Verify the queue we render on can also present here
        let supported = unsafe {
            this.loader.get_physical_device_surface_support(
                this.ctx.physical_device,
                this.ctx.queue_family,
                this.surface,
            )
        }
        .vk_context("vkGetPhysicalDeviceSurfaceSupportKHR")?;

        if !supported {
            return Err(RenderError::SurfaceNotPresentable(this.ctx.queue_family));
        }

        Ok(this)
    }

    pub fn formats(&self) -> RenderResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(self.ctx.physical_device, self.surface)
        }
        .vk_context("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    pub fn capabilities(&self) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(self.ctx.physical_device, self.surface)
        }
        .vk_context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }
}

impl Drop for WindowSurface {
    fn drop(&mut self) {
        self.ctx.wait_idle_for_teardown();
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}
