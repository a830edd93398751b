// Swapchain - Window presentation
//
// Fixed-size FIFO swapchain over a window surface. Never recreated: the
// window is not resizable.

use crate::error::{RenderError, RenderResult, VkResultExt};
use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;
use super::sync::PresentSync;
use super::{
    image, DeviceContext, Presentation, WindowSurface, RENDER_TARGET_COLOR_SPACE,
    RENDER_TARGET_FORMAT,
};

pub struct Swapchain {
    sync: Option<PresentSync>,
    image_views: Vec<vk::ImageView>,
    swapchain: Option<vk::SwapchainKHR>,
    loader: khr::Swapchain,
    extent: vk::Extent2D,
    image_index: u32,
    ctx: Arc<DeviceContext>,
}

impl Swapchain {
    pub fn new(
        ctx: Arc<DeviceContext>,
        surface: &WindowSurface,
        requested: vk::Extent2D,
    ) -> RenderResult<Self> {
        // No format negotiation: the render pass is built for one format
        let formats = surface.formats()?;
        if !supports_target_format(&formats) {
            return Err(RenderError::UnsupportedSurfaceFormat {
                format: RENDER_TARGET_FORMAT,
                color_space: RENDER_TARGET_COLOR_SPACE,
            });
        }

        let caps = surface.capabilities()?;
        let extent = choose_extent(&caps, requested);
        let image_count = desired_image_count(caps.min_image_count);

        log::info!(
            "Creating swapchain: {}x{}, {} images requested",
            extent.width,
            extent.height,
            image_count
        );

        let loader = khr::Swapchain::new(&ctx.instance, &ctx.device);
        let mut this = Self {
            sync: None,
            image_views: Vec::new(),
            swapchain: None,
            loader,
            extent,
            image_index: 0,
            ctx,
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(RENDER_TARGET_FORMAT)
            .image_color_space(RENDER_TARGET_COLOR_SPACE)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let swapchain = unsafe { this.loader.create_swapchain(&create_info, None) }
            .vk_context("vkCreateSwapchainKHR")?;
        this.swapchain = Some(swapchain);

        let images = unsafe { this.loader.get_swapchain_images(swapchain) }
            .vk_context("vkGetSwapchainImagesKHR")?;
        log::info!("Created swapchain with {} images", images.len());

        for image in images {
            let view = image::create_color_view(&this.ctx.device, image, RENDER_TARGET_FORMAT)?;
            this.image_views.push(view);
        }

        this.sync = Some(PresentSync::new(&this.ctx.device)?);

        Ok(this)
    }

    pub fn image_acquired(&self) -> vk::Semaphore {
        self.sync.as_ref().map(|s| s.image_acquired).unwrap_or_default()
    }

    pub fn render_complete(&self) -> vk::Semaphore {
        self.sync.as_ref().map(|s| s.render_complete).unwrap_or_default()
    }

    /// Block (no timeout) until an image is available. Signals `image_acquired`.
    pub fn acquire_next(&mut self) -> RenderResult<u32> {
        let (index, suboptimal) = unsafe {
            self.loader.acquire_next_image(
                self.swapchain.unwrap_or_default(),
                u64::MAX,
                self.image_acquired(),
                vk::Fence::null(),
            )
        }
        .vk_context("vkAcquireNextImageKHR")?;

        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        self.image_index = index;
        Ok(index)
    }

    /// Queue the current image for display once `render_complete` is signaled.
    /// Failures are returned, not retried.
    pub fn present(&self) -> RenderResult<()> {
        let wait_semaphores = [self.render_complete()];
        let swapchains = [self.swapchain.unwrap_or_default()];
        let image_indices = [self.image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.loader.queue_present(self.ctx.queue, &present_info) }
            .vk_context("vkQueuePresentKHR")?;
        Ok(())
    }
}

impl Swapchain {
    /// Hand the acquired image back without drawing into it.
    ///
    /// An empty batch consumes `image_acquired` and signals `render_complete`,
    /// then the image is presented as-is.
    pub fn release_acquired(&self) -> RenderResult<()> {
        self.ctx.submit(
            &[],
            &[self.image_acquired()],
            &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            &[self.render_complete()],
        )?;
        self.present()
    }

    /// Replace both semaphores with fresh unsignaled ones
    pub fn reset_sync(&mut self) -> RenderResult<()> {
        self.ctx.wait_idle()?;
        if let Some(sync) = self.sync.take() {
            sync.destroy(&self.ctx.device);
        }
        self.sync = Some(PresentSync::new(&self.ctx.device)?);
        Ok(())
    }
}

impl Presentation for Swapchain {
    fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn final_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::PRESENT_SRC_KHR
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.ctx.wait_idle_for_teardown();
        let device = &self.ctx.device;
        if let Some(sync) = self.sync.take() {
            sync.destroy(device);
        }
        for view in self.image_views.drain(..) {
            unsafe { device.destroy_image_view(view, None) };
        }
        if let Some(swapchain) = self.swapchain.take() {
            unsafe { self.loader.destroy_swapchain(swapchain, None) };
        }
    }
}

/// Double buffering at least, more if the surface demands it
pub fn desired_image_count(min_image_count: u32) -> u32 {
    min_image_count.max(2)
}

pub fn supports_target_format(formats: &[vk::SurfaceFormatKHR]) -> bool {
    formats
        .iter()
        .any(|f| f.format == RENDER_TARGET_FORMAT && f.color_space == RENDER_TARGET_COLOR_SPACE)
}

/// The surface's current extent, or the requested size clamped into range
/// when the surface leaves it to the swapchain (`u32::MAX`)
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: requested
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: requested
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_floors_at_two() {
        assert_eq!(desired_image_count(0), 2);
        assert_eq!(desired_image_count(1), 2);
        assert_eq!(desired_image_count(2), 2);
        assert_eq!(desired_image_count(3), 3);
        assert_eq!(desired_image_count(8), 8);
    }

    #[test]
    fn format_must_match_exactly() {
        let wanted = vk::SurfaceFormatKHR {
            format: RENDER_TARGET_FORMAT,
            color_space: RENDER_TARGET_COLOR_SPACE,
        };
        let wrong_space = vk::SurfaceFormatKHR {
            format: RENDER_TARGET_FORMAT,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        let wrong_format = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: RENDER_TARGET_COLOR_SPACE,
        };

        assert!(supports_target_format(&[wrong_format, wanted]));
        assert!(!supports_target_format(&[wrong_format, wrong_space]));
        assert!(!supports_target_format(&[]));
    }

    #[test]
    fn extent_follows_surface_when_defined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 800, height: 600 },
            ..Default::default()
        };
        let chosen = choose_extent(&caps, vk::Extent2D { width: 640, height: 480 });
        assert_eq!((chosen.width, chosen.height), (800, 600));
    }

    #[test]
    fn extent_clamps_requested_when_undefined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 600, height: 4096 },
            ..Default::default()
        };
        let chosen = choose_extent(&caps, vk::Extent2D { width: 640, height: 480 });
        assert_eq!((chosen.width, chosen.height), (600, 480));
    }
}
