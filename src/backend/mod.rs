// Backend module - Vulkan abstraction layer
//
// Thin owning wrappers around ash handles. Every type releases its handles
// on drop, so a constructor failing half-way cleans up after itself.

pub mod buffer;
pub mod device;
pub mod image;
pub mod memory;
pub mod offscreen;
pub mod pipeline;
pub mod render_target;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

use ash::vk;

pub use buffer::Buffer;
pub use device::{DeviceContext, DeviceRequirements};
pub use image::Image;
pub use offscreen::OffscreenTarget;
pub use pipeline::UiPipeline;
pub use render_target::RenderTarget;
pub use renderer::Renderer;
pub use surface::WindowSurface;
pub use swapchain::Swapchain;

/// Pixel format of every color target, offscreen or swapchain
pub const RENDER_TARGET_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
pub const RENDER_TARGET_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// A fixed set of images the renderer draws into
pub trait Presentation {
    fn image_views(&self) -> &[vk::ImageView];
    fn extent(&self) -> vk::Extent2D;
    /// Layout the render pass leaves the image in
    fn final_layout(&self) -> vk::ImageLayout;
}
