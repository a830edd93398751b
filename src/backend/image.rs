// GPU image with its own bound memory block

use crate::error::{RenderResult, VkResultExt};
use ash::vk;
use std::sync::Arc;
use super::{memory, DeviceContext};

pub struct Image {
    image: Option<vk::Image>,
    memory: Option<vk::DeviceMemory>,
    pub requirements: vk::MemoryRequirements,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    ctx: Arc<DeviceContext>,
}

impl Image {
    /// Create a single-mip, single-layer, optimally tiled 2D image and bind memory to it
    pub fn new(
        ctx: Arc<DeviceContext>,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
        format: vk::Format,
        extent: vk::Extent3D,
    ) -> RenderResult<Self> {
        let mut this = Self {
            image: None,
            memory: None,
            requirements: vk::MemoryRequirements::default(),
            format,
            extent,
            ctx,
        };

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { this.ctx.device.create_image(&image_info, None) }
            .vk_context("vkCreateImage")?;
        this.image = Some(image);

        this.requirements = unsafe { this.ctx.device.get_image_memory_requirements(image) };

        let memory = memory::allocate(
            &this.ctx,
            this.requirements.memory_type_bits,
            properties,
            this.requirements.size,
        )?;
        this.memory = Some(memory);

        unsafe { this.ctx.device.bind_image_memory(image, memory, 0) }
            .vk_context("vkBindImageMemory")?;

        Ok(this)
    }

    pub fn handle(&self) -> vk::Image {
        self.image.unwrap_or_default()
    }

    /// Release the image and its memory. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.image.is_none() && self.memory.is_none() {
            return;
        }
        self.ctx.wait_idle_for_teardown();
        unsafe {
            if let Some(image) = self.image.take() {
                self.ctx.device.destroy_image(image, None);
            }
            if let Some(memory) = self.memory.take() {
                self.ctx.device.free_memory(memory, None);
            }
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Plain 2D color view over the whole image
pub fn create_color_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> RenderResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.vk_context("vkCreateImageView")
}
