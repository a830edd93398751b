// Offscreen presentation - a single device-local color image
//
// Nothing is displayed: after rendering, the image is copied into a
// host-visible buffer so its pixels can be written to a file.

use crate::error::{RenderError, RenderResult};
use ash::vk;
use std::sync::Arc;
use super::{image, Buffer, DeviceContext, Image, Presentation, RENDER_TARGET_FORMAT};

pub struct OffscreenTarget {
    views: Vec<vk::ImageView>,
    image: Image,
    ctx: Arc<DeviceContext>,
}

impl OffscreenTarget {
    pub fn new(ctx: Arc<DeviceContext>, width: u32, height: u32) -> RenderResult<Self> {
        log::info!("Creating offscreen target: {}x{}", width, height);

        // Also a copy source so the result can be read back
        let image = Image::new(
            ctx.clone(),
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            RENDER_TARGET_FORMAT,
            vk::Extent3D { width, height, depth: 1 },
        )?;

        let view = image::create_color_view(&ctx.device, image.handle(), image.format)?;

        Ok(Self {
            views: vec![view],
            image,
            ctx,
        })
    }

    /// Copy the rendered image into host memory and return its raw texels
    /// (BGRA, tightly packed rows).
    ///
    /// The image must already be in `TRANSFER_SRC_OPTIMAL`, which the render
    /// pass leaves it in.
    pub fn read_pixels(&self) -> RenderResult<Vec<u8>> {
        let readback = Buffer::new(
            self.ctx.clone(),
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            self.image.requirements.size,
        )?;

        let cmd = self.ctx.begin_one_shot()?;
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(self.image.extent)
            .build();

        unsafe {
            self.ctx.device.cmd_copy_image_to_buffer(
                cmd,
                self.image.handle(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                readback.handle(),
                &[region],
            );
        }
        self.ctx.end_and_submit(cmd, &[], &[], &[])?;
        self.ctx.wait_idle()?;

        let extent = self.image.extent;
        let texels = extent.width as usize * extent.height as usize * 4;
        let len = texels.min(readback.size as usize);

        let mut pixels = vec![0u8; len];
        unsafe {
            let ptr = self
                .ctx
                .device
                .map_memory(readback.memory(), 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(|result| RenderError::Vulkan { call: "vkMapMemory", result })?
                as *const u8;
            ptr.copy_to_nonoverlapping(pixels.as_mut_ptr(), len);
            self.ctx.device.unmap_memory(readback.memory());
        }

        Ok(pixels)
    }
}

impl Presentation for OffscreenTarget {
    fn image_views(&self) -> &[vk::ImageView] {
        &self.views
    }

    fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.image.extent.width,
            height: self.image.extent.height,
        }
    }

    /// Left ready for the copy to host memory
    fn final_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    }
}

impl Drop for OffscreenTarget {
    fn drop(&mut self) {
        if self.views.is_empty() {
            return;
        }
        self.ctx.wait_idle_for_teardown();
        for view in self.views.drain(..) {
            unsafe { self.ctx.device.destroy_image_view(view, None) };
        }
        // image drops after this
    }
}
