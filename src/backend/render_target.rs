// Render pass + one framebuffer per presentable image
//
// Sized once at creation. Nothing here is ever resized.

use crate::error::{RenderResult, VkResultExt};
use ash::vk;
use std::sync::Arc;
use super::{DeviceContext, Presentation, RENDER_TARGET_FORMAT};

pub struct RenderTarget {
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: Option<vk::RenderPass>,
    pub extent: vk::Extent2D,
    ctx: Arc<DeviceContext>,
}

impl RenderTarget {
    pub fn new(
        ctx: Arc<DeviceContext>,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
        final_layout: vk::ImageLayout,
    ) -> RenderResult<Self> {
        let mut this = Self {
            framebuffers: Vec::with_capacity(image_views.len()),
            render_pass: None,
            extent,
            ctx,
        };

        let render_pass = create_render_pass(&this.ctx.device, final_layout)?;
        this.render_pass = Some(render_pass);

        for &view in image_views {
            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { this.ctx.device.create_framebuffer(&framebuffer_info, None) }
                .vk_context("vkCreateFramebuffer")?;
            this.framebuffers.push(framebuffer);
        }

        Ok(this)
    }

    pub fn for_presentation(
        ctx: Arc<DeviceContext>,
        presentation: &dyn Presentation,
    ) -> RenderResult<Self> {
        Self::new(
            ctx,
            presentation.image_views(),
            presentation.extent(),
            presentation.final_layout(),
        )
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.unwrap_or_default()
    }

    pub fn framebuffer(&self, index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index as usize).copied()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        if self.framebuffers.is_empty() && self.render_pass.is_none() {
            return;
        }
        self.ctx.wait_idle_for_teardown();
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.ctx.device.destroy_framebuffer(framebuffer, None);
            }
            if let Some(render_pass) = self.render_pass.take() {
                self.ctx.device.destroy_render_pass(render_pass, None);
            }
        }
    }
}

/// Single color attachment, cleared on load and stored at the end
fn create_render_pass(
    device: &ash::Device,
    final_layout: vk::ImageLayout,
) -> RenderResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(RENDER_TARGET_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(final_layout)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    // Layout transition must wait for the acquire semaphore's stage
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }.vk_context("vkCreateRenderPass")
}
