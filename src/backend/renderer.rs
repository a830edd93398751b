// Frame executor
//
// Owns everything needed to draw the quad into a presentation's images:
// render target, UI pipeline, camera uniform buffer + descriptor set, and
// the model. Each frame records a fresh one-shot command buffer.

use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::model::Model;
use ash::vk;
use std::path::Path;
use std::sync::Arc;
use super::pipeline::{CameraUniform, PushConstants, VERTEX_STRIDE};
use super::{Buffer, DeviceContext, Presentation, RenderTarget, UiPipeline};

/// Dark red background
pub const CLEAR_COLOR: [f32; 4] = [0.5, 0.0, 0.0, 1.0];

/// Half the edge length in pixels of the drawn quad (model spans -1..1)
const QUAD_HALF_SIZE: f32 = 100.0;

/// File locations the renderer loads at creation
#[derive(Debug, Clone, Copy)]
pub struct RendererAssets<'a> {
    pub vertex_shader: &'a Path,
    pub fragment_shader: &'a Path,
    pub model: &'a Path,
}

pub struct Renderer {
    descriptor_pool: Option<vk::DescriptorPool>,
    descriptor_set: vk::DescriptorSet,
    push_constants: PushConstants,
    camera: Buffer,
    model: Model,
    pipeline: UiPipeline,
    target: RenderTarget,
    ctx: Arc<DeviceContext>,
}

impl Renderer {
    pub fn new(
        ctx: Arc<DeviceContext>,
        presentation: &dyn Presentation,
        assets: RendererAssets<'_>,
    ) -> RenderResult<Self> {
        let target = RenderTarget::for_presentation(ctx.clone(), presentation)?;
        let extent = target.extent;

        let pipeline = UiPipeline::new(
            ctx.clone(),
            target.render_pass(),
            extent,
            assets.vertex_shader,
            assets.fragment_shader,
        )?;

        let model = Model::from_file(ctx.clone(), assets.model)?;
        check_vertex_layout(model.floats_per_vertex)?;

        let camera_data = CameraUniform::pixel_space(extent);
        let camera = Buffer::with_data(
            ctx.clone(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            bytemuck::bytes_of(&camera_data),
        )?;

        let mut this = Self {
            descriptor_pool: None,
            descriptor_set: vk::DescriptorSet::null(),
            push_constants: PushConstants::centered(extent, QUAD_HALF_SIZE),
            camera,
            model,
            pipeline,
            target,
            ctx,
        };
        this.create_descriptor_set()?;

        Ok(this)
    }

    fn create_descriptor_set(&mut self) -> RenderResult<()> {
        let device = &self.ctx.device;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .vk_context("vkCreateDescriptorPool")?;
        self.descriptor_pool = Some(pool);

        let set_layouts = [self.pipeline.descriptor_set_layout()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);
        self.descriptor_set = unsafe { device.allocate_descriptor_sets(&alloc_info) }
            .vk_context("vkAllocateDescriptorSets")?[0];

        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: self.camera.handle(),
            offset: 0,
            range: std::mem::size_of::<CameraUniform>() as vk::DeviceSize,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(self.descriptor_set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info)
            .build();

        unsafe { device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.target.extent
    }

    /// Record and submit one frame into framebuffer `index`.
    ///
    /// Does not wait for completion; callers synchronize through the given
    /// semaphores or a device idle wait.
    pub fn render(
        &self,
        index: u32,
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
    ) -> RenderResult<()> {
        let framebuffer = self
            .target
            .framebuffer(index)
            .ok_or(RenderError::FramebufferOutOfRange {
                index,
                count: self.target.framebuffer_count(),
            })?;

        let device = &self.ctx.device;
        let cmd = self.ctx.begin_one_shot()?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.target.render_pass())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.target.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.model.vertex_buffer.handle()], &[0]);
            device.cmd_bind_index_buffer(
                cmd,
                self.model.index_buffer.handle(),
                0,
                vk::IndexType::UINT32,
            );
            device.cmd_push_constants(
                cmd,
                self.pipeline.layout(),
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&self.push_constants),
            );
            device.cmd_draw_indexed(cmd, self.model.index_count, 1, 0, 0, 0);
            device.cmd_end_render_pass(cmd);
        }

        self.ctx
            .end_and_submit(cmd, wait_semaphores, wait_stages, signal_semaphores)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Remaining members release themselves in field order
        if let Some(pool) = self.descriptor_pool.take() {
            self.ctx.wait_idle_for_teardown();
            unsafe { self.ctx.device.destroy_descriptor_pool(pool, None) };
        }
    }
}

/// The pipeline only reads position + uv vertices
fn check_vertex_layout(floats_per_vertex: usize) -> RenderResult<()> {
    let expected = VERTEX_STRIDE as usize / std::mem::size_of::<f32>();
    if floats_per_vertex == expected {
        Ok(())
    } else {
        Err(RenderError::MalformedModel(format!(
            "{} floats per vertex, the UI pipeline takes {} (position + uv)",
            floats_per_vertex, expected
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_uv_models_are_accepted() {
        assert!(check_vertex_layout(5).is_ok());
    }

    #[test]
    fn other_vertex_layouts_are_rejected() {
        for floats in [3, 6, 8] {
            let err = check_vertex_layout(floats).unwrap_err();
            assert!(matches!(err, RenderError::MalformedModel(_)), "{floats}: {err}");
        }
    }

    #[test]
    fn clear_color_is_dark_red() {
        let to_u8 = |c: f32| (c * 255.0).round() as u8;
        let rgba: Vec<u8> = CLEAR_COLOR.iter().map(|&c| to_u8(c)).collect();
        assert_eq!(rgba, vec![128, 0, 0, 255]);
    }
}
