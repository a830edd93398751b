// UI graphics pipeline
//
// Fixed function state for drawing textured-looking quads in pixel space:
// position + uv vertices, a camera uniform at set 0 binding 0, and a
// scale/translate/uv-rect push constant block. No depth, no culling,
// alpha-over blending.

use crate::error::{RenderError, RenderResult, VkResultExt};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;
use super::{shader, DeviceContext};

const SHADER_ENTRY: &CStr = c"main";

/// Per-draw parameters, vertex stage
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub scale: [f32; 4],
    pub translate: [f32; 4],
    /// xy = offset, zw = size of the uv rectangle
    pub uv: [f32; 4],
}

impl PushConstants {
    /// A `size` pixel square in the middle of the target, full uv range
    pub fn centered(extent: vk::Extent2D, size: f32) -> Self {
        Self {
            scale: [size, size, 1.0, 0.0],
            translate: [extent.width as f32 / 2.0, extent.height as f32 / 2.0, 0.0, 0.0],
            uv: [0.0, 0.0, 1.0, 1.0],
        }
    }
}

/// Uniform buffer contents at set 0 binding 0
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub proj: Mat4,
}

impl CameraUniform {
    /// Orthographic projection over the target's pixel extent
    pub fn pixel_space(extent: vk::Extent2D) -> Self {
        Self {
            proj: Mat4::orthographic_rh(
                0.0,
                extent.width as f32,
                0.0,
                extent.height as f32,
                -1.0,
                1.0,
            ),
        }
    }
}

/// Interleaved vec3 position + vec2 uv
pub const VERTEX_STRIDE: u32 = 5 * std::mem::size_of::<f32>() as u32;

pub fn vertex_input_descriptions() -> (
    [vk::VertexInputBindingDescription; 1],
    [vk::VertexInputAttributeDescription; 2],
) {
    let binding = vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride(VERTEX_STRIDE)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build();

    let position_attr = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32B32_SFLOAT)
        .offset(0)
        .build();

    let uv_attr = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(1)
        .format(vk::Format::R32G32_SFLOAT)
        .offset(12)
        .build();

    ([binding], [position_attr, uv_attr])
}

pub struct UiPipeline {
    pipeline: Option<vk::Pipeline>,
    layout: Option<vk::PipelineLayout>,
    descriptor_set_layout: Option<vk::DescriptorSetLayout>,
    vert_module: Option<vk::ShaderModule>,
    frag_module: Option<vk::ShaderModule>,
    ctx: Arc<DeviceContext>,
}

impl UiPipeline {
    pub fn new(
        ctx: Arc<DeviceContext>,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        vertex_shader: &Path,
        fragment_shader: &Path,
    ) -> RenderResult<Self> {
        let mut this = Self {
            pipeline: None,
            layout: None,
            descriptor_set_layout: None,
            vert_module: None,
            frag_module: None,
            ctx,
        };

        let device = &this.ctx.device;
        let vert = shader::load_shader_module(device, vertex_shader)?;
        this.vert_module = Some(vert);
        let frag = shader::load_shader_module(device, fragment_shader)?;
        this.frag_module = Some(frag);

        let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build();
        let bindings = [ubo_binding];
        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let set_layout = unsafe { device.create_descriptor_set_layout(&set_layout_info, None) }
            .vk_context("vkCreateDescriptorSetLayout")?;
        this.descriptor_set_layout = Some(set_layout);

        let push_constant_range = vk::PushConstantRange::builder()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(std::mem::size_of::<PushConstants>() as u32)
            .build();

        let set_layouts = [set_layout];
        let push_constant_ranges = [push_constant_range];
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { this.ctx.device.create_pipeline_layout(&layout_info, None) }
            .vk_context("vkCreatePipelineLayout")?;
        this.layout = Some(layout);

        this.pipeline = Some(create_graphics_pipeline(
            &this.ctx.device,
            render_pass,
            extent,
            layout,
            vert,
            frag,
        )?);

        log::info!("Created UI pipeline ({}x{})", extent.width, extent.height);
        Ok(this)
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline.unwrap_or_default()
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.unwrap_or_default()
    }

    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptor_set_layout.unwrap_or_default()
    }
}

impl Drop for UiPipeline {
    fn drop(&mut self) {
        self.ctx.wait_idle_for_teardown();
        let device = &self.ctx.device;
        unsafe {
            if let Some(pipeline) = self.pipeline.take() {
                device.destroy_pipeline(pipeline, None);
            }
            if let Some(layout) = self.layout.take() {
                device.destroy_pipeline_layout(layout, None);
            }
            if let Some(set_layout) = self.descriptor_set_layout.take() {
                device.destroy_descriptor_set_layout(set_layout, None);
            }
            if let Some(module) = self.frag_module.take() {
                device.destroy_shader_module(module, None);
            }
            if let Some(module) = self.vert_module.take() {
                device.destroy_shader_module(module, None);
            }
        }
    }
}

fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    layout: vk::PipelineLayout,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
) -> RenderResult<vk::Pipeline> {
    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader)
        .name(SHADER_ENTRY)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader)
        .name(SHADER_ENTRY)
        .build();

    let shader_stages = &[vert_stage, frag_stage];

    let (bindings, attributes) = vertex_input_descriptions();
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Static, covers the whole target
    let viewport = vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
        .build();

    let scissor = vk::Rect2D::builder()
        .offset(vk::Offset2D { x: 0, y: 0 })
        .extent(extent)
        .build();

    let viewports = &[viewport];
    let scissors = &[scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachment = alpha_blend_attachment();
    let color_blend_attachments = &[color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, result)| RenderError::Vulkan {
        call: "vkCreateGraphicsPipelines",
        result,
    })?;

    Ok(pipelines[0])
}

/// `src.a * src + (1 - src.a) * dst` for color and alpha
fn alpha_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn gpu_struct_sizes() {
        assert_eq!(std::mem::size_of::<PushConstants>(), 48);
        assert_eq!(std::mem::size_of::<CameraUniform>(), 64);
    }

    #[test]
    fn push_constant_field_order() {
        let pc = PushConstants {
            scale: [1.0; 4],
            translate: [2.0; 4],
            uv: [3.0; 4],
        };
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&pc));
        assert_eq!(&floats[0..4], &[1.0; 4]);
        assert_eq!(&floats[4..8], &[2.0; 4]);
        assert_eq!(&floats[8..12], &[3.0; 4]);
    }

    #[test]
    fn vertex_layout_is_position_then_uv() {
        let (bindings, attributes) = vertex_input_descriptions();
        assert_eq!(bindings[0].stride, 20);
        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn centered_quad_sits_mid_target() {
        let pc = PushConstants::centered(vk::Extent2D { width: 640, height: 480 }, 100.0);
        assert_eq!(pc.translate, [320.0, 240.0, 0.0, 0.0]);
        assert_eq!(pc.scale, [100.0, 100.0, 1.0, 0.0]);
        assert_eq!(pc.uv, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn camera_maps_pixel_corners_to_clip_corners() {
        let camera = CameraUniform::pixel_space(vk::Extent2D { width: 640, height: 480 });
        let origin = camera.proj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let far_corner = camera.proj * Vec4::new(640.0, 480.0, 0.0, 1.0);
        assert!((origin.x + 1.0).abs() < 1e-6 && (origin.y + 1.0).abs() < 1e-6);
        assert!((far_corner.x - 1.0).abs() < 1e-6 && (far_corner.y - 1.0).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&origin.z));
    }

    #[test]
    fn blending_is_alpha_over() {
        let blend = alpha_blend_attachment();
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);
    }
}
