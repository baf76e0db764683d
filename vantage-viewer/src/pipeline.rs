use std::ffi::CStr;
use std::io::Cursor;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use vantage_rhi::{context::GraphicsContext, device::Device, image::DepthImage};

const VERTEX_SHADER_PATH: &str = "shaders/vert.spv";
const FRAGMENT_SHADER_PATH: &str = "shaders/frag.spv";

const SHADER_ENTRY: &CStr = c"main";

/// Push constant block: projection-view matrix at offset 0, model matrix
/// right after. Must match the vertex shader's push_constant layout.
pub const MATRIX_SIZE: u32 = mem::size_of::<[f32; 16]>() as u32;
pub const PUSH_CONSTANT_SIZE: u32 = 2 * MATRIX_SIZE;
pub const MODEL_OFFSET: u32 = MATRIX_SIZE;

/// Number of vertex input bindings; one per attribute slot.
pub const VERTEX_BINDING_COUNT: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to read shader {path}: {source}")]
    ShaderRead {
        path: &'static str,
        source: std::io::Error,
    },
    #[error("shader module creation failed: {0}")]
    ShaderModule(vk::Result),
    #[error("render pass creation failed: {0}")]
    RenderPass(vk::Result),
    #[error("framebuffer creation failed: {0}")]
    Framebuffer(vk::Result),
    #[error("pipeline layout creation failed: {0}")]
    Layout(vk::Result),
    #[error("graphics pipeline creation failed: {0}")]
    Pipeline(vk::Result),
}

/// The fixed draw configuration: render pass, framebuffers, pipeline layout
/// and the one graphics pipeline.
///
/// Independent of scene content. Framebuffers are the only part tied to the
/// swapchain images and are rebuilt on swapchain recreation; everything else
/// lives until shutdown.
pub struct RenderPipeline {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl RenderPipeline {
    pub fn new(context: &GraphicsContext) -> Result<Self, PipelineError> {
        let device = context.device().clone();
        let color_format = context.swapchain().format();

        let render_pass = create_render_pass(&device, color_format)?;

        let layout = {
            let push_constant_ranges = [vk::PushConstantRange::default()
                .stage_flags(vk::ShaderStageFlags::VERTEX)
                .offset(0)
                .size(PUSH_CONSTANT_SIZE)];
            let layout_info =
                vk::PipelineLayoutCreateInfo::default().push_constant_ranges(&push_constant_ranges);
            unsafe { device.handle().create_pipeline_layout(&layout_info, None) }
                .map_err(PipelineError::Layout)?
        };

        let extent = context.swapchain().extent();
        let pipeline = match create_graphics_pipeline(&device, render_pass, layout, extent) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe {
                    device.handle().destroy_pipeline_layout(layout, None);
                    device.handle().destroy_render_pass(render_pass, None);
                }
                return Err(e);
            }
        };

        let mut this = Self {
            device,
            render_pass,
            layout,
            pipeline,
            framebuffers: Vec::new(),
            extent,
        };
        this.rebuild_framebuffers(context)?;

        log::info!("Render pipeline ready");
        Ok(this)
    }

    /// Recreates the per-image framebuffers against the current swapchain.
    ///
    /// Call once at startup and again after every swapchain recreation; the
    /// caller must have idled the device first.
    pub fn rebuild_framebuffers(&mut self, context: &GraphicsContext) -> Result<(), PipelineError> {
        self.destroy_framebuffers();

        let extent = context.swapchain().extent();
        let depth_view = context.depth_image().view();

        for &color_view in context.swapchain().image_views() {
            let attachments = [color_view, depth_view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer =
                unsafe { self.device.handle().create_framebuffer(&framebuffer_info, None) }
                    .map_err(PipelineError::Framebuffer)?;
            self.framebuffers.push(framebuffer);
        }

        self.extent = extent;
        Ok(())
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize]
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        self.destroy_framebuffers();
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
            self.device.handle().destroy_pipeline_layout(self.layout, None);
            self.device.handle().destroy_render_pass(self.render_pass, None);
        }
    }
}

fn create_render_pass(
    device: &Device,
    color_format: vk::Format,
) -> Result<vk::RenderPass, PipelineError> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(DepthImage::FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];

    // Writes from the previous frame must retire before this frame's clear.
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.handle().create_render_pass(&render_pass_info, None) }
        .map_err(PipelineError::RenderPass)
}

fn load_shader_module(
    device: &Device,
    path: &'static str,
) -> Result<vk::ShaderModule, PipelineError> {
    let bytes = std::fs::read(Path::new(path))
        .map_err(|source| PipelineError::ShaderRead { path, source })?;
    let code = ash::util::read_spv(&mut Cursor::new(&bytes))
        .map_err(|source| PipelineError::ShaderRead { path, source })?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    unsafe { device.handle().create_shader_module(&create_info, None) }
        .map_err(PipelineError::ShaderModule)
}

fn create_graphics_pipeline(
    device: &Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
) -> Result<vk::Pipeline, PipelineError> {
    let vertex_module = load_shader_module(device, VERTEX_SHADER_PATH)?;
    let fragment_module = match load_shader_module(device, FRAGMENT_SHADER_PATH) {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.handle().destroy_shader_module(vertex_module, None) };
            return Err(e);
        }
    };

    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(SHADER_ENTRY),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_module)
            .name(SHADER_ENTRY),
    ];

    // One binding per attribute slot. Slots a primitive leaves unbound get a
    // null buffer handle at draw time; null_descriptor makes reads return
    // zeros instead of faulting.
    let bindings = [
        vertex_binding(0, 12), // position: vec3
        vertex_binding(1, 12), // normal: vec3
        vertex_binding(2, 16), // tangent: vec4
        vertex_binding(3, 8),  // texcoord 0: vec2
        vertex_binding(4, 8),  // texcoord 1: vec2
        vertex_binding(5, 16), // color 0: vec4
    ];
    let attributes = [
        vertex_attribute(0, vk::Format::R32G32B32_SFLOAT),
        vertex_attribute(1, vk::Format::R32G32B32_SFLOAT),
        vertex_attribute(2, vk::Format::R32G32B32A32_SFLOAT),
        vertex_attribute(3, vk::Format::R32G32_SFLOAT),
        vertex_attribute(4, vk::Format::R32G32_SFLOAT),
        vertex_attribute(5, vk::Format::R32G32B32A32_SFLOAT),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

    let viewports = [vk::Viewport::default()
        .width(extent.width as f32)
        .height(extent.height as f32)
        .max_depth(1.0)];
    let scissors = [vk::Rect2D::default().extent(extent)];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS);

    let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];
    let color_blend =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let result = unsafe {
        device.handle().create_graphics_pipelines(
            vk::PipelineCache::null(),
            &[pipeline_info],
            None,
        )
    };

    // Modules may be destroyed as soon as the pipeline exists.
    unsafe {
        device.handle().destroy_shader_module(vertex_module, None);
        device.handle().destroy_shader_module(fragment_module, None);
    }

    match result {
        Ok(pipelines) => Ok(pipelines[0]),
        Err((_, e)) => Err(PipelineError::Pipeline(e)),
    }
}

fn vertex_binding(binding: u32, stride: u32) -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription::default()
        .binding(binding)
        .stride(stride)
        .input_rate(vk::VertexInputRate::VERTEX)
}

fn vertex_attribute(location: u32, format: vk::Format) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription::default()
        .location(location)
        .binding(location)
        .format(format)
}
