use ash::vk;
use vantage_rhi::{
    context::GraphicsContext,
    swapchain::{AcquireOutcome, PresentOutcome},
};
use vantage_scene::{document::Document, graph::SceneGraph};
use winit::window::Window;

use crate::frame::{FramePlan, IndexKind, plan_frame};
use crate::pipeline::{MODEL_OFFSET, RenderPipeline, VERTEX_BINDING_COUNT};
use crate::resources::ResourceManager;

/// Owns every piece of render state for one window and drives the per-frame
/// cycle: wait, acquire, record, submit, present.
pub struct Renderer {
    // Field order is teardown order: framebuffers and buffers go before the
    // context that owns the swapchain and device.
    pipeline: RenderPipeline,
    resources: ResourceManager,
    context: GraphicsContext,
    document: Document,
    graph: SceneGraph,
    plan: FramePlan,
    /// Set when acquire or present reports the surface stale, or on a window
    /// resize; the next frame recreates the swapchain before acquiring.
    swapchain_stale: bool,
}

impl Renderer {
    /// Brings up the GPU context and pipeline, then uploads the document.
    ///
    /// Context and pipeline failures are fatal. A failed scene upload is
    /// not: the error is reported and the renderer keeps running with an
    /// empty scene, leaving the window alive.
    pub fn new(window: &Window, document: Document) -> anyhow::Result<Self> {
        use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

        let size = window.inner_size();
        let extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };

        let context = GraphicsContext::new(
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
            extent,
        )?;
        let pipeline = RenderPipeline::new(&context)?;

        let extent = context.swapchain().extent();

        // A scene that fails to upload or plan is dropped, not fatal: the
        // window keeps running with an empty scene.
        let (resources, document, graph, plan) = match Self::load_scene(&context, document, extent)
        {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("failed to load scene: {e}");
                log::error!("Scene load failed, continuing with an empty scene: {e}");
                Self::load_scene(&context, Document::default(), extent)?
            }
        };

        Ok(Self {
            context,
            pipeline,
            resources,
            document,
            graph,
            plan,
            swapchain_stale: false,
        })
    }

    fn load_scene(
        context: &GraphicsContext,
        document: Document,
        extent: vk::Extent2D,
    ) -> anyhow::Result<(ResourceManager, Document, SceneGraph, FramePlan)> {
        let graph = SceneGraph::build(&document);
        // Planning validates index types before any GPU memory is touched.
        let plan = plan_frame(&document, &graph, aspect(extent))?;
        let resources = ResourceManager::upload(context.device(), &document)?;
        Ok((resources, document, graph, plan))
    }

    /// Flags the swapchain for recreation before the next frame.
    pub fn resize(&mut self) {
        self.swapchain_stale = true;
    }

    /// Runs one frame cycle. Transient surface staleness skips the frame;
    /// any other failure is fatal to the caller.
    pub fn draw_frame(&mut self, window: &Window) -> anyhow::Result<()> {
        if self.swapchain_stale {
            self.recreate_swapchain(window)?;
        }

        let sync = self.context.frame_sync();
        sync.wait()?;

        let outcome = self.context.swapchain().acquire(sync.image_available())?;
        let (image_index, mark_stale) = match cycle_action(outcome) {
            CycleAction::Render {
                image_index,
                mark_stale,
            } => (image_index, mark_stale),
            CycleAction::Skip => {
                // Fence stays signaled; the skipped cycle must not deadlock
                // the next wait.
                self.swapchain_stale = true;
                return Ok(());
            }
        };

        // Reset only after a successful acquire.
        sync.reset()?;

        let command_buffer = self.record(image_index)?;

        self.context.command_pool().submit(
            command_buffer,
            sync.image_available(),
            sync.render_finished(),
            sync.in_flight(),
        )?;

        match self
            .context
            .swapchain()
            .present(image_index, sync.render_finished())?
        {
            PresentOutcome::Presented => {}
            PresentOutcome::Stale => self.swapchain_stale = true,
        }

        // A suboptimal acquire was still rendered and presented; recreate
        // before the next frame.
        if mark_stale {
            self.swapchain_stale = true;
        }

        Ok(())
    }

    fn record(&self, image_index: u32) -> anyhow::Result<vk::CommandBuffer> {
        let device = self.context.device().handle();
        let pool = self.context.command_pool();
        let command_buffer = pool.begin(image_index as usize)?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.pipeline.render_pass())
            .framebuffer(self.pipeline.framebuffer(image_index))
            .render_area(vk::Rect2D::default().extent(self.pipeline.extent()))
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.pipeline(),
            );
            device.cmd_push_constants(
                command_buffer,
                self.pipeline.layout(),
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&self.plan.view_projection),
            );

            for draw in &self.plan.draws {
                device.cmd_push_constants(
                    command_buffer,
                    self.pipeline.layout(),
                    vk::ShaderStageFlags::VERTEX,
                    MODEL_OFFSET,
                    bytemuck::bytes_of(&draw.model),
                );

                // All six slots bind in one call; unpopulated slots pass a
                // null handle, which the null_descriptor feature makes read
                // as zeros.
                let mut buffers = [vk::Buffer::null(); VERTEX_BINDING_COUNT];
                let mut offsets = [0 as vk::DeviceSize; VERTEX_BINDING_COUNT];
                for (slot, binding) in draw.bindings.iter().enumerate() {
                    if let Some((buffer, offset)) = *binding {
                        buffers[slot] = self.resources.buffer(buffer);
                        offsets[slot] = offset;
                    }
                }
                device.cmd_bind_vertex_buffers(command_buffer, 0, &buffers, &offsets);

                match draw.indices {
                    Some(indices) => {
                        let index_type = match indices.kind {
                            IndexKind::U16 => vk::IndexType::UINT16,
                            IndexKind::U32 => vk::IndexType::UINT32,
                        };
                        device.cmd_bind_index_buffer(
                            command_buffer,
                            self.resources.buffer(indices.buffer),
                            indices.offset,
                            index_type,
                        );
                        device.cmd_draw_indexed(command_buffer, indices.count, 1, 0, 0, 0);
                    }
                    None => {
                        device.cmd_draw(command_buffer, draw.vertex_count, 1, 0, 0);
                    }
                }
            }

            device.cmd_end_render_pass(command_buffer);
        }

        pool.end(command_buffer)?;
        Ok(command_buffer)
    }

    /// Rebuilds the swapchain, depth buffer, pipeline and framebuffers at the
    /// window's current size, then replans against the new aspect ratio.
    fn recreate_swapchain(&mut self, window: &Window) -> anyhow::Result<()> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            // Minimized; keep the stale flag and try again next frame.
            return Ok(());
        }

        self.context.recreate_swapchain(vk::Extent2D {
            width: size.width,
            height: size.height,
        })?;

        // The viewport and scissor are baked into the pipeline, so an extent
        // change rebuilds the whole pipeline, framebuffers included.
        self.pipeline = RenderPipeline::new(&self.context)?;
        self.plan = plan_frame(
            &self.document,
            &self.graph,
            aspect(self.context.swapchain().extent()),
        )?;
        self.swapchain_stale = false;

        Ok(())
    }

    /// Idles the device so teardown can proceed safely.
    pub fn shutdown(&mut self) {
        self.context.wait_idle();
        self.resources.destroy_all();
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Every exit path, fatal frame errors included, must drain in-flight
        // work before any owned resource is destroyed.
        self.context.wait_idle();
    }
}

/// What one frame cycle does once the acquire outcome is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleAction {
    /// Reset the fence, record, submit and present this image; `mark_stale`
    /// requests a swapchain recreate after the present.
    Render { image_index: u32, mark_stale: bool },
    /// No fence reset, no recording, no submission this cycle.
    Skip,
}

fn cycle_action(outcome: AcquireOutcome) -> CycleAction {
    match outcome {
        AcquireOutcome::Ready {
            image_index,
            suboptimal,
        } => CycleAction::Render {
            image_index,
            mark_stale: suboptimal,
        },
        AcquireOutcome::Stale => CycleAction::Skip,
    }
}

fn aspect(extent: vk::Extent2D) -> f32 {
    extent.width as f32 / extent.height.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_acquire_skips_without_rendering_or_fence_reset() {
        // The skip path records zero draws and leaves the fence signaled.
        assert_eq!(cycle_action(AcquireOutcome::Stale), CycleAction::Skip);
    }

    #[test]
    fn suboptimal_acquire_renders_and_requests_recreation() {
        assert_eq!(
            cycle_action(AcquireOutcome::Ready {
                image_index: 1,
                suboptimal: true
            }),
            CycleAction::Render {
                image_index: 1,
                mark_stale: true
            }
        );
    }

    #[test]
    fn clean_acquire_renders_without_recreation() {
        assert_eq!(
            cycle_action(AcquireOutcome::Ready {
                image_index: 0,
                suboptimal: false
            }),
            CycleAction::Render {
                image_index: 0,
                mark_stale: false
            }
        );
    }
}
