// Windowed run: draw the quad into a swapchain until the window is closed
//
// Frame loop: wait idle -> recycle command buffers -> acquire -> render ->
// present. A failing frame is logged and the next redraw tries again.

use crate::backend::{DeviceContext, DeviceRequirements, Renderer, Swapchain, WindowSurface};
use crate::config::Config;
use crate::error::RenderResult;
use crate::APP_NAME;
use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::HasRawDisplayHandle;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

pub fn run(config: Config) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.init_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Everything that lives on the GPU side of the window.
///
/// Field order is drop order.
struct VulkanState {
    renderer: Renderer,
    swapchain: Swapchain,
    _surface: WindowSurface,
    ctx: Arc<DeviceContext>,
}

impl VulkanState {
    fn new(config: &Config, window: &Window) -> Result<Self> {
        let surface_extensions = WindowSurface::required_extensions(window.raw_display_handle())
            .context("Failed to query surface extensions")?;

        let requirements = DeviceRequirements {
            instance_extensions: surface_extensions,
            device_extensions: vec![khr::Swapchain::name()],
            ..Default::default()
        };

        let ctx = DeviceContext::new(APP_NAME, &requirements, config.validation_enabled())
            .context("Failed to create device context")?;

        let surface = WindowSurface::new(ctx.clone(), window)
            .context("Failed to create window surface")?;

        let size = window.inner_size();
        let requested = vk::Extent2D {
            width: size.width,
            height: size.height,
        };
        let swapchain = Swapchain::new(ctx.clone(), &surface, requested)
            .context("Failed to create swapchain")?;

        let renderer = Renderer::new(ctx.clone(), &swapchain, config.assets.renderer_assets())
            .context("Failed to create renderer")?;

        Ok(Self {
            renderer,
            swapchain,
            _surface: surface,
            ctx,
        })
    }

    /// Draw one frame. On failure the swapchain is left ready for the next one.
    fn draw_frame(&mut self) -> RenderResult<()> {
        let mut stage = FrameStage::Idle;
        let result = self.try_draw_frame(&mut stage);

        if result.is_err() {
            if let Err(e) = self.recover(stage.recovery()) {
                log::error!("Frame recovery failed: {}", e);
            }
        }
        result
    }

    fn try_draw_frame(&mut self, stage: &mut FrameStage) -> RenderResult<()> {
        // One command buffer in flight at most
        self.ctx.wait_idle()?;
        self.ctx.reset_command_pool()?;

        let index = self.swapchain.acquire_next()?;
        *stage = FrameStage::Acquired;

        self.renderer.render(
            index,
            &[self.swapchain.image_acquired()],
            &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            &[self.swapchain.render_complete()],
        )?;
        *stage = FrameStage::Submitted;

        self.swapchain.present()
    }

    fn recover(&mut self, recovery: Recovery) -> RenderResult<()> {
        match recovery {
            Recovery::Nothing => Ok(()),
            Recovery::ReleaseImage => {
                if let Err(e) = self.swapchain.release_acquired() {
                    log::warn!("Could not release acquired image ({}), resetting semaphores", e);
                    self.swapchain.reset_sync()?;
                }
                Ok(())
            }
            Recovery::ResetSync => self.swapchain.reset_sync(),
        }
    }
}

/// How far a frame got before it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameStage {
    Idle,
    /// Image held, `image_acquired` signaled
    Acquired,
    /// `render_complete` will be signaled, present pending
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Nothing,
    /// Return the held image through an empty submit + present
    ReleaseImage,
    /// Semaphore state unknown, recreate the pair
    ResetSync,
}

impl FrameStage {
    fn recovery(self) -> Recovery {
        match self {
            FrameStage::Idle => Recovery::Nothing,
            FrameStage::Acquired => Recovery::ReleaseImage,
            FrameStage::Submitted => Recovery::ResetSync,
        }
    }
}

struct App {
    config: Config,
    // Dropped before the window it renders into
    vulkan: Option<VulkanState>,
    window: Option<Window>,
    init_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            vulkan: None,
            window: None,
            init_error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.init_error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match VulkanState::new(&self.config, &window) {
            Ok(vulkan) => {
                log::info!(
                    "Rendering {}x{} into window",
                    vulkan.renderer.extent().width,
                    vulkan.renderer.extent().height
                );
                self.vulkan = Some(vulkan);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(vulkan) = self.vulkan.as_mut() {
                    if let Err(e) = vulkan.draw_frame() {
                        log::error!("Frame failed: {}", e);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_before_acquire_needs_no_recovery() {
        assert_eq!(FrameStage::Idle.recovery(), Recovery::Nothing);
    }

    #[test]
    fn failed_render_returns_the_acquired_image() {
        assert_eq!(FrameStage::Acquired.recovery(), Recovery::ReleaseImage);
    }

    #[test]
    fn failed_present_resets_semaphores() {
        assert_eq!(FrameStage::Submitted.recovery(), Recovery::ResetSync);
    }
}
