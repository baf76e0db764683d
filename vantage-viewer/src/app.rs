use std::sync::Arc;

use vantage_scene::document::Document;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::{Window, WindowAttributes, WindowId},
};

use crate::render::Renderer;

#[derive(Default)]
enum ViewerState {
    #[default]
    Uninitialized,
    Running {
        window: Arc<Window>,
        renderer: Renderer,
    },
}

/// The windowed application: creates the window on resume, then drives the
/// renderer from redraw events until close.
pub struct Viewer {
    /// Document to render; taken when the renderer initializes.
    document: Option<Document>,
    state: ViewerState,
    /// First fatal error, reported after the event loop exits.
    error: Option<anyhow::Error>,
}

impl Viewer {
    pub fn new(document: Document) -> Self {
        Self {
            document: Some(document),
            state: ViewerState::Uninitialized,
            error: None,
        }
    }

    /// The fatal error that stopped the loop, if any.
    pub fn into_result(self) -> anyhow::Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal: {error:#}");
        self.error.get_or_insert(error);
        event_loop.exit();
    }

    fn render(&mut self, event_loop: &ActiveEventLoop) {
        let result = match &mut self.state {
            ViewerState::Running { window, renderer } => {
                // Keep the loop ticking; FIFO presentation paces it.
                window.request_redraw();
                renderer.draw_frame(window)
            }
            ViewerState::Uninitialized => Ok(()),
        };

        if let Err(e) = result {
            self.fail(event_loop, e);
        }
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self.state, ViewerState::Uninitialized) {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_active(true)
            .with_visible(true)
            .with_title("vantage")
            .with_inner_size(PhysicalSize::new(800, 600));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };

        let document = self.document.take().unwrap_or_default();
        match Renderer::new(&window, document) {
            Ok(renderer) => {
                self.state = ViewerState::Running { window, renderer };
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::Resized(_) => {
                if let ViewerState::Running { renderer, .. } = &mut self.state {
                    renderer.resize();
                }
            }
            WindowEvent::RedrawRequested => {
                self.render(event_loop);
            }
            WindowEvent::CloseRequested => {
                if let ViewerState::Running { renderer, .. } = &mut self.state {
                    renderer.shutdown();
                }
                event_loop.exit();
            }
            _ => {}
        }
    }
}
