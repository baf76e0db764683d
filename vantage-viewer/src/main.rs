use anyhow::Context;
use vantage_scene::document::Document;
use winit::event_loop::EventLoop;

use crate::app::Viewer;

mod app;
mod frame;
mod pipeline;
mod render;
mod resources;

fn run() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: vantage-viewer <scene.gltf>")?;

    let document = Document::load(&path).with_context(|| format!("failed to load {path}"))?;

    let event_loop = EventLoop::new()?;
    let mut viewer = Viewer::new(document);
    event_loop.run_app(&mut viewer)?;

    viewer.into_result()
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
