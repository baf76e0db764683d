pub mod camera;
pub mod document;
pub mod graph;
