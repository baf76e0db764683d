pub mod buffer;
pub mod command;
pub mod context;
pub mod device;
pub mod image;
pub mod instance;
pub mod surface;
pub mod swapchain;
pub mod sync;
