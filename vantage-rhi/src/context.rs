use std::sync::Arc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    command::CommandPool,
    device::Device,
    image::DepthImage,
    instance::Instance,
    surface::Surface,
    swapchain::Swapchain,
    sync::FrameSync,
};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Instance(#[from] crate::instance::InstanceError),
    #[error(transparent)]
    Surface(#[from] crate::surface::SurfaceError),
    #[error(transparent)]
    Device(#[from] crate::device::DeviceError),
    #[error(transparent)]
    Swapchain(#[from] crate::swapchain::SwapchainError),
    #[error(transparent)]
    Image(#[from] crate::image::ImageError),
    #[error(transparent)]
    Command(#[from] crate::command::CommandError),
    #[error(transparent)]
    Sync(#[from] crate::sync::SyncError),
}

/// The full Vulkan context for one window: instance, surface, device,
/// swapchain, depth buffer, command buffers and per-frame synchronization.
///
/// One frame is in flight at a time. Field order matters for teardown: the
/// swapchain and depth image drop before the device, the surface before the
/// instance.
pub struct GraphicsContext {
    frame_sync: FrameSync,
    command_pool: CommandPool,
    depth_image: DepthImage,
    swapchain: Swapchain,
    device: Arc<Device>,
    surface: Arc<Surface>,
    instance: Arc<Instance>,
}

impl GraphicsContext {
    pub fn new(
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        extent: vk::Extent2D,
    ) -> Result<Self, ContextError> {
        let instance = Instance::new(display_handle)?;
        let surface = Surface::new(instance.clone(), display_handle, window_handle)?;
        let device = Device::new(instance.clone(), &surface)?;

        let swapchain = Swapchain::new(device.clone(), &surface, extent, None)?;
        let depth_image = DepthImage::new(device.clone(), swapchain.extent())?;
        let command_pool = CommandPool::new(device.clone(), swapchain.image_count())?;
        let frame_sync = FrameSync::new(device.clone())?;

        log::info!("Graphics context ready");

        Ok(Self {
            frame_sync,
            command_pool,
            depth_image,
            swapchain,
            device,
            surface,
            instance,
        })
    }

    /// Replaces the swapchain and depth buffer after the surface became
    /// stale.
    ///
    /// Waits for the device to go idle first, so every resource tied to the
    /// old swapchain is safe to destroy. The caller rebuilds framebuffers
    /// afterwards.
    pub fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> Result<(), ContextError> {
        self.device.wait_idle();

        let swapchain = Swapchain::new(self.device.clone(), &self.surface, extent, Some(&self.swapchain))?;
        let depth_image = DepthImage::new(self.device.clone(), swapchain.extent())?;

        // The image count can change with the extent; resize the command
        // buffer set to match.
        if swapchain.image_count() != self.swapchain.image_count() {
            self.command_pool = CommandPool::new(self.device.clone(), swapchain.image_count())?;
        }

        self.depth_image = depth_image;
        self.swapchain = swapchain;

        log::debug!(
            "Swapchain recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );

        Ok(())
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn depth_image(&self) -> &DepthImage {
        &self.depth_image
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    #[inline]
    pub fn frame_sync(&self) -> &FrameSync {
        &self.frame_sync
    }

    /// Blocks until the device is idle. Call before destroying anything the
    /// GPU may still be reading.
    pub fn wait_idle(&self) {
        self.device.wait_idle();
    }
}
