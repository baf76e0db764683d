use std::sync::Arc;

use ash::vk;

use crate::device::Device;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("semaphore creation failed: {0}")]
    Semaphore(vk::Result),
    #[error("fence creation failed: {0}")]
    Fence(vk::Result),
    #[error("fence wait failed: {0}")]
    Wait(vk::Result),
    #[error("fence reset failed: {0}")]
    Reset(vk::Result),
}

/// Synchronization primitives for one frame in flight.
///
/// `image_available` is signaled by the swapchain when the acquired image is
/// ready, `render_finished` by the graphics queue when rendering completes,
/// and `in_flight` gates CPU reuse of the command buffer. The fence starts
/// signaled so the first frame does not deadlock.
pub struct FrameSync {
    device: Arc<Device>,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> Result<Self, SyncError> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let image_available =
            unsafe { device.handle().create_semaphore(&semaphore_info, None) }
                .map_err(SyncError::Semaphore)?;

        let render_finished =
            match unsafe { device.handle().create_semaphore(&semaphore_info, None) } {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    unsafe { device.handle().destroy_semaphore(image_available, None) };
                    return Err(SyncError::Semaphore(e));
                }
            };

        let in_flight = match unsafe { device.handle().create_fence(&fence_info, None) } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe {
                    device.handle().destroy_semaphore(image_available, None);
                    device.handle().destroy_semaphore(render_finished, None);
                }
                return Err(SyncError::Fence(e));
            }
        };

        Ok(Self {
            device,
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Blocks until the previous submission using this frame slot completes.
    ///
    /// Does not reset the fence; callers reset only after a successful image
    /// acquire, so a skipped frame can wait again without deadlocking.
    pub fn wait(&self) -> Result<(), SyncError> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.in_flight], true, u64::MAX)
        }
        .map_err(SyncError::Wait)
    }

    pub fn reset(&self) -> Result<(), SyncError> {
        unsafe { self.device.handle().reset_fences(&[self.in_flight]) }.map_err(SyncError::Reset)
    }

    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished
    }

    #[inline]
    pub fn in_flight(&self) -> vk::Fence {
        self.in_flight
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_semaphore(self.image_available, None);
            self.device
                .handle()
                .destroy_semaphore(self.render_finished, None);
            self.device.handle().destroy_fence(self.in_flight, None);
        }
    }
}
