use std::sync::Arc;

use ash::vk;

use crate::device::Device;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command pool creation failed: {0}")]
    PoolCreation(vk::Result),
    #[error("command buffer allocation failed: {0}")]
    Allocation(vk::Result),
    #[error("command buffer recording failed: {0}")]
    Recording(vk::Result),
    #[error("queue submission failed: {0}")]
    Submit(vk::Result),
}

/// A command pool on the graphics family with one primary command buffer per
/// swapchain image.
///
/// Buffers are re-recorded each frame, so the pool allows individual resets.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandPool {
    pub fn new(device: Arc<Device>, buffer_count: usize) -> Result<Self, CommandError> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.graphics_family());

        let pool = unsafe { device.handle().create_command_pool(&pool_info, None) }
            .map_err(CommandError::PoolCreation)?;

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(buffer_count as u32);

        let buffers = match unsafe { device.handle().allocate_command_buffers(&allocate_info) } {
            Ok(buffers) => buffers,
            Err(e) => {
                unsafe { device.handle().destroy_command_pool(pool, None) };
                return Err(CommandError::Allocation(e));
            }
        };

        Ok(Self {
            device,
            pool,
            buffers,
        })
    }

    #[inline]
    pub fn buffer(&self, index: usize) -> vk::CommandBuffer {
        self.buffers[index]
    }

    /// Resets the buffer at `index` and begins recording into it.
    pub fn begin(&self, index: usize) -> Result<vk::CommandBuffer, CommandError> {
        let buffer = self.buffers[index];
        let begin_info = vk::CommandBufferBeginInfo::default();

        unsafe {
            self.device
                .handle()
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())
                .map_err(CommandError::Recording)?;
            self.device
                .handle()
                .begin_command_buffer(buffer, &begin_info)
                .map_err(CommandError::Recording)?;
        }

        Ok(buffer)
    }

    pub fn end(&self, buffer: vk::CommandBuffer) -> Result<(), CommandError> {
        unsafe { self.device.handle().end_command_buffer(buffer) }
            .map_err(CommandError::Recording)
    }

    /// Allocates a short-lived command buffer, records into it, submits it
    /// and blocks until the queue drains.
    ///
    /// Used for transfer work outside the frame loop, such as buffer-to-buffer
    /// copies.
    pub fn one_time(
        &self,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<(), CommandError> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffer = unsafe { self.device.handle().allocate_command_buffers(&allocate_info) }
            .map_err(CommandError::Allocation)?[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let result = unsafe {
            self.device
                .handle()
                .begin_command_buffer(buffer, &begin_info)
                .map_err(CommandError::Recording)
                .and_then(|_| {
                    record(self.device.handle(), buffer);
                    self.device
                        .handle()
                        .end_command_buffer(buffer)
                        .map_err(CommandError::Recording)
                })
                .and_then(|_| {
                    let command_buffers = [buffer];
                    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                    self.device
                        .handle()
                        .queue_submit(
                            self.device.graphics_queue(),
                            &[submit_info],
                            vk::Fence::null(),
                        )
                        .map_err(CommandError::Submit)
                })
                .and_then(|_| {
                    self.device
                        .handle()
                        .queue_wait_idle(self.device.graphics_queue())
                        .map_err(CommandError::Submit)
                })
        };

        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.pool, &[buffer]);
        }
        result
    }

    /// Submits one recorded buffer to the graphics queue.
    ///
    /// Execution waits for `wait_semaphore` at the color attachment output
    /// stage, signals `signal_semaphore` on completion and `fence` when the
    /// whole submission retires.
    pub fn submit(
        &self,
        buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<(), CommandError> {
        let wait_semaphores = [wait_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [buffer];
        let signal_semaphores = [signal_semaphore];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .handle()
                .queue_submit(self.device.graphics_queue(), &[submit_info], fence)
        }
        .map_err(CommandError::Submit)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
    }
}
