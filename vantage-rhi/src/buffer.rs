use std::sync::Arc;

use ash::vk;

use crate::device::Device;

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("buffer creation failed: {0}")]
    Creation(vk::Result),
    #[error("buffer memory allocation failed: {0}")]
    Allocation(vk::Result),
    #[error("buffer memory bind failed: {0}")]
    Bind(vk::Result),
    #[error("buffer memory could not be mapped: {0}")]
    MapFailed(vk::Result),
    #[error(transparent)]
    Device(#[from] crate::device::DeviceError),
}

/// A device buffer holding uploaded geometry data.
///
/// Memory is device local and host coherent; the upload maps it once, copies
/// the bytes and unmaps. Not every device exposes such a memory type as
/// mappable, so `upload` can fail after the buffer exists; partially built
/// state is released before the error is returned.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    len: vk::DeviceSize,
}

impl Buffer {
    /// Creates a buffer usable as vertex or index data and fills it with
    /// `data`.
    ///
    /// Empty input still produces a valid buffer handle; buffer objects of
    /// size zero are not allowed, so the underlying allocation is at least
    /// one byte while `len` records the true data size.
    pub fn upload(device: Arc<Device>, data: &[u8]) -> Result<Self, BufferError> {
        let len = data.len() as vk::DeviceSize;
        let size = len.max(1);

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None) }
            .map_err(BufferError::Creation)?;

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };
        let memory_type = match device.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(memory_type) => memory_type,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { device.handle().allocate_memory(&allocate_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(BufferError::Allocation(e));
            }
        };

        if let Err(e) = unsafe { device.handle().bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.handle().destroy_buffer(buffer, None);
                device.handle().free_memory(memory, None);
            }
            return Err(BufferError::Bind(e));
        }

        if !data.is_empty() {
            let mapped = unsafe {
                device
                    .handle()
                    .map_memory(memory, 0, len, vk::MemoryMapFlags::empty())
            };
            let mapped = match mapped {
                Ok(mapped) => mapped,
                Err(e) => {
                    unsafe {
                        device.handle().destroy_buffer(buffer, None);
                        device.handle().free_memory(memory, None);
                    }
                    return Err(BufferError::MapFailed(e));
                }
            };

            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
                device.handle().unmap_memory(memory);
            }
        }

        Ok(Self {
            device,
            buffer,
            memory,
            len,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// The number of data bytes uploaded, which may be smaller than the
    /// underlying allocation.
    #[inline]
    pub fn len(&self) -> vk::DeviceSize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }
    }
}
