use std::sync::Arc;

use ash::vk;

use crate::device::Device;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image creation failed: {0}")]
    Creation(vk::Result),
    #[error("image memory allocation failed: {0}")]
    Allocation(vk::Result),
    #[error("image memory bind failed: {0}")]
    Bind(vk::Result),
    #[error("image view creation failed: {0}")]
    View(vk::Result),
    #[error(transparent)]
    Device(#[from] crate::device::DeviceError),
}

/// A depth attachment sized to the swapchain extent.
///
/// Recreated together with the swapchain whenever the surface changes size.
pub struct DepthImage {
    device: Arc<Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
}

impl DepthImage {
    pub const FORMAT: vk::Format = vk::Format::D32_SFLOAT;

    pub fn new(device: Arc<Device>, extent: vk::Extent2D) -> Result<Self, ImageError> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(Self::FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None) }
            .map_err(ImageError::Creation)?;

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let memory_type = device.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { device.handle().allocate_memory(&allocate_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(ImageError::Allocation(e));
            }
        };

        if let Err(e) = unsafe { device.handle().bind_image_memory(image, memory, 0) } {
            unsafe {
                device.handle().destroy_image(image, None);
                device.handle().free_memory(memory, None);
            }
            return Err(ImageError::Bind(e));
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(Self::FORMAT)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = match unsafe { device.handle().create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.handle().destroy_image(image, None);
                    device.handle().free_memory(memory, None);
                }
                return Err(ImageError::View(e));
            }
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
            format: Self::FORMAT,
        })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for DepthImage {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
            self.device.handle().free_memory(self.memory, None);
        }
    }
}
