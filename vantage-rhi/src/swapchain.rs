use std::sync::Arc;

use ash::vk;

use crate::{device::Device, surface::Surface};

#[derive(Debug, thiserror::Error)]
pub enum SwapchainError {
    #[error("surface query failed: {0}")]
    Surface(#[from] crate::surface::SurfaceError),
    #[error("the surface reports no formats")]
    NoFormats,
    #[error("swapchain creation failed: {0}")]
    Creation(vk::Result),
    #[error("image view creation failed: {0}")]
    ImageView(vk::Result),
    #[error("image acquisition failed: {0}")]
    Acquire(vk::Result),
    #[error("presentation failed: {0}")]
    Present(vk::Result),
}

/// Result of asking the swapchain for its next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is acquired and must be rendered and presented; the acquire
    /// semaphore has a pending signal. `suboptimal` asks for a swapchain
    /// recreate once the frame is presented.
    Ready { image_index: u32, suboptimal: bool },
    /// Nothing was acquired and no semaphore signal is pending. The caller
    /// must skip this frame and recreate the swapchain before the next
    /// acquire.
    Stale,
}

/// Result of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented (or dropped) against a stale surface; a recreate is due.
    Stale,
}

/// The rotating set of presentable images, plus one view per image.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a swapchain sized to the surface's current extent (falling
    /// back to `fallback_extent` when the surface leaves it unspecified).
    ///
    /// Pass the previous swapchain on recreation so the driver can recycle
    /// presentable images.
    pub fn new(
        device: Arc<Device>,
        surface: &Surface,
        fallback_extent: vk::Extent2D,
        old_swapchain: Option<&Swapchain>,
    ) -> Result<Self, SwapchainError> {
        let physical_device = device.physical_device();
        let capabilities = surface.capabilities(physical_device)?;
        let formats = surface.formats(physical_device)?;
        let present_modes = surface.present_modes(physical_device)?;

        let surface_format = formats
            .iter()
            .find(|format| {
                format.format == vk::Format::B8G8R8A8_UNORM
                    && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| formats.first())
            .copied()
            .ok_or(SwapchainError::NoFormats)?;

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: fallback_extent.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: fallback_extent.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };

        // FIFO is the only present mode every driver must support.
        let present_mode = if present_modes.contains(&vk::PresentModeKHR::FIFO) {
            vk::PresentModeKHR::FIFO
        } else {
            present_modes
                .first()
                .copied()
                .unwrap_or(vk::PresentModeKHR::FIFO)
        };

        // Graphics and present families may differ; the queue family index
        // list only matters for CONCURRENT sharing, which we avoid by keeping
        // ownership EXCLUSIVE and never sampling swapchain images elsewhere.
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(
                old_swapchain
                    .map(|swapchain| swapchain.swapchain)
                    .unwrap_or(vk::SwapchainKHR::null()),
            );

        let swapchain = unsafe { device.khr_swapchain().create_swapchain(&create_info, None) }
            .map_err(SwapchainError::Creation)?;

        let images = unsafe { device.khr_swapchain().get_swapchain_images(swapchain) }
            .map_err(SwapchainError::Creation)?;

        let image_views = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                unsafe { device.handle().create_image_view(&view_info, None) }
                    .map_err(SwapchainError::ImageView)
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "Swapchain created: {} images, {:?}, {}x{}",
            images.len(),
            surface_format.format,
            extent.width,
            extent.height
        );

        Ok(Self {
            device,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    /// Requests the next presentable image, signaling `semaphore` when it is
    /// actually available.
    pub fn acquire(&self, semaphore: vk::Semaphore) -> Result<AcquireOutcome, SwapchainError> {
        let result = unsafe {
            self.device.khr_swapchain().acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        classify_acquire(result)
    }

    /// Presents `image_index` on the present queue once `wait_semaphore`
    /// signals.
    pub fn present(
        &self,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome, SwapchainError> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.device
                .khr_swapchain()
                .queue_present(self.device.present_queue(), &present_info)
        };

        classify_present(result)
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device
                .khr_swapchain()
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Maps a raw acquire result to an outcome.
///
/// A suboptimal acquire still acquired: the image must be rendered and
/// presented so the pending semaphore signal is consumed; only a recreate
/// follow-up is requested. Only OUT_OF_DATE, which queues no signal, skips
/// the frame.
fn classify_acquire(
    result: Result<(u32, bool), vk::Result>,
) -> Result<AcquireOutcome, SwapchainError> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
        Err(e) => Err(SwapchainError::Acquire(e)),
    }
}

/// Maps a raw present result to an outcome. Stale results are tolerated; a
/// later acquire will see them again.
fn classify_present(result: Result<bool, vk::Result>) -> Result<PresentOutcome, SwapchainError> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
        Err(e) => Err(SwapchainError::Present(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_acquire_is_ready() {
        let outcome = classify_acquire(Ok((2, false))).unwrap();
        assert_eq!(
            outcome,
            AcquireOutcome::Ready {
                image_index: 2,
                suboptimal: false
            }
        );
    }

    #[test]
    fn suboptimal_acquire_still_delivers_the_image() {
        // The acquisition succeeded and the semaphore will signal, so the
        // image must flow through render and present.
        let outcome = classify_acquire(Ok((0, true))).unwrap();
        assert_eq!(
            outcome,
            AcquireOutcome::Ready {
                image_index: 0,
                suboptimal: true
            }
        );
    }

    #[test]
    fn out_of_date_acquire_is_stale() {
        let outcome = classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!(outcome, AcquireOutcome::Stale);
    }

    #[test]
    fn other_acquire_failures_are_errors() {
        let result = classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(
            result,
            Err(SwapchainError::Acquire(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn present_outcomes_classify_stale_and_fatal() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Stale);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::Stale
        );
        assert!(matches!(
            classify_present(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(SwapchainError::Present(vk::Result::ERROR_DEVICE_LOST))
        ));
    }
}
