use std::sync::Arc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::instance::Instance;

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface creation failed: {0}")]
    Creation(vk::Result),
    #[error("surface query failed: {0}")]
    Query(#[from] vk::Result),
}

/// A presentable window surface.
pub struct Surface {
    instance: Arc<Instance>,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Creates a surface for a native window.
    pub fn new(
        instance: Arc<Instance>,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Arc<Self>, SurfaceError> {
        let surface = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.handle(),
                display_handle,
                window_handle,
                None,
            )
        }
        .map_err(SurfaceError::Creation)?;

        Ok(Arc::new(Self { instance, surface }))
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, SurfaceError> {
        Ok(unsafe {
            self.instance
                .khr_surface()
                .get_physical_device_surface_capabilities(physical_device, self.surface)
        }?)
    }

    pub fn formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, SurfaceError> {
        Ok(unsafe {
            self.instance
                .khr_surface()
                .get_physical_device_surface_formats(physical_device, self.surface)
        }?)
    }

    pub fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, SurfaceError> {
        Ok(unsafe {
            self.instance
                .khr_surface()
                .get_physical_device_surface_present_modes(physical_device, self.surface)
        }?)
    }

    /// Checks whether a queue family can present to this surface.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool, SurfaceError> {
        Ok(unsafe {
            self.instance.khr_surface().get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                self.surface,
            )
        }?)
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.instance
                .khr_surface()
                .destroy_surface(self.surface, None);
        }
    }
}
