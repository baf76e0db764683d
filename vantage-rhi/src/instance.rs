use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::RawDisplayHandle;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("failed to load the Vulkan library: {0}")]
    LibraryLoad(#[from] ash::LoadingError),
    #[error("no surface extensions available for this display: {0}")]
    SurfaceExtensions(vk::Result),
    #[error("instance creation failed: {0}")]
    Creation(vk::Result),
}

/// The Vulkan instance, together with the loaded entry points.
///
/// Everything else in the crate hangs off an `Arc<Instance>`; the instance is
/// destroyed when the last reference drops.
pub struct Instance {
    entry: ash::Entry,
    instance: ash::Instance,
    khr_surface: ash::khr::surface::Instance,
}

impl Instance {
    /// Creates an instance with the surface extensions required by the given
    /// display, plus the Khronos validation layer when the loader reports it.
    pub fn new(display_handle: RawDisplayHandle) -> Result<Arc<Self>, InstanceError> {
        log::debug!("Loading Vulkan entrypoint");
        let entry = unsafe { ash::Entry::load()? };

        let extension_names = ash_window::enumerate_required_extensions(display_handle)
            .map_err(InstanceError::SurfaceExtensions)?;

        let mut layer_names = Vec::new();
        if Self::validation_layer_available(&entry) {
            log::debug!("Enabling {:?}", VALIDATION_LAYER);
            layer_names.push(VALIDATION_LAYER.as_ptr());
        }

        let application_info = vk::ApplicationInfo::default()
            .application_name(c"vantage")
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vantage")
            .api_version(vk::API_VERSION_1_2);

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_extension_names(extension_names)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(InstanceError::Creation)?;

        let khr_surface = ash::khr::surface::Instance::new(&entry, &instance);

        Ok(Arc::new(Self {
            entry,
            instance,
            khr_surface,
        }))
    }

    #[inline]
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// The KHR_surface instance extension functions.
    #[inline]
    pub fn khr_surface(&self) -> &ash::khr::surface::Instance {
        &self.khr_surface
    }

    pub fn enumerate_physical_devices(&self) -> Vec<vk::PhysicalDevice> {
        unsafe { self.instance.enumerate_physical_devices() }.unwrap_or_default()
    }

    fn validation_layer_available(entry: &ash::Entry) -> bool {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();

        layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == VALIDATION_LAYER)
        })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}
