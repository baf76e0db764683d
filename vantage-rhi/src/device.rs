use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;

use crate::{instance::Instance, surface::Surface};

/// Device extensions every selected device must carry.
const REQUIRED_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME, ash::ext::robustness2::NAME];

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no physical device supports the required queues, extensions and features")]
    NoSuitableDevice,
    #[error("surface query failed during device selection: {0}")]
    Surface(#[from] crate::surface::SurfaceError),
    #[error("logical device creation failed: {0}")]
    Creation(vk::Result),
    #[error("no memory type satisfies flags {0:?}")]
    NoMemoryType(vk::MemoryPropertyFlags),
}

/// Queue family indices found on a physical device.
///
/// Graphics and present may resolve to the same family; device creation
/// deduplicates them.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn find(
        instance: &Instance,
        surface: &Surface,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, DeviceError> {
        let families = unsafe {
            instance
                .handle()
                .get_physical_device_queue_family_properties(physical_device)
        };

        let mut indices = Self::default();
        for (index, properties) in families.iter().enumerate() {
            let index = index as u32;
            if properties.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics.get_or_insert(index);
            }
            if surface.supports_present(physical_device, index)? {
                indices.present.get_or_insert(index);
            }
            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }
}

/// The selected physical device and the logical device created from it.
///
/// Selection happens once; the queue handles and family indices are fixed for
/// the lifetime of the device.
pub struct Device {
    instance: Arc<Instance>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    khr_swapchain: ash::khr::swapchain::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    graphics_family: u32,
    present_family: u32,
}

impl Device {
    /// Picks the first suitable physical device and creates a logical device
    /// on it with the robustness feature chain enabled.
    pub fn new(instance: Arc<Instance>, surface: &Surface) -> Result<Arc<Self>, DeviceError> {
        let (physical_device, indices) = Self::select_physical_device(&instance, surface)?;

        let properties = unsafe {
            instance
                .handle()
                .get_physical_device_properties(physical_device)
        };
        log::info!(
            "Selected physical device: {}",
            properties
                .device_name_as_c_str()
                .map(CStr::to_string_lossy)
                .unwrap_or(std::borrow::Cow::Borrowed("unknown"))
        );

        let graphics_family = indices.graphics.ok_or(DeviceError::NoSuitableDevice)?;
        let present_family = indices.present.ok_or(DeviceError::NoSuitableDevice)?;

        // One create info per unique family.
        let queue_priorities = [1.0];
        let mut unique_families = vec![graphics_family];
        if present_family != graphics_family {
            unique_families.push(present_family);
        }
        let queue_create_infos = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<Vec<_>>();

        let extension_names = REQUIRED_EXTENSIONS
            .iter()
            .map(|name| name.as_ptr())
            .collect::<Vec<_>>();

        // Core features plus the robustness2 chain; enabled through the
        // features2 chain, so `enabled_features` stays unset.
        let features = vk::PhysicalDeviceFeatures::default()
            .robust_buffer_access(true)
            .sampler_anisotropy(true);
        let mut robustness2 =
            vk::PhysicalDeviceRobustness2FeaturesEXT::default().null_descriptor(true);
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .features(features)
            .push_next(&mut robustness2);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features2);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device, &create_info, None)
        }
        .map_err(DeviceError::Creation)?;

        let khr_swapchain = ash::khr::swapchain::Device::new(instance.handle(), &device);

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok(Arc::new(Self {
            instance,
            physical_device,
            device,
            khr_swapchain,
            graphics_queue,
            present_queue,
            graphics_family,
            present_family,
        }))
    }

    fn select_physical_device(
        instance: &Arc<Instance>,
        surface: &Surface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices), DeviceError> {
        for physical_device in instance.enumerate_physical_devices() {
            if !Self::supports_required_extensions(instance, physical_device) {
                continue;
            }

            let features = unsafe {
                instance
                    .handle()
                    .get_physical_device_features(physical_device)
            };
            if features.sampler_anisotropy == vk::FALSE {
                continue;
            }

            let indices = QueueFamilyIndices::find(instance, surface, physical_device)?;
            if indices.is_complete() {
                return Ok((physical_device, indices));
            }
        }

        Err(DeviceError::NoSuitableDevice)
    }

    fn supports_required_extensions(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
    ) -> bool {
        let available = unsafe {
            instance
                .handle()
                .enumerate_device_extension_properties(physical_device)
        }
        .unwrap_or_default();

        REQUIRED_EXTENSIONS.iter().all(|required| {
            available.iter().any(|extension| {
                extension
                    .extension_name_as_c_str()
                    .is_ok_and(|name| name == *required)
            })
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The KHR_swapchain device extension functions.
    #[inline]
    pub fn khr_swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.khr_swapchain
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    #[inline]
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    /// Finds a memory type index compatible with `type_bits` that has all of
    /// the requested property flags.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32, DeviceError> {
        let memory_properties = unsafe {
            self.instance
                .handle()
                .get_physical_device_memory_properties(self.physical_device)
        };

        memory_properties.memory_types[..memory_properties.memory_type_count as usize]
            .iter()
            .enumerate()
            .find(|(index, memory_type)| {
                type_bits & (1 << index) != 0 && memory_type.property_flags.contains(properties)
            })
            .map(|(index, _)| index as u32)
            .ok_or(DeviceError::NoMemoryType(properties))
    }

    /// Blocks until all queues on the device are idle.
    ///
    /// Must run before any teardown; destroying resources with work in flight
    /// is undefined behavior at the API level.
    pub fn wait_idle(&self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
    }
}
