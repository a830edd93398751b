// Device Context - Core GPU interface
//
// Responsibilities:
// - Instance creation with caller-supplied layers/extensions
// - Physical device selection (first enumerated, no scoring)
// - Logical device with a single graphics queue
// - Transient command pool for one-shot command buffers

use crate::error::{RenderError, RenderResult, VkResultExt};
use ash::{vk, Entry};
use std::ffi::{c_char, CStr};
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Layers and extensions requested by the platform variant
#[derive(Debug, Default, Clone)]
pub struct DeviceRequirements<'a> {
    pub instance_layers: Vec<&'a CStr>,
    pub instance_extensions: Vec<&'a CStr>,
    pub device_layers: Vec<&'a CStr>,
    pub device_extensions: Vec<&'a CStr>,
}

type DebugMessenger = (ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT);

/// Instance, device, queue and command pool bundle every other object depends on
pub struct DeviceContext {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    entry: Entry,

    pub queue: vk::Queue,
    pub queue_family: u32,
    command_pool: vk::CommandPool,

    debug_utils: Option<DebugMessenger>,

    /// Read-only snapshot taken at creation
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceContext {
    /// Create the device context.
    ///
    /// Any failure tears down whatever was already created before returning.
    pub fn new(
        app_name: &CStr,
        requirements: &DeviceRequirements<'_>,
        enable_validation: bool,
    ) -> RenderResult<Arc<Self>> {
        log::info!("Creating Vulkan device context: {}", app_name.to_string_lossy());

        let entry = unsafe { Entry::load() }?;

        let mut instance_layers = requirements.instance_layers.clone();
        let mut instance_extensions = requirements.instance_extensions.clone();
        let validation = enable_validation && Self::validation_available(&entry);
        if validation {
            instance_layers.push(VALIDATION_LAYER);
            instance_extensions.push(ash::extensions::ext::DebugUtils::name());
        } else if enable_validation {
            log::warn!("Validation layer not installed, continuing without it");
        }

        let instance =
            Self::create_instance(&entry, app_name, &instance_layers, &instance_extensions)?;

        let debug_utils = if validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        match Self::create_device_objects(&instance, requirements) {
            Ok((physical_device, queue_family, device, queue, command_pool)) => {
                let memory_properties =
                    unsafe { instance.get_physical_device_memory_properties(physical_device) };

                Ok(Arc::new(Self {
                    device,
                    physical_device,
                    instance,
                    entry,
                    queue,
                    queue_family,
                    command_pool,
                    debug_utils,
                    memory_properties,
                }))
            }
            Err(e) => {
                unsafe {
                    if let Some((loader, messenger)) = debug_utils {
                        loader.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                Err(e)
            }
        }
    }

    fn validation_available(entry: &Entry) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|layer| {
                    (unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }) == VALIDATION_LAYER
                })
            })
            .unwrap_or(false)
    }

    fn create_instance(
        entry: &Entry,
        app_name: &CStr,
        layers: &[&CStr],
        extensions: &[&CStr],
    ) -> RenderResult<ash::Instance> {
        let app_info = vk::ApplicationInfo::builder()
            .application_name(app_name)
            .application_version(0)
            .engine_name(app_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();
        let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        unsafe { entry.create_instance(&create_info, None) }.vk_context("vkCreateInstance")
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> RenderResult<DebugMessenger> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .vk_context("vkCreateDebugUtilsMessengerEXT")?;

        Ok((debug_utils, messenger))
    }

    fn create_device_objects(
        instance: &ash::Instance,
        requirements: &DeviceRequirements<'_>,
    ) -> RenderResult<(vk::PhysicalDevice, u32, ash::Device, vk::Queue, vk::CommandPool)> {
        let physical_device = unsafe { instance.enumerate_physical_devices() }
            .vk_context("vkEnumeratePhysicalDevices")?
            .first()
            .copied()
            .ok_or(RenderError::NoPhysicalDevice)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_family =
            first_graphics_family(&queue_families).ok_or(RenderError::NoGraphicsQueue)?;
        log::info!("Using queue family {}", queue_family);

        let device = Self::create_logical_device(instance, physical_device, queue_family, requirements)?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        // Command buffers from this pool are one-shot only
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(result) => {
                unsafe { device.destroy_device(None) };
                return Err(RenderError::Vulkan { call: "vkCreateCommandPool", result });
            }
        };

        Ok((physical_device, queue_family, device, queue, command_pool))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        requirements: &DeviceRequirements<'_>,
    ) -> RenderResult<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let layer_names: Vec<*const c_char> =
            requirements.device_layers.iter().map(|l| l.as_ptr()).collect();
        let extension_names: Vec<*const c_char> =
            requirements.device_extensions.iter().map(|e| e.as_ptr()).collect();

        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .vk_context("vkCreateDevice")
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Allocate one primary command buffer and begin recording it for a single submit
    pub fn begin_one_shot(&self) -> RenderResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .vk_context("vkAllocateCommandBuffers")?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
            .vk_context("vkBeginCommandBuffer")?;

        Ok(command_buffer)
    }

    /// End recording and submit to the queue.
    ///
    /// `wait_semaphores` and `wait_stages` are paired index by index.
    pub fn end_and_submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
    ) -> RenderResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
            .vk_context("vkEndCommandBuffer")?;

        self.submit(&[command_buffer], wait_semaphores, wait_stages, signal_semaphores)
    }

    /// Submit to the queue without a fence. An empty `command_buffers` only
    /// moves semaphores along.
    pub fn submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
    ) -> RenderResult<()> {
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())
        }
        .vk_context("vkQueueSubmit")
    }

    /// Recycle every command buffer allocated so far. Caller waits idle first.
    pub fn reset_command_pool(&self) -> RenderResult<()> {
        unsafe {
            self.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
        }
        .vk_context("vkResetCommandPool")
    }

    /// Wait for device to be idle (e.g., before cleanup or readback)
    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }.vk_context("vkDeviceWaitIdle")
    }

    /// Idle wait used by destructors, where failure can only be reported
    pub(crate) fn wait_idle_for_teardown(&self) {
        if let Err(e) = self.wait_idle() {
            log::error!("{}", e);
        }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device context...");

        self.wait_idle_for_teardown();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Index of the first queue family exposing graphics capability
pub fn first_graphics_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_graphics_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        assert_eq!(first_graphics_family(&families), Some(1));
    }

    #[test]
    fn no_graphics_family() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];
        assert_eq!(first_graphics_family(&families), None);
        assert_eq!(first_graphics_family(&[]), None);
    }
}
