// Synchronization primitives for windowed presentation
//
// One "image acquired" / "render complete" pair. The frame loop waits for
// the device to go idle before reusing them, so a single pair is enough.

use crate::error::{RenderError, RenderResult, VkResultExt};
use ash::vk;

pub struct PresentSync {
    pub image_acquired: vk::Semaphore,
    pub render_complete: vk::Semaphore,
}

impl PresentSync {
    pub fn new(device: &ash::Device) -> RenderResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        unsafe {
            let image_acquired = device
                .create_semaphore(&semaphore_info, None)
                .vk_context("vkCreateSemaphore")?;
            let render_complete = match device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(result) => {
                    device.destroy_semaphore(image_acquired, None);
                    return Err(RenderError::Vulkan { call: "vkCreateSemaphore", result });
                }
            };

            Ok(Self {
                image_acquired,
                render_complete,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.render_complete, None);
            device.destroy_semaphore(self.image_acquired, None);
        }
    }
}
