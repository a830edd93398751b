// GPU buffer with its own bound memory block
//
// Used for the vertex/index buffers, the camera uniform buffer and the
// offscreen readback buffer.

use crate::error::{RenderResult, VkResultExt};
use ash::vk;
use std::sync::Arc;
use super::{memory, DeviceContext};

pub struct Buffer {
    buffer: Option<vk::Buffer>,
    memory: Option<vk::DeviceMemory>,
    pub requirements: vk::MemoryRequirements,
    pub size: vk::DeviceSize,
    ctx: Arc<DeviceContext>,
}

impl Buffer {
    /// Create the buffer, allocate memory for its requirements and bind at offset 0
    pub fn new(
        ctx: Arc<DeviceContext>,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        size: vk::DeviceSize,
    ) -> RenderResult<Self> {
        // Dropped on any early return, releasing what was created so far
        let mut this = Self {
            buffer: None,
            memory: None,
            requirements: vk::MemoryRequirements::default(),
            size,
            ctx,
        };

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let device = &this.ctx.device;
        let buffer = unsafe { device.create_buffer(&buffer_info, None) }
            .vk_context("vkCreateBuffer")?;
        this.buffer = Some(buffer);

        this.requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        log::debug!(
            "Buffer {:?}: {} bytes requested, {} allocated",
            usage,
            size,
            this.requirements.size
        );

        let memory = memory::allocate(
            &this.ctx,
            this.requirements.memory_type_bits,
            properties,
            this.requirements.size,
        )?;
        this.memory = Some(memory);

        unsafe { this.ctx.device.bind_buffer_memory(buffer, memory, 0) }
            .vk_context("vkBindBufferMemory")?;

        Ok(this)
    }

    /// Create a host-visible buffer and fill it with `data`
    pub fn with_data(
        ctx: Arc<DeviceContext>,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> RenderResult<Self> {
        let buffer = Self::new(
            ctx,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            data.len() as vk::DeviceSize,
        )?;
        buffer.upload(data)?;
        Ok(buffer)
    }

    /// Whole-buffer write. `data` must not exceed the buffer size.
    fn upload(&self, data: &[u8]) -> RenderResult<()> {
        memory::upload(&self.ctx.device, self.memory(), data)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.unwrap_or_default()
    }

    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.unwrap_or_default()
    }

    /// Release the buffer and its memory. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.buffer.is_none() && self.memory.is_none() {
            return;
        }
        self.ctx.wait_idle_for_teardown();
        unsafe {
            if let Some(buffer) = self.buffer.take() {
                self.ctx.device.destroy_buffer(buffer, None);
            }
            if let Some(memory) = self.memory.take() {
                self.ctx.device.free_memory(memory, None);
            }
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceRequirements;

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn destroy_is_idempotent() {
        let ctx = DeviceContext::new(c"buffer-test", &DeviceRequirements::default(), false).unwrap();
        let mut buffer = Buffer::with_data(
            ctx.clone(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &[1, 2, 3, 4],
        )
        .unwrap();
        assert_ne!(buffer.handle(), vk::Buffer::null());
        assert!(buffer.requirements.size >= 4);

        buffer.destroy();
        assert_eq!(buffer.handle(), vk::Buffer::null());
        assert_eq!(buffer.memory(), vk::DeviceMemory::null());
        buffer.destroy();
        drop(buffer);
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn impossible_memory_properties_fail_cleanly() {
        let ctx = DeviceContext::new(c"buffer-test", &DeviceRequirements::default(), false).unwrap();
        let result = Buffer::new(
            ctx,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::PROTECTED | vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
            64,
        );
        assert!(matches!(
            result,
            Err(crate::error::RenderError::NoMatchingMemoryType { .. })
        ));
    }
}
