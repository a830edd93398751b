// Error types for the Vulkan backend

use ash::prelude::VkResult;
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while building or driving the renderer
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    /// A Vulkan call returned a failure status
    #[error("{} failed: {} ({})", .call, .result, .result.as_raw())]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    #[error("No Vulkan physical device found")]
    NoPhysicalDevice,

    #[error("No queue family with graphics capability")]
    NoGraphicsQueue,

    #[error("No matching memory type (type bits {type_bits:#x}, properties {properties:?})")]
    NoMatchingMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("Surface does not support {format:?} / {color_space:?}")]
    UnsupportedSurfaceFormat {
        format: vk::Format,
        color_space: vk::ColorSpaceKHR,
    },

    #[error("Queue family {0} cannot present to the window surface")]
    SurfaceNotPresentable(u32),

    #[error("Framebuffer index {index} out of range ({count} framebuffers)")]
    FramebufferOutOfRange { index: u32, count: usize },

    #[error("Malformed model data: {0}")]
    MalformedModel(String),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results with [`RenderError`]
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Attach the name of the failing Vulkan call to a raw `VkResult`
pub trait VkResultExt<T> {
    fn vk_context(self, call: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn vk_context(self, call: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Vulkan { call, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_error_reports_status_code() {
        let err: RenderResult<()> =
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).vk_context("vkAllocateMemory");
        let message = err.unwrap_err().to_string();
        assert!(message.starts_with("vkAllocateMemory failed"));
        assert!(message.contains("(-2)"), "{message}");
    }

    #[test]
    fn precondition_errors_have_no_status_code() {
        let message = RenderError::NoGraphicsQueue.to_string();
        assert_eq!(message, "No queue family with graphics capability");
    }
}
