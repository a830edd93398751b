// Shader module loading
//
// SPIR-V binaries are read from disk at startup; build.rs produces them
// from the GLSL sources under shader/.

use crate::error::{RenderError, RenderResult, VkResultExt};
use ash::vk;
use std::fs::File;
use std::path::Path;

/// Read a SPIR-V file into aligned 32-bit words
pub fn read_spirv(path: &Path) -> RenderResult<Vec<u32>> {
    let io_error = |source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_error)?;
    ash::util::read_spv(&mut file).map_err(io_error)
}

pub fn create_shader_module(device: &ash::Device, code: &[u32]) -> RenderResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe { device.create_shader_module(&create_info, None) }.vk_context("vkCreateShaderModule")
}

pub fn load_shader_module(device: &ash::Device, path: &Path) -> RenderResult<vk::ShaderModule> {
    log::debug!("Loading shader {:?}", path);
    let code = read_spirv(path)?;
    create_shader_module(device, &code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_path() {
        let err = read_spirv(Path::new("shader/does-not-exist.spv")).unwrap_err();
        match err {
            RenderError::Io { path, .. } => {
                assert_eq!(path, Path::new("shader/does-not-exist.spv"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reads_little_endian_words() {
        let path = std::env::temp_dir().join(format!("quad-sample-{}.spv", std::process::id()));
        // SPIR-V magic followed by one word
        std::fs::write(&path, [0x03, 0x02, 0x23, 0x07, 0x01, 0x00, 0x00, 0x00]).unwrap();
        let words = read_spirv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(words, vec![0x0723_0203, 1]);
    }
}
