// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every setting is optional. A missing or broken config.toml falls back to
// the built-in defaults, which match the fixed asset paths and the 640x480
// target size.

use crate::backend::renderer::RendererAssets;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub debug: DebugConfig,
    pub assets: AssetsConfig,
}

/// Window / render target size
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Quad Sample".to_string(),
            width: 640,
            height: 480,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honored in debug builds
    pub validation_layers: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
        }
    }
}

/// Input and output files, relative to the working directory
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub model: PathBuf,
    pub output: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            vertex_shader: PathBuf::from("./shader/ui.vert.spv"),
            fragment_shader: PathBuf::from("./shader/ui.frag.spv"),
            model: PathBuf::from("./model/square.raw"),
            output: PathBuf::from("rendering-result.png"),
        }
    }
}

impl AssetsConfig {
    pub fn renderer_assets(&self) -> RendererAssets<'_> {
        RendererAssets {
            vertex_shader: &self.vertex_shader,
            fragment_shader: &self.fragment_shader,
            model: &self.model,
        }
    }
}

/// Looked up in the working directory
pub const CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Settings from `config.toml`, or defaults when it is absent or broken
    pub fn load() -> Self {
        match Self::read(Path::new(CONFIG_FILE)) {
            Ok(Some(config)) => config,
            Ok(None) => {
                log::info!("No {} found, using defaults", CONFIG_FILE);
                Self::default()
            }
            Err(e) => {
                log::warn!("Ignoring {}: {:#}", CONFIG_FILE, e);
                Self::default()
            }
        }
    }

    /// `Ok(None)` when there is no file at `path`
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Cannot read {}", path.display())),
        };

        let config: Config =
            toml::from_str(&text).with_context(|| format!("Cannot parse {}", path.display()))?;
        log::info!("Using settings from {}", path.display());
        log::debug!("{:?}", config);

        Ok(Some(config))
    }

    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_paths() {
        let config = Config::default();
        assert_eq!((config.window.width, config.window.height), (640, 480));
        assert_eq!(config.assets.vertex_shader, Path::new("./shader/ui.vert.spv"));
        assert_eq!(config.assets.fragment_shader, Path::new("./shader/ui.frag.spv"));
        assert_eq!(config.assets.model, Path::new("./model/square.raw"));
        assert_eq!(config.assets.output, Path::new("rendering-result.png"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 320

            [debug]
            validation_layers = false
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 320);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.window.title, "Vulkan Quad Sample");
        assert!(!config.debug.validation_layers);
        assert!(!config.validation_enabled());
        assert_eq!(config.assets.model, Path::new("./model/square.raw"));
    }

    #[test]
    fn asset_paths_are_overridable() {
        let config: Config = toml::from_str(
            r#"
            [assets]
            model = "other.raw"
            output = "out/frame.png"
            "#,
        )
        .unwrap();
        let assets = config.assets.renderer_assets();
        assert_eq!(assets.model, Path::new("other.raw"));
        assert_eq!(assets.vertex_shader, Path::new("./shader/ui.vert.spv"));
        assert_eq!(config.assets.output, Path::new("out/frame.png"));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = Config::read(Path::new("definitely/not/here/config.toml")).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn file_on_disk_is_read() {
        let path = std::env::temp_dir().join(format!("quad-sample-ok-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nheight = 200\n").unwrap();
        let config = Config::read(&path);
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap().unwrap();
        assert_eq!((config.window.width, config.window.height), (640, 200));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let path = std::env::temp_dir().join(format!("quad-sample-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[window\nwidth = ").unwrap();
        let result = Config::read(&path);
        std::fs::remove_file(&path).unwrap();
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.starts_with("Cannot parse"), "{message}");
    }
}
