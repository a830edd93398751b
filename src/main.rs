// =============================================================================
// VULKAN QUAD SAMPLE
// =============================================================================
//
// Draws one alpha-blended quad over a dark red background, either into an
// offscreen image written to rendering-result.png, or into a window until
// it is closed.
//
// RESOURCE CHAIN (created top-down, destroyed bottom-up):
//   DeviceContext (instance, device, queue, command pool)
//     └── OffscreenTarget | WindowSurface + Swapchain
//           └── Renderer (render pass, framebuffers, pipeline, model, camera)
//
// =============================================================================

mod backend;
mod config;
mod error;
mod model;
mod offscreen;
mod windowed;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use config::Config;
use std::ffi::CStr;

pub const APP_NAME: &CStr = c"Vulkan Quad Sample";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum RunMode {
    /// Render a single frame to rendering-result.png
    #[default]
    Offscreen,
    /// Render into a window until it is closed
    Windows,
}

#[derive(Debug, Parser)]
#[command(version, about = "Minimal Vulkan sample: one quad, offscreen or windowed")]
struct Args {
    #[arg(value_enum)]
    mode: Option<RunMode>,
}

fn main() -> Result<()> {
    // Usage errors exit here with a non-zero status
    let args = Args::parse();

    init_logging();

    let config = Config::load();
    let mode = args.mode.unwrap_or_default();
    log::info!(
        "Starting in {:?} mode, {}x{}",
        mode,
        config.window.width,
        config.window.height
    );

    match mode {
        RunMode::Offscreen => offscreen::run(&config),
        RunMode::Windows => windowed::run(config),
    }
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_argument_means_offscreen() {
        let args = Args::try_parse_from(["quad-sample"]).unwrap();
        assert_eq!(args.mode, None);
        assert_eq!(args.mode.unwrap_or_default(), RunMode::Offscreen);
    }

    #[test]
    fn explicit_modes() {
        let args = Args::try_parse_from(["quad-sample", "offscreen"]).unwrap();
        assert_eq!(args.mode, Some(RunMode::Offscreen));
        let args = Args::try_parse_from(["quad-sample", "windows"]).unwrap();
        assert_eq!(args.mode, Some(RunMode::Windows));
    }

    #[test]
    fn unknown_mode_is_a_usage_error() {
        let err = Args::try_parse_from(["quad-sample", "fullscreen"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn extra_arguments_are_rejected() {
        assert!(Args::try_parse_from(["quad-sample", "offscreen", "windows"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
