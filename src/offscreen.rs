// Offscreen run: render one frame into a device-local image and save it as PNG

use crate::backend::{DeviceContext, DeviceRequirements, OffscreenTarget, Renderer};
use crate::config::Config;
use crate::APP_NAME;
use anyhow::{anyhow, Context, Result};
use std::path::Path;

pub fn run(config: &Config) -> Result<()> {
    let width = config.window.width;
    let height = config.window.height;

    // No window, so no surface or swapchain extensions
    let ctx = DeviceContext::new(
        APP_NAME,
        &DeviceRequirements::default(),
        config.validation_enabled(),
    )
    .context("Failed to create device context")?;

    let target = OffscreenTarget::new(ctx.clone(), width, height)
        .context("Failed to create offscreen target")?;
    let renderer = Renderer::new(ctx.clone(), &target, config.assets.renderer_assets())
        .context("Failed to create renderer")?;

    renderer.render(0, &[], &[], &[]).context("Failed to render frame")?;
    ctx.wait_idle()?;

    let mut pixels = target.read_pixels().context("Failed to read back pixels")?;
    bgra_to_rgba(&mut pixels);
    save_png(&config.assets.output, width, height, pixels)?;

    log::info!("Wrote {:?} ({}x{})", config.assets.output, width, height);
    Ok(())
}

/// Swap the blue and red channel of every 4-byte texel in place
pub fn bgra_to_rgba(pixels: &mut [u8]) {
    for texel in pixels.chunks_exact_mut(4) {
        texel.swap(0, 2);
    }
}

fn save_png(path: &Path, width: u32, height: u32, rgba: Vec<u8>) -> Result<()> {
    let len = rgba.len();
    let image = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("Read back {} bytes, too few for {}x{} RGBA", len, width, height))?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swizzle_swaps_red_and_blue_only() {
        let mut pixels = vec![
            10, 20, 30, 40, //
            0, 0, 128, 255, //
        ];
        bgra_to_rgba(&mut pixels);
        assert_eq!(pixels, vec![30, 20, 10, 40, 128, 0, 0, 255]);
    }

    #[test]
    fn swizzle_ignores_trailing_partial_texel() {
        let mut pixels = vec![1, 2, 3, 4, 5, 6];
        bgra_to_rgba(&mut pixels);
        assert_eq!(pixels, vec![3, 2, 1, 4, 5, 6]);
    }

    #[test]
    fn short_pixel_buffer_is_an_error() {
        let path = std::env::temp_dir().join("quad-sample-never-written.png");
        assert!(save_png(&path, 4, 4, vec![0; 4 * 4 * 4 - 1]).is_err());
        assert!(!path.exists());
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn renders_clear_color_background() {
        let mut config = Config::default();
        config.debug.validation_layers = false;
        config.assets.output =
            std::env::temp_dir().join(format!("quad-sample-{}.png", std::process::id()));

        run(&config).unwrap();

        let image = image::open(&config.assets.output).unwrap().to_rgba8();
        std::fs::remove_file(&config.assets.output).unwrap();
        assert_eq!(image.dimensions(), (640, 480));

        let background = image
            .pixels()
            .filter(|p| p.0 == [128, 0, 0, 255])
            .count();
        assert!(background > (640 * 480) / 2, "only {background} background pixels");
    }
}
