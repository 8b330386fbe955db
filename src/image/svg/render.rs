//! SVG rasterization with resvg.
//!
//! Renders a parsed `usvg` tree into a tiny-skia pixmap and encodes it as
//! PNG with the `image` crate.

use anyhow::{Context, Result};
use image::ImageEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use resvg::tiny_skia;

use super::{Rasterizer, SvgMetadata};
use crate::config::PngOptions;

/// Density at which one SVG user unit is one pixel (CSS px).
pub const BASE_DENSITY: f32 = 96.0;

/// Parsing the first document loads lazily-initialized parser state,
/// so a tiny one is parsed up front.
const WARMUP_SVG: &[u8] = br#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="1" height="1"/></svg>"#;

/// Built-in rasterizer backed by `usvg` + `resvg`.
pub struct ResvgRasterizer {
    options: usvg::Options<'static>,
}

impl ResvgRasterizer {
    /// Create the rasterizer, loading system fonts and warming up the parser.
    pub fn new() -> Self {
        let mut options = usvg::Options {
            dpi: BASE_DENSITY,
            ..Default::default()
        };
        options.fontdb_mut().load_system_fonts();

        let rasterizer = Self { options };
        rasterizer.warm_up();
        rasterizer
    }

    fn warm_up(&self) {
        // Failures here are irrelevant, real documents report their own errors
        if let Err(e) = usvg::Tree::from_data(WARMUP_SVG, &self.options) {
            crate::debug!("render"; "warm-up parse failed: {}", e);
        }
    }

    fn parse(&self, svg: &[u8]) -> Result<usvg::Tree> {
        usvg::Tree::from_data(svg, &self.options).context("Failed to parse SVG")
    }
}

impl Default for ResvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer for ResvgRasterizer {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn metadata(&self, svg: &[u8]) -> Result<SvgMetadata> {
        let tree = self.parse(svg)?;
        let size = tree.size();
        Ok(SvgMetadata {
            width: size.width().round() as u32,
            height: size.height().round() as u32,
            density: Some(self.options.dpi),
        })
    }

    fn render_png(&self, svg: &[u8], density: f32, options: &PngOptions) -> Result<Vec<u8>> {
        let tree = self.parse(svg)?;

        let scale = density / self.options.dpi;
        let size = tree
            .size()
            .to_int_size()
            .scale_by(scale)
            .with_context(|| format!("Invalid output size at density {density}"))?;

        let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
            .context("Failed to allocate pixmap")?;
        resvg::render(
            &tree,
            tiny_skia::Transform::from_scale(scale, scale),
            &mut pixmap.as_mut(),
        );

        encode_png(&pixmap, options)
    }
}

/// Encode a premultiplied pixmap as straight-alpha RGBA PNG.
fn encode_png(pixmap: &tiny_skia::Pixmap, options: &PngOptions) -> Result<Vec<u8>> {
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        rgba.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }

    let (compression, filter) = encoder_settings(options);
    let mut png = Vec::new();
    PngEncoder::new_with_quality(&mut png, compression, filter)
        .write_image(
            &rgba,
            pixmap.width(),
            pixmap.height(),
            image::ExtendedColorType::Rgba8,
        )
        .context("Failed to encode PNG")?;

    Ok(png)
}

/// Map zlib-style options onto the encoder's presets.
fn encoder_settings(options: &PngOptions) -> (CompressionType, FilterType) {
    let compression = match options.compression_level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    };
    let filter = if options.adaptive_filtering {
        FilterType::Adaptive
    } else {
        FilterType::NoFilter
    };
    (compression, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::svg::RED_200X100;

    fn decode(png: &[u8]) -> image::RgbaImage {
        image::load_from_memory(png).unwrap().to_rgba8()
    }

    #[test]
    fn test_metadata() {
        let meta = ResvgRasterizer::new().metadata(RED_200X100.as_bytes()).unwrap();
        assert_eq!((meta.width, meta.height), (200, 100));
        assert_eq!(meta.density, Some(BASE_DENSITY));
    }

    #[test]
    fn test_render_scales_with_density() {
        let rasterizer = ResvgRasterizer::new();
        let options = PngOptions::default();

        for (factor, expected) in [(1.0, (200, 100)), (2.0, (400, 200)), (3.0, (600, 300))] {
            let png = rasterizer
                .render_png(RED_200X100.as_bytes(), BASE_DENSITY * factor, &options)
                .unwrap();
            assert_eq!(decode(&png).dimensions(), expected);
        }
    }

    #[test]
    fn test_render_is_solid_red() {
        let png = ResvgRasterizer::new()
            .render_png(RED_200X100.as_bytes(), BASE_DENSITY, &PngOptions::default())
            .unwrap();
        let img = decode(&png);
        assert!(img.pixels().all(|p| p.0 == [255, 0, 0, 255]));
    }

    #[test]
    fn test_render_is_deterministic() {
        let rasterizer = ResvgRasterizer::new();
        let options = PngOptions::default();
        let a = rasterizer.render_png(RED_200X100.as_bytes(), 192.0, &options).unwrap();
        let b = rasterizer.render_png(RED_200X100.as_bytes(), 192.0, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_svg() {
        let rasterizer = ResvgRasterizer::new();
        assert!(rasterizer.metadata(b"not an svg").is_err());
        assert!(rasterizer.render_png(b"<svg", 96.0, &PngOptions::default()).is_err());
    }

    #[test]
    fn test_encoder_settings() {
        let fast = PngOptions {
            compression_level: 1,
            adaptive_filtering: true,
        };
        assert!(matches!(
            encoder_settings(&fast),
            (CompressionType::Fast, FilterType::Adaptive)
        ));
        assert!(matches!(
            encoder_settings(&PngOptions::default()),
            (CompressionType::Default, FilterType::NoFilter)
        ));
    }
}
