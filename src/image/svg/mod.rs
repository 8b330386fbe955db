//! SVG rasterization.
//!
//! The pipeline treats the engine as an opaque service behind
//! [`Rasterizer`]: read document metadata, render at a density, encode
//! to PNG.
//!
//! # Modules
//!
//! - [`render`]: resvg-backed implementation
//!
//! # Density
//!
//! ```text
//! metadata(svg)           ──► width × height at `density`
//! render_png(svg, d)      ──► (width × d / density) × (height × d / density) PNG
//! ```

mod render;

pub use render::{BASE_DENSITY, ResvgRasterizer};

use anyhow::Result;

use crate::config::PngOptions;

/// Intrinsic properties of an SVG document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgMetadata {
    /// Width in pixels at `density`.
    pub width: u32,
    /// Height in pixels at `density`.
    pub height: u32,
    /// Density the dimensions are expressed at. Without it output sizes
    /// can't be computed.
    pub density: Option<f32>,
}

/// Decode/render service for SVG documents.
///
/// Implementations are CPU-bound and called from blocking threads.
pub trait Rasterizer: Send + Sync {
    fn metadata(&self, svg: &[u8]) -> Result<SvgMetadata>;

    /// Render at `density` and encode to PNG bytes.
    fn render_png(&self, svg: &[u8], density: f32, options: &PngOptions) -> Result<Vec<u8>>;
}

/// Compute blake3 hash for asset naming (32 hex chars).
///
/// Content changes → hash changes → new output file name.
pub fn content_hash(content: &[u8]) -> String {
    let hash = blake3::hash(content);
    hash.to_hex()[..32].to_string()
}

#[cfg(test)]
pub(crate) const RED_200X100: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100" viewBox="0 0 200 100"><rect width="200" height="100" fill="#ff0000"/></svg>"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        let a = content_hash(b"<svg/>");
        assert_eq!(a.len(), 32);
        assert_eq!(a, content_hash(b"<svg/>"));
        assert_ne!(a, content_hash(b"<svg />"));
    }
}
