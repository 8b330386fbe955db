//! `[transformer.svgAssetPlugin.output]` PNG encoder options.
//!
//! # Example
//!
//! ```toml
//! [transformer.svgAssetPlugin.output]
//! compressionLevel = 9      # 0 (fastest) ..= 9 (smallest), default 6
//! adaptiveFiltering = true  # per-row adaptive filter selection, default false
//! ```

use serde::{Deserialize, Serialize};

use super::{ConfigDiagnostics, FieldPath};

/// PNG encoder settings passed through to the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PngOptions {
    pub compression_level: u8,
    pub adaptive_filtering: bool,
}

impl PngOptions {
    pub const MAX_COMPRESSION_LEVEL: u8 = 9;

    const FIELD_COMPRESSION: FieldPath =
        FieldPath("transformer.svgAssetPlugin.output.compressionLevel");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.compression_level > Self::MAX_COMPRESSION_LEVEL {
            diag.error_with_hint(
                Self::FIELD_COMPRESSION,
                format!("compression level {} is out of range", self.compression_level),
                "use a value between 0 and 9",
            );
        }
    }
}

impl Default for PngOptions {
    fn default() -> Self {
        Self {
            compression_level: 6,
            adaptive_filtering: false,
        }
    }
}
