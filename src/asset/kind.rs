//! Asset kind definitions.

use serde::{Deserialize, Serialize};

/// File type of a bundler asset, serialized as its extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetKind {
    /// Vector source, converted by the plugin.
    Svg,
    /// Raster output of a conversion.
    Png,
    /// Anything else, passed through untouched.
    Other(String),
}

impl From<String> for AssetKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "svg" => Self::Svg,
            "png" => Self::Png,
            _ => Self::Other(value),
        }
    }
}

impl From<AssetKind> for String {
    fn from(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Svg => "svg".to_string(),
            AssetKind::Png => "png".to_string(),
            AssetKind::Other(other) => other,
        }
    }
}
