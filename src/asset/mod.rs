//! Bundler asset descriptors.
//!
//! [`AssetData`] mirrors the record the host bundler hands to asset
//! plugins (camelCase JSON). Fields the plugin doesn't know about are
//! kept verbatim so a pass-through returns exactly what came in.

mod kind;

pub use kind::AssetKind;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One logical image asset: its file set, scales and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetData {
    /// One file per entry in `scales`.
    pub files: Vec<PathBuf>,

    pub scales: Vec<f64>,

    /// Content hash computed by the bundler.
    pub hash: String,

    /// Directory holding `files`.
    pub file_system_location: PathBuf,

    /// URL prefix the asset is served under.
    pub http_server_location: String,

    /// File name without extension or scale suffix.
    pub name: String,

    #[serde(rename = "type")]
    pub kind: AssetKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Host fields this plugin does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetData {
    /// First source file, if any.
    pub fn first_file(&self) -> Option<&PathBuf> {
        self.files.first()
    }
}
