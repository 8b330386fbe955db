//! Rasterize SVG assets into cached multi-scale PNGs for a JS bundler.
//!
//! The bundler hands each asset descriptor to [`SvgAssetPlugin::convert`].
//! SVG assets come back as PNG descriptors with one file per configured
//! scale, stored in a cache directory next to the source and regenerated
//! only when outdated.
//!
//! # Modules
//!
//! - [`asset`]: bundler asset descriptors
//! - [`config`]: plugin configuration from the host config file
//! - [`convert`]: the conversion pipeline
//! - [`freshness`]: timestamps, staleness checks and cache sweeps
//! - [`image`]: SVG rasterization
//! - [`logger`]: colored stderr logging
//! - [`utils`]: shared helpers

pub mod logger;

pub mod asset;
pub mod config;
pub mod convert;
pub mod freshness;
pub mod image;
pub mod utils;

pub use asset::{AssetData, AssetKind};
pub use config::{ConfigError, PluginConfig};
pub use convert::{ConvertError, SvgAssetPlugin};
