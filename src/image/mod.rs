//! Image processing utilities.
//!
//! # Modules
//!
//! - [`svg`]: SVG metadata, rasterization and PNG encoding

pub mod svg;
