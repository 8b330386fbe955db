//! Output file naming.
//!
//! ```text
//! {name}-{hash}.png        scale 1
//! {name}-{hash}@{s}x.png   any other scale
//! ```

/// Base name shared by every scale of one converted asset.
pub fn output_name(name: &str, hash: &str) -> String {
    format!("{name}-{hash}")
}

/// Density suffix, empty for the base scale.
#[allow(clippy::float_cmp)]
pub fn scale_suffix(scale: f64) -> String {
    if scale == 1.0 {
        String::new()
    } else {
        format!("@{scale}x")
    }
}

/// PNG file name for one scale.
pub fn output_file_name(output_name: &str, scale: f64) -> String {
    format!("{output_name}{}.png", scale_suffix(scale))
}
