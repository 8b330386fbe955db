//! Command-line interface module.

mod args;
pub mod convert;
mod output;
pub mod sweep;

pub use args::{Cli, Commands};
pub use output::write_json;
