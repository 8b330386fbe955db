//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;
use svg_asset_plugin::config::CONFIG_FILE;

/// Rasterize bundler SVG assets into cached multi-scale PNGs
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// Host config file path (default: metro.config.toml)
    #[arg(short = 'C', long, global = true, default_value = CONFIG_FILE, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Convert asset descriptors (one JSON object or an array)
    #[command(visible_alias = "c")]
    Convert {
        /// Descriptor file. Omit or use `-` to read from stdin.
        #[arg(value_hint = clap::ValueHint::FilePath)]
        input: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Convert a single SVG file
    #[command(visible_alias = "r")]
    Render {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        svg: PathBuf,

        /// URL prefix the asset is served under
        #[arg(short = 'p', long, default_value = "/assets")]
        public_path: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Delete cached PNGs that have not been validated recently
    #[command(visible_alias = "s")]
    Sweep {
        #[arg(value_hint = clap::ValueHint::DirPath)]
        dir: PathBuf,

        /// Keep files validated within this many hours
        #[arg(long, default_value_t = 24)]
        max_age_hours: u64,
    },

    /// Print the resolved configuration
    Config {
        #[command(flatten)]
        output: OutputArgs,
    },
}

/// JSON output options.
#[derive(clap::Args, Debug, Clone)]
pub struct OutputArgs {
    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}
