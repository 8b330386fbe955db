//! svg-asset-plugin command-line host.

mod cli;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use std::process::ExitCode;
use svg_asset_plugin::{PluginConfig, SvgAssetPlugin, log, logger};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log!("error"; "{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Convert { input, output } => {
            let plugin = load_plugin(cli).await?;
            cli::convert::run_convert(&plugin, input.as_deref(), output).await
        }
        Commands::Render {
            svg,
            public_path,
            output,
        } => {
            let plugin = load_plugin(cli).await?;
            cli::convert::run_render(&plugin, svg, public_path, output).await
        }
        Commands::Sweep { dir, max_age_hours } => cli::sweep::run_sweep(dir, *max_age_hours).await,
        Commands::Config { output } => {
            let config = load_config(cli).await?;
            cli::write_json(&config, output)
        }
    }
}

async fn load_config(cli: &Cli) -> Result<PluginConfig> {
    let path = std::path::absolute(&cli.config)
        .with_context(|| format!("invalid config path {}", cli.config.display()))?;
    Ok(PluginConfig::open(&path).await?)
}

async fn load_plugin(cli: &Cli) -> Result<SvgAssetPlugin> {
    Ok(SvgAssetPlugin::new(load_config(cli).await?))
}
