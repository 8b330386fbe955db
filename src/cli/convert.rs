//! `convert` and `render` commands.

use anyhow::{Context, Result};
use futures_util::future::try_join_all;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use svg_asset_plugin::image::svg::content_hash;
use svg_asset_plugin::{AssetData, AssetKind, SvgAssetPlugin, debug};
use tokio::io::AsyncReadExt;

use super::args::OutputArgs;
use super::output::write_json;

/// Convert descriptors read from `input` (stdin when `None` or `-`).
pub async fn run_convert(plugin: &SvgAssetPlugin, input: Option<&Path>, output: &OutputArgs) -> Result<()> {
    let text = read_input(input).await?;
    let converted = convert_json(plugin, &text).await?;
    write_json(&converted, output)
}

/// Build a descriptor for one SVG file and convert it.
pub async fn run_render(
    plugin: &SvgAssetPlugin,
    svg: &Path,
    public_path: &str,
    output: &OutputArgs,
) -> Result<()> {
    let svg = std::path::absolute(svg).with_context(|| format!("invalid path {}", svg.display()))?;
    let content = tokio::fs::read(&svg)
        .await
        .with_context(|| format!("failed to read {}", svg.display()))?;

    let asset = descriptor_for(&svg, &content, public_path)?;
    debug!("convert"; "descriptor for {}: hash {}", svg.display(), asset.hash);

    let converted = plugin
        .convert(asset)
        .await
        .with_context(|| format!("failed to convert {}", svg.display()))?;
    write_json(&converted, output)
}

async fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Convert one descriptor object or an array of them, keeping the shape.
async fn convert_json(plugin: &SvgAssetPlugin, text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text).context("invalid descriptor JSON")?;

    match value {
        Value::Array(items) => {
            let assets = items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<Vec<AssetData>, _>>()
                .context("invalid asset descriptor")?;
            let converted = try_join_all(assets.into_iter().map(|asset| plugin.convert(asset))).await?;
            Ok(serde_json::to_value(converted)?)
        }
        other => {
            let asset: AssetData = serde_json::from_value(other).context("invalid asset descriptor")?;
            Ok(serde_json::to_value(plugin.convert(asset).await?)?)
        }
    }
}

/// Descriptor for a standalone file, as the bundler would build it.
fn descriptor_for(path: &Path, content: &[u8], public_path: &str) -> Result<AssetData> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("no file name in {}", path.display()))?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    Ok(AssetData {
        files: vec![path.to_path_buf()],
        scales: vec![1.0],
        hash: content_hash(content),
        file_system_location: dir,
        http_server_location: public_path.trim_end_matches('/').to_string(),
        name: name.to_string(),
        kind: AssetKind::from(extension),
        width: None,
        height: None,
        extra: Map::new(),
    })
}
