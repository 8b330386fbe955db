use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use svg_asset_plugin::log;

use super::args::OutputArgs;

/// Print `value` as JSON to stdout or the requested file.
pub fn write_json<T: Serialize>(value: &T, args: &OutputArgs) -> Result<()> {
    let formatted = if args.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };

    if let Some(ref path) = args.output {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writeln!(file, "{formatted}")?;
        log!("output"; "wrote {}", path.display());
    } else {
        println!("{formatted}");
    }

    Ok(())
}
