//! Plugin configuration from the host build config.
//!
//! Options are read from `metro.config.toml` in the working directory:
//!
//! ```toml
//! [transformer.svgAssetPlugin]
//! cacheDir = ".png-cache"           # output subdirectory next to each SVG
//! scales = [1, 2, 3]                # generated pixel densities, must include 1
//! ignorePatterns = ["raw/"]         # or includePatterns, ignoreRegex, includeRegex
//! # patterns and regexes see paths relative to the project root,
//! # e.g. ignoreRegex = "^assets/raw/" rather than "^/app/assets/raw/"
//!
//! [transformer.svgAssetPlugin.output]
//! compressionLevel = 9
//! ```
//!
//! # Module Structure
//!
//! | Module   | Purpose                                      |
//! |----------|----------------------------------------------|
//! | `error`  | `ConfigError`, collected diagnostics         |
//! | `filter` | Ignore/include path predicates               |
//! | `output` | PNG encoder options                          |
//!
//! A missing or unparsable host config resolves to the defaults. Invalid
//! plugin options are an error at load time, before any asset is
//! converted.
//!
//! # Watermark
//!
//! Every generated file older than [`PluginConfig::watermark`] is
//! regenerated. The watermark is the later of the host config's mtime and
//! the plugin executable's mtime, so editing the config or upgrading the
//! plugin invalidates all cached PNGs.

mod error;
pub mod filter;
mod output;

pub use error::{ConfigDiagnostic, ConfigDiagnostics, ConfigError, FieldPath};
pub use filter::{FilterMode, GlobMatcher, PathFilter, PathMatcher, RegexMatcher};
pub use output::PngOptions;

use crate::freshness::{MISSING, last_modified};
use crate::log;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Host config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "metro.config.toml";

/// Table holding the plugin options inside the host config.
const SECTION: &str = "transformer.svgAssetPlugin";

// ============================================================================
// raw options
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HostConfig {
    transformer: TransformerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TransformerSection {
    #[serde(rename = "svgAssetPlugin")]
    svg_asset_plugin: PluginOptions,
}

/// Options as written under `[transformer.svgAssetPlugin]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginOptions {
    /// Output subdirectory name, created next to each converted SVG.
    pub cache_dir: String,

    /// Scales to generate, in output order.
    pub scales: Vec<f64>,

    /// PNG encoder options.
    pub output: PngOptions,

    pub ignore_patterns: Vec<String>,
    pub ignore_regex: Option<String>,
    pub include_patterns: Vec<String>,
    pub include_regex: Option<String>,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            cache_dir: ".png-cache".to_string(),
            scales: vec![1.0, 2.0, 3.0],
            output: PngOptions::default(),
            ignore_patterns: Vec::new(),
            ignore_regex: None,
            include_patterns: Vec::new(),
            include_regex: None,
        }
    }
}

impl PluginOptions {
    const FIELD_CACHE_DIR: FieldPath = FieldPath("transformer.svgAssetPlugin.cacheDir");
    const FIELD_SCALES: FieldPath = FieldPath("transformer.svgAssetPlugin.scales");
    const FIELD_IGNORE: FieldPath = FieldPath("transformer.svgAssetPlugin.ignorePatterns");
    const FIELD_INCLUDE: FieldPath = FieldPath("transformer.svgAssetPlugin.includePatterns");

    /// Parse host config content, collecting unknown plugin fields.
    pub fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), toml::de::Error> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let host: HostConfig = serde_ignored::deserialize(deserializer, |path| {
            let path = path.to_string();
            // Other host settings are none of our business
            if path.starts_with(SECTION) {
                ignored.push(path);
            }
        })?;
        Ok((host.transformer.svg_asset_plugin, ignored))
    }

    /// Validate all options, collecting every problem.
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        self.validate_cache_dir(diag);
        self.validate_scales(diag);
        self.output.validate(diag);
    }

    fn validate_cache_dir(&self, diag: &mut ConfigDiagnostics) {
        let dir = Path::new(&self.cache_dir);
        if self.cache_dir.trim().is_empty() {
            diag.error(Self::FIELD_CACHE_DIR, "cache directory name is empty");
        } else if dir.is_absolute() || dir.components().any(|c| c == Component::ParentDir) {
            diag.error_with_hint(
                Self::FIELD_CACHE_DIR,
                format!("`{}` escapes the asset directory", self.cache_dir),
                "use a relative name such as \".png-cache\"",
            );
        }
    }

    fn validate_scales(&self, diag: &mut ConfigDiagnostics) {
        if self.scales.is_empty() {
            diag.error(Self::FIELD_SCALES, "at least one scale is required");
            return;
        }

        if let Some(bad) = self.scales.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            diag.error(Self::FIELD_SCALES, format!("scale {bad} is not a positive number"));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.scales.iter().find(|s| !seen.insert(s.to_bits())) {
            diag.error(Self::FIELD_SCALES, format!("scale {dup} is listed twice"));
        }

        if !self.scales.contains(&1.0) {
            diag.error_with_hint(
                Self::FIELD_SCALES,
                "scales must include 1",
                "the 1x image is the base asset the others are derived from",
            );
        }
    }

    fn has_ignore(&self) -> bool {
        !self.ignore_patterns.is_empty() || self.ignore_regex.is_some()
    }

    fn has_include(&self) -> bool {
        !self.include_patterns.is_empty() || self.include_regex.is_some()
    }

    /// Build the configured path filter, reporting conflicts and bad patterns.
    pub fn build_filter(&self, diag: &mut ConfigDiagnostics) -> Option<PathFilter> {
        if self.has_ignore() && self.has_include() {
            diag.error_with_hint(
                Self::FIELD_INCLUDE,
                "ignore and include filters are mutually exclusive",
                "keep either the ignore* or the include* options",
            );
            return None;
        }

        let (mode, field, patterns, regex) = if self.has_ignore() {
            (
                FilterMode::Ignore,
                Self::FIELD_IGNORE,
                &self.ignore_patterns,
                self.ignore_regex.as_deref(),
            )
        } else if self.has_include() {
            (
                FilterMode::Include,
                Self::FIELD_INCLUDE,
                &self.include_patterns,
                self.include_regex.as_deref(),
            )
        } else {
            return None;
        };

        let matcher: Arc<dyn PathMatcher> = match (patterns.is_empty(), regex) {
            (false, Some(_)) => {
                diag.error_with_hint(
                    field,
                    format!("both patterns and a regex are set for the {mode} filter"),
                    "glob patterns are preferred, drop the regex",
                );
                return None;
            }
            (false, None) => match GlobMatcher::new(patterns) {
                Ok(m) => Arc::new(m),
                Err(e) => {
                    diag.error(field, format!("invalid glob pattern: {e}"));
                    return None;
                }
            },
            (true, Some(regex)) => match RegexMatcher::new(regex) {
                Ok(m) => Arc::new(m),
                Err(e) => {
                    diag.error(field, format!("invalid regex: {e}"));
                    return None;
                }
            },
            (true, None) => return None,
        };

        Some(PathFilter::new(mode, matcher))
    }
}

// ============================================================================
// resolved configuration
// ============================================================================

/// Resolved, validated plugin configuration. Immutable once loaded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Project root: the directory holding the host config.
    pub root: PathBuf,

    /// Host config path (may not exist).
    pub config_path: PathBuf,

    pub cache_dir: String,

    pub scales: Vec<f64>,

    pub output: PngOptions,

    pub filter: Option<PathFilter>,

    /// Generated files older than this (ms since epoch) are regenerated.
    pub watermark: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        let options = PluginOptions::default();
        Self {
            root: PathBuf::new(),
            config_path: PathBuf::from(CONFIG_FILE),
            cache_dir: options.cache_dir,
            scales: options.scales,
            output: options.output,
            filter: None,
            watermark: MISSING,
        }
    }
}

impl PluginConfig {
    /// Resolve configuration from the current working directory.
    pub async fn load() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(PathBuf::from("."), e))?;
        Self::open(&cwd.join(CONFIG_FILE)).await
    }

    /// Resolve configuration from `config_path`, stamped by the running executable.
    pub async fn open(config_path: &Path) -> Result<Self, ConfigError> {
        let stamp = plugin_stamp_path();
        Self::load_from(config_path, stamp.as_deref()).await
    }

    /// Resolve configuration from an explicit host config path.
    ///
    /// `stamp` is the file whose mtime stands for the plugin's own
    /// settings; `None` leaves only the host config in the watermark.
    pub async fn load_from(config_path: &Path, stamp: Option<&Path>) -> Result<Self, ConfigError> {
        let (config_mtime, stamp_mtime) = tokio::join!(last_modified(config_path), async {
            match stamp {
                Some(path) => last_modified(path).await,
                None => MISSING,
            }
        });

        let options = read_options(config_path).await;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self::resolve(options, root, config_path.to_path_buf(), config_mtime.max(stamp_mtime))
    }

    /// Validate options and assemble the configuration.
    pub fn resolve(
        options: PluginOptions,
        root: PathBuf,
        config_path: PathBuf,
        watermark: u64,
    ) -> Result<Self, ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        options.validate(&mut diag);
        let filter = options.build_filter(&mut diag);
        diag.into_result().map_err(ConfigError::Diagnostics)?;

        Ok(Self {
            root,
            config_path,
            cache_dir: options.cache_dir,
            scales: options.scales,
            output: options.output,
            filter,
            watermark,
        })
    }

    /// Check whether the filter leaves `path` unconverted.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.filter
            .as_ref()
            .is_some_and(|filter| filter.excludes(path, &self.root))
    }
}

/// Read plugin options, falling back to defaults on any failure.
async fn read_options(path: &Path) -> PluginOptions {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            crate::debug!("config"; "{} not found, using defaults", path.display());
            return PluginOptions::default();
        }
        Err(e) => {
            log!("warning"; "cannot read {}: {}, using defaults", path.display(), e);
            return PluginOptions::default();
        }
    };

    match PluginOptions::parse_with_ignored(&content) {
        Ok((options, ignored)) => {
            if !ignored.is_empty() {
                print_unknown_fields_warning(&ignored, path);
            }
            options
        }
        Err(e) => {
            log!("warning"; "cannot parse {}: {}, using defaults", path.display(), e);
            PluginOptions::default()
        }
    }
}

/// Print warning about unknown plugin fields.
fn print_unknown_fields_warning(fields: &[String], path: &Path) {
    let display_path = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy());
    log!("warning"; "unknown fields in {}, ignoring:", display_path);
    for field in fields {
        eprintln!("- {field}");
    }
}

/// File standing for the plugin's own settings: the running executable.
fn plugin_stamp_path() -> Option<PathBuf> {
    std::env::current_exe().ok()
}

// ============================================================================
// tests
// ============================================================================
