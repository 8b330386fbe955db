//! SVG asset conversion.
//!
//! Turns one SVG asset descriptor into a multi-scale PNG descriptor,
//! rendering only the outputs the staleness cache reports as outdated.
//!
//! # Flow
//!
//! ```text
//! AssetData (svg)
//!     │
//!     ├─ not svg / filtered out ──► returned unchanged
//!     │
//!     ├─ validate files/scales
//!     │
//!     ├─ mkdir {fileSystemLocation}/{cacheDir}
//!     │
//!     ├─ per configured scale (concurrent):
//!     │      outdated? ──► decode once ──► render ──► write
//!     │      current?  ──► touch
//!     │
//!     └─► AssetData (png, one file per scale)
//! ```
//!
//! # Modules
//!
//! - [`error`]: conversion failures
//! - [`naming`]: output file names
//! - [`source`]: lazily decoded source image

mod error;
pub mod naming;
mod source;

pub use error::{BoxError, ConvertError};

use futures_util::future::try_join_all;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::asset::{AssetData, AssetKind};
use crate::config::{ConfigError, PluginConfig};
use crate::freshness::{StalenessCache, touch};
use crate::image::svg::{Rasterizer, ResvgRasterizer};
use crate::utils::memo::Memo;
use crate::{debug, log};
use naming::{output_file_name, output_name};
use source::{SourceLoader, source_loader};

/// Lazily created rasterization engine, shared by every conversion.
pub type EngineHandle = Memo<Arc<dyn Rasterizer>, ConvertError>;

/// The asset plugin: configuration, staleness cache and engine.
///
/// One instance serves a whole build. Conversions may run concurrently.
#[derive(Debug)]
pub struct SvgAssetPlugin {
    config: Arc<PluginConfig>,
    cache: StalenessCache,
    engine: Arc<EngineHandle>,
}

impl SvgAssetPlugin {
    /// Load configuration from the working directory.
    pub async fn load() -> Result<Self, ConfigError> {
        Ok(Self::new(PluginConfig::load().await?))
    }

    /// Create a plugin backed by resvg.
    pub fn new(config: PluginConfig) -> Self {
        Self::with_rasterizer(config, || {
            Ok(Arc::new(ResvgRasterizer::new()) as Arc<dyn Rasterizer>)
        })
    }

    /// Create a plugin with a custom engine factory.
    ///
    /// The factory runs on a blocking thread the first time an asset
    /// actually needs decoding, and at most once.
    pub fn with_rasterizer<F>(config: PluginConfig, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Rasterizer>, ConvertError> + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        let engine = Memo::new(move || {
            let init = Arc::clone(&factory);
            async move {
                let rasterizer = tokio::task::spawn_blocking(move || (*init)()).await??;
                Ok::<_, ConvertError>(rasterizer)
            }
        });

        Self {
            config: Arc::new(config),
            cache: StalenessCache::new(),
            engine: Arc::new(engine),
        }
    }

    /// Replace the staleness cache (custom sweep timing).
    pub fn with_cache(mut self, cache: StalenessCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn cache(&self) -> &StalenessCache {
        &self.cache
    }

    /// Convert one asset descriptor.
    ///
    /// Non-SVG and filtered-out assets come back unchanged.
    pub async fn convert(&self, asset: AssetData) -> Result<AssetData, ConvertError> {
        if !self.should_convert(&asset) {
            return Ok(asset);
        }
        self.convert_svg(asset).await
    }

    fn should_convert(&self, asset: &AssetData) -> bool {
        if asset.kind != AssetKind::Svg {
            return false;
        }

        let first = asset.first_file().map_or(Path::new(""), PathBuf::as_path);
        if self.config.is_excluded(first) {
            debug!("convert"; "skipping {} (filtered)", first.display());
            return false;
        }

        true
    }

    /// Reported dimensions come from the decoded source, so a run where
    /// every scale is current still reads and parses the SVG once.
    async fn convert_svg(&self, asset: AssetData) -> Result<AssetData, ConvertError> {
        validate_input(&asset)?;

        let input_scale = asset.scales[0];
        let output_dir = asset.file_system_location.join(&self.config.cache_dir);
        let name = output_name(&asset.name, &asset.hash);

        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| ConvertError::CacheDir {
                path: output_dir.clone(),
                source,
            })?;

        let source = source_loader(asset.files[0].clone(), Arc::clone(&self.engine));

        let files = try_join_all(self.config.scales.iter().map(|&scale| {
            let path = output_dir.join(output_file_name(&name, scale));
            self.ensure_png(&source, scale / input_scale, path)
        }))
        .await?;

        let image = source.get().await?;
        let http_server_location = format!("{}/{}", asset.http_server_location, self.config.cache_dir);

        debug!("convert"; "{} -> {} ({} scales)", asset.name, name, files.len());

        Ok(AssetData {
            files,
            scales: self.config.scales.clone(),
            file_system_location: output_dir,
            http_server_location,
            name,
            kind: AssetKind::Png,
            width: Some(image.metadata.width),
            height: Some(image.metadata.height),
            ..asset
        })
    }

    /// Make sure `path` holds a current rendering at `scale` times the source density.
    async fn ensure_png(
        &self,
        source: &SourceLoader,
        scale: f64,
        path: PathBuf,
    ) -> Result<PathBuf, ConvertError> {
        if !self.cache.is_outdated(&path, self.config.watermark).await {
            touch(&path).await;
            return Ok(path);
        }

        let image = source.get().await?;
        let rasterizer = Arc::clone(self.engine.get().await?);
        let data = Arc::clone(&image.data);
        #[allow(clippy::cast_possible_truncation)]
        let density = image.density * scale as f32;
        let options = self.config.output;

        let png = tokio::task::spawn_blocking(move || rasterizer.render_png(&data, density, &options))
            .await?
            .map_err(|e| ConvertError::Render {
                path: path.clone(),
                source: e.into(),
            })?;

        replace_file(&path, &temp_path(&path), &png)
            .await
            .map_err(|source| ConvertError::Write {
                path: path.clone(),
                source,
            })?;

        log!("convert"; "{}", path.display());
        Ok(path)
    }
}

/// Sibling scratch name for `path`, unique per write. Never ends in `.png`.
fn temp_path(path: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}-{n}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Write `bytes` to `temp` and rename it over `path`.
///
/// `path` either keeps its previous content or holds all of `bytes`.
async fn replace_file(path: &Path, temp: &Path, bytes: &[u8]) -> io::Result<()> {
    let written = match tokio::fs::write(temp, bytes).await {
        Ok(()) => tokio::fs::rename(temp, path).await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(temp).await {
            debug!("convert"; "cannot remove {}: {}", temp.display(), e);
        }
    }
    written
}

/// Reject descriptors the plugin can't handle: exactly one file at scale 1.
#[allow(clippy::float_cmp)]
fn validate_input(asset: &AssetData) -> Result<(), ConvertError> {
    if asset.scales.len() != asset.files.len() {
        return Err(ConvertError::MismatchedScales);
    }
    match asset.files.len() {
        0 => Err(ConvertError::NoFiles),
        1 if asset.scales[0] != 1.0 => Err(ConvertError::ScaledInput),
        1 => Ok(()),
        _ => Err(ConvertError::MultipleScales),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterMode, GlobMatcher, PathFilter, PngOptions};
    use crate::freshness::mtime::{last_modified, now_millis, set_modified};
    use crate::image::svg::{RED_200X100, SvgMetadata};
    use serde_json::Map;
    use std::fs;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    /// resvg with render/decode counters.
    struct Counting {
        inner: ResvgRasterizer,
        decodes: Arc<AtomicUsize>,
        renders: Arc<AtomicUsize>,
    }

    impl Rasterizer for Counting {
        fn metadata(&self, svg: &[u8]) -> anyhow::Result<SvgMetadata> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            self.inner.metadata(svg)
        }

        fn render_png(&self, svg: &[u8], density: f32, options: &PngOptions) -> anyhow::Result<Vec<u8>> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            self.inner.render_png(svg, density, options)
        }
    }

    struct NoDensity;

    impl Rasterizer for NoDensity {
        fn metadata(&self, _svg: &[u8]) -> anyhow::Result<SvgMetadata> {
            Ok(SvgMetadata {
                width: 10,
                height: 10,
                density: None,
            })
        }

        fn render_png(&self, _: &[u8], _: f32, _: &PngOptions) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("unreachable")
        }
    }

    struct Broken;

    impl Rasterizer for Broken {
        fn metadata(&self, _svg: &[u8]) -> anyhow::Result<SvgMetadata> {
            Ok(SvgMetadata {
                width: 10,
                height: 10,
                density: Some(96.0),
            })
        }

        fn render_png(&self, _: &[u8], _: f32, _: &PngOptions) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("out of memory")
        }
    }

    struct Fixture {
        dir: TempDir,
        decodes: Arc<AtomicUsize>,
        renders: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("red.svg"), RED_200X100).unwrap();
            Self {
                dir,
                decodes: Arc::new(AtomicUsize::new(0)),
                renders: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn config(&self) -> PluginConfig {
            PluginConfig {
                root: self.dir.path().to_path_buf(),
                ..PluginConfig::default()
            }
        }

        fn plugin(&self, config: PluginConfig) -> SvgAssetPlugin {
            let decodes = Arc::clone(&self.decodes);
            let renders = Arc::clone(&self.renders);
            SvgAssetPlugin::with_rasterizer(config, move || {
                Ok(Arc::new(Counting {
                    inner: ResvgRasterizer::new(),
                    decodes: Arc::clone(&decodes),
                    renders: Arc::clone(&renders),
                }) as Arc<dyn Rasterizer>)
            })
        }

        fn asset(&self) -> AssetData {
            AssetData {
                files: vec![self.dir.path().join("red.svg")],
                scales: vec![1.0],
                hash: "abc123".to_string(),
                file_system_location: self.dir.path().to_path_buf(),
                http_server_location: "/assets/images".to_string(),
                name: "red".to_string(),
                kind: AssetKind::Svg,
                width: None,
                height: None,
                extra: Map::new(),
            }
        }

        fn cache_dir(&self) -> PathBuf {
            self.dir.path().join(".png-cache")
        }

        fn renders(&self) -> usize {
            self.renders.load(Ordering::SeqCst)
        }

        fn decodes(&self) -> usize {
            self.decodes.load(Ordering::SeqCst)
        }
    }

    fn decode(path: &Path) -> image::RgbaImage {
        image::open(path).unwrap().to_rgba8()
    }

    #[tokio::test]
    async fn test_converts_to_all_scales() {
        let fx = Fixture::new();
        let plugin = fx.plugin(fx.config());

        let out = plugin.convert(fx.asset()).await.unwrap();
        let cache = fx.cache_dir();

        assert_eq!(out.kind, AssetKind::Png);
        assert_eq!(out.name, "red-abc123");
        assert_eq!(out.file_system_location, cache);
        assert_eq!(out.http_server_location, "/assets/images/.png-cache");
        assert_eq!(out.scales, [1.0, 2.0, 3.0]);
        assert_eq!(
            out.files,
            [
                cache.join("red-abc123.png"),
                cache.join("red-abc123@2x.png"),
                cache.join("red-abc123@3x.png"),
            ]
        );
        assert_eq!((out.width, out.height), (Some(200), Some(100)));
        assert_eq!(out.hash, "abc123");

        let expected = [(200, 100), (400, 200), (600, 300)];
        for (file, (w, h)) in out.files.iter().zip(expected) {
            let img = decode(file);
            assert_eq!(img.dimensions(), (w, h));
            assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
            assert_eq!(img.get_pixel(w - 1, h - 1).0, [255, 0, 0, 255]);
        }

        assert_eq!(fx.renders(), 3);
        assert_eq!(fx.decodes(), 1);
    }

    #[tokio::test]
    async fn test_second_run_renders_nothing() {
        let fx = Fixture::new();
        let plugin = fx.plugin(fx.config());

        let first = plugin.convert(fx.asset()).await.unwrap();
        let bytes: Vec<_> = first.files.iter().map(|f| fs::read(f).unwrap()).collect();

        let second = plugin.convert(fx.asset()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.renders(), 3);
        // dimensions still come from a fresh decode
        assert_eq!(fx.decodes(), 2);
        for (file, before) in second.files.iter().zip(bytes) {
            assert_eq!(fs::read(file).unwrap(), before);
        }
    }

    #[tokio::test]
    async fn test_current_outputs_are_touched() {
        let fx = Fixture::new();
        let plugin = fx.plugin(fx.config());

        let out = plugin.convert(fx.asset()).await.unwrap();
        let old = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        for file in &out.files {
            set_modified(file, old).await.unwrap();
        }

        let before = now_millis();
        plugin.convert(fx.asset()).await.unwrap();

        assert_eq!(fx.renders(), 3);
        for file in &out.files {
            assert!(last_modified(file).await + 1000 >= before);
        }
    }

    #[tokio::test]
    async fn test_watermark_forces_regeneration() {
        let fx = Fixture::new();
        let out = fx.plugin(fx.config()).convert(fx.asset()).await.unwrap();

        let old = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        for file in &out.files {
            set_modified(file, old).await.unwrap();
        }

        let config = PluginConfig {
            watermark: now_millis(),
            ..fx.config()
        };
        fx.plugin(config).convert(fx.asset()).await.unwrap();

        assert_eq!(fx.renders(), 6);
    }

    #[tokio::test]
    async fn test_missing_scale_is_repaired() {
        let fx = Fixture::new();
        let plugin = fx.plugin(fx.config());

        let out = plugin.convert(fx.asset()).await.unwrap();
        fs::remove_file(&out.files[1]).unwrap();

        plugin.convert(fx.asset()).await.unwrap();

        assert_eq!(fx.renders(), 4);
        assert_eq!(decode(&out.files[1]).dimensions(), (400, 200));
    }

    #[tokio::test]
    async fn test_no_scratch_files_left_behind() {
        let fx = Fixture::new();
        fx.plugin(fx.config()).convert(fx.asset()).await.unwrap();

        let mut names: Vec<_> = fs::read_dir(fx.cache_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        assert_eq!(names, ["red-abc123.png", "red-abc123@2x.png", "red-abc123@3x.png"]);
    }

    #[tokio::test]
    async fn test_replace_file_overwrites_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"a much longer previous rendering").unwrap();

        replace_file(&path, &temp_path(&path), b"new").await.unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"complete").unwrap();
        // a directory in the way makes the scratch write fail
        let temp = dir.path().join("a.png.tmp");
        fs::create_dir(&temp).unwrap();

        assert!(replace_file(&path, &temp, b"partial").await.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"complete");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_output_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        let temp = dir.path().join("a.png.tmp");
        fs::create_dir(&temp).unwrap();

        assert!(replace_file(&path, &temp, b"partial").await.is_err());
        assert!(!path.exists());
        assert!(StalenessCache::new().is_outdated(&path, 0).await);
    }

    #[test]
    fn test_temp_path_is_unique_sibling() {
        let path = Path::new("/cache/red-abc123@2x.png");
        let a = temp_path(path);
        let b = temp_path(path);

        assert_ne!(a, b);
        assert_eq!(a.parent(), path.parent());
        assert_eq!(a.extension().unwrap(), "tmp");
    }

    #[tokio::test]
    async fn test_output_order_follows_config() {
        let fx = Fixture::new();
        let config = PluginConfig {
            scales: vec![3.0, 1.0, 1.5],
            ..fx.config()
        };

        let out = fx.plugin(config).convert(fx.asset()).await.unwrap();
        let cache = fx.cache_dir();

        assert_eq!(out.scales, [3.0, 1.0, 1.5]);
        assert_eq!(
            out.files,
            [
                cache.join("red-abc123@3x.png"),
                cache.join("red-abc123.png"),
                cache.join("red-abc123@1.5x.png"),
            ]
        );
        assert_eq!(decode(&out.files[2]).dimensions(), (300, 150));
    }

    #[tokio::test]
    async fn test_non_svg_passes_through() {
        let fx = Fixture::new();
        let plugin = fx.plugin(fx.config());
        let asset = AssetData {
            kind: AssetKind::Other("jpg".to_string()),
            files: vec![],
            scales: vec![2.0, 3.0],
            ..fx.asset()
        };

        let out = plugin.convert(asset.clone()).await.unwrap();

        assert_eq!(out, asset);
        assert!(!fx.cache_dir().exists());
        assert_eq!(fx.decodes(), 0);
    }

    #[tokio::test]
    async fn test_filtered_svg_passes_through() {
        let fx = Fixture::new();
        let matcher = GlobMatcher::new(&["*.svg"]).unwrap();
        let config = PluginConfig {
            filter: Some(PathFilter::new(FilterMode::Ignore, Arc::new(matcher))),
            ..fx.config()
        };
        let plugin = fx.plugin(config);

        let out = plugin.convert(fx.asset()).await.unwrap();

        assert_eq!(out, fx.asset());
        assert!(!fx.cache_dir().exists());
    }

    #[tokio::test]
    async fn test_rejects_invalid_descriptors() {
        let fx = Fixture::new();
        let plugin = fx.plugin(fx.config());
        let svg = fx.dir.path().join("red.svg");

        let cases = [
            (vec![], vec![], "No files passed."),
            (vec![svg.clone()], vec![1.0, 2.0], "Passed scales doesn't match passed files."),
            (
                vec![svg.clone(), svg.clone()],
                vec![1.0, 2.0],
                "Multiple SVG scales not supported.",
            ),
            (vec![svg.clone()], vec![0.5], "Scaled SVGs not supported."),
        ];

        for (files, scales, message) in cases {
            let asset = AssetData {
                files,
                scales,
                ..fx.asset()
            };
            let err = plugin.convert(asset).await.unwrap_err();
            assert_eq!(err.to_string(), message);
        }

        assert_eq!(fx.decodes(), 0);
        assert!(!fx.cache_dir().exists());
    }

    #[tokio::test]
    async fn test_missing_source_propagates_io_error() {
        let fx = Fixture::new();
        let plugin = fx.plugin(fx.config());
        let asset = AssetData {
            files: vec![fx.dir.path().join("gone.svg")],
            ..fx.asset()
        };

        let err = plugin.convert(asset).await.unwrap_err();

        assert!(matches!(err.unshared(), ConvertError::Io(e) if e.kind() == io::ErrorKind::NotFound));
        assert_eq!(fx.renders(), 0);
    }

    #[tokio::test]
    async fn test_missing_density() {
        let fx = Fixture::new();
        let plugin = SvgAssetPlugin::with_rasterizer(fx.config(), || {
            Ok(Arc::new(NoDensity) as Arc<dyn Rasterizer>)
        });

        let err = plugin.convert(fx.asset()).await.unwrap_err();

        assert_eq!(err.to_string(), "Input image missing density information");
    }

    #[tokio::test]
    async fn test_render_failure() {
        let fx = Fixture::new();
        let plugin = SvgAssetPlugin::with_rasterizer(fx.config(), || {
            Ok(Arc::new(Broken) as Arc<dyn Rasterizer>)
        });

        let err = plugin.convert(fx.asset()).await.unwrap_err();

        assert!(matches!(err, ConvertError::Render { .. }));
    }

    #[tokio::test]
    async fn test_engine_is_created_once() {
        let fx = Fixture::new();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let plugin = SvgAssetPlugin::with_rasterizer(fx.config(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ResvgRasterizer::new()) as Arc<dyn Rasterizer>)
        });

        let other = AssetData {
            hash: "def456".to_string(),
            ..fx.asset()
        };
        let (a, b) = tokio::join!(plugin.convert(fx.asset()), plugin.convert(other));
        a.unwrap();
        b.unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_is_shared() {
        let fx = Fixture::new();
        let plugin = SvgAssetPlugin::with_rasterizer(fx.config(), || {
            Err(ConvertError::Io(io::Error::other("no fonts")))
        });

        let first = plugin.convert(fx.asset()).await.unwrap_err();
        let second = plugin.convert(fx.asset()).await.unwrap_err();

        assert_eq!(first.to_string(), "no fonts");
        assert_eq!(second.to_string(), "no fonts");
    }
}
