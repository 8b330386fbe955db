//! Lazily decoded source SVG, shared by all scales of one asset.

use std::path::PathBuf;
use std::sync::Arc;

use super::{ConvertError, EngineHandle};
use crate::image::svg::SvgMetadata;
use crate::utils::memo::Memo;

/// Source bytes plus the metadata needed to size every output.
#[derive(Debug)]
pub struct SourceImage {
    pub data: Arc<[u8]>,
    pub metadata: SvgMetadata,
    /// Density the metadata dimensions are expressed at.
    pub density: f32,
}

pub type SourceLoader = Memo<SourceImage, ConvertError>;

/// Create a loader that reads and decodes `path` on first use.
pub fn source_loader(path: PathBuf, engine: Arc<EngineHandle>) -> SourceLoader {
    Memo::new(move || {
        let path = path.clone();
        let engine = Arc::clone(&engine);
        async move {
            let (data, rasterizer) = tokio::join!(tokio::fs::read(&path), engine.get());
            let data: Arc<[u8]> = data?.into();
            let rasterizer = Arc::clone(rasterizer?);

            let input = Arc::clone(&data);
            let metadata = tokio::task::spawn_blocking(move || rasterizer.metadata(&input))
                .await?
                .map_err(|e| ConvertError::Decode {
                    path: path.clone(),
                    source: e.into(),
                })?;

            let density = metadata.density.ok_or(ConvertError::MissingDensity)?;

            crate::debug!(
                "convert";
                "decoded {} ({}x{} at {} dpi)",
                path.display(), metadata.width, metadata.height, density
            );

            Ok::<_, ConvertError>(SourceImage {
                data,
                metadata,
                density,
            })
        }
    })
}
