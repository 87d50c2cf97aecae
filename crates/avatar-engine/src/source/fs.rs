use std::path::{Path, PathBuf};

use avatar_asset::index::PartId;
#[cfg(feature = "gltf")]
use avatar_asset::scene::ImportedScene;
use log::{debug, trace};
use url::Url;

#[cfg(any(feature = "gltf", test))]
use crate::error::ImportError;
use crate::error::LocateError;

#[cfg(feature = "gltf")]
use super::SceneImporter;
use super::AssetLocator;

/// Looks parts up as `<root>/<part id>.<extension>`.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec![
                String::from("glb"),
                String::from("gltf"),
                String::from("vrm"),
            ],
        }
    }

    pub fn with_extensions<S: Into<String>>(mut self, extensions: impl IntoIterator<Item = S>) -> Self {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_plain_name(part_id: &PartId) -> bool {
        let id = part_id.as_str();
        !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
    }
}

impl AssetLocator for DirectoryLocator {
    async fn locate(&self, part_id: &PartId) -> Result<Url, LocateError> {
        if !Self::is_plain_name(part_id) {
            debug!("Refuse to locate part with path-like id {:?}", part_id.as_str());
            return Err(LocateError::NotFound(part_id.clone()));
        }
        for extension in &self.extensions {
            let path = self.root.join(format!("{}.{}", part_id, extension));
            trace!("Probe {}", path.display());
            if !tokio::fs::try_exists(&path)
                .await
                .map_err(LocateError::network)?
            {
                continue;
            }
            let path = tokio::fs::canonicalize(&path)
                .await
                .map_err(LocateError::network)?;
            return Url::from_file_path(&path)
                .map_err(|_| LocateError::NotFound(part_id.clone()));
        }
        Err(LocateError::NotFound(part_id.clone()))
    }
}

#[cfg(any(feature = "gltf", test))]
fn file_path(url: &Url) -> Result<PathBuf, ImportError> {
    if url.scheme() != "file" {
        return Err(ImportError::UnsupportedScheme(url.scheme().to_string()));
    }
    url.to_file_path()
        .map_err(|_| ImportError::BadUrl(url.clone()))
}

/// Imports glTF and GLB files from `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct GltfImporter;

#[cfg(feature = "gltf")]
impl SceneImporter for GltfImporter {
    async fn import(&self, url: &Url) -> Result<ImportedScene, ImportError> {
        let path = file_path(url)?;
        let buffer = tokio::fs::read(&path).await?;
        debug!("Read {} bytes from {}", buffer.len(), path.display());
        tokio::task::spawn_blocking(move || {
            avatar_asset::loader::gltf::load_gltf(&buffer, path.parent())
        })
        .await
        .map_err(ImportError::format)?
        .map_err(ImportError::format)
    }
}
