//! Collaborators that turn a part identifier into an imported scene.
use std::future::Future;

use avatar_asset::{index::PartId, scene::ImportedScene};
use url::Url;

use crate::error::{ImportError, LoadError, LocateError};

pub mod fs;
pub mod memory;

/// Resolves a part identifier to a loadable URL.
pub trait AssetLocator: Send + Sync + 'static {
    fn locate(&self, part_id: &PartId) -> impl Future<Output = Result<Url, LocateError>> + Send;
}

/// Imports the scene stored at a URL.
///
/// Every call must return fresh skeleton instances, even for a URL that was
/// imported before.
pub trait SceneImporter: Send + Sync + 'static {
    fn import(&self, url: &Url) -> impl Future<Output = Result<ImportedScene, ImportError>> + Send;
}

/// Locate then import one part.
pub async fn load_part<L, I>(
    locator: &L,
    importer: &I,
    part_id: &PartId,
) -> Result<ImportedScene, LoadError>
where
    L: AssetLocator,
    I: SceneImporter,
{
    let url = locator.locate(part_id).await?;
    Ok(importer.import(&url).await?)
}
