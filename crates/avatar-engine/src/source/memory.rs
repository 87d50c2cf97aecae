use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use avatar_asset::{index::PartId, scene::ImportedScene};
use url::Url;

use crate::error::{ImportError, LocateError};

use super::{AssetLocator, SceneImporter};

#[derive(Debug)]
enum Entry {
    Scene(ImportedScene),
    Failure,
}

#[derive(Debug)]
struct Stored {
    entry: Entry,
    latency: Duration,
}

#[derive(Debug, Default)]
struct Store {
    parts: HashMap<PartId, Stored>,
    imports: Vec<PartId>,
}

/// In-memory part store acting as both locator and importer.
///
/// Each part has its own import latency so that tests and demos can control
/// the order in which concurrent loads complete.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    store: Arc<Mutex<Store>>,
}

impl MemoryAssets {
    const HOST: &'static str = "assets";

    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, part_id: impl Into<PartId>, scene: ImportedScene, latency: Duration) {
        self.store().parts.insert(
            part_id.into(),
            Stored {
                entry: Entry::Scene(scene),
                latency,
            },
        );
    }

    /// Register a part that can be located but fails to import.
    pub fn insert_broken(&self, part_id: impl Into<PartId>, latency: Duration) {
        self.store().parts.insert(
            part_id.into(),
            Stored {
                entry: Entry::Failure,
                latency,
            },
        );
    }

    pub fn set_latency(&self, part_id: &PartId, latency: Duration) {
        if let Some(stored) = self.store().parts.get_mut(part_id) {
            stored.latency = latency;
        }
    }

    /// Every import started so far, in order.
    pub fn imports(&self) -> Vec<PartId> {
        self.store().imports.clone()
    }

    pub fn import_count(&self, part_id: &PartId) -> usize {
        self.store()
            .imports
            .iter()
            .filter(|imported| *imported == part_id)
            .count()
    }

    fn part_id(url: &Url) -> Result<PartId, ImportError> {
        if url.scheme() != "memory" {
            return Err(ImportError::UnsupportedScheme(url.scheme().to_string()));
        }
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(PartId::from)
            .ok_or_else(|| ImportError::BadUrl(url.clone()))
    }
}

impl AssetLocator for MemoryAssets {
    async fn locate(&self, part_id: &PartId) -> Result<Url, LocateError> {
        if !self.store().parts.contains_key(part_id) {
            return Err(LocateError::NotFound(part_id.clone()));
        }
        let mut url = Url::parse(&format!("memory://{}/", Self::HOST))
            .map_err(LocateError::network)?;
        url.path_segments_mut()
            .map_err(|_| LocateError::NotFound(part_id.clone()))?
            .pop_if_empty()
            .push(part_id.as_str());
        Ok(url)
    }
}

impl SceneImporter for MemoryAssets {
    async fn import(&self, url: &Url) -> Result<ImportedScene, ImportError> {
        let part_id = Self::part_id(url)?;
        let latency = {
            let mut store = self.store();
            store.imports.push(part_id.clone());
            store
                .parts
                .get(&part_id)
                .map(|stored| stored.latency)
                .ok_or_else(|| ImportError::BadUrl(url.clone()))?
        };
        tokio::time::sleep(latency).await;

        let store = self.store();
        match store.parts.get(&part_id).map(|stored| &stored.entry) {
            Some(Entry::Scene(scene)) => Ok(scene.instantiate()),
            Some(Entry::Failure) => Err(ImportError::Rejected(format!(
                "{} is not a valid scene",
                part_id
            ))),
            None => Err(ImportError::BadUrl(url.clone())),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use avatar_asset::{index::PartId, scene::ImportedScene, skeleton::Skeleton};

    use crate::{
        error::{ImportError, LocateError},
        source::{AssetLocator, SceneImporter},
    };

    use super::MemoryAssets;

    #[tokio::test(start_paused = true)]
    async fn test_import_instantiates_skeleton() {
        let assets = MemoryAssets::new();
        let scene = ImportedScene {
            skeleton: Some(Skeleton::chain(None, ["Hips"])),
            ..Default::default()
        };
        let original = scene.skeleton.as_ref().unwrap().id();
        assets.insert("B1", scene, Duration::from_millis(10));

        let url = assets.locate(&PartId::from("B1")).await.unwrap();
        assert_eq!(url.as_str(), "memory://assets/B1");
        let first = assets.import(&url).await.unwrap().skeleton.unwrap();
        let second = assets.import(&url).await.unwrap().skeleton.unwrap();
        assert_ne!(first.id(), original);
        assert_ne!(first.id(), second.id());
        assert_eq!(assets.import_count(&PartId::from("B1")), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures() {
        let assets = MemoryAssets::new();
        assets.insert_broken("H1", Duration::ZERO);
        assert!(matches!(
            assets.locate(&PartId::from("H9")).await,
            Err(LocateError::NotFound(_))
        ));
        let url = assets.locate(&PartId::from("H1")).await.unwrap();
        assert!(matches!(
            assets.import(&url).await,
            Err(ImportError::Rejected(_))
        ));
    }
}
