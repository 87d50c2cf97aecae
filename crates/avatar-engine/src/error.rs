use std::{
    error::Error as StdError,
    fmt::{self, Display, Formatter},
    io,
    sync::Arc,
};

use avatar_asset::index::{PartId, SkeletonId};
use url::Url;

/// Failure to turn a part identifier into a loadable URL.
#[derive(Debug, Clone)]
pub enum LocateError {
    NotFound(PartId),
    Network(Arc<dyn StdError + Send + Sync + 'static>),
}

impl LocateError {
    pub fn network(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Network(Arc::new(error))
    }
}

impl Display for LocateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LocateError::NotFound(part_id) => write!(f, "Part {} not found", part_id),
            LocateError::Network(error) => write!(f, "Failed to locate part: {}", error),
        }
    }
}

impl StdError for LocateError {}

/// Failure to import a scene from a URL.
#[derive(Debug, Clone)]
pub enum ImportError {
    UnsupportedScheme(String),
    BadUrl(Url),
    Io(Arc<io::Error>),
    Format(Arc<dyn StdError + Send + Sync + 'static>),
    Rejected(String),
}

impl ImportError {
    pub fn format(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Format(Arc::new(error))
    }
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::UnsupportedScheme(scheme) => {
                write!(f, "Unsupported URL scheme: {}", scheme)
            }
            ImportError::BadUrl(url) => write!(f, "Bad asset URL: {}", url),
            ImportError::Io(error) => Display::fmt(error, f),
            ImportError::Format(error) => write!(f, "Bad asset: {}", error),
            ImportError::Rejected(reason) => write!(f, "Import rejected: {}", reason),
        }
    }
}

impl StdError for ImportError {}

impl From<io::Error> for ImportError {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

/// Failure of one part load, as reported at the controller boundary.
#[derive(Debug, Clone)]
pub enum LoadError {
    Resolution(LocateError),
    Import(ImportError),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Resolution(error) => Display::fmt(error, f),
            LoadError::Import(error) => Display::fmt(error, f),
        }
    }
}

impl StdError for LoadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            LoadError::Resolution(error) => Some(error),
            LoadError::Import(error) => Some(error),
        }
    }
}

impl From<LocateError> for LoadError {
    fn from(value: LocateError) -> Self {
        Self::Resolution(value)
    }
}

impl From<ImportError> for LoadError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

/// The skeleton an animation instance was bound to has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkeletonDisposed(pub SkeletonId);

impl Display for SkeletonDisposed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Skeleton {} has been disposed", self.0)
    }
}

impl StdError for SkeletonDisposed {}

/// The driver task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerClosed;

impl Display for ControllerClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Avatar controller is closed")
    }
}

impl StdError for ControllerClosed {}
