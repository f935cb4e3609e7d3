use margins_game::{CatalogError, CatalogLoader, PreferenceStore, Preferences, ScenarioCatalog};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::{fs, io};

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid catalog in {path}: {source}")]
    Catalog {
        path: PathBuf,
        #[source]
        source: CatalogError,
    },
    #[error("malformed preferences in {path}: {source}")]
    Preferences {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FileStoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Catalog the tester plays: compiled in, or a JSON file from disk.
#[derive(Debug, Clone, Default)]
pub enum CatalogSource {
    #[default]
    Builtin,
    File(PathBuf),
}

impl CatalogSource {
    pub fn from_arg(path: Option<PathBuf>) -> Self {
        path.map_or(Self::Builtin, Self::File)
    }

    pub fn label(&self) -> String {
        match self {
            Self::Builtin => "builtin".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

impl CatalogLoader for CatalogSource {
    type Error = FileStoreError;

    fn load_catalog(&self) -> Result<ScenarioCatalog, Self::Error> {
        match self {
            Self::Builtin => Ok(ScenarioCatalog::builtin()),
            Self::File(path) => {
                let raw = fs::read_to_string(path).map_err(|err| FileStoreError::io(path, err))?;
                ScenarioCatalog::from_json(&raw).map_err(|source| FileStoreError::Catalog {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

/// Preferences persisted as a small JSON document.
#[derive(Debug, Clone)]
pub struct JsonPreferences {
    path: PathBuf,
}

impl JsonPreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the system temp directory.
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join("margins-preferences.json")
    }
}

impl PreferenceStore for JsonPreferences {
    type Error = FileStoreError;

    fn load(&self) -> Result<Option<Preferences>, Self::Error> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(FileStoreError::io(&self.path, err)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| FileStoreError::Preferences {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, preferences: &Preferences) -> Result<(), Self::Error> {
        let payload =
            serde_json::to_vec_pretty(preferences).map_err(|source| FileStoreError::Preferences {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, payload).map_err(|err| FileStoreError::io(&self.path, err))
    }
}
