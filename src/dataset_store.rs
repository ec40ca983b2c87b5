//! Dataset providers.
//!
//! A dataset provider maps dataset identifiers to [GriddedDataset]s. Datasets are shared
//! read-only between requests.

use crate::dataset::GriddedDataset;
use crate::error::RegionMeanError;
use crate::metrics::DATASET_CACHE_MISSES;

use flate2::read::GzDecoder;
use hashbrown::HashMap;
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{event, Level};

/// Dataset provider trait.
///
/// Defines the interface for looking up datasets by identifier.
pub trait DatasetProvider {
    /// Get a dataset.
    ///
    /// Returns `None` if there is no dataset with the identifier.
    ///
    /// # Arguments
    ///
    /// * `dataset_id`: Dataset identifier
    fn get_dataset(
        &self,
        dataset_id: &str,
    ) -> impl Future<Output = Result<Option<Arc<GriddedDataset>>, RegionMeanError>> + Send;
}

/// Check that a dataset identifier is safe to use as a file name.
///
/// Identifiers may contain ASCII letters, digits, `_`, `.` and `-`, and may not start with `.`.
pub fn validate_dataset_id(dataset_id: &str) -> Result<(), RegionMeanError> {
    let valid = !dataset_id.is_empty()
        && !dataset_id.starts_with('.')
        && dataset_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(RegionMeanError::InvalidDatasetId {
            dataset_id: dataset_id.to_string(),
        })
    }
}

/// Datasets held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: HashMap<String, Arc<GriddedDataset>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset to the store under its own identifier.
    pub fn insert(&mut self, dataset: GriddedDataset) {
        self.datasets.insert(dataset.id.clone(), Arc::new(dataset));
    }
}

impl DatasetProvider for MemoryStore {
    async fn get_dataset(
        &self,
        dataset_id: &str,
    ) -> Result<Option<Arc<GriddedDataset>>, RegionMeanError> {
        validate_dataset_id(dataset_id)?;
        Ok(self.datasets.get(dataset_id).cloned())
    }
}

/// Datasets read from JSON files in a directory.
///
/// The dataset `<id>` is read from `<root>/<id>.json`, or from the gzip compressed
/// `<root>/<id>.json.gz`. Decoded datasets are cached for the lifetime of the store, and each
/// dataset is decoded at most once, however many requests for it arrive together.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    normalize_longitude: bool,
    cache: RwLock<HashMap<String, Arc<OnceCell<Arc<GriddedDataset>>>>>,
}

impl DirectoryStore {
    /// Create a store reading from a directory.
    ///
    /// # Arguments
    ///
    /// * `root`: Directory containing dataset files
    /// * `normalize_longitude`: Whether to remap `[0, 360)` longitudes onto `[-180, 180)` on load
    pub fn new(root: &Path, normalize_longitude: bool) -> Self {
        DirectoryStore {
            root: root.to_path_buf(),
            normalize_longitude,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Find the file holding a dataset, and whether it is compressed.
    async fn locate(&self, dataset_id: &str) -> Option<(PathBuf, bool)> {
        for (extension, compressed) in [("json", false), ("json.gz", true)] {
            let path = self.root.join(format!("{dataset_id}.{extension}"));
            if let Ok(metadata) = tokio::fs::metadata(&path).await {
                if metadata.is_file() {
                    return Some((path, compressed));
                }
            }
        }
        None
    }

    async fn load(
        &self,
        dataset_id: &str,
    ) -> Result<Option<GriddedDataset>, RegionMeanError> {
        let Some((path, compressed)) = self.locate(dataset_id).await else {
            return Ok(None);
        };
        event!(Level::DEBUG, "loading dataset from {}", path.display());
        let bytes = tokio::fs::read(&path).await?;
        let dataset_id = dataset_id.to_string();
        let normalize_longitude = self.normalize_longitude;
        // Decoding is CPU bound.
        let dataset = tokio::task::spawn_blocking(move || {
            decode_dataset(&dataset_id, &bytes, compressed, normalize_longitude)
        })
        .await??;
        Ok(Some(dataset))
    }
}

impl DatasetProvider for DirectoryStore {
    async fn get_dataset(
        &self,
        dataset_id: &str,
    ) -> Result<Option<Arc<GriddedDataset>>, RegionMeanError> {
        validate_dataset_id(dataset_id)?;
        let cached = self.cache.read().await.get(dataset_id).cloned();
        let cell = match cached {
            Some(cell) => cell,
            None => {
                // Only datasets that exist get a cache entry.
                if self.locate(dataset_id).await.is_none() {
                    return Ok(None);
                }
                self.cache
                    .write()
                    .await
                    .entry(dataset_id.to_string())
                    .or_default()
                    .clone()
            }
        };
        let dataset = cell
            .get_or_try_init(|| async {
                DATASET_CACHE_MISSES.inc();
                self.load(dataset_id)
                    .await?
                    .map(Arc::new)
                    .ok_or_else(|| RegionMeanError::DatasetNotFound {
                        dataset_id: dataset_id.to_string(),
                    })
            })
            .await;
        match dataset {
            Ok(dataset) => Ok(Some(dataset.clone())),
            // Removed since it was located; the next request tries again.
            Err(RegionMeanError::DatasetNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn decode_dataset(
    dataset_id: &str,
    bytes: &[u8],
    compressed: bool,
    normalize_longitude: bool,
) -> Result<GriddedDataset, RegionMeanError> {
    let dataset = if compressed {
        let mut json = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut json)?;
        GriddedDataset::from_json(dataset_id, &json)?
    } else {
        GriddedDataset::from_json(dataset_id, bytes)?
    };
    Ok(if normalize_longitude {
        dataset.normalize_longitude()
    } else {
        dataset
    })
}

/// Dataset store.
///
/// Dispatches to the configured provider.
#[derive(Debug)]
pub enum DatasetStore {
    /// Datasets held in memory
    Memory(MemoryStore),
    /// Datasets read from a directory
    Directory(DirectoryStore),
}

impl DatasetStore {
    /// Get a dataset, failing if it does not exist.
    ///
    /// # Arguments
    ///
    /// * `dataset_id`: Dataset identifier
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn get(&self, dataset_id: &str) -> Result<Arc<GriddedDataset>, RegionMeanError> {
        let dataset = match self {
            DatasetStore::Memory(store) => store.get_dataset(dataset_id).await?,
            DatasetStore::Directory(store) => store.get_dataset(dataset_id).await?,
        };
        dataset.ok_or_else(|| RegionMeanError::DatasetNotFound {
            dataset_id: dataset_id.to_string(),
        })
    }
}
