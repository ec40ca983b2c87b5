use crate::cli::{CommandLineArgs, DEFAULT_REGION_BBOX};
use crate::dataset_store::{DatasetStore, DirectoryStore};
use crate::error::RegionMeanError;
use crate::region::Region;

use expanduser::expanduser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{event, Level};

/// Shared application state passed to each operation request handler.
#[derive(Debug)]
pub struct AppState {
    /// Command line arguments.
    pub args: CommandLineArgs,

    /// Dataset store.
    pub datasets: DatasetStore,

    /// Region served under the configured region name.
    pub region: Arc<Region>,
}

impl AppState {
    /// Create and return an [AppState].
    ///
    /// Loads the region from the first configured source, in order of precedence: shapefile,
    /// GeoJSON file, bounding box, and the default bounding box.
    pub fn new(args: &CommandLineArgs) -> Result<Self, RegionMeanError> {
        let data_dir = expanduser(&args.data_dir)?;
        let datasets = DatasetStore::Directory(DirectoryStore::new(
            &data_dir,
            !args.keep_longitude_convention,
        ));
        let region = load_region(args)?;
        event!(
            Level::INFO,
            "serving region {} from {} and datasets from {}",
            region.name(),
            region.source(),
            data_dir.display()
        );
        Ok(Self::with_datasets(args, datasets, region))
    }

    /// Create and return an [AppState] from a dataset store and region.
    pub fn with_datasets(args: &CommandLineArgs, datasets: DatasetStore, region: Region) -> Self {
        Self {
            args: args.clone(),
            datasets,
            region: Arc::new(region),
        }
    }
}

/// Expand `~` in a region source path.
fn expand(path: &str) -> Result<PathBuf, RegionMeanError> {
    expanduser(path).map_err(|err| RegionMeanError::InvalidRegionSource {
        source_name: path.to_string(),
        reason: err.to_string(),
    })
}

fn load_region(args: &CommandLineArgs) -> Result<Region, RegionMeanError> {
    let name = &args.region_name;
    if let Some(shapefile) = &args.region_shapefile {
        Region::from_shapefile(name, &expand(shapefile)?)
    } else if let Some(geojson) = &args.region_geojson {
        Region::from_geojson(name, &expand(geojson)?)
    } else {
        let bbox = args.region_bbox.unwrap_or(DEFAULT_REGION_BBOX);
        Region::from_bbox(name, &bbox)
    }
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;
