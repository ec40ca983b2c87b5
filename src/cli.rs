//! Command Line Interface (CLI) arguments.

use crate::models::BoundingBox;

use clap::Parser;

/// Region mean server command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "REGIONMEAN_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 8080, env = "REGIONMEAN_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "REGIONMEAN_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/regionmean/certs/cert.pem",
        env = "REGIONMEAN_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/regionmean/certs/key.pem",
        env = "REGIONMEAN_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for operations to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "REGIONMEAN_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Whether to enable sending traces to Jaeger.
    #[arg(long, default_value_t = false, env = "REGIONMEAN_ENABLE_JAEGER")]
    pub enable_jaeger: bool,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "REGIONMEAN_USE_RAYON")]
    pub use_rayon: bool,
    /// Number of threads in the Rayon thread pool. Defaults to one less than the number of CPUs.
    #[arg(long, env = "REGIONMEAN_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    /// Directory containing dataset files, named `<dataset id>.json` or `<dataset id>.json.gz`
    #[arg(long, default_value = ".", env = "REGIONMEAN_DATA_DIR")]
    pub data_dir: String,
    /// Name of the region, used as a URL path segment
    #[arg(long, default_value = "ea", env = "REGIONMEAN_REGION_NAME")]
    pub region_name: String,
    /// Shapefile whose first geometry defines the region
    #[arg(long, env = "REGIONMEAN_REGION_SHAPEFILE")]
    pub region_shapefile: Option<String>,
    /// GeoJSON file whose first polygon defines the region
    #[arg(long, env = "REGIONMEAN_REGION_GEOJSON")]
    pub region_geojson: Option<String>,
    /// Bounding box defining the region, as `min_lon,min_lat,max_lon,max_lat`
    #[arg(long, allow_hyphen_values = true, env = "REGIONMEAN_REGION_BBOX")]
    pub region_bbox: Option<BoundingBox>,
    /// Keep dataset longitudes as stored instead of remapping `[0, 360)` onto `[-180, 180)`
    #[arg(long, default_value_t = false, env = "REGIONMEAN_KEEP_LONGITUDE_CONVENTION")]
    pub keep_longitude_convention: bool,
}

/// Default region bounding box, covering East Africa.
pub const DEFAULT_REGION_BBOX: BoundingBox = BoundingBox {
    min_lon: 21.8,
    min_lat: -11.8,
    max_lon: 51.4,
    max_lat: 23.2,
};

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
