//! Router, request handlers and service construction.

use crate::aggregator;
use crate::app_state::SharedAppState;
use crate::cli::CommandLineArgs;
use crate::dataset::GriddedDataset;
use crate::error::RegionMeanError;
use crate::metrics::{self, AGGREGATIONS};
use crate::models;
use crate::region::Region;
use crate::validated_json::ValidatedJson;

use axum::{
    extract::{Json, Path, State},
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;
use tracing::{event, Level};

/// Name given to regions defined in a request body.
const CUSTOM_REGION_NAME: &str = "custom";

impl IntoResponse for models::Response {
    /// Render the response as JSON.
    fn into_response(self) -> Response {
        match serde_json::to_string(&self) {
            Ok(body) => (
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                body,
            )
                .into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise response: {}", err),
            )
                .into_response(),
        }
    }
}

/// Initialise the application
pub fn init(args: &CommandLineArgs) {
    if args.use_rayon {
        let threads = args
            .thread_limit
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1));
        if let Err(err) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            event!(Level::WARN, "failed to configure Rayon thread pool: {}", err);
        }
    }
}

/// Returns a [axum::Router] for the region mean API.
///
/// The routes under the configured region name are fixed at start-up.
///
/// # Arguments
///
/// * `state`: Shared application state
pub fn router(state: SharedAppState) -> Router {
    let region = state.region.name().to_string();
    Router::new()
        .route(
            &format!("/datasets/:dataset_id/{region}/polygon"),
            get(region_polygon),
        )
        .route(
            &format!("/datasets/:dataset_id/{region}/:var_name/:operation"),
            get(region_operation),
        )
        .route("/datasets/:dataset_id/:var_name/mean", get(global_mean))
        .route(
            "/datasets/:dataset_id/region/:operation",
            post(custom_region_operation),
        )
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .on_request(metrics::request_counter)
                .on_response(metrics::record_response_metrics),
        )
}

/// The complete service type, including path normalisation.
pub type Service = NormalizePath<Router>;

/// Returns a [crate::app::Service] for the region mean API.
///
/// Trailing slashes are trimmed from request paths before routing.
///
/// # Arguments
///
/// * `state`: Shared application state
pub fn service(state: SharedAppState) -> Service {
    NormalizePathLayer::trim_trailing_slash().layer(router(state))
}

/// Apply an operation to a dataset variable.
///
/// The computation runs on the Rayon thread pool if enabled, otherwise inline.
async fn aggregate(
    state: &SharedAppState,
    operation: models::Operation,
    dataset: Arc<GriddedDataset>,
    variable: String,
    region: Option<Arc<Region>>,
) -> Result<models::Response, RegionMeanError> {
    AGGREGATIONS
        .with_label_values(&[&operation.to_string()])
        .inc();
    let region_name = region.as_ref().map(|region| region.name().to_string());
    let aggregate = if state.args.use_rayon {
        let variable = variable.clone();
        tokio_rayon::spawn(move || {
            aggregator::aggregate(operation, &dataset, &variable, region.as_deref())
        })
        .await?
    } else {
        aggregator::aggregate(operation, &dataset, &variable, region.as_deref())?
    };
    Ok(models::Response::new(
        region_name,
        variable,
        operation,
        aggregate,
    ))
}

/// Handler for operations over the configured region
///
/// # Arguments
///
/// * `state`: Shared application state
/// * `dataset_id`, `var_name`, `operation`: Path parameters
async fn region_operation(
    State(state): State<SharedAppState>,
    Path((dataset_id, var_name, operation)): Path<(String, String, String)>,
) -> Result<models::Response, RegionMeanError> {
    let operation: models::Operation = operation.parse()?;
    let dataset = state.datasets.get(&dataset_id).await?;
    let region = state.region.clone();
    aggregate(&state, operation, dataset, var_name, Some(region)).await
}

/// Handler for the unmasked mean over a whole variable
async fn global_mean(
    State(state): State<SharedAppState>,
    Path((dataset_id, var_name)): Path<(String, String)>,
) -> Result<models::Response, RegionMeanError> {
    let dataset = state.datasets.get(&dataset_id).await?;
    aggregate(&state, models::Operation::Mean, dataset, var_name, None).await
}

/// Handler for operations over a region given in the request body
async fn custom_region_operation(
    State(state): State<SharedAppState>,
    Path((dataset_id, operation)): Path<(String, String)>,
    ValidatedJson(request_data): ValidatedJson<models::RegionRequest>,
) -> Result<models::Response, RegionMeanError> {
    let operation: models::Operation = operation.parse()?;
    let region = match &request_data.region {
        models::RegionSpec::Bbox(bbox) => Region::from_bbox(CUSTOM_REGION_NAME, bbox)?,
        models::RegionSpec::Polygon(vertices) => {
            Region::from_vertices(CUSTOM_REGION_NAME, vertices)?
        }
    };
    let dataset = state.datasets.get(&dataset_id).await?;
    aggregate(
        &state,
        operation,
        dataset,
        request_data.variable,
        Some(Arc::new(region)),
    )
    .await
}

/// Handler returning the configured region as GeoJSON
async fn region_polygon(
    State(state): State<SharedAppState>,
    Path(dataset_id): Path<String>,
) -> Result<Response, RegionMeanError> {
    // Only served for datasets that exist.
    state.datasets.get(&dataset_id).await?;
    Ok((
        [(&header::CONTENT_TYPE, "application/geo+json".to_string())],
        Json(state.region.to_geojson()),
    )
        .into_response())
}
