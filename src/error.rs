//! Error handling.

use axum::{
    extract::rejection::JsonRejection,
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ndarray::ShapeError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tracing::{event, Level};

/// Region mean server error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum RegionMeanError {
    /// Error reading a dataset file
    #[error("failed to read dataset")]
    DatasetRead(#[from] std::io::Error),

    /// Error decoding dataset JSON
    #[error("failed to decode dataset")]
    DatasetDecode(#[from] serde_json::Error),

    /// Dataset content does not describe a valid gridded dataset
    #[error("invalid dataset {dataset_id}: {reason}")]
    DatasetInvalid { dataset_id: String, reason: String },

    /// No dataset with the requested identifier
    #[error("dataset '{dataset_id}' not found")]
    DatasetNotFound { dataset_id: String },

    /// Dataset identifier contains disallowed characters
    #[error("invalid dataset identifier '{dataset_id}'")]
    InvalidDatasetId { dataset_id: String },

    /// The region could not be loaded from its source
    #[error("failed to load region from {source_name}: {reason}")]
    InvalidRegionSource { source_name: String, reason: String },

    /// Dataset has no recognisable latitude/longitude coordinates
    #[error("dataset does not contain latitude/longitude coordinates")]
    MissingSpatialAxes,

    /// Error deserialising request data
    #[error("request data is not valid")]
    RequestDataJsonRejection(#[from] JsonRejection),

    /// Error validating request data (single error)
    #[error("request data is not valid")]
    RequestDataValidationSingle(#[from] validator::ValidationError),

    /// Error validating request data (multiple errors)
    #[error("request data is not valid")]
    RequestDataValidation(#[from] validator::ValidationErrors),

    /// Error creating ndarray Array from Shape
    #[error("failed to create array from shape")]
    ShapeInvalid(#[from] ShapeError),

    /// Error joining a blocking task
    #[error("error joining background task")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Unsupported operation requested
    #[error("unsupported operation {operation}")]
    UnsupportedOperation { operation: String },

    /// Requested variable does not exist in the dataset
    #[error("variable '{variable}' not found in dataset")]
    VariableNotFound { variable: String },

    /// Requested variable is not defined over the latitude/longitude grid
    #[error("variable '{variable}' is not defined over the latitude/longitude grid")]
    VariableNotSpatial { variable: String },
}

impl IntoResponse for RegionMeanError {
    /// Convert from a `RegionMeanError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    /// Main error message
    message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorBody {
    /// Return a new ErrorBody
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorBody { message, caused_by }
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Response body
    error: ErrorBody,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. This will be formatted into a suitable `ErrorBody`
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: ErrorBody::new(error),
        }
    }

    /// Return a 400 bad request ErrorResponse
    fn bad_request<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    /// Return a 404 not found ErrorResponse
    fn not_found<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    /// Return a 500 internal server error ErrorResponse
    fn internal_server_error<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<RegionMeanError> for ErrorResponse {
    /// Convert from a `RegionMeanError` into an `ErrorResponse`.
    fn from(error: RegionMeanError) -> Self {
        let response = match &error {
            // Bad request
            RegionMeanError::InvalidDatasetId { dataset_id: _ }
            | RegionMeanError::MissingSpatialAxes
            | RegionMeanError::RequestDataJsonRejection(_)
            | RegionMeanError::RequestDataValidationSingle(_)
            | RegionMeanError::RequestDataValidation(_)
            | RegionMeanError::VariableNotSpatial { variable: _ } => Self::bad_request(&error),

            // Not found
            RegionMeanError::DatasetNotFound { dataset_id: _ }
            | RegionMeanError::UnsupportedOperation { operation: _ }
            | RegionMeanError::VariableNotFound { variable: _ } => Self::not_found(&error),

            // Internal server error
            RegionMeanError::DatasetRead(_)
            | RegionMeanError::DatasetDecode(_)
            | RegionMeanError::DatasetInvalid {
                dataset_id: _,
                reason: _,
            }
            | RegionMeanError::InvalidRegionSource {
                source_name: _,
                reason: _,
            }
            | RegionMeanError::ShapeInvalid(_)
            | RegionMeanError::TaskJoin(_) => Self::internal_server_error(&error),
        };

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hyper::HeaderMap;

    // Jump through the hoops to get the body as a string.
    async fn body_string(response: Response) -> String {
        String::from_utf8(
            hyper::body::to_bytes(response.into_body())
                .await
                .unwrap()
                .to_vec(),
        )
        .unwrap()
    }

    async fn test_region_mean_error(
        error: RegionMeanError,
        status: StatusCode,
        message: &str,
        caused_by: Option<Vec<&'static str>>,
    ) {
        let response = error.into_response();
        assert_eq!(status, response.status());
        let mut headers = HeaderMap::new();
        headers.insert(&header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert_eq!(headers, *response.headers());
        let error_response: ErrorResponse =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(message.to_string(), error_response.error.message);
        // Map Vec items from str to String
        let caused_by = caused_by.map(|cb| cb.iter().map(|s| s.to_string()).collect());
        assert_eq!(caused_by, error_response.error.caused_by);
    }

    #[tokio::test]
    async fn dataset_read_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = RegionMeanError::DatasetRead(io_error);
        let message = "failed to read dataset";
        let caused_by = Some(vec!["no such file"]);
        test_region_mean_error(error, StatusCode::INTERNAL_SERVER_ERROR, message, caused_by)
            .await;
    }

    #[tokio::test]
    async fn dataset_decode_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = RegionMeanError::DatasetDecode(json_error);
        let message = "failed to decode dataset";
        let caused_by = Some(vec!["EOF while parsing an object at line 1 column 1"]);
        test_region_mean_error(error, StatusCode::INTERNAL_SERVER_ERROR, message, caused_by)
            .await;
    }

    #[tokio::test]
    async fn dataset_invalid() {
        let error = RegionMeanError::DatasetInvalid {
            dataset_id: "foo".to_string(),
            reason: "bar".to_string(),
        };
        let message = "invalid dataset foo: bar";
        test_region_mean_error(error, StatusCode::INTERNAL_SERVER_ERROR, message, None).await;
    }

    #[tokio::test]
    async fn dataset_not_found() {
        let error = RegionMeanError::DatasetNotFound {
            dataset_id: "foo".to_string(),
        };
        let message = "dataset 'foo' not found";
        test_region_mean_error(error, StatusCode::NOT_FOUND, message, None).await;
    }

    #[tokio::test]
    async fn invalid_dataset_id() {
        let error = RegionMeanError::InvalidDatasetId {
            dataset_id: "../foo".to_string(),
        };
        let message = "invalid dataset identifier '../foo'";
        test_region_mean_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[tokio::test]
    async fn invalid_region_source() {
        let error = RegionMeanError::InvalidRegionSource {
            source_name: "ea.shp".to_string(),
            reason: "no geometries".to_string(),
        };
        let message = "failed to load region from ea.shp: no geometries";
        test_region_mean_error(error, StatusCode::INTERNAL_SERVER_ERROR, message, None).await;
    }

    #[tokio::test]
    async fn missing_spatial_axes() {
        let error = RegionMeanError::MissingSpatialAxes;
        let message = "dataset does not contain latitude/longitude coordinates";
        test_region_mean_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[tokio::test]
    async fn request_data_validation_single() {
        let validation_error = validator::ValidationError::new("foo");
        let error = RegionMeanError::RequestDataValidationSingle(validation_error);
        let message = "request data is not valid";
        let caused_by = Some(vec!["Validation error: foo [{}]"]);
        test_region_mean_error(error, StatusCode::BAD_REQUEST, message, caused_by).await;
    }

    #[tokio::test]
    async fn request_data_validation() {
        let mut validation_errors = validator::ValidationErrors::new();
        let validation_error = validator::ValidationError::new("foo");
        validation_errors.add("bar", validation_error);
        let error = RegionMeanError::RequestDataValidation(validation_errors);
        let message = "request data is not valid";
        let caused_by = Some(vec!["bar: Validation error: foo [{}]"]);
        test_region_mean_error(error, StatusCode::BAD_REQUEST, message, caused_by).await;
    }

    #[tokio::test]
    async fn shape_error() {
        let error = RegionMeanError::ShapeInvalid(ShapeError::from_kind(
            ndarray::ErrorKind::OutOfBounds,
        ));
        let message = "failed to create array from shape";
        let caused_by = Some(vec!["ShapeError/OutOfBounds: out of bounds indexing"]);
        test_region_mean_error(error, StatusCode::INTERNAL_SERVER_ERROR, message, caused_by)
            .await;
    }

    #[tokio::test]
    async fn unsupported_operation() {
        let error = RegionMeanError::UnsupportedOperation {
            operation: "foo".to_string(),
        };
        let message = "unsupported operation foo";
        test_region_mean_error(error, StatusCode::NOT_FOUND, message, None).await;
    }

    #[tokio::test]
    async fn variable_not_found() {
        let error = RegionMeanError::VariableNotFound {
            variable: "foo".to_string(),
        };
        let message = "variable 'foo' not found in dataset";
        test_region_mean_error(error, StatusCode::NOT_FOUND, message, None).await;
    }

    #[tokio::test]
    async fn variable_not_spatial() {
        let error = RegionMeanError::VariableNotSpatial {
            variable: "time".to_string(),
        };
        let message = "variable 'time' is not defined over the latitude/longitude grid";
        test_region_mean_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }
}
