//! Data types and associated functions and methods

use crate::error::RegionMeanError;
use crate::region;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::str::FromStr;
use strum_macros::Display;
use validator::{Validate, ValidationError, ValidationErrors};

/// Supported aggregation operations
#[derive(Clone, Copy, Debug, Display, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    /// Number of non-missing values
    Count,
    /// Maximum value
    Max,
    /// Arithmetic mean
    Mean,
    /// Minimum value
    Min,
    /// Sum of values
    Sum,
}

impl FromStr for Operation {
    type Err = RegionMeanError;

    fn from_str(operation: &str) -> Result<Self, Self::Err> {
        match operation {
            "count" => Ok(Self::Count),
            "max" => Ok(Self::Max),
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "sum" => Ok(Self::Sum),
            _ => Err(RegionMeanError::UnsupportedOperation {
                operation: operation.to_string(),
            }),
        }
    }
}

/// Result of an aggregation
///
/// Serialises as a JSON number, or as the string `"NaN"` when undefined.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AggregationResult {
    /// A finite value
    Value(f64),
    /// No value could be computed, e.g. because no grid cell was selected
    Undefined,
}

impl AggregationResult {
    /// Returns a [AggregationResult] for a possibly non-finite value.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Self::Value(value)
        } else {
            Self::Undefined
        }
    }

    /// Returns whether the result is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl Serialize for AggregationResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Value(value) => serializer.serialize_f64(*value),
            Self::Undefined => serializer.serialize_str("NaN"),
        }
    }
}

/// Aggregated value and the number of values that contributed to it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aggregate {
    /// Aggregated value
    pub value: AggregationResult,
    /// Number of non-missing values aggregated
    pub count: usize,
}

impl Aggregate {
    /// Return a new Aggregate object.
    pub fn new(value: AggregationResult, count: usize) -> Self {
        Aggregate { value, count }
    }
}

/// Response data for aggregation requests
///
/// Serialises as `{"region": ..., "variable": ..., "<operation>": ..., "count": ...}`, with the
/// region omitted for unmasked aggregations.
#[derive(Debug, PartialEq)]
pub struct Response {
    /// Name of the region aggregated over
    pub region: Option<String>,
    /// Name of the aggregated variable
    pub variable: String,
    /// Operation performed
    pub operation: Operation,
    /// Result of the operation
    pub aggregate: Aggregate,
}

impl Response {
    /// Return a Response object
    pub fn new(
        region: Option<String>,
        variable: String,
        operation: Operation,
        aggregate: Aggregate,
    ) -> Response {
        Response {
            region,
            variable,
            operation,
            aggregate,
        }
    }
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        if let Some(region) = &self.region {
            map.serialize_entry("region", region)?;
        }
        map.serialize_entry("variable", &self.variable)?;
        map.serialize_entry(&self.operation.to_string(), &self.aggregate.value)?;
        map.serialize_entry("count", &self.aggregate.count)?;
        map.end()
    }
}

/// A longitude/latitude bounding box
// NOTE: In serde, structs can be deserialised from sequences or maps. This allows us to accept
// [<min_lon>, <min_lat>, <max_lon>, <max_lat>], with the convenience of named fields.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_bounding_box"))]
pub struct BoundingBox {
    /// Western edge
    #[validate(range(min = -360.0, max = 360.0, message = "longitude must be within [-360, 360]"))]
    pub min_lon: f64,
    /// Southern edge
    #[validate(range(min = -90.0, max = 90.0, message = "latitude must be within [-90, 90]"))]
    pub min_lat: f64,
    /// Eastern edge
    #[validate(range(min = -360.0, max = 360.0, message = "longitude must be within [-360, 360]"))]
    pub max_lon: f64,
    /// Northern edge
    #[validate(range(min = -90.0, max = 90.0, message = "latitude must be within [-90, 90]"))]
    pub max_lat: f64,
}

impl FromStr for BoundingBox {
    type Err = String;

    /// Parse `min_lon,min_lat,max_lon,max_lat`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|value| value.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| format!("invalid bounding box '{s}': {err}"))?;
        let &[min_lon, min_lat, max_lon, max_lat] = values.as_slice() else {
            return Err(format!(
                "invalid bounding box '{s}': expected min_lon,min_lat,max_lon,max_lat"
            ));
        };
        let bbox = BoundingBox {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        bbox.validate()
            .map_err(|err| format!("invalid bounding box '{s}': {err}"))?;
        Ok(bbox)
    }
}

/// Validate that a bounding box has a positive extent
fn validate_bounding_box(bbox: &BoundingBox) -> Result<(), ValidationError> {
    if bbox.min_lon >= bbox.max_lon || bbox.min_lat >= bbox.max_lat {
        let mut error = ValidationError::new("Bounding box min must be less than max");
        error.add_param("min_lon".into(), &bbox.min_lon);
        error.add_param("max_lon".into(), &bbox.max_lon);
        error.add_param("min_lat".into(), &bbox.min_lat);
        error.add_param("max_lat".into(), &bbox.max_lat);
        return Err(error);
    }
    Ok(())
}

/// Region definition for ad-hoc aggregation requests
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RegionSpec {
    /// A longitude/latitude bounding box
    Bbox(BoundingBox),
    /// A single ring of [longitude, latitude] vertices
    Polygon(Vec<[f64; 2]>),
}

impl Validate for RegionSpec {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            RegionSpec::Bbox(bbox) => bbox.validate(),
            RegionSpec::Polygon(vertices) => {
                validate_vertices(vertices).map_err(|error| {
                    let mut errors = ValidationErrors::new();
                    errors.add("polygon", error);
                    errors
                })
            }
        }
    }
}

/// Validate polygon vertices
fn validate_vertices(vertices: &[[f64; 2]]) -> Result<(), ValidationError> {
    // An explicitly closed ring repeats its first vertex.
    let distinct = match (vertices.first(), vertices.last()) {
        (Some(first), Some(last)) if vertices.len() > 1 && first == last => vertices.len() - 1,
        _ => vertices.len(),
    };
    if distinct < 3 {
        let mut error = ValidationError::new("Polygon must have at least three vertices");
        error.add_param("vertices".into(), &distinct);
        return Err(error);
    }
    if vertices
        .iter()
        .any(|[lon, lat]| !lon.is_finite() || !(-90.0..=90.0).contains(lat))
    {
        return Err(ValidationError::new(
            "Polygon vertices must be finite with latitude within [-90, 90]",
        ));
    }
    let mut ring = geo::LineString::from(
        vertices
            .iter()
            .map(|[lon, lat]| (*lon, *lat))
            .collect::<Vec<_>>(),
    );
    ring.close();
    if !region::is_simple_ring(&ring) {
        return Err(ValidationError::new("Polygon must not intersect itself"));
    }
    Ok(())
}

/// Request data for ad-hoc region aggregations
#[derive(Clone, Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegionRequest {
    /// Name of the variable to aggregate
    #[validate(length(min = 1, message = "variable must not be empty"))]
    pub variable: String,
    /// Region to aggregate over
    #[validate]
    pub region: RegionSpec,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_ser_tokens, Token};

    #[test]
    fn operation_from_str() {
        assert_eq!(Operation::Mean, "mean".parse().unwrap());
        assert_eq!(Operation::Count, "count".parse().unwrap());
        let err = "median".parse::<Operation>().unwrap_err();
        assert_eq!("unsupported operation median", err.to_string());
    }

    #[test]
    fn operation_display() {
        assert_eq!("mean", Operation::Mean.to_string());
        assert_eq!("max", Operation::Max.to_string());
    }

    #[test]
    fn aggregation_result_value() {
        assert_ser_tokens(&AggregationResult::Value(6.5), &[Token::F64(6.5)]);
    }

    #[test]
    fn aggregation_result_undefined() {
        assert_ser_tokens(&AggregationResult::Undefined, &[Token::Str("NaN")]);
    }

    #[test]
    fn aggregation_result_from_f64() {
        assert_eq!(AggregationResult::Value(1.0), AggregationResult::from_f64(1.0));
        assert!(AggregationResult::from_f64(f64::NAN).is_undefined());
        assert!(AggregationResult::from_f64(f64::INFINITY).is_undefined());
    }

    #[test]
    fn response_serialize() {
        let response = Response::new(
            Some("ea".to_string()),
            "temp".to_string(),
            Operation::Mean,
            Aggregate::new(AggregationResult::Value(6.5), 6),
        );
        assert_ser_tokens(
            &response,
            &[
                Token::Map { len: None },
                Token::Str("region"),
                Token::Str("ea"),
                Token::Str("variable"),
                Token::Str("temp"),
                Token::Str("mean"),
                Token::F64(6.5),
                Token::Str("count"),
                Token::U64(6),
                Token::MapEnd,
            ],
        );
    }

    #[test]
    fn response_serialize_undefined_without_region() {
        let response = Response::new(
            None,
            "temp".to_string(),
            Operation::Max,
            Aggregate::new(AggregationResult::Undefined, 0),
        );
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(r#"{"variable":"temp","max":"NaN","count":0}"#, json);
    }

    #[test]
    fn bounding_box_from_str() {
        let bbox: BoundingBox = "21.8, -11.8, 51.4, 23.2".parse().unwrap();
        assert_eq!(
            BoundingBox {
                min_lon: 21.8,
                min_lat: -11.8,
                max_lon: 51.4,
                max_lat: 23.2
            },
            bbox
        );
    }

    #[test]
    fn bounding_box_from_str_wrong_length() {
        let err = "1,2,3".parse::<BoundingBox>().unwrap_err();
        assert!(err.contains("expected min_lon,min_lat,max_lon,max_lat"), "{err}");
    }

    #[test]
    fn bounding_box_from_str_not_a_number() {
        let err = "1,2,3,x".parse::<BoundingBox>().unwrap_err();
        assert!(err.contains("invalid float literal"), "{err}");
    }

    #[test]
    fn bounding_box_from_str_inverted() {
        let err = "10,0,0,10".parse::<BoundingBox>().unwrap_err();
        assert!(err.contains("Bounding box min must be less than max"), "{err}");
    }

    #[test]
    fn bounding_box_latitude_out_of_range() {
        let bbox = BoundingBox {
            min_lon: 0.0,
            min_lat: -91.0,
            max_lon: 1.0,
            max_lat: 1.0,
        };
        let err = bbox.validate().unwrap_err();
        assert!(err.to_string().contains("latitude must be within"), "{err}");
    }

    #[test]
    fn region_request_bbox_sequence() {
        let request: RegionRequest = serde_json::from_str(
            r#"{"variable": "air", "region": {"bbox": [95, 15, 125, 35]}}"#,
        )
        .unwrap();
        assert_eq!(
            RegionSpec::Bbox(BoundingBox {
                min_lon: 95.0,
                min_lat: 15.0,
                max_lon: 125.0,
                max_lat: 35.0
            }),
            request.region
        );
        request.validate().unwrap();
    }

    #[test]
    fn region_request_polygon() {
        let request: RegionRequest = serde_json::from_str(
            r#"{"variable": "air", "region": {"polygon": [[0, 0], [1, 0], [0, 1]]}}"#,
        )
        .unwrap();
        request.validate().unwrap();
    }

    #[test]
    fn region_request_polygon_too_short() {
        let request: RegionRequest = serde_json::from_str(
            r#"{"variable": "air", "region": {"polygon": [[0, 0], [1, 0]]}}"#,
        )
        .unwrap();
        let err = request.validate().unwrap_err();
        assert!(
            err.to_string()
                .contains("Polygon must have at least three vertices"),
            "{err}"
        );
    }

    #[test]
    fn region_request_closed_polygon_too_short() {
        let request: RegionRequest = serde_json::from_str(
            r#"{"variable": "air", "region": {"polygon": [[0, 0], [1, 0], [0, 0]]}}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn region_request_self_intersecting_polygon() {
        let request: RegionRequest = serde_json::from_str(
            r#"{"variable": "air", "region": {"polygon": [[0, 0], [10, 10], [10, 0], [0, 10]]}}"#,
        )
        .unwrap();
        let err = request.validate().unwrap_err();
        assert!(
            err.to_string().contains("Polygon must not intersect itself"),
            "{err}"
        );
    }

    #[test]
    fn region_request_empty_variable() {
        let request: RegionRequest = serde_json::from_str(
            r#"{"variable": "", "region": {"polygon": [[0, 0], [1, 0], [0, 1]]}}"#,
        )
        .unwrap();
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("variable"), "{err}");
    }

    #[test]
    fn region_request_unknown_field() {
        let result = serde_json::from_str::<RegionRequest>(
            r#"{"variable": "air", "region": {"polygon": [[0, 0], [1, 0], [0, 1]]}, "foo": 1}"#,
        );
        assert!(result.is_err());
    }
}
