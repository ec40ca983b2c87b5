//! Gridded datasets.
//!
//! A [GriddedDataset] is a collection of named N-dimensional variables indexed by named
//! dimensions, together with the coordinate variables describing those dimensions. Datasets are
//! decoded from the JSON layout produced by xarray's `Dataset.to_dict()`:
//!
//! ```json
//! {
//!   "attrs": {},
//!   "coords": {"lat": {"dims": ["lat"], "attrs": {}, "data": [10, 20, 30]}},
//!   "data_vars": {"temp": {"dims": ["lat", "lon"], "attrs": {}, "data": [[1, 2], [3, 4]]}}
//! }
//! ```
//!
//! Data values are nested lists of numbers, with `null` marking missing values.

use crate::error::RegionMeanError;
use crate::types::Missing;

use hashbrown::HashMap;
use ndarray::{Array1, ArrayD, ArrayView1, Axis, Ix1, IxDyn};
use serde::Deserialize;
use serde_json::{Map, Value};
use strum_macros::Display;
use tracing::{event, Level};

/// Names under which a latitude coordinate is recognised.
const LATITUDE_NAMES: [&str; 2] = ["lat", "latitude"];
/// Names under which a longitude coordinate is recognised.
const LONGITUDE_NAMES: [&str; 2] = ["lon", "longitude"];
/// CF `units` values of a latitude coordinate.
const LATITUDE_UNITS: [&str; 5] = [
    "degrees_north",
    "degree_north",
    "degree_N",
    "degrees_N",
    "degreeN",
];
/// CF `units` values of a longitude coordinate.
const LONGITUDE_UNITS: [&str; 5] = [
    "degrees_east",
    "degree_east",
    "degree_E",
    "degrees_E",
    "degreeE",
];

/// A named N-dimensional variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    /// Dimension names, one per array axis
    pub dims: Vec<String>,
    /// Values
    pub data: ArrayD<f64>,
    /// Attributes
    pub attrs: Map<String, Value>,
    /// Missing data descriptor derived from `attrs`
    pub missing: Option<Missing<f64>>,
}

impl Variable {
    /// Create and return a [Variable].
    ///
    /// The missing data descriptor is derived from the CF attributes in `attrs`.
    ///
    /// # Arguments
    ///
    /// * `dims`: Dimension names
    /// * `data`: Values. Must have one axis per dimension name
    /// * `attrs`: Attributes
    pub fn new(
        dims: Vec<String>,
        data: ArrayD<f64>,
        attrs: Map<String, Value>,
    ) -> Result<Self, String> {
        if dims.len() != data.ndim() {
            return Err(format!(
                "{} dimension names given for an array with {} axes",
                dims.len(),
                data.ndim()
            ));
        }
        let missing = Missing::from_attrs(&attrs);
        Ok(Variable {
            dims,
            data,
            attrs,
            missing,
        })
    }

    /// Returns the array axis of a dimension, if the variable has it.
    pub fn axis(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Returns the values of a one-dimensional variable.
    fn values_1d(&self) -> Option<ArrayView1<'_, f64>> {
        self.data.view().into_dimensionality::<Ix1>().ok()
    }

    fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }
}

/// Longitude conventions
#[derive(Clone, Copy, Debug, Display, PartialEq)]
pub enum LongitudeConvention {
    /// Longitudes in `[-180, 180)`
    #[strum(serialize = "[-180, 180)")]
    Signed,
    /// Longitudes in `[0, 360)`
    #[strum(serialize = "[0, 360)")]
    Positive,
}

impl LongitudeConvention {
    /// Detect the convention of a sequence of longitudes.
    ///
    /// Any value greater than 180 implies `[0, 360)`.
    pub fn detect<'a>(values: impl IntoIterator<Item = &'a f64>) -> Self {
        if values.into_iter().any(|lon| *lon > 180.0) {
            Self::Positive
        } else {
            Self::Signed
        }
    }

    /// Western end of the longitude range.
    pub fn west(self) -> f64 {
        match self {
            Self::Signed => -180.0,
            Self::Positive => 0.0,
        }
    }

    /// Map a longitude onto this convention.
    pub fn wrap(self, lon: f64) -> f64 {
        match self {
            Self::Signed => (lon + 180.0).rem_euclid(360.0) - 180.0,
            Self::Positive => lon.rem_euclid(360.0),
        }
    }
}

/// Latitude and longitude axes of a dataset.
#[derive(Debug)]
pub struct SpatialAxes<'a> {
    /// Name of the latitude dimension
    pub lat_dim: &'a str,
    /// Name of the longitude dimension
    pub lon_dim: &'a str,
    /// Latitude coordinate values
    pub lat: ArrayView1<'a, f64>,
    /// Longitude coordinate values
    pub lon: ArrayView1<'a, f64>,
}

impl SpatialAxes<'_> {
    /// Longitude convention of the dataset.
    pub fn longitude_convention(&self) -> LongitudeConvention {
        LongitudeConvention::detect(self.lon.iter())
    }
}

/// A gridded dataset.
#[derive(Clone, Debug)]
pub struct GriddedDataset {
    /// Dataset identifier
    pub id: String,
    /// Global attributes
    pub attrs: Map<String, Value>,
    /// Coordinate variables
    pub coords: HashMap<String, Variable>,
    /// Data variables
    pub data_vars: HashMap<String, Variable>,
}

impl GriddedDataset {
    /// Create and return a [GriddedDataset].
    ///
    /// Checks that every dimension has the same length in every variable that uses it.
    pub fn new(
        id: &str,
        attrs: Map<String, Value>,
        coords: HashMap<String, Variable>,
        data_vars: HashMap<String, Variable>,
    ) -> Result<Self, RegionMeanError> {
        check_dimensions(coords.iter().chain(data_vars.iter())).map_err(|reason| {
            RegionMeanError::DatasetInvalid {
                dataset_id: id.to_string(),
                reason,
            }
        })?;
        Ok(GriddedDataset {
            id: id.to_string(),
            attrs,
            coords,
            data_vars,
        })
    }

    /// Decode a dataset from xarray's dictionary JSON layout.
    ///
    /// Variables with non-numeric data (e.g. timestamps) are skipped.
    ///
    /// # Arguments
    ///
    /// * `id`: Dataset identifier
    /// * `json`: JSON document
    pub fn from_json(id: &str, json: &[u8]) -> Result<Self, RegionMeanError> {
        let dict: DatasetDict = serde_json::from_slice(json)?;
        let coords = decode_variables(id, dict.coords)?;
        let data_vars = decode_variables(id, dict.data_vars)?;
        Self::new(id, dict.attrs, coords, data_vars)
    }

    /// Returns a variable by name.
    ///
    /// Data variables are searched first, then coordinates.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.data_vars.get(name).or_else(|| self.coords.get(name))
    }

    /// Locate the latitude and longitude axes.
    ///
    /// Coordinates are recognised by name first, then by CF `standard_name` or `units`
    /// attributes. Only one-dimensional coordinates qualify.
    pub fn spatial_axes(&self) -> Result<SpatialAxes<'_>, RegionMeanError> {
        let lat = self.find_axis(&LATITUDE_NAMES, "latitude", &LATITUDE_UNITS);
        let lon = self.find_axis(&LONGITUDE_NAMES, "longitude", &LONGITUDE_UNITS);
        match (lat, lon) {
            (Some((_, lat_dim, lat)), Some((_, lon_dim, lon))) => Ok(SpatialAxes {
                lat_dim,
                lon_dim,
                lat,
                lon,
            }),
            _ => Err(RegionMeanError::MissingSpatialAxes),
        }
    }

    /// Returns the coordinate name, dimension and values of a spatial axis.
    fn find_axis(
        &self,
        names: &[&str],
        standard_name: &str,
        units: &[&str],
    ) -> Option<(&str, &str, ArrayView1<'_, f64>)> {
        let by_name = names
            .iter()
            .find_map(|name| self.coords.get_key_value(*name));
        let by_attrs = || {
            let mut candidates = self
                .coords
                .iter()
                .filter(|(_, coord)| {
                    coord.attr_str("standard_name") == Some(standard_name)
                        || coord
                            .attr_str("units")
                            .is_some_and(|unit| units.contains(&unit))
                })
                .collect::<Vec<_>>();
            // Hash map order is arbitrary.
            candidates.sort_by(|(a, _), (b, _)| a.cmp(b));
            candidates.into_iter().next()
        };
        let (name, coord) = by_name.or_else(by_attrs)?;
        let values = coord.values_1d()?;
        Some((name.as_str(), coord.dims[0].as_str(), values))
    }

    /// Remap a `[0, 360)` longitude axis onto `[-180, 180)`.
    ///
    /// Each longitude `c` becomes `((c + 180) mod 360) - 180`, the axis is re-sorted ascending and
    /// every variable with the longitude dimension is reordered to match. Datasets without a
    /// longitude axis, or already using `[-180, 180)`, are returned unchanged.
    pub fn normalize_longitude(mut self) -> Self {
        let (lon_name, lon_dim, remapped) = {
            let Some((lon_name, lon_dim, lon)) =
                self.find_axis(&LONGITUDE_NAMES, "longitude", &LONGITUDE_UNITS)
            else {
                return self;
            };
            if LongitudeConvention::detect(lon.iter()) == LongitudeConvention::Signed {
                return self;
            }
            let remapped = lon
                .mapv(|c| LongitudeConvention::Signed.wrap(c))
                .to_vec();
            (lon_name.to_string(), lon_dim.to_string(), remapped)
        };

        let mut order: Vec<usize> = (0..remapped.len()).collect();
        order.sort_by(|a, b| remapped[*a].total_cmp(&remapped[*b]));
        event!(
            Level::DEBUG,
            dataset = %self.id,
            "remapping longitude {} from [0, 360) to [-180, 180)",
            lon_dim
        );

        for (name, variable) in self.coords.iter_mut().chain(self.data_vars.iter_mut()) {
            if *name == lon_name {
                let values = order.iter().map(|i| remapped[*i]).collect::<Array1<f64>>();
                variable.data = values.into_dyn();
            } else if let Some(axis) = variable.axis(&lon_dim) {
                variable.data = variable.data.select(Axis(axis), &order);
            }
        }
        self
    }
}

fn check_dimensions<'a>(
    variables: impl Iterator<Item = (&'a String, &'a Variable)>,
) -> Result<(), String> {
    let mut lengths: HashMap<&str, usize> = HashMap::new();
    for (name, variable) in variables {
        for (dim, length) in variable.dims.iter().zip(variable.data.shape()) {
            let expected = *lengths.entry(dim.as_str()).or_insert(*length);
            if expected != *length {
                return Err(format!(
                    "variable {name} has length {length} along {dim}, expected {expected}"
                ));
            }
        }
    }
    Ok(())
}

/// Dataset in xarray's dictionary layout
#[derive(Debug, Deserialize)]
struct DatasetDict {
    #[serde(default)]
    attrs: Map<String, Value>,
    #[serde(default)]
    coords: std::collections::HashMap<String, VariableDict>,
    #[serde(default)]
    data_vars: std::collections::HashMap<String, VariableDict>,
}

/// Variable in xarray's dictionary layout
#[derive(Debug, Deserialize)]
struct VariableDict {
    dims: Vec<String>,
    #[serde(default)]
    attrs: Map<String, Value>,
    data: Value,
}

fn decode_variables(
    id: &str,
    variables: std::collections::HashMap<String, VariableDict>,
) -> Result<HashMap<String, Variable>, RegionMeanError> {
    let invalid = |name: &str, reason: String| RegionMeanError::DatasetInvalid {
        dataset_id: id.to_string(),
        reason: format!("variable {name}: {reason}"),
    };
    let mut decoded = HashMap::with_capacity(variables.len());
    for (name, variable) in variables {
        let data = match decode_data(&variable.data) {
            Ok(data) => data,
            Err(DecodeError::NonNumeric) => {
                event!(
                    Level::DEBUG,
                    dataset = id,
                    "skipping non-numeric variable {}",
                    name
                );
                continue;
            }
            Err(DecodeError::Ragged) => return Err(invalid(&name, "ragged data".to_string())),
            Err(DecodeError::Shape(err)) => return Err(RegionMeanError::ShapeInvalid(err)),
        };
        let variable =
            Variable::new(variable.dims, data, variable.attrs).map_err(|err| invalid(&name, err))?;
        decoded.insert(name, variable);
    }
    Ok(decoded)
}

#[derive(Debug)]
enum DecodeError {
    NonNumeric,
    Ragged,
    Shape(ndarray::ShapeError),
}

/// Decode nested JSON lists into an array, inferring the shape from the nesting.
fn decode_data(data: &Value) -> Result<ArrayD<f64>, DecodeError> {
    let mut shape = Vec::new();
    let mut leaf_depth = None;
    let mut values = Vec::new();
    flatten_into(data, 0, &mut shape, &mut leaf_depth, &mut values)?;
    if leaf_depth.is_none() && !shape.is_empty() {
        // An empty list: the inner dimensions cannot be known, so they all have length zero.
        shape.truncate(1);
    }
    ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(DecodeError::Shape)
}

fn flatten_into(
    value: &Value,
    depth: usize,
    shape: &mut Vec<usize>,
    leaf_depth: &mut Option<usize>,
    values: &mut Vec<f64>,
) -> Result<(), DecodeError> {
    match value {
        Value::Array(items) => {
            if leaf_depth.is_some_and(|leaf| depth >= leaf) {
                return Err(DecodeError::Ragged);
            }
            if depth == shape.len() {
                shape.push(items.len());
            } else if shape[depth] != items.len() {
                return Err(DecodeError::Ragged);
            }
            for item in items {
                flatten_into(item, depth + 1, shape, leaf_depth, values)?;
            }
            Ok(())
        }
        Value::Number(_) | Value::Null => {
            match leaf_depth {
                Some(leaf) if *leaf != depth => return Err(DecodeError::Ragged),
                Some(_) => (),
                None => {
                    if depth != shape.len() {
                        return Err(DecodeError::Ragged);
                    }
                    *leaf_depth = Some(depth);
                }
            }
            values.push(value.as_f64().unwrap_or(f64::NAN));
            Ok(())
        }
        _ => Err(DecodeError::NonNumeric),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils;
    use ndarray::{array, Array2};
    use serde_json::json;

    fn decode(value: Value) -> GriddedDataset {
        GriddedDataset::from_json("test", value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn from_json_grid() {
        let dataset = decode(json!({
            "attrs": {"title": "test"},
            "coords": {
                "lat": {"dims": ["lat"], "attrs": {"units": "degrees_north"}, "data": [10, 20]},
                "lon": {"dims": ["lon"], "data": [100.0, 110.0, 120.0]},
                "time": {"dims": ["time"], "data": ["2013-01-01T00:00:00"]}
            },
            "data_vars": {
                "temp": {
                    "dims": ["time", "lat", "lon"],
                    "attrs": {"_FillValue": -999},
                    "data": [[[1, 2, null], [4, -999, 6]]]
                }
            }
        }));
        assert_eq!("test", dataset.id);
        assert_eq!(Some(&json!("test")), dataset.attrs.get("title"));
        // Non-numeric time coordinate is skipped.
        assert_eq!(2, dataset.coords.len());
        let temp = dataset.variable("temp").unwrap();
        assert_eq!(&[1, 2, 3], temp.data.shape());
        assert!(temp.data[[0, 0, 2]].is_nan());
        assert_eq!(Some(Missing::MissingValue(-999.0)), temp.missing);
        assert_eq!(Some(1), temp.axis("lat"));
        assert_eq!(None, temp.axis("depth"));
    }

    #[test]
    fn from_json_scalar() {
        let dataset = decode(json!({
            "data_vars": {"answer": {"dims": [], "data": 42}}
        }));
        let answer = dataset.variable("answer").unwrap();
        assert_eq!(0, answer.data.ndim());
        assert_eq!(42.0, answer.data[IxDyn(&[])]);
    }

    #[test]
    fn from_json_empty_list() {
        let dataset = decode(json!({
            "coords": {"lat": {"dims": ["lat"], "data": []}}
        }));
        assert_eq!(&[0], dataset.coords["lat"].data.shape());
    }

    #[test]
    fn from_json_ragged() {
        let json = json!({
            "data_vars": {"temp": {"dims": ["lat", "lon"], "data": [[1, 2], [3]]}}
        });
        let err = GriddedDataset::from_json("test", json.to_string().as_bytes()).unwrap_err();
        assert_eq!("invalid dataset test: variable temp: ragged data", err.to_string());
    }

    #[test]
    fn from_json_mixed_depth() {
        let json = json!({
            "data_vars": {"temp": {"dims": ["lat", "lon"], "data": [1, [2]]}}
        });
        let err = GriddedDataset::from_json("test", json.to_string().as_bytes()).unwrap_err();
        assert_eq!("invalid dataset test: variable temp: ragged data", err.to_string());
    }

    #[test]
    fn from_json_dims_mismatch() {
        let json = json!({
            "data_vars": {"temp": {"dims": ["lat"], "data": [[1, 2], [3, 4]]}}
        });
        let err = GriddedDataset::from_json("test", json.to_string().as_bytes()).unwrap_err();
        assert_eq!(
            "invalid dataset test: variable temp: 1 dimension names given for an array with 2 axes",
            err.to_string()
        );
    }

    #[test]
    fn from_json_length_mismatch() {
        let json = json!({
            "coords": {"lat": {"dims": ["lat"], "data": [10, 20, 30]}},
            "data_vars": {"temp": {"dims": ["lat"], "data": [1, 2]}}
        });
        let err = GriddedDataset::from_json("test", json.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, RegionMeanError::DatasetInvalid { .. }), "{err}");
    }

    #[test]
    fn from_json_invalid_json() {
        let err = GriddedDataset::from_json("test", b"{").unwrap_err();
        assert!(matches!(err, RegionMeanError::DatasetDecode(_)), "{err}");
    }

    #[test]
    fn variable_falls_back_to_coords() {
        let dataset = test_utils::get_test_dataset();
        assert!(dataset.variable("temp").is_some());
        assert!(dataset.variable("lat").is_some());
        assert!(dataset.variable("foo").is_none());
    }

    #[test]
    fn spatial_axes_by_name() {
        let dataset = test_utils::get_test_dataset();
        let axes = dataset.spatial_axes().unwrap();
        assert_eq!("lat", axes.lat_dim);
        assert_eq!("lon", axes.lon_dim);
        assert_eq!(array![10.0, 20.0, 30.0], axes.lat);
        assert_eq!(array![100.0, 110.0, 120.0], axes.lon);
        assert_eq!(LongitudeConvention::Signed, axes.longitude_convention());
    }

    #[test]
    fn spatial_axes_by_attrs() {
        let dataset = decode(json!({
            "coords": {
                "y": {"dims": ["y"], "attrs": {"standard_name": "latitude"}, "data": [0, 1]},
                "x": {"dims": ["x"], "attrs": {"units": "degrees_east"}, "data": [0, 1]}
            }
        }));
        let axes = dataset.spatial_axes().unwrap();
        assert_eq!("y", axes.lat_dim);
        assert_eq!("x", axes.lon_dim);
    }

    #[test]
    fn spatial_axes_missing() {
        let dataset = decode(json!({
            "coords": {"lat": {"dims": ["lat"], "data": [0, 1]}}
        }));
        let err = dataset.spatial_axes().unwrap_err();
        assert!(matches!(err, RegionMeanError::MissingSpatialAxes));
    }

    #[test]
    fn spatial_axes_2d_coordinate() {
        let dataset = decode(json!({
            "coords": {
                "lat": {"dims": ["y", "x"], "data": [[0, 1], [0, 1]]},
                "lon": {"dims": ["x"], "data": [0, 1]}
            }
        }));
        assert!(dataset.spatial_axes().is_err());
    }

    #[test]
    fn longitude_convention_detect() {
        assert_eq!(
            LongitudeConvention::Signed,
            LongitudeConvention::detect(&[-180.0, 0.0, 180.0])
        );
        assert_eq!(
            LongitudeConvention::Positive,
            LongitudeConvention::detect(&[0.0, 200.0])
        );
        assert_eq!("[0, 360)", LongitudeConvention::Positive.to_string());
    }

    #[test]
    fn longitude_convention_wrap() {
        let signed = LongitudeConvention::Signed;
        assert_eq!(-160.0, signed.wrap(200.0));
        assert_eq!(-180.0, signed.wrap(180.0));
        assert_eq!(0.0, signed.wrap(360.0));
        assert_eq!(10.0, signed.wrap(10.0));
        let positive = LongitudeConvention::Positive;
        assert_eq!(200.0, positive.wrap(-160.0));
        assert_eq!(10.0, positive.wrap(10.0));
        assert_eq!(0.0, positive.wrap(360.0));
        assert_eq!(-180.0, signed.west());
        assert_eq!(0.0, positive.west());
    }

    #[test]
    fn normalize_longitude_reorders_data() {
        let dataset = decode(json!({
            "coords": {
                "lat": {"dims": ["lat"], "data": [0, 10]},
                "lon": {"dims": ["lon"], "data": [0, 90, 180, 270]}
            },
            "data_vars": {
                "temp": {"dims": ["lat", "lon"], "data": [[1, 2, 3, 4], [5, 6, 7, 8]]},
                "zonal": {"dims": ["lat"], "data": [1, 2]}
            }
        }))
        .normalize_longitude();
        assert_eq!(
            array![-180.0, -90.0, 0.0, 90.0].into_dyn(),
            dataset.coords["lon"].data
        );
        let expected: Array2<f64> = array![[3.0, 4.0, 1.0, 2.0], [7.0, 8.0, 5.0, 6.0]];
        assert_eq!(expected.into_dyn(), dataset.data_vars["temp"].data);
        assert_eq!(array![1.0, 2.0].into_dyn(), dataset.data_vars["zonal"].data);
    }

    #[test]
    fn normalize_longitude_with_auxiliary_coordinate() {
        // Names sorting before and after the longitude coordinate.
        for aux in ["a", "cell_id", "lon_bnds", "x", "zz"] {
            let dataset = decode(json!({
                "coords": {
                    "lat": {"dims": ["lat"], "data": [0]},
                    "lon": {"dims": ["lon"], "data": [0, 90, 180, 270]},
                    aux: {"dims": ["lon"], "data": [1, 2, 3, 4]}
                },
                "data_vars": {
                    "temp": {"dims": ["lat", "lon"], "data": [[1, 2, 3, 4]]}
                }
            }))
            .normalize_longitude();
            assert_eq!(
                array![-180.0, -90.0, 0.0, 90.0].into_dyn(),
                dataset.coords["lon"].data,
                "{aux}"
            );
            assert_eq!(
                array![3.0, 4.0, 1.0, 2.0].into_dyn(),
                dataset.coords[aux].data,
                "{aux}"
            );
            assert_eq!(
                LongitudeConvention::Signed,
                dataset.spatial_axes().unwrap().longitude_convention()
            );
        }
    }

    #[test]
    fn normalize_longitude_by_attrs() {
        let dataset = decode(json!({
            "coords": {
                "y": {"dims": ["y"], "attrs": {"standard_name": "latitude"}, "data": [0]},
                "x": {"dims": ["x"], "attrs": {"units": "degrees_east"}, "data": [90, 270]},
                "a": {"dims": ["x"], "data": [1, 2]}
            }
        }))
        .normalize_longitude();
        assert_eq!(array![-90.0, 90.0].into_dyn(), dataset.coords["x"].data);
        assert_eq!(array![2.0, 1.0].into_dyn(), dataset.coords["a"].data);
    }

    #[test]
    fn normalize_longitude_signed_unchanged() {
        let dataset = test_utils::get_test_dataset();
        let normalized = dataset.clone().normalize_longitude();
        assert_eq!(dataset.coords, normalized.coords);
        assert_eq!(dataset.data_vars, normalized.data_vars);
    }
}
