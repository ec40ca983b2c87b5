//! Missing data descriptors
//!
//! Variables can contain missing data which should be ignored during aggregation. The CF
//! conventions describe missing data with variable attributes. Currently we support:
//!
//! * A single missing value (`_FillValue` or `missing_value`)
//! * Multiple missing values (`_FillValue` and `missing_value`, or a list of `missing_value`s)
//! * A valid minimum value (`valid_min`)
//! * A valid maximum value (`valid_max`)
//! * A valid range of values (`valid_range`, or both `valid_min` and `valid_max`)
//!
//! NaN is always treated as missing, independently of the descriptor.

use serde_json::{Map, Value};

/// Missing data
///
/// This enum can represent all known descriptions of missing data used in NetCDF4 files.
#[derive(Clone, Debug, PartialEq)]
pub enum Missing<T> {
    /// A single missing value
    MissingValue(T),
    /// Multple missing values
    MissingValues(Vec<T>),
    /// Valid minimum
    ValidMin(T),
    /// Valid maxiumum
    ValidMax(T),
    /// Valid range
    ValidRange(T, T),
}

impl Missing<f64> {
    /// Filter function to check whether the provided value is a 'missing' value
    pub fn is_missing(&self, x: &f64) -> bool {
        match self {
            Missing::MissingValue(value) => x == value,
            Missing::MissingValues(values) => values.contains(x),
            Missing::ValidMin(min) => x < min,
            Missing::ValidMax(max) => x > max,
            Missing::ValidRange(min, max) => x < min || x > max,
        }
    }

    /// Derive a missing data descriptor from CF variable attributes.
    ///
    /// Fill values take precedence over valid bounds, which mirrors how CF aware readers mask
    /// data. Returns `None` when no usable attribute is present.
    ///
    /// # Arguments
    ///
    /// * `attrs`: Variable attributes
    pub fn from_attrs(attrs: &Map<String, Value>) -> Option<Self> {
        let mut fill_values: Vec<f64> = Vec::new();
        for key in ["_FillValue", "missing_value"] {
            match attrs.get(key) {
                Some(Value::Array(values)) => {
                    fill_values.extend(values.iter().filter_map(Value::as_f64))
                }
                Some(value) => fill_values.extend(value.as_f64()),
                None => (),
            }
        }
        fill_values.dedup();
        match fill_values.len() {
            0 => (),
            1 => return Some(Missing::MissingValue(fill_values[0])),
            _ => return Some(Missing::MissingValues(fill_values)),
        }

        if let Some(Value::Array(range)) = attrs.get("valid_range") {
            if let [min, max] = range.as_slice() {
                if let (Some(min), Some(max)) = (min.as_f64(), max.as_f64()) {
                    return Some(Missing::ValidRange(min, max));
                }
            }
        }
        let valid_min = attrs.get("valid_min").and_then(Value::as_f64);
        let valid_max = attrs.get("valid_max").and_then(Value::as_f64);
        match (valid_min, valid_max) {
            (Some(min), Some(max)) => Some(Missing::ValidRange(min, max)),
            (Some(min), None) => Some(Missing::ValidMin(min)),
            (None, Some(max)) => Some(Missing::ValidMax(max)),
            (None, None) => None,
        }
    }
}
