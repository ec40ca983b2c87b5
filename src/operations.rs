//! Aggregation operations.
//!
//! Each operation is implemented as a struct that implements the
//! [Operation](crate::operation::Operation) trait.

use crate::models::{Aggregate, AggregationResult};
use crate::operation::{Operation, Selection};

/// Return the number of selected non-missing values.
pub struct Count {}

impl Operation for Count {
    fn execute(selection: &Selection) -> Aggregate {
        let count = selection.values().count();
        Aggregate::new(AggregationResult::Value(count as f64), count)
    }
}

/// Return the maximum of selected values.
pub struct Max {}

impl Operation for Max {
    fn execute(selection: &Selection) -> Aggregate {
        let (max, count) = selection
            .values()
            .fold((None, 0), |(max, count), value: f64| {
                (Some(max.map_or(value, |max: f64| max.max(value))), count + 1)
            });
        Aggregate::new(
            max.map_or(AggregationResult::Undefined, AggregationResult::from_f64),
            count,
        )
    }
}

/// Return the unweighted arithmetic mean of selected values.
pub struct Mean {}

impl Operation for Mean {
    fn execute(selection: &Selection) -> Aggregate {
        let (sum, count) = selection
            .values()
            .fold((0.0, 0), |(sum, count), value| (sum + value, count + 1));
        let mean = if count == 0 {
            AggregationResult::Undefined
        } else {
            AggregationResult::from_f64(sum / count as f64)
        };
        Aggregate::new(mean, count)
    }
}

/// Return the minimum of selected values.
pub struct Min {}

impl Operation for Min {
    fn execute(selection: &Selection) -> Aggregate {
        let (min, count) = selection
            .values()
            .fold((None, 0), |(min, count), value: f64| {
                (Some(min.map_or(value, |min: f64| min.min(value))), count + 1)
            });
        Aggregate::new(
            min.map_or(AggregationResult::Undefined, AggregationResult::from_f64),
            count,
        )
    }
}

/// Return the sum of selected values.
///
/// The sum of an empty selection is zero.
pub struct Sum {}

impl Operation for Sum {
    fn execute(selection: &Selection) -> Aggregate {
        let (sum, count) = selection
            .values()
            .fold((0.0, 0), |(sum, count), value| (sum + value, count + 1));
        Aggregate::new(AggregationResult::from_f64(sum), count)
    }
}
