//! Regional aggregation entry points.

use crate::dataset::GriddedDataset;
use crate::error::RegionMeanError;
use crate::models::{Aggregate, AggregationResult, Operation};
use crate::operation::{self, Selection};
use crate::operations;
use crate::region::Region;

use tracing::{event, Level};

/// Compute the unweighted mean of a variable over the grid cells inside a region.
///
/// Cells are selected by their centre coordinates. NaN and missing values are excluded. If no
/// cell is selected, or the mean is not finite, the result is [AggregationResult::Undefined].
///
/// # Arguments
///
/// * `dataset`: Dataset containing the variable
/// * `variable_name`: Name of the variable
/// * `region`: Region to aggregate over
pub fn compute_mean(
    dataset: &GriddedDataset,
    variable_name: &str,
    region: &Region,
) -> Result<AggregationResult, RegionMeanError> {
    aggregate(Operation::Mean, dataset, variable_name, Some(region)).map(|result| result.value)
}

/// Apply an operation to a variable, optionally restricted to a region.
pub fn aggregate(
    operation: Operation,
    dataset: &GriddedDataset,
    variable_name: &str,
    region: Option<&Region>,
) -> Result<Aggregate, RegionMeanError> {
    let selection = match region {
        Some(region) => Selection::region(dataset, variable_name, region)?,
        None => Selection::all(dataset, variable_name)?,
    };
    let result = execute(operation, &selection);
    event!(
        Level::DEBUG,
        dataset = %dataset.id,
        variable = variable_name,
        region = region.map(Region::name),
        "{} over {} values: {:?}",
        operation,
        result.count,
        result.value
    );
    Ok(result)
}

fn execute(operation: Operation, selection: &Selection) -> Aggregate {
    use operation::Operation as _;
    match operation {
        Operation::Count => operations::Count::execute(selection),
        Operation::Max => operations::Max::execute(selection),
        Operation::Mean => operations::Mean::execute(selection),
        Operation::Min => operations::Min::execute(selection),
        Operation::Sum => operations::Sum::execute(selection),
    }
}
