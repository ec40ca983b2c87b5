use crate::dataset::{GriddedDataset, Variable};
use crate::error::RegionMeanError;
use crate::mask::RegionMask;
use crate::models;
use crate::region::Region;
use crate::types::Missing;

use ndarray::{ArrayViewD, Axis, IxDyn};
use tracing::{event, Level};

/// The values of a variable that an operation aggregates.
///
/// A selection is either the whole variable, or the cells of the variable that lie inside a region
/// mask. Any non-spatial dimensions (e.g. time) are aggregated over as well.
#[derive(Debug)]
pub struct Selection<'a> {
    variable: &'a Variable,
    masked: Option<Masked>,
}

#[derive(Debug)]
struct Masked {
    mask: RegionMask,
    lat_axis: usize,
    lon_axis: usize,
}

impl<'a> Selection<'a> {
    /// Select all values of a variable.
    pub fn all(
        dataset: &'a GriddedDataset,
        variable_name: &str,
    ) -> Result<Self, RegionMeanError> {
        let variable = lookup(dataset, variable_name)?;
        Ok(Selection {
            variable,
            masked: None,
        })
    }

    /// Select the values of a variable inside a region.
    ///
    /// The region is remapped onto the dataset's longitude convention if necessary.
    ///
    /// # Arguments
    ///
    /// * `dataset`: Dataset containing the variable
    /// * `variable_name`: Name of the variable
    /// * `region`: Region to select
    pub fn region(
        dataset: &'a GriddedDataset,
        variable_name: &str,
        region: &Region,
    ) -> Result<Self, RegionMeanError> {
        let variable = lookup(dataset, variable_name)?;
        let axes = dataset.spatial_axes()?;
        let (Some(lat_axis), Some(lon_axis)) = (variable.axis(axes.lat_dim), variable.axis(axes.lon_dim))
        else {
            return Err(RegionMeanError::VariableNotSpatial {
                variable: variable_name.to_string(),
            });
        };
        let convention = axes.longitude_convention();
        let aligned = region.to_convention(convention);
        if aligned.is_some() {
            event!(
                Level::DEBUG,
                region = region.name(),
                "remapped region onto dataset longitude convention {}",
                convention
            );
        }
        let mask = RegionMask::new(aligned.as_ref().unwrap_or(region), axes.lat, axes.lon);
        Ok(Selection {
            variable,
            masked: Some(Masked {
                mask,
                lat_axis,
                lon_axis,
            }),
        })
    }

    /// Region mask, if the selection is masked.
    pub fn mask(&self) -> Option<&RegionMask> {
        self.masked.as_ref().map(|masked| &masked.mask)
    }

    /// Returns an iterator over the selected values.
    ///
    /// NaN values and values flagged by the variable's missing data descriptor are skipped.
    pub fn values(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        let filter = value_filter(self.variable.missing.as_ref());
        match &self.masked {
            None => Box::new(self.variable.data.iter().copied().filter(filter)),
            Some(masked) => {
                let view = spatial_first(self.variable.data.view(), masked.lat_axis, masked.lon_axis);
                let values = masked
                    .mask
                    .cells()
                    .indexed_iter()
                    .filter(|(_, inside)| **inside)
                    .flat_map(move |((i, j), _)| {
                        view.clone()
                            .index_axis_move(Axis(0), i)
                            .index_axis_move(Axis(0), j)
                            .into_iter()
                            .copied()
                    })
                    .collect::<Vec<_>>();
                Box::new(values.into_iter().filter(filter))
            }
        }
    }
}

fn lookup<'a>(
    dataset: &'a GriddedDataset,
    variable_name: &str,
) -> Result<&'a Variable, RegionMeanError> {
    dataset
        .variable(variable_name)
        .ok_or_else(|| RegionMeanError::VariableNotFound {
            variable: variable_name.to_string(),
        })
}

/// Reorder axes so that latitude and longitude come first.
fn spatial_first(view: ArrayViewD<'_, f64>, lat_axis: usize, lon_axis: usize) -> ArrayViewD<'_, f64> {
    let mut order = vec![lat_axis, lon_axis];
    order.extend((0..view.ndim()).filter(|axis| *axis != lat_axis && *axis != lon_axis));
    view.permuted_axes(IxDyn(&order))
}

/// Returns a filter function that can be used with the Iterator trait's filter() method to filter
/// out NaN and missing data.
fn value_filter(missing: Option<&Missing<f64>>) -> impl Fn(&f64) -> bool + '_ {
    move |x: &f64| !x.is_nan() && !missing.is_some_and(|missing| missing.is_missing(x))
}

/// Trait for aggregation operations.
///
/// This forms the contract between the API layer and operations.
pub trait Operation {
    /// Execute the operation.
    ///
    /// Returns a [models::Aggregate] with the aggregated value and the number of values that
    /// contributed to it.
    ///
    /// # Arguments
    ///
    /// * `selection`: Values to aggregate
    fn execute(selection: &Selection) -> models::Aggregate;
}
