//! Region masks over latitude/longitude grids.

use crate::region::Region;

use ndarray::{Array2, ArrayView1, ArrayView2};

/// Boolean grid marking the cells whose centre lies inside a region.
///
/// The mask has shape `(nlat, nlon)`. Cell `(i, j)` is set when the point `(lon[j], lat[i])` is
/// inside the region.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionMask {
    cells: Array2<bool>,
}

impl RegionMask {
    /// Compute the mask of a region over a grid.
    ///
    /// # Arguments
    ///
    /// * `region`: Region to mask with. Must use the same longitude convention as `lon`
    /// * `lat`: Latitude coordinate values
    /// * `lon`: Longitude coordinate values
    pub fn new(region: &Region, lat: ArrayView1<f64>, lon: ArrayView1<f64>) -> Self {
        let cells = Array2::from_shape_fn((lat.len(), lon.len()), |(i, j)| {
            region.contains(lon[j], lat[i])
        });
        RegionMask { cells }
    }

    /// Mask cells, indexed by (latitude, longitude).
    pub fn cells(&self) -> ArrayView2<'_, bool> {
        self.cells.view()
    }

    /// Number of cells inside the region.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|inside| **inside).count()
    }

    /// Returns whether no cell is inside the region.
    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|inside| *inside)
    }
}
