use crate::dataset::{GriddedDataset, Variable};
use crate::models::BoundingBox;
use crate::region::Region;

use hashbrown::HashMap;
use ndarray::{array, ArrayD};
use serde_json::Map;

fn variable(dims: &[&str], data: ArrayD<f64>) -> Variable {
    let dims = dims.iter().map(|dim| dim.to_string()).collect();
    Variable::new(dims, data, Map::new()).unwrap()
}

/// Create a 3x3 dataset with a `temp` variable over (lat, lon).
///
/// * lat = [10, 20, 30]
/// * lon = [100, 110, 120]
/// * temp = [[1, 2, 3], [4, 5, 6], [7, 8, 9]]
pub(crate) fn get_test_dataset() -> GriddedDataset {
    let mut coords = HashMap::new();
    coords.insert(
        "lat".to_string(),
        variable(&["lat"], array![10.0, 20.0, 30.0].into_dyn()),
    );
    coords.insert(
        "lon".to_string(),
        variable(&["lon"], array![100.0, 110.0, 120.0].into_dyn()),
    );
    let mut data_vars = HashMap::new();
    data_vars.insert(
        "temp".to_string(),
        variable(
            &["lat", "lon"],
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]].into_dyn(),
        ),
    );
    GriddedDataset::new("test", Map::new(), coords, data_vars).unwrap()
}

/// Create a bounding box region.
pub(crate) fn get_test_region(
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
) -> Region {
    let bbox = BoundingBox {
        min_lon,
        min_lat,
        max_lon,
        max_lat,
    };
    Region::from_bbox("test", &bbox).unwrap()
}
