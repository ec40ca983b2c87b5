//! This crate provides a regional statistics server for gridded climate datasets. Given a
//! dataset, a variable and a geographic region, it computes the unweighted mean (or count, sum,
//! minimum or maximum) of the variable over the grid cells whose centre lies inside the region.
//!
//! The region is configured at start-up from a shapefile, a GeoJSON file or a bounding box, and
//! served under its own name:
//!
//! ```text
//! GET  /datasets/<dataset id>/<region>/<variable>/mean
//! GET  /datasets/<dataset id>/<region>/polygon
//! GET  /datasets/<dataset id>/<variable>/mean
//! POST /datasets/<dataset id>/region/<operation>
//! ```
//!
//! The server is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of JSON datasets, request and response data.
//! * [ndarray] provides [NumPy](https://numpy.org)-like n-dimensional arrays used in numerical
//!   computation.
//! * [geo] and [geojson] describe region outlines, read from GeoJSON or [shapefile]s.

pub mod aggregator;
pub mod app;
pub mod app_state;
pub mod cli;
pub mod dataset;
pub mod dataset_store;
pub mod error;
pub mod mask;
pub mod metrics;
pub mod models;
pub mod operation;
pub mod operations;
pub mod region;
pub mod server;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod types;
pub mod validated_json;
