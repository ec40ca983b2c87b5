//! Data descriptor types.

pub mod missing;

pub use crate::types::missing::Missing;
