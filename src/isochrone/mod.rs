//! Isochrone model grids and magnitude lookups.
//!
//! - [`grid`]: one grid per metallicity, grouped into isochrone blocks by age
//! - [`accessor`]: isochrone selection, mass and age interpolation
//! - [`metallicity`]: the sorted set of grids and cross-metallicity lookups

pub mod accessor;
pub mod grid;
pub mod metallicity;

pub use accessor::{Isochrone, interpolate_across_age};
pub use grid::{IsochroneBlock, ModelGrid, ModelRow};
pub use metallicity::GridSet;
