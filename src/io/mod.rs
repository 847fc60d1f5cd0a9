//! Input/output helpers.
//!
//! - model grid loading (`model`)
//! - observation tables (`observations`)
//! - AB-to-Vega and distance-modulus corrections (`corrections`)
//! - chain / run / observation exports (`export`)

pub mod corrections;
pub mod export;
pub mod model;
pub mod observations;

pub use corrections::MagnitudeCorrection;
pub use export::*;
pub use model::{ModelLoad, load_model_dir, model_files, read_model_file};
pub use observations::{ObservationLoad, data_columns, load_observations};

/// A row-level problem encountered while loading a table.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}
