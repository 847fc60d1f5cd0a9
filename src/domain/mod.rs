//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - fit modes and parameter vectors (`FitMode`, `Params`)
//! - observed photometry (`ObservationSet`)
//! - run configuration and outputs (`FitConfig`, `ParamSummary`, `RunFile`)

pub mod observations;
pub mod types;

pub use observations::ObservationSet;
pub use types::*;
