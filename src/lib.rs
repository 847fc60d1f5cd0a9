//! `cmdfit` library crate.
//!
//! The binary (`cmdfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., notebooks, batch drivers)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod isochrone;
pub mod math;
pub mod plot;
pub mod report;
pub mod sampler;
pub mod stats;
pub mod tui;
