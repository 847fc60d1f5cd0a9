//! Command-line parsing for the isochrone fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the statistics and sampling code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{BandSpec, ModeKind};
use crate::stats::{DEFAULT_MASS_NODES, DEFAULT_P_FIELD};

pub mod picker;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "cmdfit",
    version,
    about = "Bayesian metallicity / age / mass fits against isochrone grids"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sample the posterior for a cluster or a single star and print the summary.
    Fit(FitArgs),
    /// Print model magnitudes at one point of (metallicity, age, mass).
    Lookup(LookupArgs),
    /// Draw a synthetic cluster from the grids and write it as CSV.
    Simulate(SimulateArgs),
    /// Run a fit and browse traces and the CMD in a terminal UI.
    Tui(FitArgs),
}

/// Where the model grids come from and how their magnitudes are corrected.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Directory holding one isochrone table per metallicity.
    #[arg(short = 'm', long, env = "CMDFIT_MODEL_DIR", value_name = "DIR")]
    pub model_dir: PathBuf,

    /// Extension of model grid files.
    #[arg(long, default_value = "cmd")]
    pub model_ext: String,

    /// AB-to-Vega offset table (band name first, offset last on each line).
    #[arg(long, env = "CMDFIT_AB_TO_VEGA", value_name = "FILE")]
    pub corrections: Option<PathBuf>,

    /// Distance modulus added to every model magnitude.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub distance_modulus: f64,
}

/// Options for fitting (also used by the TUI).
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Observation file (CSV or whitespace table). Prompted for when omitted.
    #[arg(short = 'd', long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    /// Band mapping MODEL=DATA[:ERR], repeatable (e.g. Bessell_V=V:eV).
    #[arg(short = 'b', long = "band", required = true, value_name = "MODEL=DATA[:ERR]")]
    pub bands: Vec<BandSpec>,

    /// Fit the whole population or a single star.
    #[arg(long, value_enum, default_value_t = ModeKind::Population)]
    pub mode: ModeKind,

    /// Row of the star to fit in single-star mode (0-based, after filtering).
    #[arg(long, default_value_t = 0)]
    pub star: usize,

    /// Sample an unresolved companion mass (single-star mode).
    #[arg(long)]
    pub binary: bool,

    /// Sample the star's field probability (single-star mode).
    #[arg(long)]
    pub fit_field: bool,

    /// Fixed field-star probability when it is not sampled.
    #[arg(long, default_value_t = DEFAULT_P_FIELD)]
    pub p_field: f64,

    /// Drop stars brighter than this magnitude (any band).
    #[arg(long, allow_negative_numbers = true)]
    pub mag_min: Option<f64>,

    /// Drop stars fainter than this magnitude (any band).
    #[arg(long, allow_negative_numbers = true)]
    pub mag_max: Option<f64>,

    /// Drop stars with a smaller uncertainty (any band).
    #[arg(long)]
    pub min_err: Option<f64>,

    /// Drop stars with a larger uncertainty (any band).
    #[arg(long)]
    pub max_err: Option<f64>,

    /// Mass nodes used to marginalize unknown masses in population fits.
    #[arg(long, default_value_t = DEFAULT_MASS_NODES)]
    pub mass_nodes: usize,

    /// Number of walkers (default: 6 for population fits, 16 for single stars).
    #[arg(short = 'w', long)]
    pub walkers: Option<usize>,

    /// Steps per walker.
    #[arg(short = 's', long, default_value_t = 400)]
    pub steps: usize,

    /// Steps discarded before computing the summaries.
    #[arg(long, default_value_t = 100)]
    pub burn_in: usize,

    /// Random seed for walker initialization and sampling.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Start jitter as a fraction of each parameter's allowed range.
    #[arg(long, default_value_t = 0.01)]
    pub jitter: f64,

    /// Starting [Fe/H] (default: middle of the grids).
    #[arg(long, allow_negative_numbers = true)]
    pub start_feh: Option<f64>,

    /// Starting log age (default: middle of the grids).
    #[arg(long)]
    pub start_age: Option<f64>,

    /// Starting primary mass.
    #[arg(long)]
    pub start_mass: Option<f64>,

    /// Starting companion mass.
    #[arg(long)]
    pub start_secondary: Option<f64>,

    /// Starting field probability.
    #[arg(long)]
    pub start_p_field: Option<f64>,

    /// Render an ASCII CMD in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 30)]
    pub height: usize,

    /// Export every chain sample to CSV.
    #[arg(long = "export-chain", value_name = "CSV")]
    pub export_chain: Option<PathBuf>,

    /// Export the run configuration and summaries to JSON.
    #[arg(long = "export-run", value_name = "JSON")]
    pub export_run: Option<PathBuf>,
}

/// Options for a single magnitude lookup.
#[derive(Debug, Parser, Clone)]
pub struct LookupArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Model band name, repeatable.
    #[arg(short = 'b', long = "band", required = true)]
    pub bands: Vec<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub feh: f64,

    /// log10 age in years.
    #[arg(long)]
    pub age: f64,

    /// Initial mass (solar masses).
    #[arg(long)]
    pub mass: f64,

    /// Mass of an unresolved companion.
    #[arg(long)]
    pub secondary: Option<f64>,
}

/// Options for drawing a synthetic cluster.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Model band name, repeatable.
    #[arg(short = 'b', long = "band", required = true)]
    pub bands: Vec<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub feh: f64,

    /// log10 age in years.
    #[arg(long)]
    pub age: f64,

    /// Number of stars.
    #[arg(short = 'n', long, default_value_t = 100)]
    pub stars: usize,

    /// Gaussian photometric noise (mag).
    #[arg(long, default_value_t = crate::io::observations::NOMINAL_UNCERTAINTY)]
    pub sigma: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV path.
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: PathBuf,
}
