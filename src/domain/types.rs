//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - passed between the likelihood, the sampler driver and the reports
//! - exported to JSON/CSV
//! - echoed back in the run file

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SamplerError;

/// Which kind of fit to run (CLI-level choice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    /// Whole cluster: metallicity and age only.
    Population,
    /// One star: metallicity, age, mass(es) and optionally its field probability.
    Single,
}

/// Which optional parameters a single-star fit samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleStarLayout {
    /// Row of the star in the observation set.
    pub star: usize,
    /// Sample an unresolved companion mass.
    pub fit_secondary: bool,
    /// Sample the star's field probability instead of using the fixed value.
    pub fit_field: bool,
}

/// Fit mode. Owns the mapping between [`Params`] and the sampler's flat vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    Population,
    SingleStar(SingleStarLayout),
}

impl FitMode {
    /// Number of sampled parameters.
    pub fn ndim(&self) -> usize {
        match self {
            FitMode::Population => 2,
            FitMode::SingleStar(layout) => {
                3 + usize::from(layout.fit_secondary) + usize::from(layout.fit_field)
            }
        }
    }

    /// Parameter names in vector order.
    pub fn param_names(&self) -> Vec<&'static str> {
        let mut names = vec!["feh", "log_age"];
        if let FitMode::SingleStar(layout) = self {
            names.push("primary_mass");
            if layout.fit_secondary {
                names.push("secondary_mass");
            }
            if layout.fit_field {
                names.push("p_field");
            }
        }
        names
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FitMode::Population => "population",
            FitMode::SingleStar(_) => "single star",
        }
    }

    /// Interpret a flat parameter vector.
    pub fn decode(&self, theta: &[f64]) -> Result<Params, SamplerError> {
        if theta.len() != self.ndim() {
            return Err(SamplerError::Dimension {
                expected: self.ndim(),
                got: theta.len(),
            });
        }
        Ok(match self {
            FitMode::Population => Params::Population(PopulationParams {
                feh: theta[0],
                age: theta[1],
            }),
            FitMode::SingleStar(layout) => {
                let mut rest = theta[3..].iter().copied();
                let secondary_mass = if layout.fit_secondary { rest.next() } else { None };
                let p_field = if layout.fit_field { rest.next() } else { None };
                Params::SingleStar(SingleStarParams {
                    feh: theta[0],
                    age: theta[1],
                    primary_mass: theta[2],
                    secondary_mass,
                    p_field,
                })
            }
        })
    }

    /// Flatten `params` in this mode's order.
    ///
    /// Optional values the mode does not sample are dropped; optional values the
    /// mode samples but `params` lacks are a dimension error.
    pub fn encode(&self, params: &Params) -> Result<Vec<f64>, SamplerError> {
        let out = match (self, params) {
            (FitMode::Population, Params::Population(p)) => vec![p.feh, p.age],
            (FitMode::SingleStar(layout), Params::SingleStar(p)) => {
                let mut v = vec![p.feh, p.age, p.primary_mass];
                if layout.fit_secondary {
                    v.extend(p.secondary_mass);
                }
                if layout.fit_field {
                    v.extend(p.p_field);
                }
                v
            }
            _ => Vec::new(),
        };
        if out.len() != self.ndim() {
            return Err(SamplerError::Dimension {
                expected: self.ndim(),
                got: out.len(),
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationParams {
    pub feh: f64,
    /// log10 age in years.
    pub age: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SingleStarParams {
    pub feh: f64,
    pub age: f64,
    pub primary_mass: f64,
    pub secondary_mass: Option<f64>,
    pub p_field: Option<f64>,
}

/// One point in parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Params {
    Population(PopulationParams),
    SingleStar(SingleStarParams),
}

impl Params {
    pub fn feh(&self) -> f64 {
        match self {
            Params::Population(p) => p.feh,
            Params::SingleStar(p) => p.feh,
        }
    }

    pub fn age(&self) -> f64 {
        match self {
            Params::Population(p) => p.age,
            Params::SingleStar(p) => p.age,
        }
    }
}

/// Mapping of one observed band onto a model band.
///
/// Parsed from `MODEL=DATA[:ERR]`, e.g. `Gaia_G_EDR3=phot_g:phot_g_err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSpec {
    /// Column name in the model grid.
    pub model: String,
    /// Magnitude column in the data file.
    pub data: String,
    /// Uncertainty column in the data file.
    pub error: Option<String>,
}

impl FromStr for BandSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (model, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("band '{s}' must look like MODEL=DATA[:ERR]"))?;
        let (data, error) = match rest.split_once(':') {
            Some((data, err)) => (data, Some(err.trim().to_string())),
            None => (rest, None),
        };
        let (model, data) = (model.trim(), data.trim());
        if model.is_empty() || data.is_empty() || error.as_deref() == Some("") {
            return Err(format!("band '{s}' has an empty column name"));
        }
        Ok(Self {
            model: model.to_string(),
            data: data.to_string(),
            error,
        })
    }
}

/// Magnitude / uncertainty cuts applied to observations before fitting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationFilter {
    pub mag_min: Option<f64>,
    pub mag_max: Option<f64>,
    pub min_uncertainty: Option<f64>,
    pub max_uncertainty: Option<f64>,
}

/// Optional starting point overrides (otherwise derived from the grids).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StartOverrides {
    pub feh: Option<f64>,
    pub age: Option<f64>,
    pub primary_mass: Option<f64>,
    pub secondary_mass: Option<f64>,
    pub p_field: Option<f64>,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus environment defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub model_dir: PathBuf,
    /// Extension of model grid files (without the dot).
    pub model_ext: String,
    pub data_path: PathBuf,
    pub bands: Vec<BandSpec>,

    /// AB-to-Vega correction table (optional).
    pub corrections: Option<PathBuf>,
    pub distance_modulus: f64,

    pub mode: FitMode,
    /// Fixed field probability (used when it is not sampled).
    pub p_field: f64,
    pub filter: ObservationFilter,
    /// Number of mass nodes when marginalizing unknown stellar masses.
    pub mass_nodes: usize,

    pub walkers: usize,
    pub steps: usize,
    pub burn_in: usize,
    pub seed: u64,
    pub jitter: f64,
    pub start: StartOverrides,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_chain: Option<PathBuf>,
    pub export_run: Option<PathBuf>,
}

/// Posterior summary of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSummary {
    pub name: String,
    pub q16: f64,
    pub median: f64,
    pub q84: f64,
}

impl ParamSummary {
    /// Half-width of the central 68% interval.
    pub fn sigma(&self) -> f64 {
        0.5 * (self.q84 - self.q16)
    }
}

/// A saved run (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub mode: FitMode,
    pub bands: Vec<BandSpec>,
    pub feh_grid: Vec<f64>,
    pub stars: usize,
    pub walkers: usize,
    pub steps: usize,
    pub burn_in: usize,
    pub seed: u64,
    pub p_field: f64,
    pub acceptance_fraction: f64,
    pub summaries: Vec<ParamSummary>,
}
