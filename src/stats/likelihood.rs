//! Field-contaminated Gaussian likelihood.
//!
//! Each observed magnitude is modelled as a mixture of
//!
//! - a cluster member: Gaussian around the model magnitude, width = the quoted
//!   photometric uncertainty, weight `1 - P_field`
//! - a field star: uniform over the observed magnitude range of the band,
//!   weight `P_field`
//!
//! (van Dyk et al. 2009). The mixture is evaluated in log space so that large
//! residuals do not underflow to `ln 0` while the field term is non-zero.

use crate::domain::{ObservationSet, Params};
use crate::error::AppError;
use crate::isochrone::GridSet;
use crate::math::{log_space, log_sum_exp};
use crate::stats::priors::ln_primary_mass_prior;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Default field probability used when it is not sampled.
pub const DEFAULT_P_FIELD: f64 = 0.25;
/// Default number of mass nodes when stellar masses are marginalized.
pub const DEFAULT_MASS_NODES: usize = 40;

/// Field-star part of the mixture for one band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldTerm {
    pub p_field: f64,
    /// Probability density of a field star's magnitude.
    pub density: f64,
}

/// Log-likelihood of a single observed magnitude.
///
/// `model = None` means the parameters are impossible under the model grid and
/// gives `-inf` regardless of the field term.
pub fn star_ln_likelihood(observed: f64, sigma: f64, model: Option<f64>, field: FieldTerm) -> f64 {
    let Some(model) = model else {
        return f64::NEG_INFINITY;
    };
    if !(sigma.is_finite() && sigma > 0.0 && observed.is_finite() && model.is_finite()) {
        return f64::NEG_INFINITY;
    }
    let z = (observed - model) / sigma;
    let ln_gauss = -0.5 * z * z - sigma.ln() - LN_SQRT_2PI;

    let ln_cluster = (1.0 - field.p_field).ln() + ln_gauss;
    let ln_field = field.p_field.ln() + field.density.ln();
    log_sum_exp(&[ln_cluster, ln_field])
}

/// Uniform field-star magnitude densities, one per band.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDistribution {
    densities: Vec<f64>,
}

impl FieldDistribution {
    /// `1 / (max - min)` of each band's observed magnitudes.
    ///
    /// A band with fewer than two distinct magnitudes has density 0.
    pub fn from_observations(observations: &ObservationSet) -> Self {
        let densities = (0..observations.band_count())
            .map(|band| match observations.magnitude_range(band) {
                Some((lo, hi)) if hi > lo => 1.0 / (hi - lo),
                _ => 0.0,
            })
            .collect();
        Self { densities }
    }

    pub fn density(&self, band: usize) -> f64 {
        self.densities.get(band).copied().unwrap_or(0.0)
    }

    pub fn term(&self, band: usize, p_field: f64) -> FieldTerm {
        FieldTerm {
            p_field,
            density: self.density(band),
        }
    }
}

/// Sum of [`star_ln_likelihood`] over the stars of one band.
pub fn band_ln_likelihood(observed: &[f64], sigma: &[f64], model: &[Option<f64>], field: FieldTerm) -> f64 {
    let mut total = 0.0;
    for ((&o, &s), &m) in observed.iter().zip(sigma).zip(model) {
        total += star_ln_likelihood(o, s, m, field);
        if total == f64::NEG_INFINITY {
            break;
        }
    }
    total
}

/// Sum of band-level log-likelihoods.
///
/// `models[band][star]` holds the model magnitude for each observation.
pub fn joint_ln_likelihood(
    observations: &ObservationSet,
    models: &[Vec<Option<f64>>],
    field: &FieldDistribution,
    p_field: f64,
) -> f64 {
    let mut total = 0.0;
    for (band, model) in models.iter().enumerate().take(observations.band_count()) {
        total += band_ln_likelihood(
            observations.band_magnitudes(band),
            observations.band_uncertainties(band),
            model,
            field.term(band, p_field),
        );
        if total == f64::NEG_INFINITY {
            break;
        }
    }
    total
}

/// A log-likelihood over parameter space.
pub trait Likelihood: Sync {
    fn ln_likelihood(&self, params: &Params) -> f64;
}

/// Map each observed band onto the grid band with the same name.
fn resolve_bands(grids: &GridSet, observations: &ObservationSet) -> Result<Vec<usize>, AppError> {
    observations
        .bands()
        .iter()
        .map(|name| {
            grids.band_index(name).ok_or_else(|| {
                AppError::new(
                    2,
                    format!(
                        "Band '{name}' is not in the model grids. Available: {}",
                        grids.bands().join(", ")
                    ),
                )
            })
        })
        .collect()
}

/// Log-spaced mass nodes with normalized IMF weights.
#[derive(Debug, Clone)]
struct MassNodes {
    masses: Vec<f64>,
    ln_weights: Vec<f64>,
}

impl MassNodes {
    fn new(min: f64, max: f64, count: usize) -> Result<Self, AppError> {
        let masses = log_space(min, max, count)?;
        // Equal steps in ln m, so dm = m dln m.
        let raw: Vec<f64> = masses.iter().map(|&m| ln_primary_mass_prior(m) + m.ln()).collect();
        let norm = log_sum_exp(&raw);
        let ln_weights = raw.iter().map(|w| w - norm).collect();
        Ok(Self { masses, ln_weights })
    }
}

/// Likelihood of a whole cluster for `(feh, age)`.
///
/// Stars with known initial masses are compared at their own mass. Otherwise each
/// star's mass is integrated out over a fixed set of nodes, weighted by the IMF.
#[derive(Debug, Clone)]
pub struct PopulationLikelihood<'a> {
    grids: &'a GridSet,
    observations: &'a ObservationSet,
    band_map: Vec<usize>,
    field: FieldDistribution,
    p_field: f64,
    nodes: Option<MassNodes>,
}

impl<'a> PopulationLikelihood<'a> {
    pub fn new(
        grids: &'a GridSet,
        observations: &'a ObservationSet,
        p_field: f64,
        mass_nodes: usize,
    ) -> Result<Self, AppError> {
        if !(0.0..=1.0).contains(&p_field) {
            return Err(AppError::new(2, format!("P_field must be in [0, 1], got {p_field}.")));
        }
        let band_map = resolve_bands(grids, observations)?;
        let nodes = match observations.known_masses() {
            Some(_) => None,
            None => {
                let (lo, hi) = grids.mass_range();
                Some(MassNodes::new(lo, hi, mass_nodes)?)
            }
        };
        Ok(Self {
            grids,
            observations,
            band_map,
            field: FieldDistribution::from_observations(observations),
            p_field,
            nodes,
        })
    }

    /// True when unknown stellar masses are integrated out.
    pub fn marginalizes_mass(&self) -> bool {
        self.nodes.is_some()
    }

    fn known_mass_ln_likelihood(&self, feh: f64, age: f64, masses: &[f64]) -> f64 {
        let models: Vec<Vec<Option<f64>>> = self
            .band_map
            .iter()
            .map(|&grid_band| {
                masses
                    .iter()
                    .map(|&m| self.grids.magnitude_at(age, m, feh, grid_band, None))
                    .collect()
            })
            .collect();
        joint_ln_likelihood(self.observations, &models, &self.field, self.p_field)
    }

    fn marginal_ln_likelihood(&self, feh: f64, age: f64, nodes: &MassNodes) -> f64 {
        // node_mags[node][band]
        let node_mags: Vec<Vec<Option<f64>>> = nodes
            .masses
            .iter()
            .map(|&m| {
                self.band_map
                    .iter()
                    .map(|&gb| self.grids.magnitude_at(age, m, feh, gb, None))
                    .collect()
            })
            .collect();
        if node_mags.iter().all(|mags| mags.iter().any(Option::is_none)) {
            return f64::NEG_INFINITY;
        }

        let obs = self.observations;
        let mut per_node = vec![0.0; nodes.masses.len()];
        let mut total = 0.0;
        for star in 0..obs.star_count() {
            for (slot, (mags, ln_w)) in per_node.iter_mut().zip(node_mags.iter().zip(&nodes.ln_weights)) {
                *slot = *ln_w;
                for (band, &model) in mags.iter().enumerate() {
                    *slot += star_ln_likelihood(
                        obs.magnitude(band, star),
                        obs.uncertainty(band, star),
                        model,
                        self.field.term(band, self.p_field),
                    );
                }
            }
            total += log_sum_exp(&per_node);
            if total == f64::NEG_INFINITY {
                break;
            }
        }
        total
    }
}

impl Likelihood for PopulationLikelihood<'_> {
    fn ln_likelihood(&self, params: &Params) -> f64 {
        let Params::Population(p) = params else {
            return f64::NEG_INFINITY;
        };
        match (&self.nodes, self.observations.known_masses()) {
            (Some(nodes), _) => self.marginal_ln_likelihood(p.feh, p.age, nodes),
            (None, Some(masses)) => self.known_mass_ln_likelihood(p.feh, p.age, masses),
            (None, None) => f64::NEG_INFINITY,
        }
    }
}

/// Likelihood of one star's photometry, optionally as an unresolved binary.
#[derive(Debug, Clone)]
pub struct SingleStarLikelihood<'a> {
    grids: &'a GridSet,
    observations: &'a ObservationSet,
    band_map: Vec<usize>,
    field: FieldDistribution,
    star: usize,
    p_field: f64,
}

impl<'a> SingleStarLikelihood<'a> {
    /// The field density still comes from every star in `observations`.
    pub fn new(
        grids: &'a GridSet,
        observations: &'a ObservationSet,
        star: usize,
        p_field: f64,
    ) -> Result<Self, AppError> {
        if star >= observations.star_count() {
            return Err(AppError::new(
                2,
                format!("Star {star} requested but only {} stars loaded.", observations.star_count()),
            ));
        }
        if !(0.0..=1.0).contains(&p_field) {
            return Err(AppError::new(2, format!("P_field must be in [0, 1], got {p_field}.")));
        }
        Ok(Self {
            band_map: resolve_bands(grids, observations)?,
            field: FieldDistribution::from_observations(observations),
            grids,
            observations,
            star,
            p_field,
        })
    }

    pub fn star(&self) -> usize {
        self.star
    }
}

impl Likelihood for SingleStarLikelihood<'_> {
    fn ln_likelihood(&self, params: &Params) -> f64 {
        let Params::SingleStar(p) = params else {
            return f64::NEG_INFINITY;
        };
        let p_field = p.p_field.unwrap_or(self.p_field);
        let mut total = 0.0;
        for (band, &grid_band) in self.band_map.iter().enumerate() {
            let model = self
                .grids
                .magnitude_at(p.age, p.primary_mass, p.feh, grid_band, p.secondary_mass);
            total += star_ln_likelihood(
                self.observations.magnitude(band, self.star),
                self.observations.uncertainty(band, self.star),
                model,
                self.field.term(band, p_field),
            );
            if total == f64::NEG_INFINITY {
                break;
            }
        }
        total
    }
}
