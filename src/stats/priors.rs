//! Log-priors over the fit parameters.
//!
//! - [Fe/H] and log age: uniform over the model grid bounds
//! - primary mass: log-normal, from the Miller & Scalo (1979) IMF
//! - secondary mass: uniform on `[0, m1]`
//! - field probability: uniform on `[0, 1]`
//!
//! Every function returns `-inf` outside its support.

use crate::domain::Params;
use crate::isochrone::GridSet;

/// Mean of `ln m` for the IMF prior.
pub const IMF_LN_MASS_MEAN: f64 = -1.02;
/// Width of `ln m` for the IMF prior.
pub const IMF_LN_MASS_SIGMA: f64 = 0.677;

/// `ln(1 / (max - min))` on the inclusive interval, `-inf` elsewhere.
pub fn ln_uniform(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() && value >= min && value <= max && max > min {
        -(max - min).ln()
    } else {
        f64::NEG_INFINITY
    }
}

/// Unnormalized log-normal prior on the primary mass.
pub fn ln_primary_mass_prior(mass: f64) -> f64 {
    if !(mass.is_finite() && mass > 0.0) {
        return f64::NEG_INFINITY;
    }
    let z = (mass.ln() - IMF_LN_MASS_MEAN) / IMF_LN_MASS_SIGMA;
    -0.5 * z * z
}

/// Flat prior on the companion mass, bounded by the primary.
pub fn ln_secondary_mass_prior(secondary: f64, primary: f64) -> f64 {
    if !(primary.is_finite() && primary > 0.0) {
        return f64::NEG_INFINITY;
    }
    if secondary.is_finite() && (0.0..=primary).contains(&secondary) {
        -primary.ln()
    } else {
        f64::NEG_INFINITY
    }
}

pub fn ln_field_prior(p_field: f64) -> f64 {
    if (0.0..=1.0).contains(&p_field) {
        0.0
    } else {
        f64::NEG_INFINITY
    }
}

/// Bounds of the uniform priors, taken from a grid set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorSet {
    pub feh_range: (f64, f64),
    pub age_range: (f64, f64),
}

impl PriorSet {
    pub fn from_grids(grids: &GridSet) -> Self {
        Self {
            feh_range: grids.feh_range(),
            age_range: grids.age_range(),
        }
    }

    /// Sum of the log-priors that apply to `params`.
    pub fn ln_prior(&self, params: &Params) -> f64 {
        let (feh_min, feh_max) = self.feh_range;
        let (age_min, age_max) = self.age_range;
        let mut total = ln_uniform(params.feh(), feh_min, feh_max)
            + ln_uniform(params.age(), age_min, age_max);

        if let Params::SingleStar(p) = params {
            total += ln_primary_mass_prior(p.primary_mass);
            if let Some(m2) = p.secondary_mass {
                total += ln_secondary_mass_prior(m2, p.primary_mass);
            }
            if let Some(pf) = p.p_field {
                total += ln_field_prior(pf);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PopulationParams, SingleStarParams};
    use approx::assert_relative_eq;

    fn priors() -> PriorSet {
        PriorSet {
            feh_range: (-1.0, 0.5),
            age_range: (8.0, 10.0),
        }
    }

    #[test]
    fn uniform_prior_is_inclusive() {
        assert_relative_eq!(ln_uniform(-1.0, -1.0, 0.5), -(1.5f64).ln());
        assert_relative_eq!(ln_uniform(0.5, -1.0, 0.5), -(1.5f64).ln());
        assert_eq!(ln_uniform(0.51, -1.0, 0.5), f64::NEG_INFINITY);
        assert_eq!(ln_uniform(f64::NAN, -1.0, 0.5), f64::NEG_INFINITY);
    }

    #[test]
    fn primary_mass_prior_peaks_at_imf_mode() {
        let peak = IMF_LN_MASS_MEAN.exp();
        assert!(ln_primary_mass_prior(peak).abs() < 1e-20);
        assert!(ln_primary_mass_prior(1.0) < 0.0);
        let z: f64 = 1.02 / 0.677;
        assert_relative_eq!(ln_primary_mass_prior(1.0), -0.5 * z * z, epsilon = 1e-12);
        assert_eq!(ln_primary_mass_prior(0.0), f64::NEG_INFINITY);
        assert_eq!(ln_primary_mass_prior(-1.0), f64::NEG_INFINITY);
    }

    #[test]
    fn secondary_and_field_priors() {
        assert_relative_eq!(ln_secondary_mass_prior(0.3, 2.0), -(2.0f64).ln());
        assert_relative_eq!(ln_secondary_mass_prior(2.0, 2.0), -(2.0f64).ln());
        assert_eq!(ln_secondary_mass_prior(2.1, 2.0), f64::NEG_INFINITY);
        assert_eq!(ln_secondary_mass_prior(-0.1, 2.0), f64::NEG_INFINITY);
        assert_eq!(ln_field_prior(0.0), 0.0);
        assert_eq!(ln_field_prior(1.0), 0.0);
        assert_eq!(ln_field_prior(1.01), f64::NEG_INFINITY);
    }

    #[test]
    fn prior_set_sums_applicable_terms() {
        let p = priors();
        let pop = Params::Population(PopulationParams { feh: 0.0, age: 9.0 });
        assert_relative_eq!(p.ln_prior(&pop), -(1.5f64).ln() - (2.0f64).ln());

        let single = Params::SingleStar(SingleStarParams {
            feh: 0.0,
            age: 9.0,
            primary_mass: 1.0,
            secondary_mass: Some(0.5),
            p_field: Some(0.2),
        });
        let expected = p.ln_prior(&pop) + ln_primary_mass_prior(1.0) + 0.0;
        assert_relative_eq!(p.ln_prior(&single), expected, epsilon = 1e-12);

        let outside = Params::Population(PopulationParams { feh: 0.0, age: 10.5 });
        assert_eq!(p.ln_prior(&outside), f64::NEG_INFINITY);
    }
}
