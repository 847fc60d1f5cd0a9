//! Single-metallicity lookups: isochrone selection and mass/age interpolation.
//!
//! Two kinds of lookup live here:
//!
//! - [`ModelGrid::isochrone`] hands back one *stored* isochrone. A requested age
//!   that is not stored snaps to the nearest younger stored age.
//! - [`interpolate_across_age`] never snaps: it interpolates magnitudes between
//!   the two stored ages that bracket the requested one.
//!
//! Both report "impossible under this model" as `None`; the `get_*` wrappers turn
//! that into `+inf` for callers that want a plain magnitude.

use crate::error::GridError;
use crate::isochrone::grid::{IsochroneBlock, ModelGrid};
use crate::math::{find_closest_bracket, linear_interp};

/// Borrowed view of one stored isochrone.
#[derive(Debug, Clone, Copy)]
pub struct Isochrone<'a> {
    block: &'a IsochroneBlock,
    requested_age: f64,
}

impl<'a> Isochrone<'a> {
    /// The stored age actually used.
    pub fn log_age(&self) -> f64 {
        self.block.log_age()
    }

    /// The age the caller asked for.
    pub fn requested_age(&self) -> f64 {
        self.requested_age
    }

    pub fn masses(&self) -> &'a [f64] {
        self.block.masses()
    }

    pub fn min_mass(&self) -> f64 {
        self.block.mass_range().0
    }

    pub fn max_mass(&self) -> f64 {
        self.block.mass_range().1
    }

    pub fn contains_mass(&self, mass: f64) -> bool {
        mass >= self.min_mass() && mass <= self.max_mass()
    }

    /// Magnitude in `band` at `mass`, or `None` outside the tabulated mass range.
    pub fn magnitude(&self, mass: f64, band: usize) -> Option<f64> {
        if !self.contains_mass(mass) {
            return None;
        }
        let mags = self.block.band_magnitudes(band)?;
        let bracket = find_closest_bracket(mass, self.block.masses()).ok()?;
        let value = bracket.interpolate(mass, mags)?;
        value.is_finite().then_some(value)
    }

    /// Like [`Isochrone::magnitude`] but with `+inf` for impossible inputs.
    pub fn get_magnitude(&self, mass: f64, band: usize) -> f64 {
        self.magnitude(mass, band).unwrap_or(f64::INFINITY)
    }
}

impl ModelGrid {
    /// Stored isochrone for `age`.
    ///
    /// An age between two stored ages resolves to the younger one.
    pub fn isochrone(&self, age: f64) -> Result<Isochrone<'_>, GridError> {
        let (min, max) = self.age_range();
        let bracket = find_closest_bracket(age, self.ages())
            .map_err(|_| GridError::AgeOutOfRange { age, min, max })?;

        if !bracket.is_exact() {
            log::debug!(
                "[Fe/H]={}: log age {age} not stored, using younger isochrone {}",
                self.feh(),
                bracket.lower
            );
        }

        let block = self
            .block(bracket.lower_index)
            .ok_or(GridError::AgeOutOfRange { age, min, max })?;
        Ok(Isochrone {
            block,
            requested_age: age,
        })
    }

    /// Magnitude at `(mass, age)` interpolated across age. See [`interpolate_across_age`].
    pub fn magnitude(&self, mass: f64, age: f64, band: usize) -> Option<f64> {
        interpolate_across_age(self, mass, age, band)
    }

    pub fn get_magnitude(&self, mass: f64, age: f64, band: usize) -> f64 {
        self.magnitude(mass, age, band).unwrap_or(f64::INFINITY)
    }
}

/// Magnitude at `(mass, age)` for one grid.
///
/// - stored age: direct lookup in that isochrone
/// - otherwise look up both bracketing isochrones; interpolate on age when both
///   are finite, fall back to whichever one is finite, else `None`
/// - ages outside the grid: `None`
pub fn interpolate_across_age(grid: &ModelGrid, mass: f64, age: f64, band: usize) -> Option<f64> {
    let bracket = find_closest_bracket(age, grid.ages()).ok()?;
    let lookup = |index: usize| -> Option<f64> {
        let block = grid.block(index)?;
        Isochrone {
            block,
            requested_age: age,
        }
        .magnitude(mass, band)
    };

    if bracket.is_exact() {
        return lookup(bracket.lower_index);
    }

    match (lookup(bracket.lower_index), lookup(bracket.upper_index)) {
        (Some(lo), Some(hi)) => Some(linear_interp(age, (bracket.lower, lo), (bracket.upper, hi))),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}
