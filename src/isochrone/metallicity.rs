//! Cross-metallicity lookups over a set of model grids.
//!
//! [`GridSet`] owns one [`ModelGrid`] per metallicity, sorted by [Fe/H]. A lookup
//! at an arbitrary [Fe/H] brackets the metallicity list, does the single-grid
//! lookup (mass, then age) in both neighbours and interpolates the two results.
//! Metallicities outside the stored list are never extrapolated.

use crate::error::GridError;
use crate::isochrone::grid::ModelGrid;
use crate::math::{combine_magnitudes, find_closest_bracket, linear_interp};

#[derive(Debug, Clone)]
pub struct GridSet {
    grids: Vec<ModelGrid>,
    feh: Vec<f64>,
    age_range: (f64, f64),
    mass_range: (f64, f64),
}

impl GridSet {
    /// Sort `grids` by metallicity.
    ///
    /// Fails on an empty input or two grids with the same [Fe/H]. Grids whose band
    /// layout differs from the first one are kept, with a warning.
    pub fn new(mut grids: Vec<ModelGrid>) -> Result<Self, GridError> {
        if grids.is_empty() {
            return Err(GridError::NoGrids);
        }
        grids.sort_by(|a, b| a.feh().total_cmp(&b.feh()));

        if let Some(w) = grids.windows(2).find(|w| w[0].feh() == w[1].feh()) {
            return Err(GridError::DuplicateMetallicity(w[0].feh()));
        }

        let reference = grids[0].bands().to_vec();
        for grid in &grids[1..] {
            if grid.band_count() != reference.len() {
                log::warn!(
                    "grid [Fe/H]={} has {} bands, grid [Fe/H]={} has {}",
                    grid.feh(),
                    grid.band_count(),
                    grids[0].feh(),
                    reference.len()
                );
            } else if grid.bands() != reference.as_slice() {
                log::warn!(
                    "grid [Fe/H]={} band names {:?} differ from {:?}",
                    grid.feh(),
                    grid.bands(),
                    reference
                );
            }
        }

        let feh = grids.iter().map(ModelGrid::feh).collect();
        let envelope = |f: fn(&ModelGrid) -> (f64, f64)| {
            grids.iter().map(f).fold((f64::INFINITY, f64::NEG_INFINITY), |acc, (lo, hi)| {
                (acc.0.min(lo), acc.1.max(hi))
            })
        };
        let age_range = envelope(ModelGrid::age_range);
        let mass_range = envelope(ModelGrid::mass_range);

        Ok(Self {
            grids,
            feh,
            age_range,
            mass_range,
        })
    }

    /// Stored metallicities, ascending.
    pub fn feh_list(&self) -> &[f64] {
        &self.feh
    }

    pub fn feh_range(&self) -> (f64, f64) {
        (self.feh[0], self.feh[self.feh.len() - 1])
    }

    /// Smallest and largest stored log age over every grid.
    pub fn age_range(&self) -> (f64, f64) {
        self.age_range
    }

    /// Smallest and largest initial mass over every grid.
    pub fn mass_range(&self) -> (f64, f64) {
        self.mass_range
    }

    pub fn grids(&self) -> &[ModelGrid] {
        &self.grids
    }

    /// Grid stored at exactly `feh`.
    pub fn grid_at(&self, feh: f64) -> Option<&ModelGrid> {
        let idx = self.feh.binary_search_by(|f| f.total_cmp(&feh)).ok()?;
        self.grids.get(idx)
    }

    /// Grid whose [Fe/H] is closest to `feh`.
    pub fn nearest_grid(&self, feh: f64) -> &ModelGrid {
        let idx = self.feh.partition_point(|&f| f < feh);
        let candidates = [idx.checked_sub(1), (idx < self.grids.len()).then_some(idx)];
        candidates
            .into_iter()
            .flatten()
            .min_by(|&a, &b| (self.feh[a] - feh).abs().total_cmp(&(self.feh[b] - feh).abs()))
            .map_or(&self.grids[0], |i| &self.grids[i])
    }

    /// Band names of the lowest-metallicity grid.
    pub fn bands(&self) -> &[String] {
        self.grids[0].bands()
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands().iter().position(|b| b == name)
    }

    /// Magnitude of a single star at `(age, mass, feh)`.
    pub fn single_magnitude(&self, age: f64, mass: f64, feh: f64, band: usize) -> Option<f64> {
        let bracket = find_closest_bracket(feh, &self.feh).ok()?;
        let lookup = |index: usize| self.grids.get(index)?.magnitude(mass, age, band);

        if bracket.is_exact() {
            return lookup(bracket.lower_index);
        }
        let lo = lookup(bracket.lower_index)?;
        let hi = lookup(bracket.upper_index)?;
        Some(linear_interp(feh, (bracket.lower, lo), (bracket.upper, hi)))
    }

    /// Magnitude at `(age, mass, feh)`, optionally with an unresolved companion.
    ///
    /// With `secondary_mass` the companion is looked up the same way and the two
    /// fluxes are added. `None` when any required lookup is impossible.
    pub fn magnitude_at(
        &self,
        age: f64,
        mass: f64,
        feh: f64,
        band: usize,
        secondary_mass: Option<f64>,
    ) -> Option<f64> {
        let primary = self.single_magnitude(age, mass, feh, band)?;
        match secondary_mass {
            None => Some(primary),
            Some(m2) => {
                let secondary = self.single_magnitude(age, m2, feh, band)?;
                combine_magnitudes(primary, secondary)
            }
        }
    }

    /// [`GridSet::magnitude_at`] with `+inf` standing in for "impossible".
    pub fn get_magnitude_at(
        &self,
        age: f64,
        mass: f64,
        feh: f64,
        band: usize,
        secondary_mass: Option<f64>,
    ) -> f64 {
        self.magnitude_at(age, mass, feh, band, secondary_mass)
            .unwrap_or(f64::INFINITY)
    }
}
