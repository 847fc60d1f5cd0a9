//! In-memory model grid for a single metallicity.
//!
//! A grid is a table of `(log10 age, initial mass, magnitudes...)` rows. Rows that
//! share an age form one isochrone block. At construction we:
//!
//! - drop rows with a non-finite age or mass (with a warning)
//! - group rows into blocks, ages ascending and distinct
//! - sort each block by mass and drop repeated masses (first one wins)
//!
//! so every lookup afterwards can assume strictly increasing arrays.

use crate::error::GridError;

/// One tabulated model star.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRow {
    pub log_age: f64,
    pub initial_mass: f64,
    /// One magnitude per band, in the grid's band order.
    pub magnitudes: Vec<f64>,
}

/// All model stars at one stored age.
#[derive(Debug, Clone)]
pub struct IsochroneBlock {
    pub(crate) log_age: f64,
    pub(crate) masses: Vec<f64>,
    /// `magnitudes[band][i]` belongs to `masses[i]`.
    pub(crate) magnitudes: Vec<Vec<f64>>,
}

impl IsochroneBlock {
    pub fn log_age(&self) -> f64 {
        self.log_age
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn band_magnitudes(&self, band: usize) -> Option<&[f64]> {
        self.magnitudes.get(band).map(Vec::as_slice)
    }

    pub fn mass_range(&self) -> (f64, f64) {
        // Blocks are never empty.
        (self.masses[0], self.masses[self.masses.len() - 1])
    }
}

/// Model grid at one metallicity.
#[derive(Debug, Clone)]
pub struct ModelGrid {
    feh: f64,
    bands: Vec<String>,
    ages: Vec<f64>,
    blocks: Vec<IsochroneBlock>,
    mass_range: (f64, f64),
}

impl ModelGrid {
    pub fn new(feh: f64, bands: Vec<String>, rows: Vec<ModelRow>) -> Result<Self, GridError> {
        if !feh.is_finite() {
            return Err(GridError::NonFiniteMetallicity(feh));
        }

        let n_bands = bands.len();
        let mut usable = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.magnitudes.len() != n_bands {
                return Err(GridError::RowWidth {
                    row: row_idx,
                    expected: n_bands,
                    got: row.magnitudes.len(),
                });
            }
            if !(row.log_age.is_finite() && row.initial_mass.is_finite()) {
                log::warn!(
                    "[Fe/H]={feh}: skipping model row {row_idx} with non-finite age/mass ({}, {})",
                    row.log_age,
                    row.initial_mass
                );
                continue;
            }
            usable.push(row);
        }

        if usable.is_empty() {
            return Err(GridError::EmptyGrid);
        }

        usable.sort_by(|a, b| {
            a.log_age
                .total_cmp(&b.log_age)
                .then(a.initial_mass.total_cmp(&b.initial_mass))
        });

        let mut blocks: Vec<IsochroneBlock> = Vec::new();
        let mut dropped = 0usize;
        for row in usable {
            let same_age = blocks.last().is_some_and(|b| b.log_age == row.log_age);
            if !same_age {
                blocks.push(IsochroneBlock {
                    log_age: row.log_age,
                    masses: Vec::new(),
                    magnitudes: vec![Vec::new(); n_bands],
                });
            }
            let Some(block) = blocks.last_mut() else {
                continue;
            };
            if block.masses.last() == Some(&row.initial_mass) {
                dropped += 1;
                continue;
            }
            block.masses.push(row.initial_mass);
            for (band, mag) in row.magnitudes.into_iter().enumerate() {
                block.magnitudes[band].push(mag);
            }
        }
        if dropped > 0 {
            log::debug!("[Fe/H]={feh}: dropped {dropped} rows with repeated (age, mass)");
        }

        let ages = blocks.iter().map(|b| b.log_age).collect();
        let mass_range = blocks.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, b| {
            let (lo, hi) = b.mass_range();
            (acc.0.min(lo), acc.1.max(hi))
        });

        Ok(Self {
            feh,
            bands,
            ages,
            blocks,
            mass_range,
        })
    }

    /// Metallicity tag ([Fe/H]).
    pub fn feh(&self) -> f64 {
        self.feh
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Distinct stored log10 ages, ascending.
    pub fn ages(&self) -> &[f64] {
        &self.ages
    }

    pub fn blocks(&self) -> &[IsochroneBlock] {
        &self.blocks
    }

    pub fn age_range(&self) -> (f64, f64) {
        (self.ages[0], self.ages[self.ages.len() - 1])
    }

    /// Smallest and largest initial mass over all blocks.
    pub fn mass_range(&self) -> (f64, f64) {
        self.mass_range
    }

    /// Index of the block stored at exactly `age`.
    pub fn block_index(&self, age: f64) -> Option<usize> {
        self.ages.binary_search_by(|a| a.total_cmp(&age)).ok()
    }

    pub fn block(&self, index: usize) -> Option<&IsochroneBlock> {
        self.blocks.get(index)
    }

    /// Total number of model stars kept.
    pub fn row_count(&self) -> usize {
        self.blocks.iter().map(|b| b.masses.len()).sum()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn row(age: f64, mass: f64, mags: &[f64]) -> ModelRow {
        ModelRow {
            log_age: age,
            initial_mass: mass,
            magnitudes: mags.to_vec(),
        }
    }

    /// Two-band grid with ages 8.0 and 9.0 and masses 0.5, 1.0, 1.5.
    ///
    /// At age 8.0 the first band reads 5, 4, 3; the older block is 1 mag fainter.
    pub fn two_age_grid(feh: f64, offset: f64) -> ModelGrid {
        let rows = vec![
            row(8.0, 0.5, &[5.0 + offset, 6.0 + offset]),
            row(8.0, 1.0, &[4.0 + offset, 4.5 + offset]),
            row(8.0, 1.5, &[3.0 + offset, 3.2 + offset]),
            row(9.0, 0.5, &[6.0 + offset, 7.0 + offset]),
            row(9.0, 1.0, &[5.0 + offset, 5.5 + offset]),
            row(9.0, 1.5, &[4.0 + offset, 4.2 + offset]),
        ];
        ModelGrid::new(feh, vec!["B".to_string(), "R".to_string()], rows).unwrap()
    }
}
