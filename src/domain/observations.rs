//! Observed photometry in column form.

use crate::domain::ObservationFilter;
use crate::error::AppError;

/// Per-band magnitudes and uncertainties for a set of stars.
///
/// Columns are stored band-major: `magnitudes[band][star]`. Band names are the
/// *model* band names so that the likelihood can match them against the grids.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSet {
    bands: Vec<String>,
    magnitudes: Vec<Vec<f64>>,
    uncertainties: Vec<Vec<f64>>,
    known_masses: Option<Vec<f64>>,
    ids: Option<Vec<String>>,
}

impl ObservationSet {
    pub fn new(
        bands: Vec<String>,
        magnitudes: Vec<Vec<f64>>,
        uncertainties: Vec<Vec<f64>>,
    ) -> Result<Self, AppError> {
        if bands.is_empty() {
            return Err(AppError::new(2, "Observations need at least one band."));
        }
        if magnitudes.len() != bands.len() || uncertainties.len() != bands.len() {
            return Err(AppError::new(
                2,
                format!(
                    "Observation columns do not match bands: {} bands, {} magnitude columns, {} uncertainty columns.",
                    bands.len(),
                    magnitudes.len(),
                    uncertainties.len()
                ),
            ));
        }
        let n = magnitudes[0].len();
        if magnitudes.iter().chain(&uncertainties).any(|c| c.len() != n) {
            return Err(AppError::new(2, "Observation columns have different lengths."));
        }
        Ok(Self {
            bands,
            magnitudes,
            uncertainties,
            known_masses: None,
            ids: None,
        })
    }

    /// Attach the true initial mass of every star (model-test data).
    pub fn with_known_masses(mut self, masses: Vec<f64>) -> Result<Self, AppError> {
        if masses.len() != self.star_count() {
            return Err(AppError::new(
                2,
                format!("Got {} known masses for {} stars.", masses.len(), self.star_count()),
            ));
        }
        self.known_masses = Some(masses);
        Ok(self)
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Result<Self, AppError> {
        if ids.len() != self.star_count() {
            return Err(AppError::new(
                2,
                format!("Got {} star ids for {} stars.", ids.len(), self.star_count()),
            ));
        }
        self.ids = Some(ids);
        Ok(self)
    }

    pub fn star_count(&self) -> usize {
        self.magnitudes[0].len()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| b == name)
    }

    pub fn magnitude(&self, band: usize, star: usize) -> f64 {
        self.magnitudes[band][star]
    }

    pub fn uncertainty(&self, band: usize, star: usize) -> f64 {
        self.uncertainties[band][star]
    }

    pub fn band_magnitudes(&self, band: usize) -> &[f64] {
        &self.magnitudes[band]
    }

    pub fn band_uncertainties(&self, band: usize) -> &[f64] {
        &self.uncertainties[band]
    }

    pub fn known_masses(&self) -> Option<&[f64]> {
        self.known_masses.as_deref()
    }

    pub fn ids(&self) -> Option<&[String]> {
        self.ids.as_deref()
    }

    /// Label for a star: its id when present, otherwise its row number.
    pub fn star_label(&self, star: usize) -> String {
        self.ids
            .as_ref()
            .and_then(|ids| ids.get(star).cloned())
            .unwrap_or_else(|| format!("#{star}"))
    }

    /// Smallest and largest finite magnitude in `band`.
    pub fn magnitude_range(&self, band: usize) -> Option<(f64, f64)> {
        self.magnitudes.get(band)?.iter().filter(|m| m.is_finite()).fold(None, |acc, &m| {
            Some(match acc {
                None => (m, m),
                Some((lo, hi)) => (f64::min(lo, m), f64::max(hi, m)),
            })
        })
    }

    /// Drop stars that fail `filter` in any band. Returns the number removed.
    ///
    /// Stars with a non-finite magnitude or a non-positive uncertainty are always
    /// removed.
    pub fn retain_matching(&mut self, filter: &ObservationFilter) -> usize {
        let keep = self.filter_mask(filter);
        self.retain_mask(&keep)
    }

    /// `true` for every star that passes `filter`, in row order.
    pub fn filter_mask(&self, filter: &ObservationFilter) -> Vec<bool> {
        (0..self.star_count())
            .map(|star| {
                (0..self.band_count()).all(|band| {
                    let m = self.magnitude(band, star);
                    let e = self.uncertainty(band, star);
                    m.is_finite()
                        && e.is_finite()
                        && e > 0.0
                        && filter.mag_min.is_none_or(|lo| m >= lo)
                        && filter.mag_max.is_none_or(|hi| m <= hi)
                        && filter.min_uncertainty.is_none_or(|lo| e >= lo)
                        && filter.max_uncertainty.is_none_or(|hi| e <= hi)
                })
            })
            .collect()
    }

    /// Keep the stars whose `keep` entry is `true`. Returns the number removed.
    pub fn retain_mask(&mut self, keep: &[bool]) -> usize {
        let removed = keep.iter().filter(|k| !**k).count();
        if removed == 0 {
            return 0;
        }

        let retain = |col: &mut Vec<f64>| {
            let mut it = keep.iter();
            col.retain(|_| *it.next().unwrap_or(&false));
        };
        self.magnitudes.iter_mut().for_each(retain);
        self.uncertainties.iter_mut().for_each(retain);
        if let Some(masses) = self.known_masses.as_mut() {
            retain(masses);
        }
        if let Some(ids) = self.ids.as_mut() {
            let mut it = keep.iter();
            ids.retain(|_| *it.next().unwrap_or(&false));
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ObservationSet {
        ObservationSet::new(
            vec!["B".into(), "R".into()],
            vec![vec![10.0, 12.0, f64::NAN, 15.0], vec![9.5, 11.0, 12.0, 14.0]],
            vec![vec![0.01, 0.02, 0.02, 0.3], vec![0.01, 0.02, 0.02, 0.2]],
        )
        .unwrap()
        .with_ids(vec!["a".into(), "b".into(), "c".into(), "d".into()])
        .unwrap()
    }

    #[test]
    fn shape_checks() {
        assert!(ObservationSet::new(vec![], vec![], vec![]).is_err());
        assert!(ObservationSet::new(vec!["B".into()], vec![vec![1.0]], vec![vec![0.1, 0.1]]).is_err());
        assert!(sample().with_known_masses(vec![1.0]).is_err());
    }

    #[test]
    fn ranges_ignore_non_finite_values() {
        let obs = sample();
        assert_eq!(obs.magnitude_range(0), Some((10.0, 15.0)));
        assert_eq!(obs.magnitude_range(1), Some((9.5, 14.0)));
        assert_eq!(obs.magnitude_range(5), None);
    }

    #[test]
    fn retain_matching_removes_bad_and_filtered_stars() {
        let mut obs = sample().with_known_masses(vec![1.0, 0.9, 0.8, 0.7]).unwrap();
        let filter = ObservationFilter {
            max_uncertainty: Some(0.1),
            ..Default::default()
        };
        assert_eq!(obs.retain_matching(&filter), 2);
        assert_eq!(obs.star_count(), 2);
        assert_eq!(obs.band_magnitudes(0), &[10.0, 12.0]);
        assert_eq!(obs.known_masses().unwrap(), &[1.0, 0.9]);
        assert_eq!(obs.star_label(1), "b");

        let filter = ObservationFilter {
            mag_min: Some(10.0),
            ..Default::default()
        };
        assert_eq!(obs.retain_matching(&filter), 1);
        assert_eq!(obs.ids().unwrap(), &["b".to_string()]);
    }

    #[test]
    fn filter_mask_follows_row_order() {
        let obs = sample();
        let filter = ObservationFilter {
            mag_max: Some(14.0),
            ..Default::default()
        };
        assert_eq!(obs.filter_mask(&filter), vec![true, true, false, false]);
        assert_eq!(obs.star_count(), 4);
    }
}
