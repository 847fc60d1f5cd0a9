//! Magnitude-system corrections for model grids.
//!
//! Model magnitudes are absolute AB magnitudes; observations are apparent Vega
//! magnitudes. Before comparing the two we apply
//!
//! `m_vega_apparent = m_ab - offset(band) + distance_modulus`
//!
//! Offsets come from a whitespace table: the first token of each line is the band
//! name, the last token the AB-minus-Vega offset. `#` lines are comments.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::AppError;
use crate::isochrone::ModelRow;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MagnitudeCorrection {
    offsets: HashMap<String, f64>,
    distance_modulus: f64,
}

impl MagnitudeCorrection {
    pub fn new(offsets: HashMap<String, f64>, distance_modulus: f64) -> Self {
        Self {
            offsets,
            distance_modulus,
        }
    }

    /// Distance modulus only, no AB/Vega offsets.
    pub fn distance_only(distance_modulus: f64) -> Self {
        Self::new(HashMap::new(), distance_modulus)
    }

    pub fn parse(text: &str, distance_modulus: f64) -> Result<Self, AppError> {
        let mut offsets = HashMap::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let (Some(name), Some(last)) = (tokens.first(), tokens.last()) else {
                continue;
            };
            if tokens.len() < 2 {
                return Err(AppError::new(
                    2,
                    format!("Correction table line {}: expected '<band> ... <offset>'.", idx + 1),
                ));
            }
            let offset: f64 = last.parse().map_err(|_| {
                AppError::new(
                    2,
                    format!("Correction table line {}: cannot parse offset '{last}'.", idx + 1),
                )
            })?;
            offsets.insert(name.to_string(), offset);
        }
        Ok(Self::new(offsets, distance_modulus))
    }

    pub fn read(path: &Path, distance_modulus: f64) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|e| {
            AppError::new(2, format!("Failed to read correction table '{}': {e}", path.display()))
        })?;
        Self::parse(&text, distance_modulus)
    }

    pub fn distance_modulus(&self) -> f64 {
        self.distance_modulus
    }

    pub fn offset(&self, band: &str) -> Option<f64> {
        self.offsets.get(band).copied()
    }

    /// Corrected magnitude; bands missing from the table only get the distance modulus.
    pub fn apply(&self, band: &str, magnitude: f64) -> f64 {
        magnitude - self.offset(band).unwrap_or(0.0) + self.distance_modulus
    }

    /// Correct every row in place. `bands` gives the name of each magnitude slot.
    pub fn apply_rows(&self, bands: &[String], rows: &mut [ModelRow]) {
        let missing: Vec<&str> = bands
            .iter()
            .filter(|b| !self.offsets.is_empty() && !self.offsets.contains_key(b.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            log::warn!("no AB-to-Vega offset for bands {missing:?}; applying distance modulus only");
        }

        let shifts: Vec<f64> = bands
            .iter()
            .map(|b| self.distance_modulus - self.offset(b).unwrap_or(0.0))
            .collect();
        for row in rows {
            for (mag, shift) in row.magnitudes.iter_mut().zip(&shifts) {
                *mag += shift;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "# band  lambda  AB-Vega\nBessell_B 4450 -0.09\nBessell_V 5510 0.02\n\n";

    #[test]
    fn parses_first_and_last_tokens() {
        let c = MagnitudeCorrection::parse(TABLE, 3.33).unwrap();
        assert_eq!(c.offset("Bessell_B"), Some(-0.09));
        assert_eq!(c.offset("Bessell_V"), Some(0.02));
        assert_eq!(c.offset("Gaia_G"), None);
        assert!(MagnitudeCorrection::parse("V abc", 0.0).is_err());
        assert!(MagnitudeCorrection::parse("V", 0.0).is_err());
    }

    #[test]
    fn applies_offset_and_distance_modulus() {
        let c = MagnitudeCorrection::parse(TABLE, 3.33).unwrap();
        assert!((c.apply("Bessell_V", 4.0) - (4.0 - 0.02 + 3.33)).abs() < 1e-12);
        assert!((c.apply("Gaia_G", 4.0) - 7.33).abs() < 1e-12);

        let mut rows = vec![ModelRow {
            log_age: 8.0,
            initial_mass: 1.0,
            magnitudes: vec![5.0, 4.0],
        }];
        c.apply_rows(&["Bessell_B".into(), "Bessell_V".into()], &mut rows);
        assert!((rows[0].magnitudes[0] - (5.0 + 0.09 + 3.33)).abs() < 1e-12);
        assert!((rows[0].magnitudes[1] - (4.0 - 0.02 + 3.33)).abs() < 1e-12);
    }

    #[test]
    fn distance_only_shifts_every_band() {
        let c = MagnitudeCorrection::distance_only(5.0);
        assert_eq!(c.apply("anything", 1.0), 6.0);
    }
}
