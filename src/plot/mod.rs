//! Plot data shared by the ASCII renderer and the TUI.
//!
//! A colour-magnitude diagram uses two bands for the colour (`blue - red`) and
//! one band for the vertical axis.

use crate::domain::ObservationSet;
use crate::isochrone::GridSet;
use crate::math::log_space;

pub mod ascii;

pub use ascii::{render_cmd, render_trace};

/// Points sampled along a model isochrone.
pub const TRACK_SAMPLES: usize = 200;

/// Band indices of a colour-magnitude diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdAxes {
    pub blue: usize,
    pub red: usize,
    pub magnitude: usize,
}

impl CmdAxes {
    /// `band0 - band1` against `band1`; `None` with fewer than two bands.
    pub fn for_band_count(n: usize) -> Option<Self> {
        (n >= 2).then_some(Self {
            blue: 0,
            red: 1,
            magnitude: 1,
        })
    }

    /// `(x label, y label)` for the given band names.
    pub fn labels(&self, bands: &[String]) -> (String, String) {
        let name = |i: usize| bands.get(i).map_or("?", String::as_str);
        (
            format!("{} - {}", name(self.blue), name(self.red)),
            name(self.magnitude).to_string(),
        )
    }
}

/// Observed stars as `(colour, magnitude)`.
pub fn observed_points(observations: &ObservationSet, axes: CmdAxes) -> Vec<(f64, f64)> {
    (0..observations.star_count())
        .map(|star| {
            let blue = observations.magnitude(axes.blue, star);
            let red = observations.magnitude(axes.red, star);
            (blue - red, observations.magnitude(axes.magnitude, star))
        })
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect()
}

/// Model isochrone at `(feh, age)` as `(colour, magnitude)`, ordered by mass.
///
/// Masses the grids cannot evaluate are left out.
pub fn isochrone_track(grids: &GridSet, feh: f64, age: f64, axes: CmdAxes, samples: usize) -> Vec<(f64, f64)> {
    let (lo, hi) = grids.mass_range();
    let Ok(masses) = log_space(lo, hi, samples.max(2)) else {
        return Vec::new();
    };
    masses
        .into_iter()
        .filter_map(|mass| {
            let mag = |band| grids.magnitude_at(age, mass, feh, band, None);
            Some((mag(axes.blue)? - mag(axes.red)?, mag(axes.magnitude)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isochrone::grid::fixtures::two_age_grid;

    #[test]
    fn track_follows_grid_colours() {
        let grids = GridSet::new(vec![two_age_grid(0.0, 0.0)]).unwrap();
        let axes = CmdAxes::for_band_count(2).unwrap();
        let track = isochrone_track(&grids, 0.0, 8.0, axes, 3);
        // Masses 0.5, sqrt(0.75), 1.5: endpoints are exact grid rows.
        assert_eq!(track.len(), 3);
        assert!((track[0].0 - (5.0 - 6.0)).abs() < 1e-12);
        assert!((track[0].1 - 6.0).abs() < 1e-12);
        assert!((track[2].0 - (3.0 - 3.2)).abs() < 1e-12);
        assert!((track[2].1 - 3.2).abs() < 1e-12);

        assert!(isochrone_track(&grids, 1.0, 8.0, axes, 10).is_empty());
    }

    #[test]
    fn axes_need_two_bands() {
        assert!(CmdAxes::for_band_count(1).is_none());
        let axes = CmdAxes::for_band_count(3).unwrap();
        let (x, y) = axes.labels(&["B".into(), "V".into(), "R".into()]);
        assert_eq!(x, "B - V");
        assert_eq!(y, "V");
    }

    #[test]
    fn observed_points_use_colour_and_magnitude() {
        let obs = ObservationSet::new(
            vec!["B".into(), "V".into()],
            vec![vec![10.0, 12.5], vec![9.5, 11.0]],
            vec![vec![0.1, 0.1], vec![0.1, 0.1]],
        )
        .unwrap();
        let pts = observed_points(&obs, CmdAxes::for_band_count(2).unwrap());
        assert_eq!(pts, vec![(0.5, 9.5), (1.5, 11.0)]);
    }
}
