//! Magnitude arithmetic.
//!
//! Magnitudes are logarithmic, so the light of two unresolved stars has to be
//! added in linear flux space:
//!
//! `m = -2.5 log10(10^(-m1/2.5) + 10^(-m2/2.5))`

/// Combined magnitude of two unresolved components.
///
/// Returns `None` if either input is non-finite.
pub fn combine_magnitudes(m1: f64, m2: f64) -> Option<f64> {
    if !(m1.is_finite() && m2.is_finite()) {
        return None;
    }
    // Factor out the brighter component so the flux ratio stays <= 1.
    let (bright, faint) = if m1 <= m2 { (m1, m2) } else { (m2, m1) };
    let ratio = 10f64.powf(-0.4 * (faint - bright));
    Some(bright - 2.5 * (1.0 + ratio).log10())
}
