//! Linear continuum removal.

use crate::error::SpectraError;

/// Divide `spectrum` by the straight line through two anchor bands.
///
/// `bands` are positions into `spectrum`/`wavelengths`. Returns the corrected
/// spectrum and the continuum line it was divided by. The line passes exactly
/// through both anchors, so anchor bands always correct to 1.
pub fn linear_correction(
    bands: (usize, usize),
    spectrum: &[f64],
    wavelengths: &[f64],
) -> Result<(Vec<f64>, Vec<f64>), SpectraError> {
    if spectrum.len() != wavelengths.len() {
        return Err(SpectraError::ShapeMismatch(format!(
            "{} values for {} wavelengths",
            spectrum.len(),
            wavelengths.len()
        )));
    }
    let (lo, hi) = bands;
    if lo >= wavelengths.len() || hi >= wavelengths.len() {
        return Err(SpectraError::ShapeMismatch(format!(
            "anchor bands ({lo}, {hi}) outside {} wavelengths",
            wavelengths.len()
        )));
    }

    let (x0, x1) = (wavelengths[lo], wavelengths[hi]);
    let (y0, y1) = (spectrum[lo], spectrum[hi]);
    let span = x1 - x0;
    if span == 0.0 {
        return Err(SpectraError::DegenerateContinuum(lo, hi));
    }

    let continuum: Vec<f64> = wavelengths
        .iter()
        .map(|&x| {
            let t = (x - x0) / span;
            y0 * (1.0 - t) + y1 * t
        })
        .collect();
    let corrected = spectrum
        .iter()
        .zip(&continuum)
        .map(|(y, c)| y / c)
        .collect();

    Ok((corrected, continuum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_absorption_band_depth() {
        let wavelengths = [1000.0, 1500.0, 2000.0];
        let spectrum = [0.2, 0.15, 0.4];
        let (corrected, continuum) = linear_correction((0, 2), &spectrum, &wavelengths).unwrap();

        assert_relative_eq!(continuum[1], 0.3, epsilon = 1e-12);
        assert_relative_eq!(corrected[1], 0.5, epsilon = 1e-12);
        assert_eq!(corrected[0], 1.0);
        assert_eq!(corrected[2], 1.0);
    }

    #[test]
    fn test_anchors_follow_position_not_value() {
        // Descending wavelength axis: the first column is the longest wavelength.
        let wavelengths = [2000.0, 1000.0, 1500.0];
        let spectrum = [0.4, 0.2, 0.15];
        let (corrected, continuum) = linear_correction((0, 2), &spectrum, &wavelengths).unwrap();

        // Line from (2000, 0.4) to (1500, 0.15), extrapolated to 1000.
        assert_relative_eq!(continuum[1], -0.1, epsilon = 1e-12);
        assert_relative_eq!(corrected[1], -2.0, epsilon = 1e-9);
        assert_eq!(corrected[2], 1.0);
    }

    #[test]
    fn test_degenerate_anchors() {
        assert_eq!(
            linear_correction((0, 0), &[0.5], &[700.0]),
            Err(SpectraError::DegenerateContinuum(0, 0))
        );
        assert!(matches!(
            linear_correction((0, 1), &[0.5], &[700.0]),
            Err(SpectraError::ShapeMismatch(_))
        ));
        assert!(matches!(
            linear_correction((0, 3), &[0.5, 0.6], &[700.0, 800.0]),
            Err(SpectraError::ShapeMismatch(_))
        ));
    }
}
