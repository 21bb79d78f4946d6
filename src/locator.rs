//! Nearest-label lookup within a tolerance window.
//!
//! The locator is stateless: callers pass the label sequence of whichever
//! axis they are resolving together with the tolerance owned by the table.

use std::ops::{RangeFull, RangeInclusive};

use crate::error::SpectraError;

/// Tolerance reported by a table whose tolerance was never set.
pub const DEFAULT_TOLERANCE: f64 = 0.5;

/// Validate a tolerance value. Zero means exact matching.
pub fn check_tolerance(tolerance: f64) -> Result<f64, SpectraError> {
    if tolerance.is_nan() || tolerance < 0.0 {
        return Err(SpectraError::InvalidTolerance(tolerance));
    }
    Ok(tolerance)
}

/// Resolve `key` to the position of the nearest label within `tolerance`.
///
/// Ties are broken by the lower label value, then the lower position, so the
/// result never depends on how the labels happen to be stored.
pub fn locate(labels: &[f64], key: f64, tolerance: f64) -> Result<usize, SpectraError> {
    let mut best: Option<(usize, f64)> = None;

    for (pos, &label) in labels.iter().enumerate() {
        let distance = (label - key).abs();
        // NaN distances fail this comparison and never match.
        if !(distance <= tolerance) {
            continue;
        }
        best = match best {
            None => Some((pos, distance)),
            Some((best_pos, best_distance)) => {
                let best_label = labels[best_pos];
                if distance < best_distance || (distance == best_distance && label < best_label) {
                    Some((pos, distance))
                } else {
                    Some((best_pos, best_distance))
                }
            }
        };
    }

    best.map(|(pos, _)| pos)
        .ok_or(SpectraError::LabelNotFound { key, tolerance })
}

/// Resolve every key independently. The first miss fails the whole request.
pub fn locate_each(labels: &[f64], keys: &[f64], tolerance: f64) -> Result<Vec<usize>, SpectraError> {
    keys.iter()
        .map(|&key| locate(labels, key, tolerance))
        .collect()
}

/// Positions of all labels inside `[start - tolerance, end + tolerance]`, in
/// stored order. Missing bounds are open.
pub fn locate_range(
    labels: &[f64],
    start: Option<f64>,
    end: Option<f64>,
    tolerance: f64,
) -> Vec<usize> {
    let lo = start.map_or(f64::NEG_INFINITY, |s| s - tolerance);
    let hi = end.map_or(f64::INFINITY, |e| e + tolerance);
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &label)| label >= lo && label <= hi)
        .map(|(pos, _)| pos)
        .collect()
}

// ---------------------------------------------------------------------------
// Selector – a column-axis key
// ---------------------------------------------------------------------------

/// A request against the wavelength axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// A single wavelength; reduces the column axis.
    Near(f64),
    /// Several wavelengths, each matched independently, in request order.
    AnyOf(Vec<f64>),
    /// Every wavelength within an inclusive, tolerance-widened range.
    Between { start: Option<f64>, end: Option<f64> },
    /// Every column.
    All,
}

impl Selector {
    /// Whether a successful match yields a single column.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Selector::Near(_))
    }

    /// Resolve the selector to positions within `labels`.
    ///
    /// `All` is answered by the caller since it is not restricted to
    /// wavelength columns; here it simply yields every position.
    pub fn resolve(&self, labels: &[f64], tolerance: f64) -> Result<Vec<usize>, SpectraError> {
        match self {
            Selector::Near(key) => Ok(vec![locate(labels, *key, tolerance)?]),
            Selector::AnyOf(keys) => locate_each(labels, keys, tolerance),
            Selector::Between { start, end } => Ok(locate_range(labels, *start, *end, tolerance)),
            Selector::All => Ok((0..labels.len()).collect()),
        }
    }
}

impl From<f64> for Selector {
    fn from(key: f64) -> Self {
        Selector::Near(key)
    }
}

impl From<Vec<f64>> for Selector {
    fn from(keys: Vec<f64>) -> Self {
        Selector::AnyOf(keys)
    }
}

impl From<&[f64]> for Selector {
    fn from(keys: &[f64]) -> Self {
        Selector::AnyOf(keys.to_vec())
    }
}

impl From<RangeInclusive<f64>> for Selector {
    fn from(range: RangeInclusive<f64>) -> Self {
        Selector::Between {
            start: Some(*range.start()),
            end: Some(*range.end()),
        }
    }
}

impl From<RangeFull> for Selector {
    fn from(_: RangeFull) -> Self {
        Selector::All
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS: [f64; 3] = [700.0, 750.0, 800.0];

    #[test]
    fn test_locate_within_tolerance() {
        assert_eq!(locate(&LABELS, 750.3, 1.0), Ok(1));
        assert_eq!(locate(&LABELS, 699.2, 1.0), Ok(0));
        assert_eq!(
            locate(&LABELS, 760.0, 1.0),
            Err(SpectraError::LabelNotFound {
                key: 760.0,
                tolerance: 1.0
            })
        );
    }

    #[test]
    fn test_zero_tolerance_is_exact() {
        let labels = [750.49, 751.0];
        assert_eq!(locate(&labels, 750.50, 0.1), Ok(0));
        assert!(locate(&labels, 750.50, 0.0).is_err());
        assert_eq!(locate(&labels, 750.49, 0.0), Ok(0));
    }

    #[test]
    fn test_nearest_wins_then_lowest_label() {
        let labels = [10.0, 11.0, 9.0, 10.4];
        // 10.4 is nearer to 10.3 than 10.0
        assert_eq!(locate(&labels, 10.3, 2.0), Ok(3));
        // 9.0 and 11.0 are equally near 10.0 once 10.0 itself is removed
        let labels = [11.0, 9.0];
        assert_eq!(locate(&labels, 10.0, 1.0), Ok(1));
        // duplicates resolve to the first position
        let labels = [5.0, 5.0];
        assert_eq!(locate(&labels, 5.1, 0.5), Ok(0));
    }

    #[test]
    fn test_nan_never_matches() {
        assert!(locate(&LABELS, f64::NAN, f64::INFINITY).is_err());
        assert!(locate(&[f64::NAN, 1.0], 1.0, 0.5).is_ok());
    }

    #[test]
    fn test_check_tolerance() {
        assert_eq!(check_tolerance(0.0), Ok(0.0));
        assert_eq!(check_tolerance(-0.1), Err(SpectraError::InvalidTolerance(-0.1)));
        assert!(check_tolerance(f64::NAN).is_err());
    }

    #[test]
    fn test_locate_each_fails_on_first_miss() {
        assert_eq!(locate_each(&LABELS, &[800.2, 699.9], 0.5), Ok(vec![2, 0]));
        assert!(locate_each(&LABELS, &[800.2, 725.0], 0.5).is_err());
    }

    #[test]
    fn test_locate_range_widens_by_tolerance() {
        assert_eq!(locate_range(&LABELS, Some(701.0), Some(799.0), 1.0), vec![0, 1, 2]);
        assert_eq!(locate_range(&LABELS, Some(701.0), Some(799.0), 0.5), vec![1]);
        assert_eq!(locate_range(&LABELS, None, Some(760.0), 0.0), vec![0, 1]);
        assert!(locate_range(&LABELS, Some(900.0), None, 1.0).is_empty());
    }

    #[test]
    fn test_selector_conversions() {
        assert_eq!(Selector::from(1.0), Selector::Near(1.0));
        assert_eq!(Selector::from(vec![1.0, 2.0]), Selector::AnyOf(vec![1.0, 2.0]));
        assert_eq!(
            Selector::from(1.0..=2.0),
            Selector::Between {
                start: Some(1.0),
                end: Some(2.0)
            }
        );
        assert_eq!(Selector::from(..), Selector::All);
        assert!(Selector::Near(1.0).is_scalar());
        assert!(!Selector::All.is_scalar());
    }
}
