//! Properties of tolerance matching, the spectra/meta partition and
//! continuum removal on arbitrary tables.

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use proptest::prelude::*;

use spectral_frame::locator::locate;
use spectral_frame::{
    Column, ColumnLabel, Frame, MetadataValue, RowIndex, SpectraError, SpectralTable,
};

/// Labels 10 nm apart starting at `start`.
fn grid(start: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + 10.0 * i as f64).collect()
}

/// Rows of `rows[r][b]` on `wavelengths`, plus a `site` text column and a
/// numeric `phase` column.
fn table(wavelengths: &[f64], rows: &[Vec<f64>], tolerance: f64) -> SpectralTable {
    let n = rows.len();
    let mut labels: Vec<ColumnLabel> = wavelengths.iter().map(|&w| ColumnLabel::from(w)).collect();
    let mut columns: Vec<Column> = (0..wavelengths.len())
        .map(|b| Column::Values(rows.iter().map(|r| r[b]).collect()))
        .collect();
    labels.push("site".into());
    columns.push(Column::Attributes((0..n).map(|i| format!("S{i}").into()).collect()));
    labels.push("phase".into());
    columns.push(Column::Attributes((0..n).map(|i| (15.0 * i as f64).into()).collect()));

    let frame = Frame::new(RowIndex::range("id", n), labels, columns).unwrap();
    SpectralTable::new(frame, wavelengths.to_vec(), None)
        .unwrap()
        .with_tolerance(tolerance)
        .unwrap()
}

fn rows_strategy() -> impl Strategy<Value = (usize, Vec<Vec<f64>>)> {
    (2usize..12, 1usize..6).prop_flat_map(|(bands, n)| {
        (
            Just(bands),
            prop::collection::vec(prop::collection::vec(0.01f64..1.0, bands), n),
        )
    })
}

proptest! {
    #[test]
    fn prop_key_within_tolerance_resolves_to_label(
        start in 300.0f64..2500.0,
        n in 1usize..40,
        pick in 0usize..40,
        tolerance in 0.0f64..4.9,
        frac in -1.0f64..=1.0,
    ) {
        let labels = grid(start, n);
        let k = pick % n;
        let key = labels[k] + frac * tolerance;
        // Rounding of `key` may push it marginally past the boundary.
        prop_assume!((labels[k] - key).abs() <= tolerance);
        prop_assert_eq!(locate(&labels, key, tolerance).unwrap(), k);
    }

    #[test]
    fn prop_key_beyond_tolerance_fails(
        start in 300.0f64..2500.0,
        n in 1usize..40,
        pick in 0usize..40,
        tolerance in 0.0f64..4.0,
        excess in 0.01f64..1.0,
        below in any::<bool>(),
    ) {
        let labels = grid(start, n);
        let k = pick % n;
        let offset = tolerance + excess;
        let key = if below { labels[k] - offset } else { labels[k] + offset };
        prop_assert!(
            matches!(locate(&labels, key, tolerance), Err(SpectraError::LabelNotFound { .. })),
            "key {} resolved with tolerance {}", key, tolerance
        );
    }

    #[test]
    fn prop_zero_tolerance_is_exact(start in 300.0f64..2500.0, n in 1usize..20, pick in 0usize..20) {
        let labels = grid(start, n);
        let k = pick % n;
        prop_assert_eq!(locate(&labels, labels[k], 0.0).unwrap(), k);
        let nudged = labels[k] + labels[k] * f64::EPSILON * 4.0;
        prop_assert!(locate(&labels, nudged, 0.0).is_err());
    }

    #[test]
    fn prop_spectra_and_meta_partition_columns(
        (bands, rows) in rows_strategy(),
        tolerance in 0.0f64..5.0,
    ) {
        let wavelengths = grid(500.0, bands);
        let t = table(&wavelengths, &rows, tolerance);

        let spectra = t.spectra().unwrap();
        let meta = t.meta().unwrap();
        prop_assert_eq!(spectra.frame().n_columns() + meta.frame().n_columns(), t.frame().n_columns());
        prop_assert_eq!(spectra.wavelengths(), t.wavelengths());
        prop_assert!(spectra.metadata_columns().is_empty());
        prop_assert_eq!(meta.metadata_columns(), t.metadata_columns());
        prop_assert!(meta.wavelengths().is_empty());
        prop_assert_eq!(spectra.tolerance(), tolerance);
        prop_assert_eq!(meta.tolerance(), tolerance);

        let rejoined = spectra.merge(&meta).unwrap();
        prop_assert_eq!(rejoined, t);
    }

    #[test]
    fn prop_tolerance_survives_transforms(
        (bands, rows) in rows_strategy(),
        tolerance in 0.0f64..5.0,
        factor in 0.5f64..2.0,
    ) {
        let wavelengths = grid(500.0, bands);
        let t = table(&wavelengths, &rows, tolerance);
        prop_assert_eq!(t.sort_index().tolerance(), tolerance);
        prop_assert_eq!(t.scale(factor).unwrap().tolerance(), tolerance);
        prop_assert_eq!(t.slice_rows(0..1).unwrap().tolerance(), tolerance);
        prop_assert_eq!(t.linear_correction().unwrap().tolerance(), tolerance);
    }

    #[test]
    fn prop_linear_correction_anchors_are_one(
        (bands, rows) in rows_strategy(),
    ) {
        let wavelengths = grid(500.0, bands);
        let corrected = table(&wavelengths, &rows, 0.5).linear_correction().unwrap();
        for r in 0..rows.len() {
            let spectrum = corrected.row(r).unwrap();
            prop_assert!((spectrum.y[0] - 1.0).abs() < 1e-12);
            prop_assert!((spectrum.y[bands - 1] - 1.0).abs() < 1e-12);
            prop_assert_eq!(&spectrum.metadata, &expected_metadata(r));
        }
    }

    #[test]
    fn prop_straight_line_corrects_to_one(
        intercept in 0.1f64..1.0,
        slope in -1e-4f64..1e-4,
        bands in 2usize..30,
    ) {
        let wavelengths = grid(450.0, bands);
        let row: Vec<f64> = wavelengths.iter().map(|w| intercept + slope * (w - 450.0)).collect();
        let corrected = table(&wavelengths, &[row], 0.5).linear_correction().unwrap();
        for v in corrected.row(0).unwrap().y {
            prop_assert!((v - 1.0).abs() < 1e-9);
        }
    }
}

fn expected_metadata(r: usize) -> BTreeMap<String, MetadataValue> {
    [
        ("phase".to_string(), MetadataValue::Float(15.0 * r as f64)),
        ("site".to_string(), MetadataValue::String(format!("S{r}"))),
    ]
    .into_iter()
    .collect()
}

#[test]
fn negative_and_nan_tolerances_are_rejected() {
    let t = table(&grid(500.0, 3), &[vec![0.1, 0.2, 0.3]], 1.0);
    assert!(matches!(
        t.clone().with_tolerance(-0.1),
        Err(SpectraError::InvalidTolerance(_))
    ));
    assert!(t.with_tolerance(f64::NAN).is_err());
}

#[test]
fn tie_breaks_towards_lower_label() {
    let labels = [1010.0, 1000.0];
    assert_eq!(locate(&labels, 1005.0, 5.0).unwrap(), 1);
    let t = table(&labels, &[vec![0.3, 0.6]], 5.0);
    let band = t.lookup(1005.0).unwrap().into_band().unwrap();
    assert_eq!(band.wavelength, 1000.0);
    assert_relative_eq!(band.values[0], 0.6);
}
