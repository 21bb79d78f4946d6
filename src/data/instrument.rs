use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use ndarray::Array2;

use super::frame::{Column, Frame, RowIndex};
use super::model::{ColumnLabel, MetadataValue, RowKey};
use super::table::SpectralTable;
use crate::formats::envi::EnviCube;
use crate::formats::profiler::ProfileProduct;

/// Default matching tolerance for imaging-cube tables (nm).
pub const IMAGING_CUBE_TOLERANCE: f64 = 2.0;
/// Default matching tolerance for point-profiler tables (nm).
pub const POINT_PROFILER_TOLERANCE: f64 = 1.0;

/// One frame column per matrix column, labelled by wavelength.
fn wavelength_columns(frame: &mut Frame, wavelengths: &[f64], matrix: &Array2<f64>) -> Result<()> {
    if matrix.ncols() != wavelengths.len() {
        bail!(
            "{} bands of data for {} wavelengths",
            matrix.ncols(),
            wavelengths.len()
        );
    }
    for (&w, column) in wavelengths.iter().zip(matrix.columns()) {
        frame.push_column(ColumnLabel::Wavelength(w), Column::Values(column.to_vec()))?;
    }
    Ok(())
}

impl SpectralTable {
    // -----------------------------------------------------------------------
    // Imaging spectrometer cubes
    // -----------------------------------------------------------------------

    /// Load an ENVI cube (header or data path) as one row per pixel.
    pub fn from_imaging_cube(path: impl AsRef<Path>, tolerance: f64) -> Result<SpectralTable> {
        let path = path.as_ref();
        let cube = EnviCube::open(path)?;
        SpectralTable::from_cube(&cube, tolerance)
            .with_context(|| format!("building table from {}", path.display()))
    }

    /// Rows are indexed by `(x, y)` and sorted; every non-structural header
    /// field becomes a constant metadata column.
    pub fn from_cube(cube: &EnviCube, tolerance: f64) -> Result<SpectralTable> {
        let wavelengths = cube.header.wavelengths.clone();
        if wavelengths.len() != cube.header.bands {
            bail!(
                "header lists {} wavelengths for {} bands",
                wavelengths.len(),
                cube.header.bands
            );
        }
        let width = cube.width();
        let matrix = cube.pixel_matrix()?;

        let keys: Vec<RowKey> = (0..matrix.nrows())
            .map(|i| {
                vec![
                    MetadataValue::Integer((i % width) as i64),
                    MetadataValue::Integer((i / width) as i64),
                ]
            })
            .collect();
        let index = RowIndex::new(vec!["x".into(), "y".into()], keys)?;

        let mut spectra = Frame::empty(index.clone());
        wavelength_columns(&mut spectra, &wavelengths, &matrix)?;

        let mut meta = Frame::empty(index);
        let mut meta_labels = Vec::new();
        for (name, raw) in cube.header.metadata() {
            let value = MetadataValue::guess(raw);
            meta.push_column(
                ColumnLabel::Name(name.clone()),
                Column::Attributes(vec![value; matrix.nrows()]),
            )?;
            meta_labels.push(ColumnLabel::Name(name.clone()));
        }
        debug!(
            "cube {}x{}: {} bands, {} header fields",
            width,
            cube.height(),
            wavelengths.len(),
            meta_labels.len()
        );

        let frame = spectra.merge_on_index(&meta)?.sort_index();
        let table = SpectralTable::new(frame, wavelengths, Some(meta_labels))?.with_tolerance(tolerance)?;
        info!("imaging cube table: {} pixels", table.len());
        Ok(table)
    }

    // -----------------------------------------------------------------------
    // Point spectrometer profiles
    // -----------------------------------------------------------------------

    /// Load a profile product: one row per (observation type, spectrum).
    pub fn from_point_profiler(path: impl AsRef<Path>, tolerance: f64) -> Result<SpectralTable> {
        let path = path.as_ref();
        let product = ProfileProduct::open(path)?;
        SpectralTable::from_profile(&product, tolerance)
            .with_context(|| format!("building table from {}", path.display()))
    }

    /// Rows are indexed by `(minor, id)`, ordered by id and then by the
    /// label order of the observation types. Ancillary fields are joined on
    /// `id`; a spectrum without an ancillary row is an error.
    pub fn from_profile(product: &ProfileProduct, tolerance: f64) -> Result<SpectralTable> {
        product.check_shape().context("profile product is not rectangular")?;
        let n = product.n_spectra();
        let minors = &product.spectra;

        let mut keys = Vec::with_capacity(n * minors.len());
        let mut order = Vec::with_capacity(n * minors.len());
        for id in 0..n {
            for (m, (minor, _)) in minors.iter().enumerate() {
                keys.push(vec![
                    MetadataValue::String(minor.clone()),
                    MetadataValue::Integer(id as i64),
                ]);
                order.push((m, id));
            }
        }
        let index = RowIndex::new(vec!["minor".into(), "id".into()], keys)?;

        let bands = product.wavelengths.len();
        let stacked = Array2::from_shape_fn((order.len(), bands), |(row, band)| {
            let (m, id) = order[row];
            minors[m].1[[id, band]]
        });
        let mut frame = Frame::empty(index);
        wavelength_columns(&mut frame, &product.wavelengths, &stacked)?;

        let rows = product.n_ancillary_rows();
        let mut ancillary = Frame::empty(RowIndex::range("id", rows));
        let mut meta_labels = Vec::new();
        for field in &product.ancillary {
            let label = ColumnLabel::Name(field.name.clone());
            ancillary.push_column(label.clone(), Column::Attributes(field.values.clone()))?;
            meta_labels.push(label);
        }

        let frame = frame
            .merge_on_level("id", &ancillary)
            .context("joining ancillary data on spectrum id")?;
        let table = SpectralTable::new(frame, product.wavelengths.clone(), Some(meta_labels))?
            .with_tolerance(tolerance)?;
        info!(
            "point profiler table: {} spectra x {} observation types",
            n,
            minors.len()
        );
        Ok(table)
    }
}
