use std::collections::BTreeMap;
use std::ops::Range;

use log::debug;

use super::frame::{Column, Frame, RowIndex};
use super::key::{Key, LevelSelector};
use super::model::{format_key, Band, CellValue, ColumnLabel, MetadataValue, RowKey, Spectrum};
use crate::continuum;
use crate::error::SpectraError;
use crate::locator::{self, Selector, DEFAULT_TOLERANCE};

// ---------------------------------------------------------------------------
// TableState – what makes a frame spectral
// ---------------------------------------------------------------------------

/// The state carried alongside a [`Frame`] through every transform.
#[derive(Debug, Clone, PartialEq)]
pub struct TableState {
    /// Wavelength column labels, in column order.
    pub wavelengths: Vec<f64>,
    /// Every other column.
    pub metadata: Vec<ColumnLabel>,
    /// `None` until set; reads fall back to [`DEFAULT_TOLERANCE`].
    pub tolerance: Option<f64>,
}

// ---------------------------------------------------------------------------
// Selection – result of element access
// ---------------------------------------------------------------------------

/// What a lookup produced, by how many axes were reduced.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Table(SpectralTable),
    Spectrum(Spectrum),
    Band(Band),
    Value(f64),
}

impl Selection {
    pub fn into_table(self) -> Option<SpectralTable> {
        match self {
            Selection::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_spectrum(self) -> Option<Spectrum> {
        match self {
            Selection::Spectrum(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_band(self) -> Option<Band> {
        match self {
            Selection::Band(b) => Some(b),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Selection::Value(v) => Some(*v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SpectralTable
// ---------------------------------------------------------------------------

/// Observations as rows, split into wavelength and metadata columns, with
/// tolerance-aware access by wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralTable {
    frame: Frame,
    state: TableState,
}

impl SpectralTable {
    /// Wrap `frame`, declaring which columns are wavelengths.
    ///
    /// Without an explicit `metadata` list the metadata columns are all
    /// non-wavelength columns in frame order. Wavelengths that are not numeric
    /// columns of the frame are rejected, as is any column left unassigned.
    pub fn new(
        frame: Frame,
        wavelengths: Vec<f64>,
        metadata: Option<Vec<ColumnLabel>>,
    ) -> Result<Self, SpectraError> {
        for (i, &w) in wavelengths.iter().enumerate() {
            if wavelengths[..i].iter().any(|x| x.to_bits() == w.to_bits()) {
                return Err(SpectraError::DuplicateColumn(w.to_string()));
            }
            match frame.column(&ColumnLabel::Wavelength(w)) {
                None => return Err(SpectraError::MissingWavelength(w)),
                Some(Column::Attributes(_)) => return Err(SpectraError::NonNumericWavelength(w)),
                Some(Column::Values(_)) => {}
            }
        }
        let is_wavelength = |label: &ColumnLabel| {
            label
                .as_wavelength()
                .is_some_and(|w| wavelengths.iter().any(|x| x.to_bits() == w.to_bits()))
        };

        let metadata = match metadata {
            Some(metadata) => {
                for (i, label) in metadata.iter().enumerate() {
                    if metadata[..i].iter().any(|m| m.same_as(label)) {
                        return Err(SpectraError::DuplicateColumn(label.to_string()));
                    }
                    if is_wavelength(label) {
                        return Err(SpectraError::OverlappingColumn(label.to_string()));
                    }
                    if frame.position_of(label).is_none() {
                        return Err(SpectraError::ColumnNotFound(label.to_string()));
                    }
                }
                if let Some(stray) = frame
                    .labels()
                    .iter()
                    .find(|l| !is_wavelength(l) && !metadata.iter().any(|m| m.same_as(l)))
                {
                    return Err(SpectraError::UnassignedColumn(stray.to_string()));
                }
                metadata
            }
            None => frame
                .labels()
                .iter()
                .filter(|l| !is_wavelength(l))
                .cloned()
                .collect(),
        };

        Ok(SpectralTable {
            frame,
            state: TableState {
                wavelengths,
                metadata,
                tolerance: None,
            },
        })
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, SpectraError> {
        self.set_tolerance(tolerance)?;
        Ok(self)
    }

    /// Rank-preserving result: new frame, same spectral state.
    pub(crate) fn derive(&self, frame: Frame) -> Self {
        SpectralTable {
            frame,
            state: self.state.clone(),
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn index(&self) -> &RowIndex {
        self.frame.index()
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.state.wavelengths
    }

    pub fn metadata_columns(&self) -> &[ColumnLabel] {
        &self.state.metadata
    }

    pub fn len(&self) -> usize {
        self.frame.n_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.n_rows() == 0
    }

    pub fn tolerance(&self) -> f64 {
        self.state.tolerance.unwrap_or(DEFAULT_TOLERANCE)
    }

    /// Applies to row and column lookups alike.
    pub fn set_tolerance(&mut self, tolerance: f64) -> Result<(), SpectraError> {
        self.state.tolerance = Some(locator::check_tolerance(tolerance)?);
        Ok(())
    }

    // -- views ---------------------------------------------------------------

    /// The wavelength columns only, same rows and tolerance.
    pub fn spectra(&self) -> Result<SpectralTable, SpectraError> {
        Ok(SpectralTable {
            frame: self.frame.select(&self.wavelength_labels())?,
            state: TableState {
                wavelengths: self.state.wavelengths.clone(),
                metadata: Vec::new(),
                tolerance: self.state.tolerance,
            },
        })
    }

    /// The metadata columns only, same rows and tolerance.
    pub fn meta(&self) -> Result<SpectralTable, SpectraError> {
        Ok(SpectralTable {
            frame: self.frame.select(&self.state.metadata)?,
            state: TableState {
                wavelengths: Vec::new(),
                metadata: self.state.metadata.clone(),
                tolerance: self.state.tolerance,
            },
        })
    }

    /// Join another table's columns by row key, e.g. `spectra()` with `meta()`.
    pub fn merge(&self, other: &SpectralTable) -> Result<SpectralTable, SpectraError> {
        let frame = self.frame.merge_on_index(&other.frame)?;
        let wavelengths = self
            .state
            .wavelengths
            .iter()
            .chain(&other.state.wavelengths)
            .copied()
            .collect();
        let metadata = self
            .state
            .metadata
            .iter()
            .chain(&other.state.metadata)
            .cloned()
            .collect();
        let mut merged = SpectralTable::new(frame, wavelengths, Some(metadata))?;
        merged.state.tolerance = self.state.tolerance;
        Ok(merged)
    }

    // -- element access ------------------------------------------------------

    /// Default element access: every row, columns resolved by wavelength.
    ///
    /// Equivalent to `[:, key]` on a single-level index and `[:, :, key]` on a
    /// composite one.
    pub fn lookup(&self, columns: impl Into<Selector>) -> Result<Selection, SpectraError> {
        self.get(&Key::all_rows(self.index().levels(), columns))
    }

    /// A single reflectance value addressed by full row key and wavelength.
    pub fn cell(&self, row: &[MetadataValue], wavelength: f64) -> Result<f64, SpectraError> {
        let key = Key::cell(row.iter().cloned(), wavelength);
        match self.get(&key)? {
            Selection::Value(v) => Ok(v),
            _ => Err(SpectraError::RowNotFound(format!(
                "{} is not unique",
                format_key(row)
            ))),
        }
    }

    /// Resolve `key` against both axes using the table's tolerance.
    pub fn get(&self, key: &Key) -> Result<Selection, SpectraError> {
        let tolerance = self.tolerance();
        let rows = self.resolve_rows(&key.rows, tolerance)?;
        let row_reduced = key.pins_row() && rows.len() == 1;

        debug!(
            "lookup {:?}: {} row(s), tolerance {tolerance}",
            key.columns,
            rows.len()
        );

        if let Selector::Near(x) = key.columns {
            let w = self.state.wavelengths[locator::locate(&self.state.wavelengths, x, tolerance)?];
            if row_reduced {
                return Ok(Selection::Value(self.reflectance(rows[0], w)));
            }
            return Ok(Selection::Band(Band {
                wavelength: w,
                index: rows.iter().map(|&r| self.row_key(r)).collect(),
                values: rows.iter().map(|&r| self.reflectance(r, w)).collect(),
            }));
        }

        let wavelengths = match &key.columns {
            Selector::All => None,
            selector => {
                let mut positions = selector.resolve(&self.state.wavelengths, tolerance)?;
                dedup_in_order(&mut positions);
                Some(
                    positions
                        .into_iter()
                        .map(|p| self.state.wavelengths[p])
                        .collect::<Vec<f64>>(),
                )
            }
        };

        if row_reduced {
            let wavelengths = wavelengths.as_deref().unwrap_or(&self.state.wavelengths);
            return Ok(Selection::Spectrum(self.spectrum_at(rows[0], wavelengths)));
        }

        match wavelengths {
            None => Ok(Selection::Table(self.derive(self.frame.take_rows(&rows)))),
            Some(wavelengths) => {
                let labels: Vec<ColumnLabel> =
                    wavelengths.iter().map(|&w| ColumnLabel::Wavelength(w)).collect();
                let frame = self.frame.take_rows(&rows).select(&labels)?;
                Ok(Selection::Table(SpectralTable {
                    frame,
                    state: TableState {
                        wavelengths,
                        metadata: Vec::new(),
                        tolerance: self.state.tolerance,
                    },
                }))
            }
        }
    }

    fn resolve_rows(&self, levels: &[LevelSelector], tolerance: f64) -> Result<Vec<usize>, SpectraError> {
        let index = self.index();
        if levels.len() != index.levels() {
            return Err(SpectraError::KeyArity {
                expected: index.levels(),
                got: levels.len(),
            });
        }

        // Near levels snap to one stored value first, then act like Exact.
        let mut wanted: Vec<Option<MetadataValue>> = Vec::with_capacity(levels.len());
        for (level, selector) in levels.iter().enumerate() {
            wanted.push(match selector {
                LevelSelector::All => None,
                LevelSelector::Exact(v) => Some(v.clone()),
                LevelSelector::Near(x) => {
                    let labels: Vec<f64> = index
                        .keys()
                        .iter()
                        .map(|k| k[level].as_f64().unwrap_or(f64::NAN))
                        .collect();
                    let pos = locator::locate(&labels, *x, tolerance)?;
                    Some(index.keys()[pos][level].clone())
                }
            });
        }

        let rows: Vec<usize> = index
            .keys()
            .iter()
            .enumerate()
            .filter(|(_, key)| {
                wanted
                    .iter()
                    .zip(key.iter())
                    .all(|(w, v)| w.as_ref().map_or(true, |w| w == v))
            })
            .map(|(pos, _)| pos)
            .collect();

        if rows.is_empty() && wanted.iter().any(Option::is_some) {
            let shown: Vec<String> = wanted
                .iter()
                .map(|w| w.as_ref().map_or(":".to_string(), |v| v.to_string()))
                .collect();
            return Err(SpectraError::RowNotFound(format!("({})", shown.join(", "))));
        }
        Ok(rows)
    }

    // -- positional access ---------------------------------------------------

    /// The cell at a row and column position, ignoring labels.
    pub fn iget(&self, row: usize, column: usize) -> Result<CellValue, SpectraError> {
        self.frame.cell(row, column)
    }

    /// The spectrum of the row at `position`.
    pub fn row(&self, position: usize) -> Result<Spectrum, SpectraError> {
        if position >= self.len() {
            return Err(SpectraError::OutOfBounds {
                row: position,
                column: 0,
                rows: self.len(),
                columns: self.frame.n_columns(),
            });
        }
        Ok(self.spectrum_at(position, &self.state.wavelengths))
    }

    pub fn iter_spectra(&self) -> impl Iterator<Item = Spectrum> + '_ {
        (0..self.len()).map(move |r| self.spectrum_at(r, &self.state.wavelengths))
    }

    fn row_key(&self, row: usize) -> RowKey {
        self.index().keys()[row].clone()
    }

    fn reflectance(&self, row: usize, wavelength: f64) -> f64 {
        self.frame
            .column(&ColumnLabel::Wavelength(wavelength))
            .and_then(Column::as_values)
            .map_or(f64::NAN, |v| v[row])
    }

    fn spectrum_at(&self, row: usize, wavelengths: &[f64]) -> Spectrum {
        let metadata: BTreeMap<String, MetadataValue> = self
            .state
            .metadata
            .iter()
            .filter_map(|label| {
                let value = self.frame.column(label)?.metadata(row)?;
                Some((label.to_string(), value))
            })
            .collect();
        Spectrum {
            key: self.row_key(row),
            x: wavelengths.to_vec(),
            y: wavelengths.iter().map(|&w| self.reflectance(row, w)).collect(),
            metadata,
        }
    }

    fn wavelength_labels(&self) -> Vec<ColumnLabel> {
        self.state
            .wavelengths
            .iter()
            .map(|&w| ColumnLabel::Wavelength(w))
            .collect()
    }

    // -- rank-preserving transforms -------------------------------------------

    /// Keep the rows at `positions`, in that order.
    pub fn take_rows(&self, positions: &[usize]) -> Result<SpectralTable, SpectraError> {
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.len()) {
            return Err(SpectraError::OutOfBounds {
                row: bad,
                column: 0,
                rows: self.len(),
                columns: self.frame.n_columns(),
            });
        }
        Ok(self.derive(self.frame.take_rows(positions)))
    }

    pub fn slice_rows(&self, range: Range<usize>) -> Result<SpectralTable, SpectraError> {
        let positions: Vec<usize> = range.collect();
        self.take_rows(&positions)
    }

    pub fn sort_index(&self) -> SpectralTable {
        self.derive(self.frame.sort_index())
    }

    /// Replace every row's spectrum with `f(spectrum)`.
    ///
    /// `f` must return one value per wavelength. Metadata columns are kept.
    pub fn map_spectra<F>(&self, mut f: F) -> Result<SpectralTable, SpectraError>
    where
        F: FnMut(&[f64]) -> Result<Vec<f64>, SpectraError>,
    {
        let n_wavelengths = self.state.wavelengths.len();
        let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(self.len()); n_wavelengths];

        for spectrum in self.iter_spectra() {
            let mapped = f(&spectrum.y)?;
            if mapped.len() != n_wavelengths {
                return Err(SpectraError::ShapeMismatch(format!(
                    "row {} mapped to {} values for {n_wavelengths} wavelengths",
                    format_key(&spectrum.key),
                    mapped.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(mapped) {
                column.push(value);
            }
        }

        let mut replaced: BTreeMap<u64, Vec<f64>> = self
            .state
            .wavelengths
            .iter()
            .map(|w| w.to_bits())
            .zip(columns)
            .collect();
        let mut frame = Frame::empty(self.index().clone());
        for (label, column) in self.frame.labels().iter().zip(self.frame.columns()) {
            let column = match label.as_wavelength().and_then(|w| replaced.remove(&w.to_bits())) {
                Some(values) => Column::Values(values),
                None => column.clone(),
            };
            frame.push_column(label.clone(), column)?;
        }
        Ok(self.derive(frame))
    }

    /// Multiply every reflectance value by `factor`.
    pub fn scale(&self, factor: f64) -> Result<SpectralTable, SpectraError> {
        self.map_spectra(|y| Ok(y.iter().map(|v| v * factor).collect()))
    }

    /// Divide every spectrum by the straight line joining its first and last
    /// wavelength columns (by position, not by value).
    pub fn linear_correction(&self) -> Result<SpectralTable, SpectraError> {
        let wavelengths = &self.state.wavelengths;
        let bands = (0, wavelengths.len().saturating_sub(1));
        debug!(
            "linear correction of {} spectra, anchors {:?}",
            self.len(),
            bands
        );
        self.map_spectra(|y| continuum::linear_correction(bands, y, wavelengths).map(|(corrected, _)| corrected))
    }
}

fn dedup_in_order(positions: &mut Vec<usize>) {
    let mut seen = std::collections::HashSet::new();
    positions.retain(|p| seen.insert(*p));
}
