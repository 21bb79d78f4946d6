use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::frame::{Column, Frame, RowIndex};
use super::model::{ColumnLabel, MetadataValue, Spectrum};
use super::table::SpectralTable;
use crate::config::LoaderConfig;
use crate::error::SpectraError;

/// Load a spectral table, choosing the reader by file extension:
///
/// | extension | reader | tolerance |
/// |---|---|---|
/// | `hdr`, `img`, `dat`, `raw`, `bsq`, `bil`, `bip` | ENVI imaging cube | `imaging_cube_tolerance` |
/// | `lbl`, `spc` | profile product | `point_profiler_tolerance` |
/// | `parquet`, `pq`, `json`, `csv` | per-record `x`/`y` tables | `tabular_tolerance` |
pub fn load_file(path: &Path, config: &LoaderConfig) -> Result<SpectralTable> {
    config.validate()?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "hdr" | "img" | "dat" | "raw" | "bsq" | "bil" | "bip" => {
            SpectralTable::from_imaging_cube(path, config.imaging_cube_tolerance)?
        }
        "lbl" | "spc" => SpectralTable::from_point_profiler(path, config.point_profiler_tolerance)?,
        "parquet" | "pq" => tabular(load_parquet(path)?, config)?,
        "json" => tabular(load_json(path)?, config)?,
        "csv" => tabular(load_csv(path)?, config)?,
        other => bail!("no reader for '.{other}' files ({})", path.display()),
    };
    info!(
        "loaded {}: {} rows, {} wavelengths, {} metadata columns",
        path.display(),
        table.len(),
        table.wavelengths().len(),
        table.metadata_columns().len()
    );
    Ok(table)
}

fn tabular(spectra: Vec<Spectrum>, config: &LoaderConfig) -> Result<SpectralTable> {
    let table = SpectralTable::from_spectra(spectra)?.with_tolerance(config.tabular_tolerance)?;
    Ok(table)
}

impl SpectralTable {
    /// Build a table from records sharing one wavelength axis.
    ///
    /// Rows are indexed `id = 0..n` in record order. Metadata columns are the
    /// sorted union of the records' fields; a record lacking a field gets
    /// `Null` there.
    pub fn from_spectra(spectra: Vec<Spectrum>) -> Result<SpectralTable, SpectraError> {
        let axis: Vec<f64> = spectra.first().map(|s| s.x.clone()).unwrap_or_default();
        for (i, s) in spectra.iter().enumerate() {
            if s.y.len() != s.x.len() {
                return Err(SpectraError::ShapeMismatch(format!(
                    "record {i}: x has {} values but y has {}",
                    s.x.len(),
                    s.y.len()
                )));
            }
            let same = s.x.len() == axis.len()
                && s.x.iter().zip(&axis).all(|(a, b)| a.to_bits() == b.to_bits());
            if !same {
                return Err(SpectraError::ShapeMismatch(format!(
                    "record {i} has a different wavelength axis than record 0"
                )));
            }
        }

        let mut frame = Frame::empty(RowIndex::range("id", spectra.len()));
        for (band, &w) in axis.iter().enumerate() {
            let values = spectra.iter().map(|s| s.y[band]).collect();
            frame.push_column(ColumnLabel::Wavelength(w), Column::Values(values))?;
        }

        let fields: BTreeSet<&String> = spectra.iter().flat_map(|s| s.metadata.keys()).collect();
        for field in &fields {
            let values = spectra
                .iter()
                .map(|s| s.metadata.get(*field).cloned().unwrap_or(MetadataValue::Null))
                .collect();
            frame.push_column(ColumnLabel::Name((*field).clone()), Column::Attributes(values))?;
        }
        debug!(
            "assembled {} records: {} bands, {} fields",
            spectra.len(),
            axis.len(),
            fields.len()
        );

        SpectralTable::new(frame, axis, None)
    }
}

/// Per-record wavelength and value list fields of the tabular formats.
const AXIS_FIELD: &str = "x";
const VALUES_FIELD: &str = "y";

fn record(row: usize, x: Vec<f64>, y: Vec<f64>, metadata: BTreeMap<String, MetadataValue>) -> Result<Spectrum> {
    if x.len() != y.len() {
        bail!("record {row}: {} wavelengths but {} values", x.len(), y.len());
    }
    Ok(Spectrum {
        key: vec![MetadataValue::Integer(row as i64)],
        x,
        y,
        metadata,
    })
}

// -- JSON ----------------------------------------------------------------------

/// An array of objects, each with `x` and `y` number arrays; every other
/// member is metadata.
fn load_json(path: &Path) -> Result<Vec<Spectrum>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let rows: Vec<JsonMap<String, JsonValue>> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not an array of JSON records", path.display()))?;

    rows.into_iter()
        .enumerate()
        .map(|(row, mut fields)| {
            let x = json_floats(fields.remove(AXIS_FIELD), AXIS_FIELD)
                .with_context(|| format!("record {row}"))?;
            let y = json_floats(fields.remove(VALUES_FIELD), VALUES_FIELD)
                .with_context(|| format!("record {row}"))?;
            let metadata = fields.into_iter().map(|(k, v)| (k, json_metadata(v))).collect();
            record(row, x, y, metadata)
        })
        .collect()
}

fn json_floats(value: Option<JsonValue>, field: &str) -> Result<Vec<f64>> {
    let Some(JsonValue::Array(items)) = value else {
        bail!("'{field}' must be an array of numbers");
    };
    items
        .iter()
        .map(|v| v.as_f64().with_context(|| format!("'{field}' holds {v}, not a number")))
        .collect()
}

fn json_metadata(value: JsonValue) -> MetadataValue {
    match value {
        JsonValue::Null => MetadataValue::Null,
        JsonValue::Bool(b) => MetadataValue::Bool(b),
        JsonValue::String(s) => MetadataValue::String(s),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => MetadataValue::Integer(i),
            (None, Some(f)) => MetadataValue::Float(f),
            (None, None) => MetadataValue::String(n.to_string()),
        },
        nested => MetadataValue::String(nested.to_string()),
    }
}

// -- CSV -----------------------------------------------------------------------

/// A header row, then one record per line. The `x` and `y` cells hold
/// `;`-joined numbers (`"750;1000;1250"`); other cells are typed with
/// [`MetadataValue::guess`].
fn load_csv(path: &Path) -> Result<Vec<Spectrum>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let headers = reader.headers().context("reading CSV header row")?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("CSV header has no '{name}' column"))
    };
    let (xi, yi) = (position(AXIS_FIELD)?, position(VALUES_FIELD)?);

    let mut spectra = Vec::new();
    for (row, line) in reader.records().enumerate() {
        let line = line.with_context(|| format!("CSV record {row}"))?;
        let cell = |i: usize| line.get(i).unwrap_or_default();
        let x = split_floats(cell(xi)).with_context(|| format!("record {row} '{AXIS_FIELD}'"))?;
        let y = split_floats(cell(yi)).with_context(|| format!("record {row} '{VALUES_FIELD}'"))?;
        let metadata = headers
            .iter()
            .zip(line.iter())
            .enumerate()
            .filter(|&(i, _)| i != xi && i != yi)
            .map(|(_, (name, value))| (name.to_string(), MetadataValue::guess(value)))
            .collect();
        spectra.push(record(row, x, y, metadata)?);
    }
    Ok(spectra)
}

fn split_floats(cell: &str) -> Result<Vec<f64>> {
    cell.split(';')
        .map(str::trim)
        .map(|tok| tok.parse::<f64>().with_context(|| format!("'{tok}' is not a number")))
        .collect()
}

// -- Parquet -------------------------------------------------------------------

/// `x` and `y` are list columns (`List` or `LargeList` of any numeric type);
/// scalar columns become metadata.
fn load_parquet(path: &Path) -> Result<Vec<Spectrum>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let batches = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet footer")?
        .build()
        .context("building parquet reader")?;

    let mut spectra = Vec::new();
    for batch in batches {
        let batch = batch.context("decoding parquet row group")?;
        let column = |name: &str| {
            batch
                .column_by_name(name)
                .with_context(|| format!("parquet schema has no '{name}' column"))
        };
        let (xs, ys) = (column(AXIS_FIELD)?, column(VALUES_FIELD)?);
        let meta: Vec<(&str, &ArrayRef)> = batch
            .schema_ref()
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(f, c)| (f.name().as_str(), c))
            .filter(|(name, _)| *name != AXIS_FIELD && *name != VALUES_FIELD)
            .collect();

        for i in 0..batch.num_rows() {
            let row = spectra.len();
            let x = list_floats(xs, i).with_context(|| format!("record {row} '{AXIS_FIELD}'"))?;
            let y = list_floats(ys, i).with_context(|| format!("record {row} '{VALUES_FIELD}'"))?;
            let metadata = meta
                .iter()
                .map(|(name, col)| (name.to_string(), arrow_metadata(col, i)))
                .collect();
            spectra.push(record(row, x, y, metadata)?);
        }
    }
    Ok(spectra)
}

/// One list cell as `f64`s; null items read as NaN.
fn list_floats(col: &ArrayRef, i: usize) -> Result<Vec<f64>> {
    if col.is_null(i) {
        bail!("list cell is null");
    }
    let items = if let Some(list) = col.as_list_opt::<i32>() {
        list.value(i)
    } else if let Some(list) = col.as_list_opt::<i64>() {
        list.value(i)
    } else {
        bail!("expected a list column, found {}", col.data_type());
    };
    let items = cast(&items, &DataType::Float64)
        .with_context(|| format!("list items of type {} are not numeric", items.data_type()))?;
    let floats = items
        .as_primitive_opt::<Float64Type>()
        .context("cast did not produce Float64 items")?;
    Ok(floats.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// One scalar cell as metadata. Types without a metadata counterpart keep
/// their type name.
fn arrow_metadata(col: &ArrayRef, i: usize) -> MetadataValue {
    if col.is_null(i) {
        return MetadataValue::Null;
    }
    let ty = col.data_type();
    let scalar = |to: &DataType| cast(&col.slice(i, 1), to).ok().filter(|a| !a.is_null(0));
    let value = if ty.is_integer() {
        scalar(&DataType::Int64)
            .and_then(|a| a.as_primitive_opt::<Int64Type>().map(|a| MetadataValue::Integer(a.value(0))))
    } else if ty.is_floating() {
        scalar(&DataType::Float64)
            .and_then(|a| a.as_primitive_opt::<Float64Type>().map(|a| MetadataValue::Float(a.value(0))))
    } else {
        match ty {
            DataType::Boolean => col.as_boolean_opt().map(|a| MetadataValue::Bool(a.value(i))),
            DataType::Utf8 => col.as_string_opt::<i32>().map(|a| a.value(i).into()),
            DataType::LargeUtf8 => col.as_string_opt::<i64>().map(|a| a.value(i).into()),
            _ => None,
        }
    };
    value.unwrap_or_else(|| MetadataValue::String(ty.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_json_records() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "obs.json",
            r#"[
                {"x": [750.0, 1000.0], "y": [0.1, 0.2], "target": "mare", "orbit": 12},
                {"x": [750.0, 1000.0], "y": [0.3, 0.4], "target": "crater"}
            ]"#,
        );
        let table = load_file(&path, &LoaderConfig::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.wavelengths(), &[750.0, 1000.0]);
        assert_eq!(table.tolerance(), 0.5);

        let orbit = table.frame().column(&"orbit".into()).unwrap();
        assert_eq!(orbit.metadata(0), Some(MetadataValue::Integer(12)));
        assert_eq!(orbit.metadata(1), Some(MetadataValue::Null));
        assert_eq!(table.cell(&[1_i64.into()], 1000.4).unwrap(), 0.4);
    }

    #[test]
    fn test_load_csv_guesses_metadata_types() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "obs.csv",
            "x,y,phase,site\n\"750;1000\",\"0.1;0.2\",30.5,A\n\"750;1000\",\"0.5;0.6\",45,B\n",
        );
        let table = load_file(&path, &LoaderConfig::default()).unwrap();
        let phase = table.frame().column(&"phase".into()).unwrap();
        assert_eq!(phase.metadata(0), Some(MetadataValue::Float(30.5)));
        assert_eq!(phase.metadata(1), Some(MetadataValue::Integer(45)));
        assert_eq!(table.meta().unwrap().metadata_columns().len(), 2);
    }

    #[test]
    fn test_mismatched_axes_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "obs.json",
            r#"[{"x": [750.0], "y": [0.1]}, {"x": [751.0], "y": [0.2]}]"#,
        );
        let err = load_file(&path, &LoaderConfig::default()).unwrap_err();
        assert!(err.to_string().contains("different wavelength axis"));
    }

    #[test]
    fn test_record_lengths_must_agree() {
        let dir = TempDir::new().unwrap();
        let json = write(&dir, "obs.json", r#"[{"x": [750.0, 1000.0], "y": [0.1]}]"#);
        let err = load_file(&json, &LoaderConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("record 0: 2 wavelengths but 1 values"));

        let csv = write(&dir, "obs.csv", "x,y\n\"750;1000\",\"0.1;oops\"\n");
        let err = load_file(&csv, &LoaderConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("'oops' is not a number"));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "obs.txt", "");
        assert!(load_file(&path, &LoaderConfig::default()).is_err());
    }

    #[test]
    fn test_from_spectra_empty() {
        let table = SpectralTable::from_spectra(Vec::new()).unwrap();
        assert!(table.is_empty());
        assert!(table.wavelengths().is_empty());
    }
}
