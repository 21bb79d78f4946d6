//! Point-spectrometer profile products: a PDS3 attached label followed by
//! the wavelength array, one 2-D spectrum array per observation type (the
//! "minor" key, e.g. radiance or reflectance) and a binary table with one
//! ancillary row per spectrum.

use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use ndarray::Array2;

use super::pds::{parse_label, split_label, Label, OdlObject};
use super::{decode_samples, Endian, SampleType};
use crate::data::model::MetadataValue;

pub const WAVELENGTH_OBJECT: &str = "SP_SPECTRUM_WAV";
pub const SPECTRUM_PREFIX: &str = "SP_SPECTRUM_";
pub const ANCILLARY_OBJECT: &str = "ANCILLARY_AND_SUPPLEMENT_DATA";

/// One named ancillary field, one value per spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct AncillaryField {
    pub name: String,
    pub values: Vec<MetadataValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileProduct {
    pub wavelengths: Vec<f64>,
    /// `(minor, matrix)` in label order; each matrix is `(spectra, bands)`.
    pub spectra: Vec<(String, Array2<f64>)>,
    pub ancillary: Vec<AncillaryField>,
}

// ---------------------------------------------------------------------------
// PDS binary types
// ---------------------------------------------------------------------------

fn pds_sample_type(data_type: &str, bytes: usize) -> Result<(SampleType, Endian)> {
    let int = |signed: bool| -> Result<SampleType> {
        Ok(match (signed, bytes) {
            (true, 1) => SampleType::I8,
            (true, 2) => SampleType::I16,
            (true, 4) => SampleType::I32,
            (true, 8) => SampleType::I64,
            (false, 1) => SampleType::U8,
            (false, 2) => SampleType::U16,
            (false, 4) => SampleType::U32,
            (false, 8) => SampleType::U64,
            _ => bail!("{data_type} cannot be {bytes} bytes wide"),
        })
    };
    let real = || -> Result<SampleType> {
        Ok(match bytes {
            4 => SampleType::F32,
            8 => SampleType::F64,
            _ => bail!("{data_type} cannot be {bytes} bytes wide"),
        })
    };
    Ok(match data_type {
        "MSB_INTEGER" | "SUN_INTEGER" | "INTEGER" => (int(true)?, Endian::Big),
        "MSB_UNSIGNED_INTEGER" | "SUN_UNSIGNED_INTEGER" | "UNSIGNED_INTEGER" => {
            (int(false)?, Endian::Big)
        }
        "LSB_INTEGER" | "PC_INTEGER" | "VAX_INTEGER" => (int(true)?, Endian::Little),
        "LSB_UNSIGNED_INTEGER" | "PC_UNSIGNED_INTEGER" | "VAX_UNSIGNED_INTEGER" => {
            (int(false)?, Endian::Little)
        }
        "IEEE_REAL" | "SUN_REAL" | "MSB_REAL" | "REAL" | "FLOAT" => (real()?, Endian::Big),
        "PC_REAL" | "LSB_REAL" => (real()?, Endian::Little),
        other => bail!("unsupported PDS data type {other}"),
    })
}

fn pds_type_name(ty: SampleType, endian: Endian) -> &'static str {
    match (ty.is_float(), endian) {
        (true, Endian::Big) => "IEEE_REAL",
        (true, Endian::Little) => "PC_REAL",
        (false, endian) => {
            let signed = matches!(
                ty,
                SampleType::I8 | SampleType::I16 | SampleType::I32 | SampleType::I64
            );
            match (signed, endian) {
                (true, Endian::Big) => "MSB_INTEGER",
                (false, Endian::Big) => "MSB_UNSIGNED_INTEGER",
                (true, Endian::Little) => "LSB_INTEGER",
                (false, Endian::Little) => "LSB_UNSIGNED_INTEGER",
            }
        }
    }
}

/// `SCALING_FACTOR` and `OFFSET` of an object, if any.
fn scaling(object: &OdlObject) -> Result<Option<(f64, f64)>> {
    let factor = object.f64_opt("SCALING_FACTOR")?;
    let offset = object.f64_opt("OFFSET")?;
    Ok(match (factor, offset) {
        (None, None) => None,
        (f, o) => Some((f.unwrap_or(1.0), o.unwrap_or(0.0))),
    })
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

struct ArrayData {
    dims: Vec<usize>,
    values: Vec<f64>,
}

fn read_array(bytes: &[u8], label: &Label, name: &str, record_bytes: Option<usize>) -> Result<ArrayData> {
    let object = label
        .child(name)
        .with_context(|| format!("label has no {name} object"))?;
    let offset = label.pointer(name)?.byte_offset(record_bytes)?;

    let dims = object
        .list("AXIS_ITEMS")?
        .iter()
        .map(|d| d.parse::<usize>().with_context(|| format!("{name} AXIS_ITEMS '{d}'")))
        .collect::<Result<Vec<_>>>()?;
    if let Some(axes) = object.get("AXES") {
        if axes.parse::<usize>().ok() != Some(dims.len()) {
            bail!("{name} declares {axes} axes but lists {} AXIS_ITEMS", dims.len());
        }
    }

    let (ty, endian) = pds_sample_type(object.require("ITEM_TYPE")?, object.usize("ITEM_BYTES")?)?;
    let body = bytes
        .get(offset..)
        .with_context(|| format!("{name} starts beyond the end of the file"))?;
    let count = dims
        .iter()
        .try_fold(1usize, |n, &d| n.checked_mul(d))
        .with_context(|| format!("{name} AXIS_ITEMS {dims:?} overflow the address space"))?;
    let mut values = decode_samples(body, count, ty, endian)
        .with_context(|| format!("reading {name}"))?;
    if let Some((factor, add)) = scaling(object)? {
        values.iter_mut().for_each(|v| *v = *v * factor + add);
    }
    Ok(ArrayData { dims, values })
}

fn read_table(bytes: &[u8], label: &Label, name: &str, record_bytes: Option<usize>) -> Result<Vec<AncillaryField>> {
    let table = label
        .child(name)
        .with_context(|| format!("label has no {name} table"))?;
    let offset = label.pointer(name)?.byte_offset(record_bytes)?;
    let rows = table.usize("ROWS")?;
    let row_bytes = table.usize("ROW_BYTES")?;
    if row_bytes == 0 {
        bail!("{name} declares ROW_BYTES = 0");
    }
    let end = rows
        .checked_mul(row_bytes)
        .and_then(|len| len.checked_add(offset))
        .with_context(|| format!("{name} size ({rows} rows of {row_bytes} bytes) overflows"))?;
    let body = bytes
        .get(offset..end)
        .with_context(|| format!("{name} ({rows} rows of {row_bytes} bytes) runs past the end of the file"))?;

    let mut fields = Vec::new();
    for column in table.children.iter().filter(|c| c.name == "COLUMN") {
        let field = column.require("NAME")?.to_string();
        let data_type = column.require("DATA_TYPE")?;
        let start = column.usize("START_BYTE")?.saturating_sub(1);
        let width = column.usize("BYTES")?;
        if start.checked_add(width).map_or(true, |end| end > row_bytes) {
            bail!("column {field} extends past ROW_BYTES = {row_bytes}");
        }
        let scale = scaling(column)?;

        let values = body
            .chunks_exact(row_bytes)
            .map(|row| decode_cell(&row[start..start + width], data_type, scale))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("reading column {field}"))?;
        fields.push(AncillaryField { name: field, values });
    }
    Ok(fields)
}

fn decode_cell(cell: &[u8], data_type: &str, scale: Option<(f64, f64)>) -> Result<MetadataValue> {
    let text = || String::from_utf8_lossy(cell).trim().to_string();
    Ok(match data_type {
        "CHARACTER" => MetadataValue::String(text()),
        "ASCII_INTEGER" => MetadataValue::Integer(
            text().parse().with_context(|| format!("'{}' is not an integer", text()))?,
        ),
        "ASCII_REAL" => MetadataValue::Float(
            text().parse().with_context(|| format!("'{}' is not a number", text()))?,
        ),
        binary => {
            let (ty, endian) = pds_sample_type(binary, cell.len())?;
            let raw = ty.decode(cell, endian);
            match scale {
                Some((factor, add)) => MetadataValue::Float(raw * factor + add),
                None if ty.is_float() => MetadataValue::Float(raw),
                None => MetadataValue::Integer(raw as i64),
            }
        }
    })
}

impl ProfileProduct {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let product =
            Self::from_bytes(&bytes).with_context(|| format!("parsing profile product {}", path.display()))?;
        info!(
            "loaded profile {} ({} spectra x {} bands, {} observation types)",
            path.display(),
            product.n_spectra(),
            product.wavelengths.len(),
            product.spectra.len()
        );
        Ok(product)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (text, label_len) = split_label(bytes)?;
        let label = parse_label(text)?;
        let record_bytes = match label.get("RECORD_BYTES") {
            Some(_) => Some(label.usize("RECORD_BYTES")?),
            None => None,
        };
        debug!("label spans {label_len} bytes, {} objects", label.children.len());

        let wavelengths = read_array(bytes, &label, WAVELENGTH_OBJECT, record_bytes)?.values;

        let mut spectra = Vec::new();
        for object in &label.children {
            let Some(minor) = object.name.strip_prefix(SPECTRUM_PREFIX) else {
                continue;
            };
            if object.name == WAVELENGTH_OBJECT {
                continue;
            }
            let array = read_array(bytes, &label, &object.name, record_bytes)?;
            let [n, bands] = array.dims[..] else {
                bail!("{} must have two axes, found {:?}", object.name, array.dims);
            };
            spectra.push((minor.to_string(), Array2::from_shape_vec((n, bands), array.values)?));
        }

        let ancillary = read_table(bytes, &label, ANCILLARY_OBJECT, record_bytes)?;
        let product = ProfileProduct {
            wavelengths,
            spectra,
            ancillary,
        };
        product.check_shape()?;
        Ok(product)
    }

    /// Every observation type must hold the same number of spectra, each with
    /// one value per wavelength.
    pub fn check_shape(&self) -> Result<()> {
        let bands = self.wavelengths.len();
        if let Some((minor, m)) = self.spectra.iter().find(|(_, m)| m.ncols() != bands) {
            bail!("{minor} has {} bands but {bands} wavelengths are defined", m.ncols());
        }
        if let Some((first, rest)) = self.spectra.split_first() {
            if let Some((minor, m)) = rest.iter().find(|(_, m)| m.nrows() != first.1.nrows()) {
                bail!(
                    "{minor} holds {} spectra but {} holds {}",
                    m.nrows(),
                    first.0,
                    first.1.nrows()
                );
            }
        }
        Ok(())
    }

    /// Number of spectra per observation type.
    pub fn n_spectra(&self) -> usize {
        self.spectra.first().map_or(0, |(_, m)| m.nrows())
    }

    /// Number of ancillary rows.
    pub fn n_ancillary_rows(&self) -> usize {
        self.ancillary.first().map_or(0, |f| f.values.len())
    }

    // -- writing ---------------------------------------------------------------

    /// Serialize as an attached-label product. Arrays are written as
    /// big-endian doubles; ancillary integers as 8-byte `MSB_INTEGER`, floats
    /// as `IEEE_REAL`, booleans as 1-byte unsigned and text as `CHARACTER`.
    /// Null cells become NaN, zero or blanks according to the column type.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let rows = self.n_ancillary_rows();
        if let Some(f) = self.ancillary.iter().find(|f| f.values.len() != rows) {
            bail!("ancillary field {} has {} rows, expected {rows}", f.name, f.values.len());
        }
        let columns = self
            .ancillary
            .iter()
            .map(column_encoding)
            .collect::<Result<Vec<_>>>()?;
        let row_bytes: usize = columns.iter().map(|c| c.width).sum();

        let item = SampleType::F64;
        let wav_len = self.wavelengths.len() * item.size();
        let spectra_lens: Vec<usize> = self.spectra.iter().map(|(_, m)| m.len() * item.size()).collect();

        // Pointers are zero-padded to a fixed width, so the label length does
        // not depend on the offsets written into it.
        let render = |data_start: usize| -> String {
            let mut label = String::new();
            label.push_str("PDS_VERSION_ID = PDS3\r\nRECORD_TYPE = UNDEFINED\r\n");
            let mut at = data_start + 1;
            label.push_str(&format!("^{WAVELENGTH_OBJECT} = {at:010} <BYTES>\r\n"));
            at += wav_len;
            for ((minor, _), len) in self.spectra.iter().zip(&spectra_lens) {
                label.push_str(&format!("^{SPECTRUM_PREFIX}{minor} = {at:010} <BYTES>\r\n"));
                at += len;
            }
            label.push_str(&format!("^{ANCILLARY_OBJECT} = {at:010} <BYTES>\r\n"));

            push_array(&mut label, WAVELENGTH_OBJECT, &self.wavelengths.len().to_string(), item);
            for (minor, m) in &self.spectra {
                let dims = format!("({}, {})", m.nrows(), m.ncols());
                push_array(&mut label, &format!("{SPECTRUM_PREFIX}{minor}"), &dims, item);
            }

            label.push_str(&format!("OBJECT = {ANCILLARY_OBJECT}\r\n"));
            label.push_str("  INTERCHANGE_FORMAT = BINARY\r\n");
            label.push_str(&format!("  ROWS = {rows}\r\n"));
            label.push_str(&format!("  COLUMNS = {}\r\n", columns.len()));
            label.push_str(&format!("  ROW_BYTES = {row_bytes}\r\n"));
            let mut start = 1;
            for (field, column) in self.ancillary.iter().zip(&columns) {
                label.push_str("  OBJECT = COLUMN\r\n");
                label.push_str(&format!("    NAME = \"{}\"\r\n", field.name));
                label.push_str(&format!("    DATA_TYPE = {}\r\n", column.data_type));
                label.push_str(&format!("    START_BYTE = {start}\r\n"));
                label.push_str(&format!("    BYTES = {}\r\n", column.width));
                label.push_str("  END_OBJECT = COLUMN\r\n");
                start += column.width;
            }
            label.push_str(&format!("END_OBJECT = {ANCILLARY_OBJECT}\r\n"));
            label.push_str("END\r\n");
            label
        };

        let label_len = render(0).len();
        let mut out = render(label_len).into_bytes();
        debug_assert_eq!(out.len(), label_len);

        for &w in &self.wavelengths {
            item.encode(w, Endian::Big, &mut out);
        }
        for (_, m) in &self.spectra {
            for &v in m.as_standard_layout().iter() {
                item.encode(v, Endian::Big, &mut out);
            }
        }
        for row in 0..rows {
            for (field, column) in self.ancillary.iter().zip(&columns) {
                column.encode(&field.values[row], &mut out);
            }
        }
        Ok(out)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_bytes()?).with_context(|| format!("writing {}", path.display()))
    }
}

fn push_array(label: &mut String, name: &str, dims: &str, item: SampleType) {
    let axes = if dims.starts_with('(') { 2 } else { 1 };
    label.push_str(&format!("OBJECT = {name}\r\n"));
    label.push_str(&format!("  AXES = {axes}\r\n"));
    label.push_str(&format!("  AXIS_ITEMS = {dims}\r\n"));
    label.push_str(&format!("  ITEM_TYPE = {}\r\n", pds_type_name(item, Endian::Big)));
    label.push_str(&format!("  ITEM_BYTES = {}\r\n", item.size()));
    label.push_str(&format!("END_OBJECT = {name}\r\n"));
}

/// How one ancillary column is laid out in a row.
struct ColumnEncoding {
    data_type: &'static str,
    width: usize,
    kind: Option<SampleType>,
}

impl ColumnEncoding {
    fn encode(&self, value: &MetadataValue, out: &mut Vec<u8>) {
        match self.kind {
            Some(ty) => {
                let v = match value {
                    MetadataValue::Integer(i) => *i as f64,
                    MetadataValue::Float(f) => *f,
                    MetadataValue::Bool(b) => f64::from(u8::from(*b)),
                    _ if ty.is_float() => f64::NAN,
                    _ => 0.0,
                };
                ty.encode(v, Endian::Big, out);
            }
            None => {
                let text = match value {
                    MetadataValue::Null => String::new(),
                    other => other.to_string(),
                };
                let mut cell = text.into_bytes();
                cell.resize(self.width, b' ');
                out.extend_from_slice(&cell);
            }
        }
    }
}

fn column_encoding(field: &AncillaryField) -> Result<ColumnEncoding> {
    let first = field.values.iter().find(|v| !matches!(v, MetadataValue::Null));
    let binary = |ty: SampleType| ColumnEncoding {
        data_type: pds_type_name(ty, Endian::Big),
        width: ty.size(),
        kind: Some(ty),
    };
    let encoding = match first {
        Some(MetadataValue::Integer(_)) => binary(SampleType::I64),
        Some(MetadataValue::Float(_)) | Some(MetadataValue::Null) | None => binary(SampleType::F64),
        Some(MetadataValue::Bool(_)) => binary(SampleType::U8),
        Some(MetadataValue::String(_)) => ColumnEncoding {
            data_type: "CHARACTER",
            width: field
                .values
                .iter()
                .map(|v| v.to_string().len())
                .max()
                .unwrap_or(1)
                .max(1),
            kind: None,
        },
    };
    let mixed = field.values.iter().any(|v| {
        !matches!(v, MetadataValue::Null) && std::mem::discriminant(v) != std::mem::discriminant(first.unwrap_or(v))
    });
    if mixed {
        bail!("ancillary field {} mixes value types", field.name);
    }
    Ok(encoding)
}
