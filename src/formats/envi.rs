//! ENVI-format imaging spectrometer cubes: a text `.hdr` header beside a raw
//! band-sequential, band-interleaved-by-line or band-interleaved-by-pixel file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info};
use ndarray::{Array2, Array3, Axis};

use super::{decode_samples, Endian, SampleType};

/// Header fields that describe the raster layout rather than the scene.
const STRUCTURAL_KEYS: &[&str] = &[
    "samples",
    "lines",
    "bands",
    "header offset",
    "data type",
    "interleave",
    "byte order",
    "wavelength",
    "file type",
];

/// Extensions tried, in order, when looking for the raw data beside a header.
const DATA_EXTENSIONS: &[&str] = &["img", "IMG", "dat", "raw", "bsq", "bil", "bip"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    Bsq,
    Bil,
    Bip,
}

impl Interleave {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bsq" => Ok(Interleave::Bsq),
            "bil" => Ok(Interleave::Bil),
            "bip" => Ok(Interleave::Bip),
            other => bail!("unknown interleave '{other}'"),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Interleave::Bsq => "bsq",
            Interleave::Bil => "bil",
            Interleave::Bip => "bip",
        }
    }
}

/// ENVI `data type` code ↔ sample type.
fn sample_type(code: u32) -> Result<SampleType> {
    Ok(match code {
        1 => SampleType::U8,
        2 => SampleType::I16,
        3 => SampleType::I32,
        4 => SampleType::F32,
        5 => SampleType::F64,
        12 => SampleType::U16,
        13 => SampleType::U32,
        14 => SampleType::I64,
        15 => SampleType::U64,
        other => bail!("unsupported ENVI data type {other}"),
    })
}

fn data_type_code(ty: SampleType) -> Result<u32> {
    Ok(match ty {
        SampleType::U8 => 1,
        SampleType::I16 => 2,
        SampleType::I32 => 3,
        SampleType::F32 => 4,
        SampleType::F64 => 5,
        SampleType::U16 => 12,
        SampleType::U32 => 13,
        SampleType::I64 => 14,
        SampleType::U64 => 15,
        SampleType::I8 => bail!("ENVI has no signed 8-bit data type"),
    })
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EnviHeader {
    /// Pixels per line (raster width).
    pub samples: usize,
    /// Lines (raster height).
    pub lines: usize,
    pub bands: usize,
    pub header_offset: usize,
    pub data_type: SampleType,
    pub interleave: Interleave,
    pub byte_order: Endian,
    /// One centre wavelength per band, in band order.
    pub wavelengths: Vec<f64>,
    /// Every other header field, keys lower-cased, values as written.
    pub fields: BTreeMap<String, String>,
}

impl EnviHeader {
    /// A header for a little-endian BSQ cube of `f32` samples.
    pub fn new(samples: usize, lines: usize, wavelengths: Vec<f64>) -> Self {
        EnviHeader {
            samples,
            lines,
            bands: wavelengths.len(),
            header_offset: 0,
            data_type: SampleType::F32,
            interleave: Interleave::Bsq,
            byte_order: Endian::Little,
            wavelengths,
            fields: BTreeMap::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        match lines.next() {
            Some(first) if first.trim() == "ENVI" => {}
            _ => bail!("missing ENVI magic on the first header line"),
        }

        let mut raw: BTreeMap<String, String> = BTreeMap::new();
        let mut pending: Option<(String, String)> = None;

        for line in lines {
            if let Some((key, mut value)) = pending.take() {
                value.push(' ');
                value.push_str(line.trim());
                if value.contains('}') {
                    raw.insert(key, value);
                } else {
                    pending = Some((key, value));
                }
                continue;
            }

            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                bail!("malformed header line '{line}'");
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if value.starts_with('{') && !value.contains('}') {
                pending = Some((key, value));
            } else {
                raw.insert(key, value);
            }
        }
        if let Some((key, _)) = pending {
            bail!("unterminated '{{' in header field '{key}'");
        }

        let number = |key: &str| -> Result<usize> {
            raw.get(key)
                .with_context(|| format!("header is missing '{key}'"))?
                .trim()
                .parse::<usize>()
                .with_context(|| format!("header field '{key}' is not a count"))
        };

        let samples = number("samples")?;
        let lines = number("lines")?;
        let bands = number("bands")?;
        let header_offset = match raw.get("header offset") {
            Some(_) => number("header offset")?,
            None => 0,
        };
        let data_type = sample_type(number("data type")? as u32)?;
        let interleave = match raw.get("interleave") {
            Some(s) => Interleave::parse(s)?,
            None => Interleave::Bsq,
        };
        let byte_order = match raw.get("byte order").map(|s| s.trim()) {
            None | Some("0") => Endian::Little,
            Some("1") => Endian::Big,
            Some(other) => bail!("unknown byte order '{other}'"),
        };
        let wavelengths = match raw.get("wavelength") {
            Some(list) => parse_list(list)
                .iter()
                .map(|s| {
                    s.parse::<f64>()
                        .with_context(|| format!("wavelength '{s}' is not a number"))
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let fields = raw
            .into_iter()
            .filter(|(k, _)| !STRUCTURAL_KEYS.contains(&k.as_str()))
            .collect();

        Ok(EnviHeader {
            samples,
            lines,
            bands,
            header_offset,
            data_type,
            interleave,
            byte_order,
            wavelengths,
            fields,
        })
    }

    pub fn to_text(&self) -> Result<String> {
        let mut out = String::from("ENVI\n");
        out.push_str(&format!("samples = {}\n", self.samples));
        out.push_str(&format!("lines = {}\n", self.lines));
        out.push_str(&format!("bands = {}\n", self.bands));
        out.push_str(&format!("header offset = {}\n", self.header_offset));
        out.push_str("file type = ENVI Standard\n");
        out.push_str(&format!("data type = {}\n", data_type_code(self.data_type)?));
        out.push_str(&format!("interleave = {}\n", self.interleave.as_str()));
        let order = match self.byte_order {
            Endian::Little => 0,
            Endian::Big => 1,
        };
        out.push_str(&format!("byte order = {order}\n"));
        for (key, value) in &self.fields {
            out.push_str(&format!("{key} = {value}\n"));
        }
        if !self.wavelengths.is_empty() {
            let list: Vec<String> = self.wavelengths.iter().map(|w| w.to_string()).collect();
            out.push_str(&format!("wavelength = {{\n {} }}\n", list.join(",\n ")));
        }
        Ok(out)
    }

    /// Scene fields: every field except raster layout and wavelengths.
    /// Braced lists keep their braces.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    fn sample_count(&self) -> Result<usize> {
        self.samples
            .checked_mul(self.lines)
            .and_then(|n| n.checked_mul(self.bands))
            .with_context(|| {
                format!(
                    "{} x {} x {} samples overflow the address space",
                    self.samples, self.lines, self.bands
                )
            })
    }

    fn data_len(&self) -> Result<usize> {
        self.sample_count()?
            .checked_mul(self.data_type.size())
            .context("cube size overflows the address space")
    }
}

/// Split `{ a, b, c }` into its trimmed items.
fn parse_list(value: &str) -> Vec<&str> {
    value
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Cube
// ---------------------------------------------------------------------------

/// A fully loaded cube. `data` is indexed `[line, sample, band]`, i.e.
/// `[y, x, band]`, whatever the on-disk interleave.
#[derive(Debug, Clone, PartialEq)]
pub struct EnviCube {
    pub header: EnviHeader,
    pub data: Array3<f64>,
}

/// Resolve `(header, data)` paths from either of the two files.
pub fn companion_paths(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let is_header = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("hdr"));

    if is_header {
        let data = DATA_EXTENSIONS
            .iter()
            .map(|ext| path.with_extension(ext))
            .chain(std::iter::once(path.with_extension("")))
            .find(|p| p.is_file())
            .with_context(|| format!("no data file found beside {}", path.display()))?;
        return Ok((path.to_path_buf(), data));
    }

    let replaced = path.with_extension("hdr");
    let appended = PathBuf::from(format!("{}.hdr", path.display()));
    let header = [replaced, appended]
        .into_iter()
        .find(|p| p.is_file())
        .with_context(|| format!("no .hdr header found for {}", path.display()))?;
    Ok((header, path.to_path_buf()))
}

impl EnviCube {
    /// Open a cube from its header or its data file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (header_path, data_path) = companion_paths(path.as_ref())?;
        let text = std::fs::read_to_string(&header_path)
            .with_context(|| format!("reading ENVI header {}", header_path.display()))?;
        let header = EnviHeader::parse(&text)
            .with_context(|| format!("parsing ENVI header {}", header_path.display()))?;
        debug!(
            "{}: {}x{} pixels, {} bands, {:?} {:?}",
            header_path.display(),
            header.samples,
            header.lines,
            header.bands,
            header.data_type,
            header.interleave
        );

        let bytes = std::fs::read(&data_path)
            .with_context(|| format!("reading ENVI data {}", data_path.display()))?;
        let cube = Self::from_bytes(header, &bytes)
            .with_context(|| format!("decoding ENVI data {}", data_path.display()))?;
        info!(
            "loaded cube {} ({} pixels x {} bands)",
            data_path.display(),
            cube.header.samples * cube.header.lines,
            cube.header.bands
        );
        Ok(cube)
    }

    /// Decode raw data laid out as `header` describes.
    pub fn from_bytes(header: EnviHeader, bytes: &[u8]) -> Result<Self> {
        let body = bytes
            .get(header.header_offset..)
            .context("header offset lies beyond the end of the data")?;
        let data_len = header.data_len()?;
        if body.len() < data_len {
            bail!("data holds {} bytes, header describes {data_len}", body.len());
        }
        let count = header.sample_count()?;
        let values = decode_samples(body, count, header.data_type, header.byte_order)?;

        let (w, h, b) = (header.samples, header.lines, header.bands);
        let data = match header.interleave {
            Interleave::Bsq => Array3::from_shape_vec((b, h, w), values)?.permuted_axes([1, 2, 0]),
            Interleave::Bil => Array3::from_shape_vec((h, b, w), values)?.permuted_axes([0, 2, 1]),
            Interleave::Bip => Array3::from_shape_vec((h, w, b), values)?,
        };
        Ok(EnviCube {
            header,
            data: data.as_standard_layout().into_owned(),
        })
    }

    pub fn width(&self) -> usize {
        self.header.samples
    }

    pub fn height(&self) -> usize {
        self.header.lines
    }

    /// One row per pixel, one column per band. Row `i` is pixel
    /// `(i % width, i / width)`.
    pub fn pixel_matrix(&self) -> Result<Array2<f64>> {
        let pixels = self.width() * self.height();
        let matrix = self
            .data
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((pixels, self.header.bands))?;
        Ok(matrix)
    }

    /// Write the header beside `data_path` (as `<data_path>.hdr` with the
    /// extension replaced) and the samples in the header's layout.
    pub fn write(&self, data_path: impl AsRef<Path>) -> Result<PathBuf> {
        let data_path = data_path.as_ref();
        let header = &self.header;
        let expected = (header.lines, header.samples, header.bands);
        if self.data.dim() != expected {
            bail!(
                "cube is {:?} but the header describes {:?}",
                self.data.dim(),
                expected
            );
        }

        let ordered = match header.interleave {
            Interleave::Bsq => self.data.view().permuted_axes([2, 0, 1]),
            Interleave::Bil => self.data.view().permuted_axes([0, 2, 1]),
            Interleave::Bip => self.data.view(),
        };
        let mut bytes = vec![0u8; header.header_offset];
        bytes.reserve(header.data_len()?);
        for &v in ordered.iter() {
            header.data_type.encode(v, header.byte_order, &mut bytes);
        }

        let header_path = data_path.with_extension("hdr");
        std::fs::write(&header_path, header.to_text()?)
            .with_context(|| format!("writing {}", header_path.display()))?;
        std::fs::write(data_path, bytes).with_context(|| format!("writing {}", data_path.display()))?;
        Ok(header_path)
    }

    /// The spectrum of one pixel.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Vec<f64>> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(self.data.index_axis(Axis(0), y).index_axis(Axis(0), x).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "ENVI
description = {
  M3 Level 2 reflectance, synthetic}
samples = 3
lines = 2
bands = 2
header offset = 0
file type = ENVI Standard
data type = 4
interleave = bil
sensor type = M3
byte order = 0
wavelength units = Nanometers
wavelength = { 540.84, 1489.5 }
";

    /// value = 100 * band + 10 * y + x
    fn synthetic(interleave: Interleave) -> EnviCube {
        let mut header = EnviHeader::new(3, 2, vec![540.84, 1489.5]);
        header.interleave = interleave;
        header.data_type = SampleType::I16;
        header.byte_order = Endian::Big;
        let data = Array3::from_shape_fn((2, 3, 2), |(y, x, b)| (100 * b + 10 * y + x) as f64);
        EnviCube { header, data }
    }

    #[test]
    fn test_parse_header() {
        let header = EnviHeader::parse(HEADER).unwrap();
        assert_eq!((header.samples, header.lines, header.bands), (3, 2, 2));
        assert_eq!(header.data_type, SampleType::F32);
        assert_eq!(header.interleave, Interleave::Bil);
        assert_eq!(header.byte_order, Endian::Little);
        assert_eq!(header.wavelengths, vec![540.84, 1489.5]);
        assert_eq!(header.metadata()["sensor type"], "M3");
        assert!(header.metadata()["description"].contains("synthetic"));
        assert!(!header.metadata().contains_key("samples"));
    }

    #[test]
    fn test_parse_header_errors() {
        assert!(EnviHeader::parse("samples = 3").is_err());
        assert!(EnviHeader::parse("ENVI\nsamples = 3\nlines = 1\nbands = 1\ndata type = 9\n").is_err());
        assert!(EnviHeader::parse("ENVI\nwavelength = { 1, 2\n").is_err());
    }

    #[test]
    fn test_every_interleave_decodes_to_the_same_pixels() {
        let dir = TempDir::new().unwrap();
        for interleave in [Interleave::Bsq, Interleave::Bil, Interleave::Bip] {
            let path = dir.path().join(format!("cube_{}.img", interleave.as_str()));
            let cube = synthetic(interleave);
            cube.write(&path).unwrap();

            let loaded = EnviCube::open(&path).unwrap();
            assert_eq!(loaded.header.interleave, interleave);
            assert_eq!(loaded.data, cube.data);
            assert_eq!(loaded.pixel(2, 1), Some(vec![12.0, 112.0]));
        }
    }

    #[test]
    fn test_pixel_matrix_is_row_major() {
        let matrix = synthetic(Interleave::Bsq).pixel_matrix().unwrap();
        assert_eq!(matrix.dim(), (6, 2));
        for i in 0..6 {
            let (x, y) = (i % 3, i / 3);
            assert_eq!(matrix[[i, 0]], (10 * y + x) as f64);
        }
    }

    #[test]
    fn test_open_by_header_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scene.img");
        let header_path = synthetic(Interleave::Bip).write(&path).unwrap();
        assert_eq!(header_path, dir.path().join("scene.hdr"));
        let loaded = EnviCube::open(&header_path).unwrap();
        assert_eq!(loaded.width(), 3);
    }

    #[test]
    fn test_short_data_is_rejected() {
        let header = EnviHeader::parse(HEADER).unwrap();
        let err = EnviCube::from_bytes(header, &[0u8; 10]).unwrap_err();
        assert!(err.to_string().contains("header describes 48"));
    }

    #[test]
    fn test_oversized_dimensions_are_rejected() {
        let text = format!(
            "ENVI\nsamples = {}\nlines = 4\nbands = 4\ndata type = 4\ninterleave = bsq\n",
            usize::MAX / 2
        );
        let header = EnviHeader::parse(&text).unwrap();
        let err = EnviCube::from_bytes(header, &[0u8; 64]).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }
}
