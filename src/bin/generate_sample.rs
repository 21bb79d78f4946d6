//! Write a synthetic imaging cube, profile product and parquet table into a
//! directory (default `sample_data/`), then load each one back.
//!
//! ```text
//! RUST_LOG=info cargo run --bin generate_sample -- out_dir
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use ndarray::{Array2, Array3};
use parquet::arrow::ArrowWriter;

use spectral_frame::formats::envi::{EnviCube, EnviHeader};
use spectral_frame::formats::profiler::{AncillaryField, ProfileProduct};
use spectral_frame::{load_file, LoaderConfig, MetadataValue};

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Reflectance on a sloped continuum with Gaussian absorption bands
/// `(centre, width, depth)`.
fn generate_spectrum(
    wavelengths: &[f64],
    bands: &[(f64, f64, f64)],
    albedo: f64,
    noise_level: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    wavelengths
        .iter()
        .map(|&w| {
            let continuum = albedo * (1.0 + 0.00015 * (w - wavelengths[0]));
            let absorption: f64 = bands
                .iter()
                .map(|&(mu, sigma, depth)| gaussian(w, mu, sigma, depth))
                .sum();
            continuum * (1.0 - absorption) + rng.gauss(0.0, noise_level)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

// ---------------------------------------------------------------------------
// Imaging cube
// ---------------------------------------------------------------------------

fn write_cube(dir: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let (width, height) = (40, 30);
    let wavelengths: Vec<f64> = (0..85).map(|i| 460.99 + i as f64 * 29.94).collect();

    let mut data = Array3::<f64>::zeros((height, width, wavelengths.len()));
    for y in 0..height {
        for x in 0..width {
            // Pyroxene-like bands deepen towards the lower right.
            let depth = 0.05 + 0.2 * (x + y) as f64 / (width + height) as f64;
            let bands = [(950.0, 90.0, depth), (2000.0, 220.0, depth * 0.8)];
            let spectrum = generate_spectrum(&wavelengths, &bands, 0.12, 0.002, rng);
            for (b, v) in spectrum.into_iter().enumerate() {
                data[[y, x, b]] = v;
            }
        }
    }

    let mut header = EnviHeader::new(width, height, wavelengths);
    header.fields.insert("description".into(), "synthetic lunar scene".into());
    header.fields.insert("sensor type".into(), "M3".into());
    header.fields.insert("wavelength units".into(), "Nanometers".into());

    EnviCube { header, data }.write(dir.join("scene.img"))
}

// ---------------------------------------------------------------------------
// Point profiler product
// ---------------------------------------------------------------------------

fn write_profile(dir: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let n = 24;
    let wavelengths: Vec<f64> = (0..296).map(|i| 512.6 + i as f64 * 5.5).collect();

    let mut spectra = Vec::new();
    for (minor, scale) in [("RAD", 80.0), ("REF1", 1.0), ("REF2", 1.0)] {
        let mut matrix = Array2::<f64>::zeros((n, wavelengths.len()));
        for id in 0..n {
            let depth = 0.1 + 0.01 * id as f64;
            let y = generate_spectrum(&wavelengths, &[(1050.0, 120.0, depth)], 0.15, 0.001, rng);
            for (b, v) in y.into_iter().enumerate() {
                matrix[[id, b]] = v * scale;
            }
        }
        spectra.push((minor.to_string(), matrix));
    }

    let ancillary = vec![
        AncillaryField {
            name: "EMISSION_ANGLE".into(),
            values: (0..n).map(|i| MetadataValue::Float(0.5 * i as f64)).collect(),
        },
        AncillaryField {
            name: "INCIDENCE_ANGLE".into(),
            values: (0..n).map(|i| MetadataValue::Float(30.0 + 0.25 * i as f64)).collect(),
        },
        AncillaryField {
            name: "ORBIT".into(),
            values: (0..n).map(|i| MetadataValue::Integer(5100 + (i / 8) as i64)).collect(),
        },
    ];

    let path = dir.join("profile.spc");
    ProfileProduct {
        wavelengths,
        spectra,
        ancillary,
    }
    .write(&path)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Parquet records
// ---------------------------------------------------------------------------

fn write_parquet(dir: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let wavelengths: Vec<f64> = (0..120).map(|i| 400.0 + i as f64 * 20.0).collect();

    let targets: [(&str, f64, Vec<(f64, f64, f64)>); 3] = [
        ("mare", 0.07, vec![(1000.0, 100.0, 0.12), (2000.0, 250.0, 0.08)]),
        ("highland", 0.22, vec![(930.0, 80.0, 0.05)]),
        ("crater", 0.16, vec![(1000.0, 90.0, 0.2), (1250.0, 120.0, 0.06)]),
    ];
    let phase_angles = [15.0, 30.0, 60.0, 90.0];

    let mut all_y: Vec<Vec<f64>> = Vec::new();
    let mut all_target: Vec<&str> = Vec::new();
    let mut all_phase: Vec<f64> = Vec::new();
    let mut all_orbit: Vec<i64> = Vec::new();

    for (target, albedo, bands) in &targets {
        for (i, &phase) in phase_angles.iter().enumerate() {
            let brightness = albedo * (1.0 - phase / 300.0);
            all_y.push(generate_spectrum(&wavelengths, bands, brightness, 0.001, rng));
            all_target.push(target);
            all_phase.push(phase);
            all_orbit.push(1200 + i as i64);
        }
    }

    let mut x_builder = ListBuilder::new(Float64Builder::new());
    let mut y_builder = ListBuilder::new(Float64Builder::new());
    for y in &all_y {
        x_builder.values().append_slice(&wavelengths);
        x_builder.append(true);
        y_builder.values().append_slice(y);
        y_builder.append(true);
    }

    let item = Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::List(item.clone()), false),
        Field::new("y", DataType::List(item), false),
        Field::new("target", DataType::Utf8, false),
        Field::new("phase_angle", DataType::Float64, false),
        Field::new("orbit", DataType::Int64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(x_builder.finish()),
            Arc::new(y_builder.finish()),
            Arc::new(StringArray::from(all_target)),
            Arc::new(Float64Array::from(all_phase)),
            Arc::new(Int64Array::from(all_orbit)),
        ],
    )
    .context("building record batch")?;

    let path = dir.join("records.parquet");
    let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(path)
}

fn main() -> Result<()> {
    env_logger::init();

    let dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "sample_data".into()));
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let paths = [
        write_cube(&dir, &mut rng)?,
        write_profile(&dir, &mut rng)?,
        write_parquet(&dir, &mut rng)?,
    ];

    let config = LoaderConfig::default();
    for path in &paths {
        let table = load_file(path, &config)?;
        let corrected = table.linear_correction()?;
        let centre = table.wavelengths()[table.wavelengths().len() / 2];
        let band = corrected
            .lookup(centre + 0.5 * table.tolerance())?
            .into_band()
            .context("a wavelength lookup over all rows yields a band")?;
        let mean = band.values.iter().sum::<f64>() / band.len().max(1) as f64;
        info!(
            "{}: mean continuum-removed value at {} nm is {mean:.4}",
            path.display(),
            band.wavelength
        );
        println!(
            "Wrote {} ({} rows, {} wavelengths, {} metadata columns, tolerance {})",
            path.display(),
            table.len(),
            table.wavelengths().len(),
            table.metadata_columns().len(),
            table.tolerance()
        );
    }
    Ok(())
}
