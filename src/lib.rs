//! Tolerance-indexed tables for planetary remote-sensing spectra.
//!
//! A [`SpectralTable`] pairs a generic [`Frame`] with the small amount of state
//! that makes it spectral: the ordered wavelength columns, the metadata
//! columns, and the tolerance used to resolve real-valued wavelength keys.
//!
//! ```no_run
//! use spectral_frame::{SpectralTable, IMAGING_CUBE_TOLERANCE};
//!
//! # fn main() -> anyhow::Result<()> {
//! let table = SpectralTable::from_imaging_cube("scene.hdr", IMAGING_CUBE_TOLERANCE)?;
//! let band = table.lookup(1500.3)?;
//! let corrected = table.linear_correction()?;
//! # let _ = (band, corrected);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod continuum;
pub mod data;
pub mod error;
pub mod formats;
pub mod locator;

pub use config::LoaderConfig;
pub use data::frame::{Column, Frame, RowIndex};
pub use data::instrument::{IMAGING_CUBE_TOLERANCE, POINT_PROFILER_TOLERANCE};
pub use data::key::{Key, LevelSelector};
pub use data::loader::load_file;
pub use data::model::{Band, CellValue, ColumnLabel, MetadataValue, RowKey, Spectrum};
pub use data::table::{Selection, SpectralTable, TableState};
pub use error::SpectraError;
pub use locator::{Selector, DEFAULT_TOLERANCE};
