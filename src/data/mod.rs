//! Data layer: core types, tables, loading, and filtering.
//!
//! Architecture:
//! ```text
//!  .hdr/.img   .lbl   .parquet / .json / .csv
//!      │         │            │
//!      ▼         ▼            ▼
//!   ┌────────────┐      ┌──────────┐
//!   │ instrument │      │  loader   │  records → from_spectra
//!   └────────────┘      └──────────┘
//!          │                 │
//!          ▼                 ▼
//!   ┌──────────────────────────────┐
//!   │ SpectralTable (table)        │  Frame + wavelengths, metadata,
//!   │   Frame (frame), Key (key)   │  tolerance
//!   └──────────────────────────────┘
//!          │
//!          ▼
//!   ┌──────────┐
//!   │  filter   │  apply metadata predicates → filtered rows
//!   └──────────┘
//! ```

pub mod filter;
pub mod frame;
pub mod instrument;
pub mod key;
pub mod loader;
pub mod model;
pub mod table;
