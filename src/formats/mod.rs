//! Instrument file formats.
//!
//! ```text
//!   .hdr + .img                 .lbl / .spc
//!        │                           │
//!        ▼                           ▼
//!   ┌──────────┐              ┌────────────┐   ┌───────┐
//!   │   envi    │              │  profiler   │◄──│  pds  │  ODL label
//!   └──────────┘              └────────────┘   └───────┘
//!        │  EnviCube                 │  ProfileProduct
//!        ▼                           ▼
//!   data::instrument  →  SpectralTable
//! ```
//!
//! Both readers share the raw sample decoding below.

pub mod envi;
pub mod pds;
pub mod profiler;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// A fixed-width binary sample type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl SampleType {
    pub fn size(self) -> usize {
        match self {
            SampleType::U8 | SampleType::I8 => 1,
            SampleType::I16 | SampleType::U16 => 2,
            SampleType::I32 | SampleType::U32 | SampleType::F32 => 4,
            SampleType::I64 | SampleType::U64 | SampleType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, SampleType::F32 | SampleType::F64)
    }

    /// Decode one sample. `bytes` must be exactly `self.size()` long.
    pub fn decode(self, bytes: &[u8], endian: Endian) -> f64 {
        macro_rules! read {
            ($t:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(&bytes[..$n]);
                match endian {
                    Endian::Little => <$t>::from_le_bytes(buf) as f64,
                    Endian::Big => <$t>::from_be_bytes(buf) as f64,
                }
            }};
        }
        match self {
            SampleType::U8 => bytes[0] as f64,
            SampleType::I8 => bytes[0] as i8 as f64,
            SampleType::I16 => read!(i16, 2),
            SampleType::U16 => read!(u16, 2),
            SampleType::I32 => read!(i32, 4),
            SampleType::U32 => read!(u32, 4),
            SampleType::I64 => read!(i64, 8),
            SampleType::U64 => read!(u64, 8),
            SampleType::F32 => read!(f32, 4),
            SampleType::F64 => read!(f64, 8),
        }
    }

    /// Append one sample. Integer types saturate.
    pub fn encode(self, value: f64, endian: Endian, out: &mut Vec<u8>) {
        macro_rules! put {
            ($v:expr) => {{
                let v = $v;
                match endian {
                    Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
                    Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
                }
            }};
        }
        match self {
            SampleType::U8 => out.push(value as u8),
            SampleType::I8 => out.push(value as i8 as u8),
            SampleType::I16 => put!(value as i16),
            SampleType::U16 => put!(value as u16),
            SampleType::I32 => put!(value as i32),
            SampleType::U32 => put!(value as u32),
            SampleType::I64 => put!(value as i64),
            SampleType::U64 => put!(value as u64),
            SampleType::F32 => put!(value as f32),
            SampleType::F64 => put!(value),
        }
    }
}

/// Decode `count` consecutive samples starting at the beginning of `bytes`.
pub fn decode_samples(bytes: &[u8], count: usize, ty: SampleType, endian: Endian) -> Result<Vec<f64>> {
    let needed = count
        .checked_mul(ty.size())
        .with_context(|| format!("{count} {ty:?} samples overflow the address space"))?;
    if bytes.len() < needed {
        bail!(
            "expected {needed} bytes for {count} {ty:?} samples, found {}",
            bytes.len()
        );
    }
    Ok(bytes[..needed]
        .chunks_exact(ty.size())
        .map(|chunk| ty.decode(chunk, endian))
        .collect())
}
