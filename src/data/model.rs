use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in a metadata column
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value: acquisition geometry, instrument
/// state, timestamps, row-key components.
/// Used as a `BTreeMap` / `BTreeSet` key and as a row-key level, so it must be
/// `Ord` and `Hash`.
#[derive(Debug, Clone)]
pub enum MetadataValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Null,
}

// -- Manual Eq/Ord so we can put MetadataValue in BTreeSet and sort row keys --
// Floats compare by `total_cmp`, matching the bitwise hash below.

impl PartialEq for MetadataValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for MetadataValue {}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use MetadataValue::*;
        fn discriminant(v: &MetadataValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for MetadataValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MetadataValue::String(s) => s.hash(state),
            MetadataValue::Integer(i) => i.hash(state),
            MetadataValue::Float(f) => f.to_bits().hash(state),
            MetadataValue::Bool(b) => b.hash(state),
            MetadataValue::Null => {}
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl MetadataValue {
    /// Interpret the value as an `f64`, for tolerance matching on row levels.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Type a raw text field (header values, CSV cells) by its content.
    pub fn guess(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return MetadataValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return MetadataValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return MetadataValue::Float(f);
        }
        if s == "true" || s == "false" {
            return MetadataValue::Bool(s == "true");
        }
        MetadataValue::String(s.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Integer(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

/// One component per row-index level, e.g. `[x, y]` or `[minor, id]`.
pub type RowKey = Vec<MetadataValue>;

/// Render a row key the way error messages show it: `(3, 7)`.
pub fn format_key(key: &[MetadataValue]) -> String {
    let parts: Vec<String> = key.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(", "))
}

// ---------------------------------------------------------------------------
// Column labels and cells
// ---------------------------------------------------------------------------

/// A column label: either a real-valued wavelength or a named attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnLabel {
    Wavelength(f64),
    Name(String),
}

impl ColumnLabel {
    pub fn as_wavelength(&self) -> Option<f64> {
        match self {
            ColumnLabel::Wavelength(w) => Some(*w),
            ColumnLabel::Name(_) => None,
        }
    }

    /// Labels compare bitwise so that `-0.0`/`0.0` and NaN behave predictably
    /// when checking for duplicates.
    pub fn same_as(&self, other: &ColumnLabel) -> bool {
        match (self, other) {
            (ColumnLabel::Wavelength(a), ColumnLabel::Wavelength(b)) => a.to_bits() == b.to_bits(),
            (ColumnLabel::Name(a), ColumnLabel::Name(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ColumnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnLabel::Wavelength(w) => write!(f, "{w}"),
            ColumnLabel::Name(n) => write!(f, "{n}"),
        }
    }
}

impl From<f64> for ColumnLabel {
    fn from(w: f64) -> Self {
        ColumnLabel::Wavelength(w)
    }
}

impl From<&str> for ColumnLabel {
    fn from(n: &str) -> Self {
        ColumnLabel::Name(n.to_string())
    }
}

impl From<String> for ColumnLabel {
    fn from(n: String) -> Self {
        ColumnLabel::Name(n)
    }
}

/// A single cell fetched by position.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Reflectance(f64),
    Attribute(MetadataValue),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Reflectance(v) => Some(*v),
            CellValue::Attribute(m) => m.as_f64(),
        }
    }
}

// ---------------------------------------------------------------------------
// Spectrum – one row of a spectral table
// ---------------------------------------------------------------------------

/// A single observation: reflectance values aligned to wavelengths plus the
/// row's metadata. Carries no tolerance; it is a plain value.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Row key the spectrum was taken from.
    pub key: RowKey,
    /// Wavelength axis (x).
    pub x: Vec<f64>,
    /// Reflectance axis (y) – same length as `x`.
    pub y: Vec<f64>,
    /// Metadata columns of the row: column label → value.
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Band – one wavelength column across rows
// ---------------------------------------------------------------------------

/// All rows' values at a single wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    /// The stored wavelength label that was matched.
    pub wavelength: f64,
    pub index: Vec<RowKey>,
    pub values: Vec<f64>,
}

impl Band {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_guess_metadata_type() {
        assert_eq!(MetadataValue::guess("12"), MetadataValue::Integer(12));
        assert_eq!(MetadataValue::guess(" 1.5 "), MetadataValue::Float(1.5));
        assert_eq!(MetadataValue::guess("true"), MetadataValue::Bool(true));
        assert_eq!(MetadataValue::guess(""), MetadataValue::Null);
        assert_eq!(
            MetadataValue::guess("M3G20090207T023516"),
            MetadataValue::String("M3G20090207T023516".into())
        );
    }

    #[test]
    fn test_metadata_ordering_groups_by_type() {
        let set: BTreeSet<MetadataValue> = [
            MetadataValue::from("b"),
            MetadataValue::from(2_i64),
            MetadataValue::Null,
            MetadataValue::from(1_i64),
            MetadataValue::from("a"),
        ]
        .into_iter()
        .collect();
        let ordered: Vec<String> = set.iter().map(|v| v.to_string()).collect();
        assert_eq!(ordered, ["<null>", "1", "2", "a", "b"]);
    }

    #[test]
    fn test_row_keys_sort_lexicographically() {
        let mut keys: Vec<RowKey> = vec![
            vec![1_i64.into(), 0_i64.into()],
            vec![0_i64.into(), 1_i64.into()],
            vec![0_i64.into(), 0_i64.into()],
        ];
        keys.sort();
        assert_eq!(format_key(&keys[0]), "(0, 0)");
        assert_eq!(format_key(&keys[2]), "(1, 0)");
    }

    #[test]
    fn test_column_label_identity() {
        assert!(ColumnLabel::from(750.0).same_as(&ColumnLabel::Wavelength(750.0)));
        assert!(!ColumnLabel::from(750.0).same_as(&ColumnLabel::from("750")));
        assert_eq!(ColumnLabel::from("sensor_azimuth").to_string(), "sensor_azimuth");
    }
}
