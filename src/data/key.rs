use super::model::MetadataValue;
use crate::locator::Selector;

/// How one row-index level is matched.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelSelector {
    /// Every value of the level.
    All,
    /// Exact equality with the stored level value.
    Exact(MetadataValue),
    /// Nearest numeric level value within the table's tolerance.
    Near(f64),
}

impl From<MetadataValue> for LevelSelector {
    fn from(value: MetadataValue) -> Self {
        LevelSelector::Exact(value)
    }
}

impl From<i64> for LevelSelector {
    fn from(value: i64) -> Self {
        LevelSelector::Exact(MetadataValue::Integer(value))
    }
}

impl From<&str> for LevelSelector {
    fn from(value: &str) -> Self {
        LevelSelector::Exact(MetadataValue::from(value))
    }
}

/// A full element-access key: one selector per row level plus a column
/// selector against the wavelength axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub rows: Vec<LevelSelector>,
    pub columns: Selector,
}

impl Key {
    pub fn new(rows: Vec<LevelSelector>, columns: impl Into<Selector>) -> Self {
        Key {
            rows,
            columns: columns.into(),
        }
    }

    /// Every row of an index with `levels` levels, columns by `columns`.
    pub fn all_rows(levels: usize, columns: impl Into<Selector>) -> Self {
        Key::new(vec![LevelSelector::All; levels], columns)
    }

    /// A single cell: each row level exact, then one wavelength.
    pub fn cell<I>(row: I, wavelength: f64) -> Self
    where
        I: IntoIterator,
        I::Item: Into<MetadataValue>,
    {
        Key::new(
            row.into_iter().map(|v| LevelSelector::Exact(v.into())).collect(),
            Selector::Near(wavelength),
        )
    }

    /// Whether every row level pins a single value.
    pub fn pins_row(&self) -> bool {
        !self.rows.iter().any(|r| matches!(r, LevelSelector::All))
    }
}
