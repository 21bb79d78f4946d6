use thiserror::Error;

/// Failures raised by table construction, lookup and transforms.
///
/// File parsing and loading report through `anyhow` instead, so that the
/// underlying parse error reaches the caller with the path attached.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectraError {
    #[error("tolerance must be a non-negative number, got {0}")]
    InvalidTolerance(f64),

    #[error("no label within {tolerance} of {key}")]
    LabelNotFound { key: f64, tolerance: f64 },

    #[error("no row matches key {0}")]
    RowNotFound(String),

    #[error("key addresses {got} row level(s) but the index has {expected}")]
    KeyArity { expected: usize, got: usize },

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("wavelength {0} is not a column of the table")]
    MissingWavelength(f64),

    #[error("wavelength column {0} does not hold numeric values")]
    NonNumericWavelength(f64),

    #[error("column '{0}' is listed as both a wavelength and a metadata column")]
    OverlappingColumn(String),

    #[error("column '{0}' is neither a wavelength nor a metadata column")]
    UnassignedColumn(String),

    #[error("duplicate column label '{0}'")]
    DuplicateColumn(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("row index mismatch: {0}")]
    IndexMismatch(String),

    #[error("position ({row}, {column}) is outside a {rows}x{columns} table")]
    OutOfBounds {
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    },

    #[error("continuum anchors at positions {0} and {1} share the same wavelength")]
    DegenerateContinuum(usize, usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SpectraError::LabelNotFound {
            key: 760.0,
            tolerance: 1.0,
        };
        assert_eq!(err.to_string(), "no label within 1 of 760");

        let err = SpectraError::KeyArity {
            expected: 2,
            got: 1,
        };
        assert!(err.to_string().contains("index has 2"));
    }
}
