use std::collections::HashMap;

use super::model::{format_key, CellValue, ColumnLabel, MetadataValue, RowKey};
use crate::error::SpectraError;

// ---------------------------------------------------------------------------
// Column – one labelled column of cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Numeric measurements (reflectance, radiance, …).
    Values(Vec<f64>),
    /// Ancillary attributes of arbitrary type.
    Attributes(Vec<MetadataValue>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Values(v) => v.len(),
            Column::Attributes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_values(&self) -> Option<&[f64]> {
        match self {
            Column::Values(v) => Some(v),
            Column::Attributes(_) => None,
        }
    }

    pub fn cell(&self, row: usize) -> Option<CellValue> {
        match self {
            Column::Values(v) => v.get(row).map(|&x| CellValue::Reflectance(x)),
            Column::Attributes(v) => v.get(row).map(|m| CellValue::Attribute(m.clone())),
        }
    }

    /// The cell as a metadata value; numeric cells become `Float`.
    pub fn metadata(&self, row: usize) -> Option<MetadataValue> {
        match self {
            Column::Values(v) => v.get(row).map(|&x| MetadataValue::Float(x)),
            Column::Attributes(v) => v.get(row).cloned(),
        }
    }

    fn take(&self, positions: &[usize]) -> Column {
        match self {
            Column::Values(v) => Column::Values(positions.iter().map(|&p| v[p]).collect()),
            Column::Attributes(v) => {
                Column::Attributes(positions.iter().map(|&p| v[p].clone()).collect())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RowIndex – single or multi-level row keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RowIndex {
    names: Vec<String>,
    keys: Vec<RowKey>,
}

impl RowIndex {
    /// Every key must have one component per level name.
    pub fn new(names: Vec<String>, keys: Vec<RowKey>) -> Result<Self, SpectraError> {
        if names.is_empty() {
            return Err(SpectraError::IndexMismatch(
                "a row index needs at least one level".into(),
            ));
        }
        if let Some(bad) = keys.iter().find(|k| k.len() != names.len()) {
            return Err(SpectraError::KeyArity {
                expected: names.len(),
                got: bad.len(),
            });
        }
        Ok(RowIndex { names, keys })
    }

    /// A single-level index `0..n`.
    pub fn range(name: &str, n: usize) -> Self {
        RowIndex {
            names: vec![name.to_string()],
            keys: (0..n as i64).map(|i| vec![MetadataValue::Integer(i)]).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn key(&self, row: usize) -> Option<&RowKey> {
        self.keys.get(row)
    }

    pub fn levels(&self) -> usize {
        self.names.len()
    }

    pub fn is_composite(&self) -> bool {
        self.names.len() > 1
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn level_position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn take(&self, positions: &[usize]) -> RowIndex {
        RowIndex {
            names: self.names.clone(),
            keys: positions.iter().map(|&p| self.keys[p].clone()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame – the generic tabular value
// ---------------------------------------------------------------------------

/// A rectangular table: a row index and labelled, equally long columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: RowIndex,
    labels: Vec<ColumnLabel>,
    columns: Vec<Column>,
}

impl Frame {
    pub fn new(
        index: RowIndex,
        labels: Vec<ColumnLabel>,
        columns: Vec<Column>,
    ) -> Result<Self, SpectraError> {
        let mut frame = Frame::empty(index);
        if labels.len() != columns.len() {
            return Err(SpectraError::ShapeMismatch(format!(
                "{} labels for {} columns",
                labels.len(),
                columns.len()
            )));
        }
        for (label, column) in labels.into_iter().zip(columns) {
            frame.push_column(label, column)?;
        }
        Ok(frame)
    }

    /// A frame with rows but no columns yet.
    pub fn empty(index: RowIndex) -> Self {
        Frame {
            index,
            labels: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn push_column(&mut self, label: ColumnLabel, column: Column) -> Result<(), SpectraError> {
        if column.len() != self.index.len() {
            return Err(SpectraError::ShapeMismatch(format!(
                "column '{label}' has {} rows, index has {}",
                column.len(),
                self.index.len()
            )));
        }
        if self.position_of(&label).is_some() {
            return Err(SpectraError::DuplicateColumn(label.to_string()));
        }
        self.labels.push(label);
        self.columns.push(column);
        Ok(())
    }

    pub fn index(&self) -> &RowIndex {
        &self.index
    }

    pub fn labels(&self) -> &[ColumnLabel] {
        &self.labels
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_columns(&self) -> usize {
        self.labels.len()
    }

    pub fn position_of(&self, label: &ColumnLabel) -> Option<usize> {
        self.labels.iter().position(|l| l.same_as(label))
    }

    pub fn column(&self, label: &ColumnLabel) -> Option<&Column> {
        self.position_of(label).map(|p| &self.columns[p])
    }

    pub fn cell(&self, row: usize, column: usize) -> Result<CellValue, SpectraError> {
        self.columns
            .get(column)
            .and_then(|c| c.cell(row))
            .ok_or(SpectraError::OutOfBounds {
                row,
                column,
                rows: self.n_rows(),
                columns: self.n_columns(),
            })
    }

    /// Keep the given columns, in the given order.
    pub fn select(&self, labels: &[ColumnLabel]) -> Result<Frame, SpectraError> {
        let mut out = Frame::empty(self.index.clone());
        for label in labels {
            let column = self
                .column(label)
                .ok_or_else(|| SpectraError::ColumnNotFound(label.to_string()))?;
            out.push_column(label.clone(), column.clone())?;
        }
        Ok(out)
    }

    /// Keep the rows at `positions`, in that order. Positions must be in bounds.
    pub fn take_rows(&self, positions: &[usize]) -> Frame {
        Frame {
            index: self.index.take(positions),
            labels: self.labels.clone(),
            columns: self.columns.iter().map(|c| c.take(positions)).collect(),
        }
    }

    /// Stable sort of the rows by ascending row key.
    pub fn sort_index(&self) -> Frame {
        let mut order: Vec<usize> = (0..self.n_rows()).collect();
        order.sort_by(|&a, &b| self.index.keys[a].cmp(&self.index.keys[b]));
        self.take_rows(&order)
    }

    /// Join `right`'s columns onto this frame by identical row key.
    ///
    /// Every row here must find exactly one row in `right`; the result keeps
    /// this frame's row order.
    pub fn merge_on_index(&self, right: &Frame) -> Result<Frame, SpectraError> {
        if self.index.names != right.index.names {
            return Err(SpectraError::IndexMismatch(format!(
                "index levels {:?} and {:?} differ",
                self.index.names, right.index.names
            )));
        }
        let lookup = unique_positions(&right.index.keys)?;
        let positions = self
            .index
            .keys
            .iter()
            .map(|key| {
                lookup.get(key.as_slice()).copied().ok_or_else(|| {
                    SpectraError::IndexMismatch(format!("no row {} to merge with", format_key(key)))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.append_columns(right, &positions)
    }

    /// Join a single-level `right` frame on one level of this frame's index.
    ///
    /// Used to attach per-sample fields onto per-curve rows that share the
    /// sample id. Every row here must find its level value in `right`.
    pub fn merge_on_level(&self, level: &str, right: &Frame) -> Result<Frame, SpectraError> {
        let at = self.index.level_position(level).ok_or_else(|| {
            SpectraError::IndexMismatch(format!("index has no level '{level}'"))
        })?;
        if right.index.names != [level] {
            return Err(SpectraError::IndexMismatch(format!(
                "right side must be indexed by '{level}' alone, found {:?}",
                right.index.names
            )));
        }
        let lookup = unique_positions(&right.index.keys)?;
        let positions = self
            .index
            .keys
            .iter()
            .map(|key| {
                let value = &key[at];
                lookup.get(std::slice::from_ref(value)).copied().ok_or_else(|| {
                    SpectraError::IndexMismatch(format!("no {level} {value} to merge with"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.append_columns(right, &positions)
    }

    fn append_columns(&self, right: &Frame, positions: &[usize]) -> Result<Frame, SpectraError> {
        let mut out = self.clone();
        for (label, column) in right.labels.iter().zip(&right.columns) {
            out.push_column(label.clone(), column.take(positions))?;
        }
        Ok(out)
    }
}

fn unique_positions(keys: &[RowKey]) -> Result<HashMap<&[MetadataValue], usize>, SpectraError> {
    let mut lookup = HashMap::with_capacity(keys.len());
    for (pos, key) in keys.iter().enumerate() {
        if lookup.insert(key.as_slice(), pos).is_some() {
            return Err(SpectraError::IndexMismatch(format!(
                "duplicate row key {}",
                format_key(key)
            )));
        }
    }
    Ok(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy_index(pairs: &[(i64, i64)]) -> RowIndex {
        RowIndex::new(
            vec!["x".into(), "y".into()],
            pairs.iter().map(|&(x, y)| vec![x.into(), y.into()]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_ragged_and_duplicate_columns() {
        let index = RowIndex::range("id", 2);
        let err = Frame::new(
            index.clone(),
            vec![750.0.into()],
            vec![Column::Values(vec![1.0])],
        )
        .unwrap_err();
        assert!(matches!(err, SpectraError::ShapeMismatch(_)));

        let err = Frame::new(
            index,
            vec![750.0.into(), 750.0.into()],
            vec![Column::Values(vec![1.0, 2.0]), Column::Values(vec![3.0, 4.0])],
        )
        .unwrap_err();
        assert_eq!(err, SpectraError::DuplicateColumn("750".into()));
    }

    #[test]
    fn test_index_key_arity_checked() {
        let err = RowIndex::new(vec!["x".into(), "y".into()], vec![vec![1_i64.into()]]).unwrap_err();
        assert_eq!(err, SpectraError::KeyArity { expected: 2, got: 1 });
    }

    #[test]
    fn test_sort_index_orders_by_composite_key() {
        let frame = Frame::new(
            xy_index(&[(1, 0), (0, 1), (0, 0)]),
            vec![750.0.into()],
            vec![Column::Values(vec![10.0, 1.0, 0.0])],
        )
        .unwrap();
        let sorted = frame.sort_index();
        assert_eq!(sorted.column(&750.0.into()), Some(&Column::Values(vec![0.0, 1.0, 10.0])));
        assert_eq!(sorted.index().key(2), Some(&vec![1_i64.into(), 0_i64.into()]));
    }

    #[test]
    fn test_merge_on_index_aligns_by_key() {
        let left = Frame::new(
            xy_index(&[(0, 0), (1, 0)]),
            vec![750.0.into()],
            vec![Column::Values(vec![0.1, 0.2])],
        )
        .unwrap();
        let right = Frame::new(
            xy_index(&[(1, 0), (0, 0)]),
            vec!["phase".into()],
            vec![Column::Attributes(vec!["b".into(), "a".into()])],
        )
        .unwrap();
        let merged = left.merge_on_index(&right).unwrap();
        assert_eq!(merged.n_columns(), 2);
        assert_eq!(
            merged.column(&"phase".into()),
            Some(&Column::Attributes(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_merge_on_index_missing_key_is_fatal() {
        let left = Frame::empty(xy_index(&[(0, 0), (2, 2)]));
        let right = Frame::empty(xy_index(&[(0, 0)]));
        let err = left.merge_on_index(&right).unwrap_err();
        assert!(err.to_string().contains("(2, 2)"));
    }

    #[test]
    fn test_merge_on_level_broadcasts_per_id() {
        let curves = Frame::empty(
            RowIndex::new(
                vec!["minor".into(), "id".into()],
                vec![
                    vec!["RAD".into(), 0_i64.into()],
                    vec!["REF".into(), 0_i64.into()],
                    vec!["RAD".into(), 1_i64.into()],
                ],
            )
            .unwrap(),
        );
        let ancillary = Frame::new(
            RowIndex::range("id", 2),
            vec!["emission".into()],
            vec![Column::Values(vec![12.5, 30.0])],
        )
        .unwrap();
        let merged = curves.merge_on_level("id", &ancillary).unwrap();
        assert_eq!(
            merged.column(&"emission".into()),
            Some(&Column::Values(vec![12.5, 12.5, 30.0]))
        );

        let short = Frame::empty(RowIndex::range("id", 1));
        assert!(curves.merge_on_level("id", &short).is_err());
        assert!(curves.merge_on_level("sample", &ancillary).is_err());
    }

    #[test]
    fn test_cell_out_of_bounds() {
        let frame = Frame::new(
            RowIndex::range("id", 1),
            vec![750.0.into()],
            vec![Column::Values(vec![0.5])],
        )
        .unwrap();
        assert_eq!(frame.cell(0, 0), Ok(CellValue::Reflectance(0.5)));
        assert!(matches!(frame.cell(1, 0), Err(SpectraError::OutOfBounds { .. })));
    }
}
