use std::collections::{BTreeMap, BTreeSet};

use super::model::MetadataValue;
use super::table::SpectralTable;

// ---------------------------------------------------------------------------
// Filter predicate: which unique values are selected per metadata column
// ---------------------------------------------------------------------------

/// Per-column selection state: maps metadata column → set of selected values.
/// If a column is absent from the map it is not constrained.
pub type FilterState = BTreeMap<String, BTreeSet<MetadataValue>>;

/// For each metadata column the sorted set of values it takes.
pub fn unique_values(table: &SpectralTable) -> FilterState {
    let frame = table.frame();
    table
        .metadata_columns()
        .iter()
        .filter_map(|label| {
            let column = frame.column(label)?;
            let values = (0..frame.n_rows()).filter_map(|r| column.metadata(r)).collect();
            Some((label.to_string(), values))
        })
        .collect()
}

/// Initialise a [`FilterState`] with all values selected (i.e. keep every row).
pub fn init_filter_state(table: &SpectralTable) -> FilterState {
    unique_values(table)
}

/// Return positions of rows that pass all active filters.
///
/// A row passes a column filter when:
/// * The column is not present in `filters` → passes (no constraint)
/// * The filter set for that column is empty → nothing selected → fails
/// * The row's value for that column is in the selected set → passes
/// * The table has no such metadata column → passes only if `Null` is selected
pub fn filtered_indices(table: &SpectralTable, filters: &FilterState) -> Vec<usize> {
    let frame = table.frame();
    let constraints: Vec<_> = filters
        .iter()
        .map(|(col, selected)| {
            let column = table
                .metadata_columns()
                .iter()
                .find(|label| label.to_string() == *col)
                .and_then(|label| frame.column(label));
            (column, selected)
        })
        .collect();

    (0..frame.n_rows())
        .filter(|&row| {
            constraints.iter().all(|(column, selected)| {
                match column.and_then(|c| c.metadata(row)) {
                    Some(val) => selected.contains(&val),
                    None => selected.contains(&MetadataValue::Null),
                }
            })
        })
        .collect()
}

impl SpectralTable {
    /// Keep the rows passing `filters`; wavelengths, metadata columns and
    /// tolerance carry over.
    pub fn filter(&self, filters: &FilterState) -> SpectralTable {
        let keep = filtered_indices(self, filters);
        self.derive(self.frame().take_rows(&keep))
    }
}
