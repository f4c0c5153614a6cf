// src/table/mod.rs

pub mod store;

pub use store::{load, persist};

/// One row of string fields; order is significant.
pub type Row = Vec<String>;

/// An in-memory CSV table. Row 0 is the header, rows 1.. are data rows whose
/// first field names the entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of rows, header included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Data rows paired with their index in the table (starting at 1).
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &Row)> {
        self.rows.iter().enumerate().skip(1)
    }
}

impl<S: Into<String>> FromIterator<Vec<S>> for Table {
    fn from_iter<I: IntoIterator<Item = Vec<S>>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        )
    }
}

/// The entity a data row refers to: its first field, or "" for an empty row.
pub fn entity_name(row: &Row) -> &str {
    row.first().map(String::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_rows_skip_header_and_keep_indices() {
        let table: Table = vec![vec!["name"], vec!["alice"], vec!["bob"]]
            .into_iter()
            .collect();

        assert_eq!(table.len(), 3);
        assert_eq!(table.header(), Some(&vec!["name".to_string()]));

        let names: Vec<(usize, &str)> = table
            .data_rows()
            .map(|(i, row)| (i, entity_name(row)))
            .collect();
        assert_eq!(names, vec![(1, "alice"), (2, "bob")]);
    }

    #[test]
    fn empty_row_has_empty_entity() {
        assert_eq!(entity_name(&Vec::new()), "");
    }
}
