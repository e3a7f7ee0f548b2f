use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::record::COLUMN_ID;

/// One data row, keyed by column header.
pub type Row = HashMap<String, String>;

/// Snapshot of the whole remote table: the header row plus every data row
/// in storage order (oldest first).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// A table with the given header and no data rows.
    pub fn empty(headers: Vec<String>) -> Self {
        Table {
            headers,
            rows: Vec::new(),
        }
    }

    /// Build a table from a raw cell grid whose first row is the header.
    ///
    /// # Arguments
    /// * `grid` - Stored cells, header row first
    /// * `canonical` - Column names the application writes rows in
    ///
    /// # Returns
    /// The snapshot keyed by column name. The stored header is kept when it
    /// only uses canonical names. A header that is a prefix of `canonical`
    /// (an older sheet without the id column) is widened to `canonical`.
    /// Any other header, such as a sheet created with localized titles, is
    /// replaced by `canonical` and cells are read by position, the same
    /// order rows are appended in. A grid with no header row at all reads as
    /// `canonical` with no data. Short rows are padded with empty cells,
    /// cells past the header are dropped.
    pub fn from_grid(grid: Vec<Vec<String>>, canonical: &[String]) -> Self {
        let mut lines = grid.into_iter();
        let stored: Vec<String> = match lines.next() {
            Some(header) if header.iter().any(|h| !h.trim().is_empty()) => {
                header.into_iter().map(|h| h.trim().to_string()).collect()
            }
            _ => return Table::empty(canonical.to_vec()),
        };
        let headers = resolve_headers(stored, canonical);

        let rows = lines
            .map(|line| {
                let mut cells = line.into_iter();
                headers
                    .iter()
                    .map(|h| (h.clone(), cells.next().unwrap_or_default()))
                    .collect::<Row>()
            })
            .collect();

        Table { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row values in header order.
    pub fn ordered_values(&self, row: &Row) -> Vec<String> {
        self.headers
            .iter()
            .map(|h| row.get(h).cloned().unwrap_or_default())
            .collect()
    }

    /// Header followed by every row, as a plain grid.
    pub fn grid(&self) -> Vec<Vec<String>> {
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(self.headers.clone());
        grid.extend(self.rows.iter().map(|row| self.ordered_values(row)));
        grid
    }

    /// Position of the row carrying the given record id.
    pub fn position_of_id(&self, id: &str) -> Option<usize> {
        if id.is_empty() {
            return None;
        }
        self.rows
            .iter()
            .position(|row| row.get(COLUMN_ID).map(String::as_str) == Some(id))
    }
}

fn resolve_headers(stored: Vec<String>, canonical: &[String]) -> Vec<String> {
    if canonical.is_empty() {
        return stored;
    }
    if stored.iter().all(|h| canonical.contains(h)) {
        if canonical.starts_with(&stored) {
            return canonical.to_vec();
        }
        return stored;
    }
    debug!(found = ?stored, "header not recognised, reading columns by position");
    canonical.to_vec()
}

/// Cell value of `row` in `column`, empty when the column is absent.
pub fn cell<'a>(row: &'a Row, column: &str) -> &'a str {
    row.get(column).map(String::as_str).unwrap_or("")
}
