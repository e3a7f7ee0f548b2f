use std::sync::{Mutex, MutexGuard};

use super::{StoreError, TableStore, out_of_range};
use crate::table::Table;

/// In-process table, the grid includes the header row like a real sheet.
pub struct MemoryStore {
    name: String,
    header: Vec<String>,
    grid: Mutex<Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn new(name: &str, header: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            header,
            grid: Mutex::new(Vec::new()),
        }
    }

    /// A store pre-filled with a header and the given data rows.
    pub fn with_rows(name: &str, header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut grid = Vec::with_capacity(rows.len() + 1);
        grid.push(header.clone());
        grid.extend(rows);
        Self {
            name: name.to_string(),
            header,
            grid: Mutex::new(grid),
        }
    }

    /// A store holding an existing sheet's cells as-is, header row included.
    ///
    /// `header` is still the schema rows are written in, which may differ
    /// from the grid's own first row.
    pub fn with_grid(name: &str, header: Vec<String>, grid: Vec<Vec<String>>) -> Self {
        Self {
            name: name.to_string(),
            header,
            grid: Mutex::new(grid),
        }
    }

    /// Number of data rows currently stored.
    pub fn row_count(&self) -> usize {
        self.grid
            .lock()
            .map(|grid| grid.len().saturating_sub(1))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Vec<String>>>, StoreError> {
        self.grid
            .lock()
            .map_err(|_| StoreError::Transport("memory store lock poisoned".to_string()))
    }
}

impl TableStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_all(&self) -> Result<Table, StoreError> {
        let grid = self.lock()?.clone();
        Ok(Table::from_grid(grid, &self.header))
    }

    async fn append_row(&self, values: Vec<String>) -> Result<(), StoreError> {
        let mut grid = self.lock()?;
        if grid.is_empty() {
            grid.push(self.header.clone());
        }
        grid.push(values);
        Ok(())
    }

    async fn delete_row(&self, position: usize) -> Result<(), StoreError> {
        let mut grid = self.lock()?;
        let len = grid.len().saturating_sub(1);
        if position >= len {
            return Err(out_of_range(position, len));
        }
        grid.remove(position + 1);
        Ok(())
    }
}
