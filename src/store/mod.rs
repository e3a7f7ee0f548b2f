//! Access to the tabular store holding the practice log.
//!
//! The store is the system of record. Every call is one attempt against it:
//! no caching, no retries, no transactions. Callers re-read the whole table
//! after a mutation instead of patching their snapshot.

use std::future::Future;
use thiserror::Error;

use crate::config::{Backend, Config};
use crate::table::Table;

mod file;
mod memory;
#[cfg(feature = "web")]
mod sheets;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "web")]
pub use sheets::SheetsStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Credentials missing or rejected
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The named table does not exist
    #[error("table `{0}` not found")]
    NotFound(String),
    #[error("could not save the row: {0}")]
    Write(String),
    /// Out-of-range position or the row moved since it was displayed
    #[error("could not delete the row: {0}")]
    Delete(String),
    /// Any other failure talking to the store
    #[error("store unavailable: {0}")]
    Transport(String),
}

/// Read-all / append / delete-by-position over one named table.
pub trait TableStore: Send + Sync + 'static {
    /// Human-readable name of the backing table, for logs and pages.
    fn name(&self) -> &str;

    /// Establish the connection and resolve the table.
    ///
    /// Backends that need no connection succeed immediately.
    fn open(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
        async { Ok(()) }
    }

    /// Every data row in storage order, oldest first.
    fn read_all(&self) -> impl Future<Output = Result<Table, StoreError>> + Send;

    /// Append one row of cells after the last data row.
    fn append_row(&self, values: Vec<String>)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove the data row at zero-based `position`. The header is never
    /// touched.
    fn delete_row(&self, position: usize) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// 1-based sheet row number of the data row at zero-based `position`,
/// accounting for the header row.
pub fn sheet_row_number(position: usize) -> usize {
    position + 2
}

pub(crate) fn out_of_range(position: usize, len: usize) -> StoreError {
    StoreError::Delete(format!(
        "row {} is out of range, the table has {} rows",
        position, len
    ))
}

/// The store selected by configuration.
pub enum AnyStore {
    Memory(MemoryStore),
    File(FileStore),
    #[cfg(feature = "web")]
    Sheets(SheetsStore),
}

impl AnyStore {
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let header = config.header();
        match config.store.backend {
            Backend::Memory => Ok(AnyStore::Memory(MemoryStore::new(&config.table_name, header))),
            Backend::File => Ok(AnyStore::File(FileStore::new(
                &config.table_name,
                &config.store.path,
                header,
            ))),
            #[cfg(feature = "web")]
            Backend::Sheets => Ok(AnyStore::Sheets(SheetsStore::new(config))),
            #[cfg(not(feature = "web"))]
            Backend::Sheets => Err(StoreError::Transport(
                "the sheets backend requires the `web` feature".to_string(),
            )),
        }
    }
}

impl TableStore for AnyStore {
    fn name(&self) -> &str {
        match self {
            AnyStore::Memory(store) => store.name(),
            AnyStore::File(store) => store.name(),
            #[cfg(feature = "web")]
            AnyStore::Sheets(store) => store.name(),
        }
    }

    async fn open(&self) -> Result<(), StoreError> {
        match self {
            AnyStore::Memory(store) => store.open().await,
            AnyStore::File(store) => store.open().await,
            #[cfg(feature = "web")]
            AnyStore::Sheets(store) => store.open().await,
        }
    }

    async fn read_all(&self) -> Result<Table, StoreError> {
        match self {
            AnyStore::Memory(store) => store.read_all().await,
            AnyStore::File(store) => store.read_all().await,
            #[cfg(feature = "web")]
            AnyStore::Sheets(store) => store.read_all().await,
        }
    }

    async fn append_row(&self, values: Vec<String>) -> Result<(), StoreError> {
        match self {
            AnyStore::Memory(store) => store.append_row(values).await,
            AnyStore::File(store) => store.append_row(values).await,
            #[cfg(feature = "web")]
            AnyStore::Sheets(store) => store.append_row(values).await,
        }
    }

    async fn delete_row(&self, position: usize) -> Result<(), StoreError> {
        match self {
            AnyStore::Memory(store) => store.delete_row(position).await,
            AnyStore::File(store) => store.delete_row(position).await,
            #[cfg(feature = "web")]
            AnyStore::Sheets(store) => store.delete_row(position).await,
        }
    }
}
