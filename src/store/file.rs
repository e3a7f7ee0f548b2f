use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::info;

use super::{StoreError, TableStore, out_of_range};
use crate::table::Table;

type Grid = Vec<Vec<String>>;

/// Table kept on local disk as a gzip-compressed bincode grid.
///
/// The grid holds the header row followed by the data rows, the same shape
/// a spreadsheet has. A missing file is an empty table.
pub struct FileStore {
    name: String,
    path: PathBuf,
    header: Vec<String>,
    // serialises read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(name: &str, path: &Path, header: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            header,
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the grid file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn modify<F>(&self, change: F, fail: fn(String) -> StoreError) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Grid) -> Result<(), StoreError>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Transport("file store lock poisoned".to_string()))?;
        let mut grid = load_grid(&self.path).map_err(|e| StoreError::Transport(e.to_string()))?;
        change(&mut grid)?;
        save_grid(&grid, &self.path).map_err(|e| fail(e.to_string()))
    }
}

impl TableStore for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    /// The file itself may be missing, its directory may not.
    async fn open(&self) -> Result<(), StoreError> {
        let dir = match self.path().parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        if !dir.is_dir() {
            return Err(StoreError::Transport(format!(
                "directory {} does not exist",
                dir.display()
            )));
        }
        info!(table = %self.name, path = %self.path().display(), "using local grid file");
        Ok(())
    }

    async fn read_all(&self) -> Result<Table, StoreError> {
        let grid = load_grid(&self.path).map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Table::from_grid(grid, &self.header))
    }

    async fn append_row(&self, values: Vec<String>) -> Result<(), StoreError> {
        self.modify(
            |grid| {
                if grid.is_empty() {
                    grid.push(self.header.clone());
                }
                grid.push(values);
                Ok(())
            },
            StoreError::Write,
        )
    }

    async fn delete_row(&self, position: usize) -> Result<(), StoreError> {
        self.modify(
            |grid| {
                let len = grid.len().saturating_sub(1);
                if position >= len {
                    return Err(out_of_range(position, len));
                }
                grid.remove(position + 1);
                Ok(())
            },
            StoreError::Delete,
        )
    }
}

fn load_grid(path: &Path) -> std::io::Result<Grid> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);

    let grid: Grid = deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(grid)
}

// Written to a sibling temp file and renamed so readers never see a torn file.
fn save_grid(grid: &Grid, path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)?;
    {
        let encoder = GzEncoder::new(temp.as_file(), Compression::default());
        let mut writer = std::io::BufWriter::new(encoder);

        serialize_into(&mut writer, grid)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?.flush()?;
    }
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::header;
    use crate::table::cell;

    fn row(member: &str) -> Vec<String> {
        vec!["2024-05-01".to_string(), member.to_string()]
    }

    #[tokio::test]
    async fn missing_file_is_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new("log", &dir.path().join("log.bin.gz"), header(true));
        let table = store.read_all().await.unwrap();
        assert!(table.is_empty());
        assert_eq!(table.headers, header(true));
    }

    #[tokio::test]
    async fn open_requires_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new("log", &dir.path().join("log.bin.gz"), header(false));
        store.open().await.unwrap();
        assert!(!store.path().exists());

        let store = FileStore::new("log", &dir.path().join("nope").join("log.bin.gz"), header(false));
        let err = store.open().await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }

    #[tokio::test]
    async fn rows_survive_a_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.bin.gz");
        {
            let store = FileStore::new("log", &path, header(false));
            store.append_row(row("Trumpet")).await.unwrap();
            store.append_row(row("Rhythm")).await.unwrap();
        }
        assert!(path.exists());

        let store = FileStore::new("log", &path, header(false));
        let table = store.read_all().await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(cell(&table.rows[1], "member"), "Rhythm");
    }

    #[tokio::test]
    async fn delete_by_position_and_range_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new("log", &dir.path().join("log.bin.gz"), header(false));
        for member in ["A", "B", "C"] {
            store.append_row(row(member)).await.unwrap();
        }

        store.delete_row(0).await.unwrap();
        let err = store.delete_row(2).await.unwrap_err();
        assert!(matches!(err, StoreError::Delete(_)));

        let table = store.read_all().await.unwrap();
        let members: Vec<&str> = table.rows.iter().map(|r| cell(r, "member")).collect();
        assert_eq!(members, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn corrupt_file_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.bin.gz");
        std::fs::write(&path, b"not gzip").unwrap();
        let store = FileStore::new("log", &path, header(false));
        let err = store.read_all().await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}
