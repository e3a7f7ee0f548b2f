//! Deleting a single record picked from the history view.
//!
//! The user picks a row by its position in the snapshot they are looking at.
//! Positions shift whenever someone else appends or deletes, so the
//! confirmation carries the record id and the row's values as seen, and the
//! flow re-reads the table to find that same record before deleting it.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::record::{COLUMN_DATE, COLUMN_ID, COLUMN_MEMBER, COLUMN_SONG};
use crate::store::{StoreError, TableStore};
use crate::table::{Table, cell};

/// The row the user asked to delete, as displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTarget {
    pub position: usize,
    /// Record id, empty for rows written without one
    #[serde(default)]
    pub id: String,
    /// Row values in header order, JSON encoded
    #[serde(default)]
    pub expected: String,
}

/// What the confirmation step shows about the selected row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    pub date: String,
    pub member: String,
    pub song: String,
    pub target: DeleteTarget,
}

/// Describe the row at `position` for the confirmation step.
pub fn confirmation(table: &Table, position: usize) -> Option<Confirmation> {
    let row = table.rows.get(position)?;
    let expected = serde_json::to_string(&table.ordered_values(row)).unwrap_or_default();
    Some(Confirmation {
        date: cell(row, COLUMN_DATE).to_string(),
        member: cell(row, COLUMN_MEMBER).to_string(),
        song: cell(row, COLUMN_SONG).to_string(),
        target: DeleteTarget {
            position,
            id: cell(row, COLUMN_ID).to_string(),
            expected,
        },
    })
}

/// Find where the target record sits in a fresh snapshot.
pub fn locate(table: &Table, target: &DeleteTarget) -> Result<usize, StoreError> {
    if !target.id.is_empty() {
        return table.position_of_id(&target.id).ok_or_else(|| {
            StoreError::Delete("the record no longer exists, it may have been deleted already".to_string())
        });
    }

    let expected: Vec<String> = serde_json::from_str(&target.expected)
        .map_err(|_| StoreError::Delete("the deletion request is malformed".to_string()))?;
    match table.rows.get(target.position) {
        Some(row) if table.ordered_values(row) == expected => Ok(target.position),
        _ => Err(StoreError::Delete(
            "the table changed since it was displayed, reload and try again".to_string(),
        )),
    }
}

/// Re-read the table, locate the target and delete it.
///
/// # Errors
/// * `StoreError::Delete` if the record is gone or the row at the position
///   no longer holds the values that were confirmed
/// * Any error from reading the table or deleting the row
pub async fn delete_record<S: TableStore>(store: &S, target: &DeleteTarget) -> Result<(), StoreError> {
    let table = store.read_all().await?;
    let position = locate(&table, target).map_err(|e| {
        warn!(table = store.name(), position = target.position, error = %e, "stale delete refused");
        e
    })?;
    if position != target.position {
        info!(from = target.position, to = position, "record moved since it was displayed");
    }

    store.delete_row(position).await?;
    info!(table = store.name(), position, "row deleted");
    Ok(())
}
