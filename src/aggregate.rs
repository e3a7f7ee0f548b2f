//! Read-only projections over a table snapshot.
//!
//! Everything here is recomputed from scratch on each render. Cells are
//! untyped text, so numbers are coerced (anything unparseable counts as 0)
//! and dates are compared as calendar dates, with unparseable dates ordered
//! before every valid one.

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::record::{
    COLUMN_COMMENT, COLUMN_COMPLETION, COLUMN_DATE, COLUMN_DURATION, COLUMN_MEMBER,
    COLUMN_SECTION, COLUMN_SONG, coerce_number, parse_date,
};
use crate::table::{Row, Table, cell};

pub const RECENT_LOG_LIMIT: usize = 10;
pub const RECENT_COMMENTS_LIMIT: usize = 5;

/// A row of the recent log, with its position in the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub position: usize,
    pub values: Vec<String>,
}

/// One labelled bar of a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentEntry {
    pub date: String,
    pub member: String,
    pub song: String,
    pub section: String,
    pub comment: String,
}

/// Everything the dashboard shows, derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub headers: Vec<String>,
    pub recent: Vec<LogEntry>,
    pub member_minutes: Vec<Bar>,
    pub song_progress: Vec<Bar>,
    pub comments: Vec<CommentEntry>,
}

impl Dashboard {
    pub fn from_table(table: &Table) -> Self {
        Dashboard {
            headers: table.headers.clone(),
            recent: recent_log(table, RECENT_LOG_LIMIT)
                .into_iter()
                .map(|position| LogEntry {
                    position,
                    values: table.ordered_values(&table.rows[position]),
                })
                .collect(),
            member_minutes: member_totals(table),
            song_progress: song_progress(table),
            comments: recent_comments(table, RECENT_COMMENTS_LIMIT),
        }
    }
}

/// Positions of rows ordered by date, oldest first. Stable for equal dates.
fn by_date_ascending(table: &Table) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..table.len()).collect();
    positions.sort_by_key(|&p| parse_date(cell(&table.rows[p], COLUMN_DATE)));
    positions
}

/// Positions of rows ordered by date, newest first. Stable for equal dates.
fn by_date_descending(table: &Table) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..table.len()).collect();
    positions.sort_by_key(|&p| Reverse(parse_date(cell(&table.rows[p], COLUMN_DATE))));
    positions
}

/// Positions of the `limit` most recent rows, newest first.
pub fn recent_log(table: &Table, limit: usize) -> Vec<usize> {
    let mut positions = by_date_descending(table);
    positions.truncate(limit);
    positions
}

/// Total practice minutes per member, ordered by member name.
///
/// # Arguments
/// * `table` - Snapshot returned by the store
///
/// # Returns
/// One bar per distinct member cell. Durations that do not parse count as 0.
pub fn member_totals(table: &Table) -> Vec<Bar> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for row in &table.rows {
        *totals.entry(cell(row, COLUMN_MEMBER)).or_default() +=
            coerce_number(cell(row, COLUMN_DURATION));
    }
    into_bars(totals)
}

/// Per song, the mean over members of each member's latest completion.
///
/// Rows are walked in ascending date order (stable, undated rows first), so
/// the last row seen for a (song, member) pair is that member's latest.
///
/// # Examples
/// ```
/// use band_log::aggregate::song_progress;
/// use band_log::record::header;
/// use band_log::table::Table;
///
/// let row = |date: &str, member: &str, pct: &str| -> Vec<String> {
///     [date, member, "Moanin'", "A", "30", pct, ""]
///         .iter()
///         .map(|c| c.to_string())
///         .collect()
/// };
/// let grid = vec![
///     header(false),
///     row("2024-05-01", "Saxophone", "40"),
///     row("2024-05-02", "Saxophone", "80"),
///     row("2024-05-01", "Trumpet", "60"),
/// ];
/// let bars = song_progress(&Table::from_grid(grid, &header(false)));
/// assert_eq!(bars.len(), 1);
/// assert_eq!(bars[0].value, 70.0);
/// ```
pub fn song_progress(table: &Table) -> Vec<Bar> {
    let mut latest: BTreeMap<(&str, &str), &Row> = BTreeMap::new();
    for position in by_date_ascending(table) {
        let row = &table.rows[position];
        latest.insert((cell(row, COLUMN_SONG), cell(row, COLUMN_MEMBER)), row);
    }

    let mut per_song: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for ((song, _), row) in latest {
        let entry = per_song.entry(song).or_default();
        entry.0 += coerce_number(cell(row, COLUMN_COMPLETION));
        entry.1 += 1;
    }

    per_song
        .into_iter()
        .map(|(song, (sum, count))| Bar {
            label: song.to_string(),
            value: sum / count as f64,
        })
        .collect()
}

/// The `limit` most recent rows as comment cards, newest first.
pub fn recent_comments(table: &Table, limit: usize) -> Vec<CommentEntry> {
    recent_log(table, limit)
        .into_iter()
        .map(|p| {
            let row = &table.rows[p];
            CommentEntry {
                date: cell(row, COLUMN_DATE).to_string(),
                member: cell(row, COLUMN_MEMBER).to_string(),
                song: cell(row, COLUMN_SONG).to_string(),
                section: cell(row, COLUMN_SECTION).to_string(),
                comment: cell(row, COLUMN_COMMENT).to_string(),
            }
        })
        .collect()
}

fn into_bars(values: BTreeMap<&str, f64>) -> Vec<Bar> {
    values
        .into_iter()
        .map(|(label, value)| Bar {
            label: label.to_string(),
            value,
        })
        .collect()
}
