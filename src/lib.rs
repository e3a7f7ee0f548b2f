/*!
# Band Practice Log

A small web application where band members report their practice sessions
to a shared spreadsheet, look at how everyone is doing, and remove entries
that were registered by mistake.

## Overview

The spreadsheet is the system of record. The application keeps no state of
its own between requests: every page re-reads the whole table, every report
appends one row, every deletion removes one row. When the spreadsheet cannot
be reached the page shows the error and carries on with an empty table.

## Architecture

### Store Layer
- **TableStore** - read all rows, append a row, delete a row by position
- **Google Sheets backend** - spreadsheet found by title through the Drive API,
  service-account credentials from a hosted secret or a local key file
- **File backend** - gzip-compressed bincode grid for offline use
- **Memory backend** - in-process grid for tests and demos

### Logic Layer
- **Report intake** - validates one submitted form and appends it
- **Aggregation** - recent log, minutes per member, latest completion per song,
  recent comments
- **Deletion flow** - confirms the selected row and deletes it only if it is
  still the same record

### Web Layer
- **Technologies**: axum, handlebars, plotters
- Report form, dashboard with bar charts, history editor, CSV/XLSX export

## Data Model

One record per practice session: date, member, song, section, duration in
minutes, completion percentage and comment, plus a generated id in a trailing
column so deletions can find the record again after the table has shifted.

## Modules

- **record**: the practice record and its column layout
- **table**: snapshot of the remote table
- **config**: TOML configuration and credential resolution
- **store**: the store trait and its backends
- **intake**: report validation and submission
- **aggregate**: dashboard projections
- **history**: deletion flow
- **export**: CSV and XLSX export
- **chart**: PNG bar charts
- **app**: routing and handlers

## HTTP Endpoints

- `/` - Report form, `POST /report` submits it
- `/dashboard` - Recent activity, charts and comments
- `/history` - Table browser, `?select=<n>` to confirm, `POST /history/delete`
- `/api/records`, `/api/summary` - JSON views
- `/export.csv`, `/export.xlsx` - Full table download
*/

pub mod aggregate;
#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod chart;
pub mod config;
pub mod export;
pub mod history;
pub mod intake;
pub mod record;
pub mod store;
pub mod table;

/// Re-export the types most callers need
pub use config::Config;
pub use record::PracticeRecord;
pub use store::{AnyStore, StoreError, TableStore};
pub use table::{Row, Table};
