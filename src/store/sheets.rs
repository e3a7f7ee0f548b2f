//! Google Sheets backend.
//!
//! The spreadsheet is looked up by title through the Drive API and its first
//! worksheet holds the table. Authentication uses a service-account key taken
//! from the configured credential sources.

use google_drive3::DriveHub;
use google_sheets4::api::{
    BatchUpdateSpreadsheetRequest, DeleteDimensionRequest, DimensionRange, Request, ValueRange,
};
use google_sheets4::{Sheets, hyper, hyper_rustls, oauth2};
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{StoreError, TableStore, out_of_range, sheet_row_number};
use crate::config::{Config, CredentialsConfig};
use crate::table::Table;

type Connector = HttpsConnector<HttpConnector>;

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Resolved handle on the remote worksheet.
struct Connection {
    hub: Sheets<Connector>,
    spreadsheet_id: String,
    sheet_id: i32,
    sheet_title: String,
}

impl Connection {
    /// A1 range covering the whole worksheet.
    fn range(&self) -> String {
        format!("'{}'", self.sheet_title.replace('\'', "''"))
    }
}

/// Store backed by the first worksheet of a named Google spreadsheet.
///
/// The connection is established on first use and kept afterwards; a failed
/// attempt is not cached, so the next request tries again.
pub struct SheetsStore {
    table_name: String,
    header: Vec<String>,
    credentials: CredentialsConfig,
    connection: OnceCell<Connection>,
}

impl SheetsStore {
    pub fn new(config: &Config) -> Self {
        Self {
            table_name: config.table_name.clone(),
            header: config.header(),
            credentials: config.credentials.clone(),
            connection: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<&Connection, StoreError> {
        self.connection.get_or_try_init(|| self.connect()).await
    }

    async fn connect(&self) -> Result<Connection, StoreError> {
        let material = self.credentials.resolve()?;
        debug!(source = ?material.source, "using service account credentials");

        let key = oauth2::parse_service_account_key(material.json.as_bytes())
            .map_err(|e| StoreError::Auth(format!("invalid service account key: {}", e)))?;
        let auth = oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| StoreError::Auth(e.to_string()))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| StoreError::Transport(format!("cannot load root certificates: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = hyper::Client::builder().build(connector);

        let drive = DriveHub::new(client.clone(), auth.clone());
        let hub = Sheets::new(client, auth);

        let spreadsheet_id = self.find_spreadsheet(&drive).await?;
        let (_, spreadsheet) = hub
            .spreadsheets()
            .get(&spreadsheet_id)
            .doit()
            .await
            .map_err(|e| classify(e, &self.table_name, StoreError::Transport))?;

        let properties = spreadsheet
            .sheets
            .unwrap_or_default()
            .into_iter()
            .find_map(|sheet| sheet.properties)
            .ok_or_else(|| StoreError::NotFound(self.table_name.clone()))?;

        let connection = Connection {
            hub,
            spreadsheet_id,
            sheet_id: properties.sheet_id.unwrap_or(0),
            sheet_title: properties.title.unwrap_or_else(|| "Sheet1".to_string()),
        };
        info!(
            table = %self.table_name,
            spreadsheet = %connection.spreadsheet_id,
            sheet = %connection.sheet_title,
            "connected to spreadsheet"
        );
        Ok(connection)
    }

    async fn find_spreadsheet(&self, drive: &DriveHub<Connector>) -> Result<String, StoreError> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            self.table_name.replace('\\', "\\\\").replace('\'', "\\'"),
            SPREADSHEET_MIME
        );
        let (_, list) = drive
            .files()
            .list()
            .q(&query)
            .supports_all_drives(true)
            .include_items_from_all_drives(true)
            .doit()
            .await
            .map_err(|e| classify(e, &self.table_name, StoreError::Transport))?;

        list.files
            .unwrap_or_default()
            .into_iter()
            .find_map(|file| file.id)
            .ok_or_else(|| StoreError::NotFound(self.table_name.clone()))
    }

    async fn grid(&self, conn: &Connection) -> Result<Vec<Vec<String>>, StoreError> {
        let (_, values) = conn
            .hub
            .spreadsheets()
            .values_get(&conn.spreadsheet_id, &conn.range())
            .doit()
            .await
            .map_err(|e| classify(e, &self.table_name, StoreError::Transport))?;

        Ok(values
            .values
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

impl TableStore for SheetsStore {
    fn name(&self) -> &str {
        &self.table_name
    }

    async fn open(&self) -> Result<(), StoreError> {
        self.connection().await.map(|_| ())
    }

    async fn read_all(&self) -> Result<Table, StoreError> {
        let conn = self.connection().await?;
        let grid = self.grid(conn).await?;
        Ok(Table::from_grid(grid, &self.header))
    }

    async fn append_row(&self, values: Vec<String>) -> Result<(), StoreError> {
        let conn = self.connection().await?;

        // a blank worksheet gets its header in the same call
        let mut rows = Vec::with_capacity(2);
        if self.grid(conn).await?.is_empty() {
            rows.push(self.header.iter().cloned().map(Value::String).collect());
        }
        rows.push(values.into_iter().map(Value::String).collect());

        let request = ValueRange {
            values: Some(rows),
            ..Default::default()
        };
        conn.hub
            .spreadsheets()
            .values_append(request, &conn.spreadsheet_id, &conn.range())
            .value_input_option("RAW")
            .insert_data_option("INSERT_ROWS")
            .doit()
            .await
            .map_err(|e| classify(e, &self.table_name, StoreError::Write))?;
        Ok(())
    }

    async fn delete_row(&self, position: usize) -> Result<(), StoreError> {
        let conn = self.connection().await?;

        // the grid extends past the data, so range-check against the values
        let len = self.grid(conn).await?.len().saturating_sub(1);
        if position >= len {
            return Err(out_of_range(position, len));
        }

        let request = BatchUpdateSpreadsheetRequest {
            requests: Some(vec![Request {
                delete_dimension: Some(DeleteDimensionRequest {
                    range: Some(data_row_range(conn.sheet_id, position)),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };
        conn.hub
            .spreadsheets()
            .batch_update(request, &conn.spreadsheet_id)
            .doit()
            .await
            .map_err(|e| classify(e, &self.table_name, StoreError::Delete))?;
        Ok(())
    }
}

/// Half-open, zero-based row span of the data row at `position`.
///
/// The API counts from the top of the sheet, so the span is
/// `sheet_row_number(position) - 1 .. sheet_row_number(position)`.
fn data_row_range(sheet_id: i32, position: usize) -> DimensionRange {
    let row_number = sheet_row_number(position) as i32;
    DimensionRange {
        sheet_id: Some(sheet_id),
        dimension: Some("ROWS".to_string()),
        start_index: Some(row_number - 1),
        end_index: Some(row_number),
        ..Default::default()
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Map an API failure onto the store taxonomy, `fallback` covers whatever is
/// neither an auth nor a missing-table problem.
fn classify(err: google_sheets4::Error, table: &str, fallback: fn(String) -> StoreError) -> StoreError {
    use google_sheets4::Error;

    match err {
        Error::MissingToken(e) => StoreError::Auth(e.to_string()),
        Error::MissingAPIKey => StoreError::Auth("missing API key".to_string()),
        Error::BadRequest(body) => match body["error"]["code"].as_u64() {
            Some(401) | Some(403) => StoreError::Auth(
                body["error"]["message"]
                    .as_str()
                    .unwrap_or("permission denied")
                    .to_string(),
            ),
            Some(404) => StoreError::NotFound(table.to_string()),
            _ => fallback(body.to_string()),
        },
        Error::Failure(response) => match response.status().as_u16() {
            401 | 403 => StoreError::Auth(response.status().to_string()),
            404 => StoreError::NotFound(table.to_string()),
            _ => fallback(response.status().to_string()),
        },
        other => fallback(other.to_string()),
    }
}
