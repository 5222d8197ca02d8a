// src/sheets_client.rs
//! Google Sheets (values API v4) as the content table.
//!
//! Columns are located by the header row, so the sheet may hold extra
//! columns or a different order. Missing known columns are appended to the
//! header on first write.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::row::{GENERATED_ON_FORMAT, POSTED_ON_FORMAT};
use crate::models::{CellValue, Column, TableRow};
use crate::store::TabularStore;

type Layout = Vec<Option<Column>>;

pub struct SheetsClient {
    client: Client,
    access_token: String,
    spreadsheet_id: String,
    sheet_name: String,
    base_url: String,
    layout: RwLock<Option<Layout>>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// A1 column letters for a 0-based column offset.
pub fn column_letter(mut offset: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (offset % 26) as u8) as char);
        if offset < 26 {
            break;
        }
        offset = offset / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Splits a values grid into the header layout and the data rows.
fn parse_grid(values: &[Vec<Value>]) -> Option<(Layout, Vec<TableRow>)> {
    let (header, data) = values.split_first()?;
    let layout: Layout = header
        .iter()
        .map(|cell| Column::from_header(&cell_text(cell)))
        .collect();
    if layout.iter().all(Option::is_none) {
        return None;
    }

    let rows = data
        .iter()
        .enumerate()
        .map(|(position, row)| {
            let cells = row
                .iter()
                .enumerate()
                .filter_map(|(offset, cell)| {
                    let column = (*layout.get(offset)?)?;
                    Some((column, CellValue::parse(&incoming_text(column, cell))))
                })
                .collect();
            TableRow { position, cells }
        })
        .collect();
    Some((layout, rows))
}

fn is_timestamp(column: Column) -> bool {
    matches!(
        column,
        Column::GeneratedOn | Column::PostedOnInstagram | Column::CreatedOn
    )
}

/// Text sent for a cell. Timestamps get a leading `'` so Sheets keeps them
/// as text instead of converting them to date serials.
fn outgoing_text(column: Column, value: &CellValue) -> String {
    let text = value.to_cell_string();
    if is_timestamp(column) && !text.is_empty() {
        format!("'{}", text)
    } else {
        text
    }
}

/// Date serial (days since 1899-12-30) as a timestamp.
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !(0.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(chrono::Duration::milliseconds(millis))
}

/// Timestamp cells in the text form the row mapping expects. Cells written
/// before timestamps were forced to text come back as date serials.
fn incoming_text(column: Column, value: &Value) -> String {
    if !is_timestamp(column) {
        return cell_text(value);
    }
    if let Value::Number(n) = value {
        if let Some(at) = n.as_f64().and_then(serial_to_datetime) {
            return match column {
                Column::GeneratedOn => at.format(GENERATED_ON_FORMAT).to_string(),
                Column::PostedOnInstagram => at.format(POSTED_ON_FORMAT).to_string(),
                _ => at.and_utc().to_rfc3339(),
            };
        }
    }
    let text = cell_text(value);
    match text.strip_prefix('\'') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

fn row_values(layout: &Layout, cells: &[(Column, CellValue)]) -> Vec<String> {
    layout
        .iter()
        .map(|slot| {
            slot.and_then(|column| cells.iter().find(|(c, _)| *c == column))
                .map(|(column, value)| outgoing_text(*column, value))
                .unwrap_or_default()
        })
        .collect()
}

fn missing_columns(layout: &Layout) -> Vec<Column> {
    Column::ALL
        .into_iter()
        .filter(|column| !layout.contains(&Some(*column)))
        .collect()
}

impl SheetsClient {
    pub fn new(access_token: String, spreadsheet_id: String, sheet_name: String) -> Self {
        Self {
            client: Client::new(),
            access_token,
            spreadsheet_id,
            sheet_name,
            base_url: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            layout: RwLock::new(None),
        }
    }

    fn range(&self, cells: &str) -> String {
        let sheet = if self.sheet_name.contains(|c: char| !c.is_ascii_alphanumeric()) {
            format!("'{}'", self.sheet_name.replace('\'', "''"))
        } else {
            self.sheet_name.clone()
        };
        if cells.is_empty() {
            sheet
        } else {
            format!("{}!{}", sheet, cells)
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            self.base_url,
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, StoreError> {
        let response = request
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Sheets request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to read Sheets response: {}", e)))?;
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!(
                "Sheets API error ({}): {}",
                status, body
            )));
        }
        Ok(body)
    }

    async fn write_header(&self, start_offset: usize, headers: &[&str]) -> Result<(), StoreError> {
        let range = self.range(&format!("{}1", column_letter(start_offset)));
        let request = self
            .client
            .put(self.values_url(&range))
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "values": [headers] }));
        self.send(request).await?;
        Ok(())
    }

    /// Header layout, creating or extending the header row when needed.
    async fn ensure_layout(&self) -> Result<Layout, StoreError> {
        if self.layout.read().await.is_none() {
            self.read_rows().await?;
        }

        let mut guard = self.layout.write().await;
        let mut layout = guard.clone().unwrap_or_default();
        let missing = missing_columns(&layout);
        if !missing.is_empty() {
            let headers: Vec<&str> = missing.iter().map(|c| c.header()).collect();
            info!("Adding columns {:?} to sheet header", headers);
            self.write_header(layout.len(), &headers).await?;
            layout.extend(missing.into_iter().map(Some));
            *guard = Some(layout.clone());
        }
        Ok(layout)
    }
}

#[async_trait]
impl TabularStore for SheetsClient {
    async fn read_rows(&self) -> Result<Vec<TableRow>, StoreError> {
        let request = self
            .client
            .get(self.values_url(&self.range("")))
            .query(&[("valueRenderOption", "FORMULA")]);
        let body = self.send(request).await?;
        let grid: ValueRange = serde_json::from_str(&body)
            .map_err(|e| StoreError::Unparsable(format!("Unexpected Sheets payload: {}", e)))?;

        match parse_grid(&grid.values) {
            Some((layout, rows)) => {
                debug!("Read {} rows from sheet {}", rows.len(), self.sheet_name);
                *self.layout.write().await = Some(layout);
                Ok(rows)
            }
            None if grid.values.is_empty() => {
                *self.layout.write().await = None;
                Ok(Vec::new())
            }
            None => Err(StoreError::Unparsable(
                "first row holds no known column headers".to_string(),
            )),
        }
    }

    async fn append_rows(&self, rows: Vec<Vec<(Column, CellValue)>>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let layout = self.ensure_layout().await?;
        let values: Vec<Vec<String>> = rows.iter().map(|cells| row_values(&layout, cells)).collect();

        let url = format!("{}:append", self.values_url(&self.range("A1")));
        let request = self
            .client
            .post(url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": values }));
        self.send(request).await?;
        info!("Appended {} rows to sheet {}", values.len(), self.sheet_name);
        Ok(())
    }

    async fn update_rows(
        &self,
        updates: Vec<(usize, Vec<(Column, CellValue)>)>,
    ) -> Result<(), StoreError> {
        let layout = self.ensure_layout().await?;
        let mut data = Vec::new();
        for (position, cells) in &updates {
            // Header is sheet row 1, data position 0 is row 2
            let sheet_row = position + 2;
            for (column, value) in cells {
                let Some(offset) = layout.iter().position(|slot| *slot == Some(*column)) else {
                    warn!("Column {} missing from sheet, skipping update", column.header());
                    continue;
                };
                data.push(json!({
                    "range": self.range(&format!("{}{}", column_letter(offset), sheet_row)),
                    "values": [[outgoing_text(*column, value)]],
                }));
            }
        }
        if data.is_empty() {
            return Ok(());
        }

        let request = self
            .client
            .post(format!(
                "{}/{}/values:batchUpdate",
                self.base_url, self.spreadsheet_id
            ))
            .json(&json!({ "valueInputOption": "USER_ENTERED", "data": data }));
        self.send(request).await?;
        debug!("Updated {} cells across {} rows", data.len(), updates.len());
        Ok(())
    }
}
