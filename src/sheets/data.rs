use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::SheetsConfig;
use crate::sheets::{SheetTarget, SheetsClient};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("Failed to load service account credentials from {0}: {1}")]
    Credentials(String, std::io::Error),
    #[error("Service account token request failed: {0}")]
    Token(#[from] yup_oauth2::Error),
    #[error("Service account returned an empty access token")]
    EmptyToken,
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Google API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Spreadsheet '{0}' not found or not shared with the service account")]
    NotFound(String),
    #[error("Spreadsheet {0} has no worksheets")]
    NoWorksheet(String),
    #[error("Invalid API URL")]
    Url,
}

#[derive(Deserialize, Debug)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize, Debug)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize, Debug)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize, Debug)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize, Debug)]
struct SheetProperties {
    title: String,
    #[serde(default)]
    index: u32,
}

#[derive(Deserialize, Debug)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Single quotes inside a Drive query literal are backslash-escaped.
fn drive_name_query(name: &str) -> String {
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        name.replace('\\', "\\\\").replace('\'', "\\'"),
        SPREADSHEET_MIME
    )
}

/// A1 notation for a whole sheet, e.g. `'My Sheet'` or `'My Sheet'!A1`.
fn a1_range(title: &str, cell: Option<&str>) -> String {
    let quoted = format!("'{}'", title.replace('\'', "''"));
    match cell {
        Some(cell) => format!("{}!{}", quoted, cell),
        None => quoted,
    }
}

fn first_sheet_title(meta: SpreadsheetMeta) -> Option<String> {
    meta.sheets
        .into_iter()
        .min_by_key(|s| s.properties.index)
        .map(|s| s.properties.title)
}

fn first_value(range: ValueRange) -> Option<String> {
    let value = range.values.into_iter().next()?.into_iter().next()?;
    let text = match value {
        Value::String(s) => s,
        Value::Null => return None,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn values_url(spreadsheet_id: &str, range: &str) -> Result<Url, SheetsError> {
    let mut url = Url::parse(SHEETS_API).map_err(|_| SheetsError::Url)?;
    url.path_segments_mut()
        .map_err(|_| SheetsError::Url)?
        .extend(&[spreadsheet_id, "values", range]);
    Ok(url)
}

impl SheetsClient {
    async fn read_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SheetsError> {
        let response = request.bearer_auth(&self.token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Status { status, body });
        }

        Ok(response.json::<T>().await?)
    }

    /// First spreadsheet visible to the service account with exactly this name.
    pub async fn find_spreadsheet_id(&self, name: &str) -> Result<String, SheetsError> {
        let request = self.http.get(DRIVE_FILES_API).query(&[
            ("q", drive_name_query(name)),
            ("fields", "files(id,name)".to_string()),
            ("pageSize", "1".to_string()),
            ("supportsAllDrives", "true".to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
        ]);

        let list: DriveFileList = self.read_json(request).await?;
        list.files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| SheetsError::NotFound(name.to_string()))
    }

    pub async fn first_worksheet_title(&self, spreadsheet_id: &str) -> Result<String, SheetsError> {
        let mut url = Url::parse(SHEETS_API).map_err(|_| SheetsError::Url)?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Url)?
            .push(spreadsheet_id);

        let request = self
            .http
            .get(url)
            .query(&[("fields", "sheets.properties(title,index)")]);
        let meta: SpreadsheetMeta = self.read_json(request).await?;

        first_sheet_title(meta).ok_or_else(|| SheetsError::NoWorksheet(spreadsheet_id.to_string()))
    }

    /// Resolves the configured spreadsheet and returns its first worksheet.
    pub async fn open(self, config: &SheetsConfig) -> Result<Worksheet, SheetsError> {
        let spreadsheet_id = match &config.spreadsheet_id {
            Some(id) => id.clone(),
            None => self.find_spreadsheet_id(&config.sheet_name).await?,
        };
        let title = self.first_worksheet_title(&spreadsheet_id).await?;
        log::info!("Opened '{}' ({}), worksheet '{}'", config.sheet_name, spreadsheet_id, title);

        Ok(Worksheet {
            client: self,
            spreadsheet_id,
            title,
        })
    }
}

pub struct Worksheet {
    client: SheetsClient,
    pub spreadsheet_id: String,
    pub title: String,
}

#[async_trait]
impl SheetTarget for Worksheet {
    async fn first_cell(&self) -> Result<Option<String>, SheetsError> {
        let url = values_url(&self.spreadsheet_id, &a1_range(&self.title, Some("A1")))?;
        let range: ValueRange = self.client.read_json(self.client.http.get(url)).await?;
        Ok(first_value(range))
    }

    async fn append_rows(&self, rows: &[Vec<Value>]) -> Result<(), SheetsError> {
        let url = values_url(
            &self.spreadsheet_id,
            &format!("{}:append", a1_range(&self.title, None)),
        )?;
        let request = self
            .client
            .http
            .post(url)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": rows }));

        let _: Value = self.client.read_json(request).await?;
        log::debug!("Appended {} rows to '{}'", rows.len(), self.title);
        Ok(())
    }
}
