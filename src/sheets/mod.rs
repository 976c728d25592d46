pub mod auth;
pub mod data;

use async_trait::async_trait;
use serde_json::Value;

use crate::sheets::data::SheetsError;

pub struct SheetsClient {
    pub token: String,
    http: reqwest::Client,
}

impl SheetsClient {
    pub fn new(token: String) -> Self {
        Self {
            token,
            http: reqwest::Client::new(),
        }
    }
}

/// Where export rows end up. Implemented by `data::Worksheet`.
#[async_trait]
pub trait SheetTarget {
    /// Contents of `A1`, or `None` when the sheet is empty.
    async fn first_cell(&self) -> Result<Option<String>, SheetsError>;

    async fn append_rows(&self, rows: &[Vec<Value>]) -> Result<(), SheetsError>;
}
