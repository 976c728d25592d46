use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use toml;

use crate::record::TimeRange;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found. A default '{0}' has been created. Please update it with your credentials.")]
    Created(String),
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to write default configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    pub spotify: SpotifyConfig,
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_spotify_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_token_cache")]
    pub token_cache: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SheetsConfig {
    pub sheet_name: String,
    pub credentials_path: String,
    #[serde(default = "default_sheets_scopes")]
    pub scopes: Vec<String>,
    /// Skips the lookup by name when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub recent_limit: u32,
    pub top_limit: u32,
    pub top_track_ranges: Vec<TimeRange>,
    pub top_artist_range: TimeRange,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            recent_limit: 50,
            top_limit: 20,
            top_track_ranges: vec![TimeRange::ShortTerm, TimeRange::MediumTerm],
            top_artist_range: TimeRange::MediumTerm,
            batch_size: 50,
            batch_delay_ms: 1000,
        }
    }
}

fn default_spotify_scopes() -> Vec<String> {
    vec![
        "user-read-recently-played".to_string(),
        "user-top-read".to_string(),
        "user-read-private".to_string(),
        "user-read-email".to_string(),
    ]
}

fn default_sheets_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/spreadsheets".to_string(),
        "https://www.googleapis.com/auth/drive".to_string(),
    ]
}

fn default_token_cache() -> String {
    "spotify_token.json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spotify: SpotifyConfig {
                client_id: "your_spotify_client_id".to_string(),
                client_secret: "your_spotify_client_secret".to_string(),
                redirect_uri: "http://localhost:8888/callback".to_string(),
                scopes: default_spotify_scopes(),
                token_cache: default_token_cache(),
            },
            sheets: SheetsConfig {
                sheet_name: "Spotify Listening History".to_string(),
                credentials_path: "credentials.json".to_string(),
                scopes: default_sheets_scopes(),
                spreadsheet_id: None,
            },
            export: ExportConfig::default(),
        }
    }
}

impl Config {
    /// Environment variables (and a `.env` file, if present) win over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = value;
        }
        if let Some(value) = lookup("SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = value;
        }
        if let Some(value) = lookup("SPOTIFY_REDIRECT_URI") {
            self.spotify.redirect_uri = value;
        }
        if let Some(value) = lookup("SHEET_NAME") {
            self.sheets.sheet_name = value;
        }
        if let Some(value) = lookup("GOOGLE_SHEETS_CREDENTIALS") {
            self.sheets.credentials_path = value;
        }
    }
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

pub fn load_config_from(config_path: &str) -> Result<Config, ConfigError> {
    dotenv::dotenv().ok();

    if !Path::new(config_path).exists() {
        let toml_string = toml::to_string_pretty(&Config::default())?;

        let mut file = fs::File::create(config_path)?;
        file.write_all(toml_string.as_bytes())?;

        return Err(ConfigError::Created(config_path.to_string()));
    }

    let config_str = fs::read_to_string(config_path)?;
    let mut config: Config = toml::from_str(&config_str)?;
    config.apply_env_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    log::debug!("Loaded configuration from {}", config_path);
    Ok(config)
}
