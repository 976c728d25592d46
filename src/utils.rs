use chrono::{DateTime, Local};
use std::error::Error;
use std::time::{SystemTime, UNIX_EPOCH};

pub const ROW_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn export_timestamp() -> String {
    Local::now().format(ROW_TIME_FORMAT).to_string()
}

/// `2024-03-01T10:00:00.123Z` -> `2024-03-01 10:00:00`. Unparseable input is kept as-is.
pub fn format_played_at(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.format(ROW_TIME_FORMAT).to_string(),
        Err(e) => {
            log::warn!("Could not parse played_at '{}': {}", raw, e);
            raw.to_string()
        }
    }
}

/// The user-facing line for a fatal error: its `Display` text, not its `Debug` form.
pub fn error_message(error: &dyn Error) -> String {
    format!("Error: {}", error)
}

pub fn log_error(error: &dyn Error) {
    eprintln!("{}", error_message(error));
}
