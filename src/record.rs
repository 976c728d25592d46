use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const HEADER: [&str; 9] = [
    "Timestamp",
    "Type",
    "Track Name",
    "Artist(s)",
    "Album",
    "Duration (ms)",
    "Popularity",
    "Played At",
    "Context",
];

/// Spotify's windowing for "top" queries.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "4 weeks",
            TimeRange::MediumTerm => "6 months",
            TimeRange::LongTerm => "all time",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    RecentPlay,
    TopTrack(TimeRange),
    TopArtist(TimeRange),
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::RecentPlay => write!(f, "recent"),
            RecordKind::TopTrack(range) => write!(f, "top_{}", range),
            RecordKind::TopArtist(range) => write!(f, "artist_{}", range),
        }
    }
}

/// One flattened unit of listening data, destined for a single sheet row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub kind: RecordKind,
    pub track_name: String,
    pub artists: String,
    pub album: String,
    pub duration_ms: Option<u64>,
    pub popularity: Option<u32>,
    pub played_at: Option<String>,
    pub context: String,
    /// Top three genres; only set for artists and not written as a column.
    pub genres: Option<String>,
}

impl ExportRecord {
    /// Cells in `HEADER` order. Absent values become empty strings.
    pub fn to_row(&self, timestamp: &str) -> Vec<Value> {
        vec![
            Value::from(timestamp),
            Value::from(self.kind.to_string()),
            Value::from(self.track_name.as_str()),
            Value::from(self.artists.as_str()),
            Value::from(self.album.as_str()),
            self.duration_ms.map(Value::from).unwrap_or_else(empty_cell),
            self.popularity.map(Value::from).unwrap_or_else(empty_cell),
            Value::from(self.played_at.as_deref().unwrap_or("")),
            Value::from(self.context.as_str()),
        ]
    }
}

fn empty_cell() -> Value {
    Value::from("")
}

pub fn header_row() -> Vec<Value> {
    HEADER.iter().map(|h| Value::from(*h)).collect()
}
