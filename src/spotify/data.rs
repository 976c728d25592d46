use crate::record::{ExportRecord, RecordKind, TimeRange};
use crate::spotify::SpotifyClient;
use crate::utils::format_played_at;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

pub const SPOTIFY_API: &str = "https://api.spotify.com/v1";

#[derive(Error, Debug)]
pub enum SpotifyError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Spotify returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Deserialize, Debug)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// The part of Spotify's paging and cursor-paging objects we read.
#[derive(Deserialize, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
}

#[derive(Deserialize, Debug)]
pub struct PlayHistory {
    pub track: Track,
    #[serde(default)]
    pub played_at: Option<String>,
    #[serde(default)]
    pub context: Option<PlayContext>,
}

#[derive(Deserialize, Debug)]
pub struct PlayContext {
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Deserialize, Debug)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
    #[serde(default)]
    pub album: Album,
    pub duration_ms: u64,
    #[serde(default)]
    pub popularity: Option<u32>,
}

#[derive(Deserialize, Debug)]
pub struct SimpleArtist {
    pub name: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct Album {
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct Artist {
    pub name: String,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl SpotifyClient {
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SpotifyError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .query(query)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Status { status, body });
        }

        Ok(response.json::<T>().await?)
    }

    pub async fn current_user(&self) -> Result<SpotifyUser, SpotifyError> {
        self.get_json("/me", &[]).await
    }

    pub async fn recently_played(&self, limit: u32) -> Result<Page<PlayHistory>, SpotifyError> {
        self.get_json("/me/player/recently-played", &[("limit", limit.to_string())])
            .await
    }

    pub async fn top_tracks(
        &self,
        limit: u32,
        time_range: TimeRange,
    ) -> Result<Page<Track>, SpotifyError> {
        self.get_json(
            "/me/top/tracks",
            &[
                ("limit", limit.to_string()),
                ("time_range", time_range.to_string()),
            ],
        )
        .await
    }

    pub async fn top_artists(
        &self,
        limit: u32,
        time_range: TimeRange,
    ) -> Result<Page<Artist>, SpotifyError> {
        self.get_json(
            "/me/top/artists",
            &[
                ("limit", limit.to_string()),
                ("time_range", time_range.to_string()),
            ],
        )
        .await
    }
}

fn join_artists(artists: &[SimpleArtist]) -> String {
    artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn track_record(track: Track, kind: RecordKind, played_at: Option<String>, context: String) -> ExportRecord {
    ExportRecord {
        kind,
        artists: join_artists(&track.artists),
        track_name: track.name,
        album: track.album.name,
        duration_ms: Some(track.duration_ms),
        popularity: track.popularity,
        played_at,
        context,
        genres: None,
    }
}

pub fn recent_plays_to_records(page: Page<PlayHistory>) -> Vec<ExportRecord> {
    page.items
        .into_iter()
        .map(|item| {
            let played_at = item
                .played_at
                .filter(|p| !p.is_empty())
                .map(|p| format_played_at(&p));
            let context = item
                .context
                .map(|c| c.type_)
                .unwrap_or_else(|| "Unknown".to_string());
            track_record(item.track, RecordKind::RecentPlay, played_at, context)
        })
        .collect()
}

pub fn top_tracks_to_records(page: Page<Track>, time_range: TimeRange) -> Vec<ExportRecord> {
    page.items
        .into_iter()
        .map(|track| {
            track_record(
                track,
                RecordKind::TopTrack(time_range),
                None,
                "top_tracks".to_string(),
            )
        })
        .collect()
}

pub fn top_artists_to_records(page: Page<Artist>, time_range: TimeRange) -> Vec<ExportRecord> {
    page.items
        .into_iter()
        .map(|artist| ExportRecord {
            kind: RecordKind::TopArtist(time_range),
            track_name: String::new(),
            artists: artist.name,
            album: String::new(),
            duration_ms: None,
            popularity: artist.popularity,
            played_at: None,
            context: "top_artists".to_string(),
            genres: Some(
                artist
                    .genres
                    .iter()
                    .take(3)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        })
        .collect()
}

pub async fn fetch_recently_played(client: &SpotifyClient, limit: u32) -> Vec<ExportRecord> {
    match client.recently_played(limit).await {
        Ok(page) => recent_plays_to_records(page),
        Err(e) => {
            log::error!("Error fetching recently played: {}", e);
            Vec::new()
        }
    }
}

pub async fn fetch_top_tracks(
    client: &SpotifyClient,
    limit: u32,
    time_range: TimeRange,
) -> Vec<ExportRecord> {
    match client.top_tracks(limit, time_range).await {
        Ok(page) => top_tracks_to_records(page, time_range),
        Err(e) => {
            log::error!("Error fetching top tracks ({}): {}", time_range, e);
            Vec::new()
        }
    }
}

pub async fn fetch_top_artists(
    client: &SpotifyClient,
    limit: u32,
    time_range: TimeRange,
) -> Vec<ExportRecord> {
    match client.top_artists(limit, time_range).await {
        Ok(page) => {
            let records = top_artists_to_records(page, time_range);
            log::info!("Found {} top artists", records.len());
            records
        }
        Err(e) => {
            log::error!("Error fetching top artists ({}): {}", time_range, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track_json(name: &str, artists: &[&str]) -> serde_json::Value {
        json!({
            "name": name,
            "artists": artists.iter().map(|a| json!({ "name": a })).collect::<Vec<_>>(),
            "album": { "name": format!("{} Album", name) },
            "duration_ms": 180000,
            "popularity": 55,
        })
    }

    #[test]
    fn test_recent_plays_mapping() {
        let page: Page<PlayHistory> = serde_json::from_value(json!({
            "items": [
                {
                    "track": track_json("One", &["A", "B"]),
                    "played_at": "2024-03-01T10:00:00.123Z",
                    "context": { "type": "playlist", "uri": "spotify:playlist:x" }
                },
                {
                    "track": track_json("Two", &["C"]),
                    "played_at": "2024-03-01T09:00:00.000Z",
                    "context": null
                },
                {
                    "track": track_json("Three", &[]),
                    "played_at": "2024-03-01T08:00:00.000Z"
                }
            ],
            "cursors": { "after": "1", "before": "0" }
        }))
        .unwrap();

        let records = recent_plays_to_records(page);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind, RecordKind::RecentPlay);
        assert_eq!(records[0].track_name, "One");
        assert_eq!(records[0].artists, "A, B");
        assert_eq!(records[0].album, "One Album");
        assert_eq!(records[0].duration_ms, Some(180000));
        assert_eq!(records[0].popularity, Some(55));
        assert_eq!(records[0].played_at.as_deref(), Some("2024-03-01 10:00:00"));
        assert_eq!(records[0].context, "playlist");
        assert_eq!(records[1].context, "Unknown");
        assert_eq!(records[2].context, "Unknown");
        assert_eq!(records[2].artists, "");
    }

    #[test]
    fn test_top_tracks_mapping() {
        let page: Page<Track> = serde_json::from_value(json!({
            "items": [track_json("X", &["Solo"]), track_json("Y", &["Duo", "Pair"])],
            "total": 2
        }))
        .unwrap();

        let records = top_tracks_to_records(page, TimeRange::ShortTerm);

        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.kind == RecordKind::TopTrack(TimeRange::ShortTerm)));
        assert!(records.iter().all(|r| r.context == "top_tracks"));
        assert!(records.iter().all(|r| r.played_at.is_none()));
        assert_eq!(records[1].artists, "Duo, Pair");
    }

    #[test]
    fn test_top_artists_mapping() {
        let page: Page<Artist> = serde_json::from_value(json!({
            "items": [
                {
                    "name": "Band",
                    "popularity": 80,
                    "genres": ["rock", "indie rock", "garage", "post-punk"]
                },
                { "name": "Quiet", "popularity": 10, "genres": [] }
            ]
        }))
        .unwrap();

        let records = top_artists_to_records(page, TimeRange::MediumTerm);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, RecordKind::TopArtist(TimeRange::MediumTerm));
        assert_eq!(records[0].artists, "Band");
        assert_eq!(records[0].track_name, "");
        assert_eq!(records[0].album, "");
        assert_eq!(records[0].duration_ms, None);
        assert_eq!(records[0].popularity, Some(80));
        assert_eq!(records[0].context, "top_artists");
        assert_eq!(records[0].genres.as_deref(), Some("rock, indie rock, garage"));
        assert_eq!(records[1].genres.as_deref(), Some(""));
    }

    /// Serves one canned HTTP response on a local port and returns its base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let base = serve_once("401 Unauthorized", r#"{"error":"bad token"}"#).await;
        let client = SpotifyClient::with_api_base("t".to_string(), base);

        match client.recently_played(5).await {
            Err(SpotifyError::Status { status, body }) => {
                assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
                assert!(body.contains("bad token"));
            }
            other => panic!("expected status error, got {:?}", other.map(|p| p.items.len())),
        }
    }

    #[tokio::test]
    async fn test_fetchers_return_empty_on_error_status() {
        let base = serve_once("500 Internal Server Error", "{}").await;
        let client = SpotifyClient::with_api_base("t".to_string(), base);
        assert!(fetch_recently_played(&client, 50).await.is_empty());

        let base = serve_once("429 Too Many Requests", "{}").await;
        let client = SpotifyClient::with_api_base("t".to_string(), base);
        assert!(fetch_top_tracks(&client, 20, TimeRange::ShortTerm).await.is_empty());

        let base = serve_once("403 Forbidden", "{}").await;
        let client = SpotifyClient::with_api_base("t".to_string(), base);
        assert!(fetch_top_artists(&client, 20, TimeRange::MediumTerm).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetchers_return_empty_when_unreachable() {
        let client = SpotifyClient::with_api_base("t".to_string(), "http://127.0.0.1:1");

        assert!(fetch_recently_played(&client, 50).await.is_empty());
        assert!(fetch_top_tracks(&client, 20, TimeRange::MediumTerm).await.is_empty());
        assert!(fetch_top_artists(&client, 20, TimeRange::MediumTerm).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetcher_maps_successful_response() {
        let base = serve_once(
            "200 OK",
            r#"{"items":[{"name":"Band","popularity":80,"genres":["rock"]}]}"#,
        )
        .await;
        let client = SpotifyClient::with_api_base("t".to_string(), base);

        let records = fetch_top_artists(&client, 20, TimeRange::LongTerm).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, RecordKind::TopArtist(TimeRange::LongTerm));
        assert_eq!(records[0].genres.as_deref(), Some("rock"));
    }

    #[test]
    fn test_empty_page_yields_no_records() {
        let page: Page<Track> = serde_json::from_value(json!({ "items": [] })).unwrap();
        assert!(top_tracks_to_records(page, TimeRange::LongTerm).is_empty());
    }
}
