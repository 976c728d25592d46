pub mod auth;
pub mod data;

pub struct SpotifyClient {
    pub token: String,
    api_base: String,
    http: reqwest::Client,
}

impl SpotifyClient {
    pub fn new(token: String) -> Self {
        Self::with_api_base(token, data::SPOTIFY_API)
    }

    pub fn with_api_base(token: String, api_base: impl Into<String>) -> Self {
        Self {
            token,
            api_base: api_base.into(),
            http: reqwest::Client::new(),
        }
    }
}
