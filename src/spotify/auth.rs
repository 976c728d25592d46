use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::SpotifyConfig;
use crate::spotify::data::SpotifyError;
use crate::spotify::SpotifyClient;
use crate::utils::now_secs;

const AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const DEFAULT_EXPIRES_IN: u64 = 3600;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid OAuth configuration: {0}")]
    Config(String),
    #[error("Token cache I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Token cache is not valid JSON: {0}")]
    Cache(#[from] serde_json::Error),
    #[error("Redirect URL did not contain an authorization code")]
    MissingCode,
    #[error("Authorization was denied: {0}")]
    Denied(String),
    #[error("CSRF state in the redirect URL does not match")]
    StateMismatch,
    #[error("Token request failed: {0}")]
    TokenRequest(String),
    #[error("Cached token has no refresh token")]
    NoRefreshToken,
    #[error("Could not verify the Spotify connection: {0}")]
    Verify(#[from] SpotifyError),
}

/// On-disk token, laid out like the cache files other Spotify tools write.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
    pub expires_at: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl CachedToken {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// A refresh response may omit the refresh token; `previous_refresh` is kept in that case.
    pub fn from_response(
        response: &BasicTokenResponse,
        previous_refresh: Option<&str>,
        now: u64,
    ) -> Self {
        let expires_in = response
            .expires_in()
            .map(|d| d.as_secs())
            .unwrap_or(DEFAULT_EXPIRES_IN);
        let scope = response
            .scopes()
            .map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();

        Self {
            access_token: response.access_token().secret().to_string(),
            token_type: response.token_type().as_ref().to_string(),
            expires_in,
            scope,
            expires_at: now + expires_in,
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| previous_refresh.map(str::to_string)),
        }
    }
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<CachedToken>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save(&self, token: &CachedToken) -> Result<(), AuthError> {
        let contents = serde_json::to_string(token)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    pub fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Could not remove token cache {}: {}", self.path.display(), e);
            }
        }
    }
}

#[async_trait]
pub trait TokenRefresher {
    async fn refresh(&self, token: &CachedToken) -> Result<CachedToken, AuthError>;
}

pub struct SpotifyOAuth {
    client: BasicClient,
    scopes: Vec<String>,
}

impl SpotifyOAuth {
    pub fn new(config: &SpotifyConfig) -> Result<Self, AuthError> {
        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(AUTH_URL.to_string()).map_err(|e| AuthError::Config(e.to_string()))?,
            Some(TokenUrl::new(TOKEN_URL.to_string()).map_err(|e| AuthError::Config(e.to_string()))?),
        )
        .set_redirect_uri(
            RedirectUrl::new(config.redirect_uri.clone())
                .map_err(|e| AuthError::Config(e.to_string()))?,
        );

        Ok(Self {
            client,
            scopes: config.scopes.clone(),
        })
    }

    /// Authorization-code flow with PKCE; the user pastes the redirected URL back in.
    pub async fn authorize_interactive(&self) -> Result<CachedToken, AuthError> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        println!("Open this URL in your browser:\n{}", auth_url);
        print!("Enter the URL you were redirected to: ");
        io::stdout().flush()?;
        let mut input_url = String::new();
        io::stdin().read_line(&mut input_url)?;

        let (code, state) = parse_redirect(&input_url)?;
        verify_state(csrf_token.secret(), state.as_deref())?;

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::TokenRequest(e.to_string()))?;

        Ok(CachedToken::from_response(&token_result, None, now_secs()))
    }
}

#[async_trait]
impl TokenRefresher for SpotifyOAuth {
    async fn refresh(&self, token: &CachedToken) -> Result<CachedToken, AuthError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(AuthError::NoRefreshToken)?;

        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::TokenRequest(e.to_string()))?;

        Ok(CachedToken::from_response(
            &token_result,
            Some(refresh_token),
            now_secs(),
        ))
    }
}

/// Pulls `code` and `state` out of the redirected URL.
pub fn parse_redirect(input: &str) -> Result<(String, Option<String>), AuthError> {
    let url = Url::parse(input.trim()).map_err(|_| AuthError::MissingCode)?;
    let mut code = None;
    let mut state = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(AuthError::Denied(value.into_owned())),
            _ => {}
        }
    }

    code.filter(|c| !c.is_empty())
        .map(|c| (c, state))
        .ok_or(AuthError::MissingCode)
}

/// The redirect must echo back exactly the state we sent.
pub fn verify_state(expected: &str, got: Option<&str>) -> Result<(), AuthError> {
    match got {
        Some(state) if state == expected => Ok(()),
        _ => Err(AuthError::StateMismatch),
    }
}

/// Returns the cached token, refreshing and persisting it only once it has expired.
pub async fn resolve_cached<R>(
    store: &TokenStore,
    cached: CachedToken,
    refresher: &R,
    now: u64,
) -> Result<CachedToken, AuthError>
where
    R: TokenRefresher + Sync,
{
    if !cached.is_expired(now) {
        log::debug!("Using cached Spotify token");
        return Ok(cached);
    }

    log::info!("Token expired, refreshing...");
    let refreshed = refresher.refresh(&cached).await?;
    if let Err(e) = store.save(&refreshed) {
        log::warn!("Refreshed token could not be cached: {}", e);
    }
    Ok(refreshed)
}

fn troubleshooting_tips(redirect_uri: &str) -> String {
    format!(
        "Troubleshooting tips:\n\
         1. Make sure the client_id and client_secret in config.toml are correct\n\
         2. Ensure the redirect URI matches exactly: {}\n\
         3. Check that this URI is registered in your Spotify app settings",
        redirect_uri
    )
}

pub async fn authenticate(config: &SpotifyConfig) -> Result<SpotifyClient, AuthError> {
    let oauth = SpotifyOAuth::new(config)?;
    let store = TokenStore::new(&config.token_cache);

    match store.load() {
        Ok(Some(cached)) => {
            log::info!("Found existing token file");
            match resolve_cached(&store, cached, &oauth, now_secs()).await {
                Ok(token) => {
                    log::info!("Authenticated with saved token");
                    return Ok(SpotifyClient::new(token.access_token));
                }
                Err(e) => {
                    log::warn!("Error with saved token: {}. Starting fresh authentication...", e);
                    store.clear();
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            log::warn!("Unreadable token cache: {}. Starting fresh authentication...", e);
            store.clear();
        }
    }

    let token = match oauth.authorize_interactive().await {
        Ok(token) => token,
        Err(e) => {
            println!("\n{}", troubleshooting_tips(&config.redirect_uri));
            return Err(e);
        }
    };
    store.save(&token)?;

    let client = SpotifyClient::new(token.access_token);
    let user = match client.current_user().await {
        Ok(user) => user,
        Err(e) => {
            println!("\n{}", troubleshooting_tips(&config.redirect_uri));
            return Err(e.into());
        }
    };
    log::info!(
        "Successfully authenticated as: {} ({})",
        user.display_name.as_deref().unwrap_or(&user.id),
        user.email.as_deref().unwrap_or("no email")
    );

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    impl CountingRefresher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, token: &CachedToken) -> Result<CachedToken, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CachedToken {
                access_token: "fresh".to_string(),
                expires_at: token.expires_at + 3600,
                ..token.clone()
            })
        }
    }

    fn token(expires_at: u64) -> CachedToken {
        CachedToken {
            access_token: "stale".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scope: "user-top-read".to_string(),
            expires_at,
            refresh_token: Some("refresh".to_string()),
        }
    }

    fn temp_store(name: &str) -> TokenStore {
        let path = std::env::temp_dir().join(format!(
            "spotify-sheets-export-{}-{}.json",
            name,
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        TokenStore::new(path)
    }

    #[tokio::test]
    async fn test_valid_token_is_not_refreshed() {
        let store = temp_store("valid");
        let refresher = CountingRefresher::new();

        let resolved = resolve_cached(&store, token(1_000), &refresher, 999)
            .await
            .unwrap();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolved.access_token, "stale");
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_saved() {
        let store = temp_store("expired");
        let refresher = CountingRefresher::new();

        let resolved = resolve_cached(&store, token(1_000), &refresher, 1_000)
            .await
            .unwrap();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolved.access_token, "fresh");
        assert_eq!(store.load().unwrap(), Some(resolved));
        store.clear();
    }

    #[tokio::test]
    async fn test_refreshed_token_survives_unwritable_cache() {
        let dir = std::env::temp_dir().join(format!(
            "spotify-sheets-export-missing-dir-{}",
            std::process::id()
        ));
        let store = TokenStore::new(dir.join("nested").join("token.json"));
        let refresher = CountingRefresher::new();

        let resolved = resolve_cached(&store, token(1_000), &refresher, 2_000)
            .await
            .unwrap();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolved.access_token, "fresh");
    }

    #[test]
    fn test_troubleshooting_tips_name_redirect_uri() {
        let tips = troubleshooting_tips("http://localhost:8888/callback");

        assert!(tips.contains("client_id and client_secret"));
        assert!(tips.contains("matches exactly: http://localhost:8888/callback"));
        assert_eq!(tips.lines().count(), 4);
    }

    #[test]
    fn test_verify_state() {
        assert!(verify_state("xyz", Some("xyz")).is_ok());
        assert!(matches!(
            verify_state("xyz", Some("abc")),
            Err(AuthError::StateMismatch)
        ));
        assert!(matches!(verify_state("xyz", None), Err(AuthError::StateMismatch)));
    }

    #[test]
    fn test_redirect_without_state_is_rejected() {
        let (_, state) = parse_redirect("http://localhost:8888/callback?code=abc").unwrap();
        assert!(matches!(
            verify_state("expected", state.as_deref()),
            Err(AuthError::StateMismatch)
        ));
    }

    #[test]
    fn test_store_round_trip_and_clear() {
        let store = temp_store("store");
        store.save(&token(42)).unwrap();
        assert_eq!(store.load().unwrap(), Some(token(42)));

        store.clear();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_cache_without_optional_fields() {
        let parsed: CachedToken =
            serde_json::from_str(r#"{"access_token":"a","expires_at":10}"#).unwrap();
        assert_eq!(parsed.token_type, "Bearer");
        assert_eq!(parsed.refresh_token, None);
        assert!(parsed.is_expired(10));
        assert!(!parsed.is_expired(9));
    }

    #[test]
    fn test_parse_redirect() {
        let (code, state) =
            parse_redirect("http://localhost:8888/callback?code=abc123&state=xyz\n").unwrap();
        assert_eq!(code, "abc123");
        assert_eq!(state.as_deref(), Some("xyz"));

        assert!(matches!(
            parse_redirect("http://localhost:8888/callback?error=access_denied"),
            Err(AuthError::Denied(_))
        ));
        assert!(matches!(
            parse_redirect("http://localhost:8888/callback"),
            Err(AuthError::MissingCode)
        ));
        assert!(matches!(parse_redirect("not a url"), Err(AuthError::MissingCode)));
    }
}
