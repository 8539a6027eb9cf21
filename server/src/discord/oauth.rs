//! Discord OAuth2 login.
//!
//! Plain authorization-code flow against Discord's REST endpoints. The CSRF
//! state lives in Redis under a hashed key and is consumed exactly once.

use fred::prelude::*;
use rand::RngCore;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Config;

/// Scopes requested from Discord.
pub const SCOPES: &str = "identify email";

/// Lifetime of a pending login, in seconds.
pub const FLOW_STATE_TTL_SECS: i64 = 600;

const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";

/// Discord OAuth failures.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Discord request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Invalid authorize URL: {0}")]
    InvalidUrl(String),

    #[error("State store error: {0}")]
    Redis(#[from] fred::error::Error),
}

/// Discord account returned by `/users/@me`.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
}

impl DiscordUser {
    /// Name shown for accounts created from this login.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Value stored for a pending login.
#[derive(Debug, Serialize, Deserialize)]
struct FlowState {
    created_at: i64,
}

/// OAuth2 client settings for Discord.
#[derive(Debug, Clone)]
pub struct DiscordOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    api_base: String,
}

impl DiscordOAuth {
    /// Build from configuration. `None` unless id, secret and redirect URI are all set.
    #[must_use]
    pub fn from_config(config: &Config, http: reqwest::Client) -> Option<Self> {
        Some(Self {
            http,
            client_id: config.discord_client_id.clone()?,
            client_secret: config.discord_client_secret.clone()?,
            redirect_uri: config.discord_redirect_uri.clone()?,
            api_base: config.discord_api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Authorization URL the browser is sent to.
    pub fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let mut url =
            Url::parse(AUTHORIZE_URL).map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    /// Exchange an authorization code for a user access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let resp = self
            .http
            .post(format!("{}/oauth2/token", self.api_base))
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let body: TokenResponse = resp.json().await?;
        body.access_token.ok_or_else(|| {
            OAuthError::Exchange(format!(
                "{} {}",
                body.error.as_deref().unwrap_or("unknown"),
                body.error_description.as_deref().unwrap_or("")
            ))
        })
    }

    /// Fetch the Discord account behind a user access token.
    pub async fn fetch_user(&self, access_token: &str) -> Result<DiscordUser, OAuthError> {
        let user = self
            .http
            .get(format!("{}/users/@me", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<DiscordUser>()
            .await?;
        Ok(user)
    }
}

/// Random CSRF state, hex encoded.
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn state_key(state: &str) -> String {
    format!("discord:oauth:state:{}", hex::encode(Sha256::digest(state.as_bytes())))
}

/// Remember a pending login.
pub async fn store_flow_state(redis: &Client, state: &str) -> Result<(), OAuthError> {
    let value = serde_json::to_string(&FlowState {
        created_at: chrono::Utc::now().timestamp(),
    })
    .map_err(|e| OAuthError::Exchange(e.to_string()))?;

    redis
        .set::<(), _, _>(
            state_key(state),
            value,
            Some(Expiration::EX(FLOW_STATE_TTL_SECS)),
            None,
            false,
        )
        .await?;
    Ok(())
}

/// Consume a pending login. `false` if unknown, expired or already used.
pub async fn consume_flow_state(redis: &Client, state: &str) -> Result<bool, OAuthError> {
    let stored: Option<String> = redis.getdel(state_key(state)).await?;
    Ok(stored.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        let mut config = Config::default_for_test();
        config.discord_client_id = Some("1234".into());
        config.discord_client_secret = Some("shh".into());
        config.discord_redirect_uri = Some("https://lms.example/auth/discord/callback".into());
        config
    }

    #[test]
    fn test_requires_full_configuration() {
        let mut config = configured();
        config.discord_client_secret = None;
        assert!(DiscordOAuth::from_config(&config, reqwest::Client::new()).is_none());
        assert!(DiscordOAuth::from_config(&configured(), reqwest::Client::new()).is_some());
    }

    #[test]
    fn test_authorize_url_carries_scopes_and_state() {
        let oauth = DiscordOAuth::from_config(&configured(), reqwest::Client::new()).unwrap();
        let url = Url::parse(&oauth.authorize_url("abc123").unwrap()).unwrap();

        assert_eq!(url.host_str(), Some("discord.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("scope".into(), "identify email".into())));
        assert!(pairs.contains(&("state".into(), "abc123".into())));
        assert!(pairs.contains(&("client_id".into(), "1234".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "https://lms.example/auth/discord/callback".into()
        )));
    }

    #[test]
    fn test_state_is_random_and_key_is_hashed() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);

        let key = state_key(&a);
        assert!(key.starts_with("discord:oauth:state:"));
        assert!(!key.contains(&a));
    }

    #[test]
    fn test_display_name_prefers_global_name() {
        let user: DiscordUser = serde_json::from_str(
            r#"{"id":"1","username":"kit","global_name":"Kit Walker","email":"kit@example.com"}"#,
        )
        .unwrap();
        assert_eq!(user.display_name(), "Kit Walker");

        let user: DiscordUser = serde_json::from_str(r#"{"id":"1","username":"kit"}"#).unwrap();
        assert_eq!(user.display_name(), "kit");
        assert!(user.email.is_none());
    }
}
