//! Guild role lookups.
//!
//! Every failure collapses into an empty role set at [`roles_or_empty`]: a
//! user whose roles cannot be read only loses role-derived access.

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::entitlements::RoleSet;

/// Role lookup failures. Never returned to clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Discord request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Discord returned status {0}")]
    Status(StatusCode),

    #[error("User is not a member of the guild")]
    NotMember,
}

/// Source of a user's external role set.
pub trait RoleGateway: Send + Sync {
    /// Fetch the roles a guild member currently holds.
    fn fetch_roles<'a>(&'a self, member_id: &'a str)
        -> BoxFuture<'a, Result<RoleSet, GatewayError>>;
}

#[derive(Debug, Deserialize)]
struct GuildMember {
    #[serde(default)]
    roles: Vec<String>,
}

/// Discord REST implementation, authenticated as a bot.
#[derive(Debug, Clone)]
pub struct DiscordGateway {
    http: reqwest::Client,
    api_base: String,
    guild_id: String,
    bot_token: String,
}

impl DiscordGateway {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        guild_id: impl Into<String>,
        bot_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            guild_id: guild_id.into(),
            bot_token: bot_token.into(),
        }
    }

    /// Build from configuration. `None` when the bot token or guild is missing.
    #[must_use]
    pub fn from_config(config: &Config, http: reqwest::Client) -> Option<Self> {
        let bot_token = config.discord_bot_token.as_ref()?;
        let guild_id = config.discord_guild_id.as_ref()?;
        Some(Self::new(
            http,
            config.discord_api_base.trim_end_matches('/'),
            guild_id,
            bot_token,
        ))
    }

    fn member_url(&self, member_id: &str) -> String {
        format!(
            "{}/guilds/{}/members/{member_id}",
            self.api_base, self.guild_id
        )
    }
}

impl RoleGateway for DiscordGateway {
    fn fetch_roles<'a>(
        &'a self,
        member_id: &'a str,
    ) -> BoxFuture<'a, Result<RoleSet, GatewayError>> {
        Box::pin(async move {
            let resp = self
                .http
                .get(self.member_url(member_id))
                .header("Authorization", format!("Bot {}", self.bot_token))
                .send()
                .await?;

            match resp.status() {
                StatusCode::NOT_FOUND => return Err(GatewayError::NotMember),
                status if !status.is_success() => return Err(GatewayError::Status(status)),
                _ => {}
            }

            let member: GuildMember = resp.json().await?;
            Ok(member.roles.into_iter().collect())
        })
    }
}

/// Current roles of `member_id`, or the empty set when they cannot be read.
///
/// No retries. A missing gateway or member id also yields the empty set.
pub async fn roles_or_empty(gateway: Option<&dyn RoleGateway>, member_id: Option<&str>) -> RoleSet {
    let (Some(gateway), Some(member_id)) = (gateway, member_id) else {
        return RoleSet::empty();
    };

    match gateway.fetch_roles(member_id).await {
        Ok(roles) => {
            tracing::debug!(member_id = %member_id, count = roles.len(), "Fetched guild roles");
            roles
        }
        Err(e) => {
            warn!(member_id = %member_id, error = %e, "Guild role lookup failed, using no roles");
            RoleSet::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FixedRoles(Vec<&'static str>);

    impl RoleGateway for FixedRoles {
        fn fetch_roles<'a>(
            &'a self,
            _member_id: &'a str,
        ) -> BoxFuture<'a, Result<RoleSet, GatewayError>> {
            Box::pin(async move { Ok(self.0.iter().copied().collect()) })
        }
    }

    struct Failing {
        calls: AtomicUsize,
    }

    impl RoleGateway for Failing {
        fn fetch_roles<'a>(
            &'a self,
            _member_id: &'a str,
        ) -> BoxFuture<'a, Result<RoleSet, GatewayError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(GatewayError::Status(StatusCode::BAD_GATEWAY)) })
        }
    }

    #[tokio::test]
    async fn test_roles_pass_through() {
        let gateway = FixedRoles(vec!["111", "222"]);
        let roles = roles_or_empty(Some(&gateway), Some("42")).await;
        assert!(roles.contains("111"));
        assert!(roles.contains("222"));
        assert_eq!(roles.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_becomes_empty_without_retry() {
        let gateway = Failing {
            calls: AtomicUsize::new(0),
        };
        let roles = roles_or_empty(Some(&gateway), Some("42")).await;
        assert!(roles.is_empty());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_member_id_skips_lookup() {
        let gateway = Failing {
            calls: AtomicUsize::new(0),
        };
        let roles = roles_or_empty(Some(&gateway), None).await;
        assert!(roles.is_empty());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_is_empty() {
        assert!(roles_or_empty(None, Some("42")).await.is_empty());
    }

    #[test]
    fn test_from_config_requires_bot_and_guild() {
        let mut config = Config::default_for_test();
        assert!(DiscordGateway::from_config(&config, reqwest::Client::new()).is_none());

        config.discord_bot_token = Some("bot-token".into());
        config.discord_guild_id = Some("9001".into());
        config.discord_api_base = "https://discord.example/api/".into();
        let gateway = DiscordGateway::from_config(&config, reqwest::Client::new()).unwrap();

        assert_eq!(
            gateway.member_url("42"),
            "https://discord.example/api/guilds/9001/members/42"
        );
    }

    #[test]
    fn test_member_payload_roles() {
        let member: GuildMember =
            serde_json::from_str(r#"{"user":{"id":"42"},"roles":["1","2"],"nick":null}"#).unwrap();
        assert_eq!(member.roles, vec!["1", "2"]);

        let bare: GuildMember = serde_json::from_str(r#"{"user":{"id":"42"}}"#).unwrap();
        assert!(bare.roles.is_empty());
    }
}
