//! Discord integration: OAuth2 login and guild role lookups.

pub mod gateway;
pub mod oauth;

pub use gateway::{roles_or_empty, DiscordGateway, GatewayError, RoleGateway};
pub use oauth::{DiscordOAuth, DiscordUser, OAuthError};
