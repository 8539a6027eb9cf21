//! User Types

use serde::{Deserialize, Serialize};

/// Internal account role.
///
/// Entitlement exemption is decided by [`UserRole::is_entitlement_exempt`]
/// and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "user_role", rename_all = "UPPERCASE"))]
pub enum UserRole {
    /// Regular learner.
    #[default]
    User,
    /// Content and user administrator.
    Admin,
    /// Administrator with access to reports.
    Superadmin,
}

impl UserRole {
    /// Whether this role sees every module regardless of module type grants.
    #[must_use]
    pub const fn is_entitlement_exempt(self) -> bool {
        matches!(self, Self::Admin | Self::Superadmin)
    }

    /// Whether this role may call administrative endpoints.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        self.is_entitlement_exempt()
    }

    /// Whether this role may read platform reports.
    #[must_use]
    pub const fn is_superadmin(self) -> bool {
        matches!(self, Self::Superadmin)
    }

    /// Role name as stored and serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
            Self::Superadmin => "SUPERADMIN",
        }
    }
}

/// Account status. Inactive accounts cannot authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "account_status", rename_all = "UPPERCASE"))]
pub enum AccountStatus {
    #[default]
    Active,
    Inactive,
}
