//! Entitlement data types.

use std::collections::{BTreeSet, HashSet};

use lms_common::UserRole;
use serde::Serialize;
use uuid::Uuid;

/// Discord role identifiers held by a member of the configured guild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(HashSet<String>);

impl RoleSet {
    /// The set used whenever roles are unknown.
    #[must_use]
    pub fn empty() -> Self {
        Self(HashSet::new())
    }

    #[must_use]
    pub fn contains(&self, role_id: &str) -> bool {
        self.0.contains(role_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Sorted copy, for stable token claims.
    #[must_use]
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut roles: Vec<_> = self.0.iter().cloned().collect();
        roles.sort();
        roles
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A module type as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: Uuid,
    /// Discord roles that grant this type. Usually zero or one.
    pub external_role_ids: Vec<String>,
    /// Holding this type grants every module.
    pub is_aio: bool,
}

/// Snapshot of everything the resolver needs about a user.
#[derive(Debug, Clone)]
pub struct Principal {
    pub role: UserRole,
    pub manual_type_ids: BTreeSet<Uuid>,
    pub external_roles: RoleSet,
}

/// Which modules a principal may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entitlement {
    /// Every module, whatever its type.
    Unrestricted,
    /// Untyped modules plus modules of these types.
    Restricted(BTreeSet<Uuid>),
}

impl Entitlement {
    #[must_use]
    pub const fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }
}
