//! Content visibility filtering.
//!
//! Turns an [`Entitlement`] plus an optional requested type into a predicate
//! over a module's `type_id`, usable both in memory and as SQL.

use std::collections::BTreeSet;

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::models::Entitlement;

/// Predicate selecting which modules a listing may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityFilter {
    /// No restriction.
    All,
    /// Only modules of exactly this type.
    OnlyType(Uuid),
    /// Untyped modules, plus modules of these types.
    PublicOr(BTreeSet<Uuid>),
    /// Matches no module. A denied type filter yields an empty page, not an error.
    Nothing,
}

/// Build the filter for a listing request.
pub fn visibility_filter(
    entitlement: &Entitlement,
    requested_type_id: Option<Uuid>,
) -> VisibilityFilter {
    match (entitlement, requested_type_id) {
        (Entitlement::Unrestricted, Some(type_id)) => VisibilityFilter::OnlyType(type_id),
        (Entitlement::Unrestricted, None) => VisibilityFilter::All,
        (Entitlement::Restricted(allowed), Some(type_id)) => {
            if allowed.contains(&type_id) {
                VisibilityFilter::OnlyType(type_id)
            } else {
                VisibilityFilter::Nothing
            }
        }
        (Entitlement::Restricted(allowed), None) => VisibilityFilter::PublicOr(allowed.clone()),
    }
}

impl VisibilityFilter {
    /// Whether a module with this `type_id` passes the filter.
    #[must_use]
    pub fn matches(&self, type_id: Option<Uuid>) -> bool {
        match self {
            Self::All => true,
            Self::OnlyType(wanted) => type_id == Some(*wanted),
            Self::PublicOr(allowed) => type_id.is_none_or(|id| allowed.contains(&id)),
            Self::Nothing => false,
        }
    }

    /// Append the predicate as a parenthesized SQL boolean expression on `column`.
    ///
    /// `column` must be a trusted identifier, never user input.
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>, column: &str) {
        match self {
            Self::All => {
                builder.push("TRUE");
            }
            Self::OnlyType(type_id) => {
                builder.push("(").push(column).push(" = ");
                builder.push_bind(*type_id).push(")");
            }
            Self::PublicOr(allowed) if allowed.is_empty() => {
                builder.push("(").push(column).push(" IS NULL)");
            }
            Self::PublicOr(allowed) => {
                let ids: Vec<Uuid> = allowed.iter().copied().collect();
                builder
                    .push("(")
                    .push(column)
                    .push(" IS NULL OR ")
                    .push(column)
                    .push(" = ANY(");
                builder.push_bind(ids).push("))");
            }
            Self::Nothing => {
                builder.push("FALSE");
            }
        }
    }
}
