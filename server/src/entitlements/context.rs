//! Per-request entitlement loading.

use std::collections::BTreeSet;

use uuid::Uuid;

use super::models::{Entitlement, Principal};
use super::{resolver, store};
use crate::api::AppState;
use crate::auth::AuthUser;
use crate::tenant::TenantContext;

/// Resolve what the current user may see within the tenant.
///
/// Exempt roles return before any catalog query.
#[tracing::instrument(skip(state, user), fields(user_id = %user.id, tenant = %tenant))]
pub async fn load_entitlement(
    state: &AppState,
    tenant: &TenantContext,
    user: &AuthUser,
) -> sqlx::Result<Entitlement> {
    if user.role.is_entitlement_exempt() {
        return Ok(Entitlement::Unrestricted);
    }

    let catalog = store::list_module_type_catalog(&state.db, tenant).await?;
    let principal = Principal {
        role: user.role,
        manual_type_ids: store::get_user_manual_grants(&state.db, tenant, user.id).await?,
        external_roles: user.external_roles.clone(),
    };

    let entitlement = resolver::resolve(&principal, &catalog);
    tracing::debug!(unrestricted = entitlement.is_unrestricted(), "Entitlement resolved");
    Ok(entitlement)
}

/// Type ids the user holds, for the profile view.
///
/// The literal union of manual and role grants. Admin and AIO holders see
/// exactly what they hold here, even though they are unrestricted.
pub async fn effective_types_for_display(
    state: &AppState,
    tenant: &TenantContext,
    user: &AuthUser,
) -> sqlx::Result<BTreeSet<Uuid>> {
    let catalog = store::list_module_type_catalog(&state.db, tenant).await?;
    let manual = store::get_user_manual_grants(&state.db, tenant, user.id).await?;

    Ok(resolver::effective_type_ids(
        &manual,
        &user.external_roles,
        &catalog,
    ))
}
