//! Entitlement resolution logic.
//!
//! Computes which module types a user may view.

use std::collections::BTreeSet;

use uuid::Uuid;

use super::models::{CatalogEntry, Entitlement, Principal, RoleSet};

/// Compute the effective type set for a user.
///
/// Union of the manual grants and every catalog type mapped to any of the
/// user's Discord roles. A type reachable both ways appears once.
pub fn effective_type_ids(
    manual_type_ids: &BTreeSet<Uuid>,
    external_roles: &RoleSet,
    catalog: &[CatalogEntry],
) -> BTreeSet<Uuid> {
    let mut effective = manual_type_ids.clone();

    if external_roles.is_empty() {
        return effective;
    }

    for entry in catalog {
        if entry
            .external_role_ids
            .iter()
            .any(|role_id| external_roles.contains(role_id))
        {
            effective.insert(entry.id);
        }
    }

    effective
}

/// Resolve a principal's entitlement.
///
/// Resolution order:
/// 1. Admin and superadmin roles see everything
/// 2. Build the effective type set
/// 3. Holding any AIO type grants everything
/// 4. Otherwise restricted to the effective set
pub fn resolve(principal: &Principal, catalog: &[CatalogEntry]) -> Entitlement {
    if principal.role.is_entitlement_exempt() {
        return Entitlement::Unrestricted;
    }

    let effective = effective_type_ids(
        &principal.manual_type_ids,
        &principal.external_roles,
        catalog,
    );

    let holds_aio = catalog
        .iter()
        .any(|entry| entry.is_aio && effective.contains(&entry.id));

    if holds_aio {
        Entitlement::Unrestricted
    } else {
        Entitlement::Restricted(effective)
    }
}

#[cfg(test)]
mod tests {
    use lms_common::UserRole;

    use super::*;

    fn entry(id: Uuid, roles: &[&str], is_aio: bool) -> CatalogEntry {
        CatalogEntry {
            id,
            external_role_ids: roles.iter().map(|r| (*r).to_string()).collect(),
            is_aio,
        }
    }

    fn principal(role: UserRole, manual: &[Uuid], roles: &[&str]) -> Principal {
        Principal {
            role,
            manual_type_ids: manual.iter().copied().collect(),
            external_roles: roles.iter().copied().collect(),
        }
    }

    #[test]
    fn test_admin_roles_bypass_everything() {
        let aio = Uuid::new_v4();
        let catalog = [entry(aio, &["role-x"], true)];

        for role in [UserRole::Admin, UserRole::Superadmin] {
            assert_eq!(
                resolve(&principal(role, &[], &[]), &catalog),
                Entitlement::Unrestricted
            );
            assert_eq!(
                resolve(&principal(role, &[Uuid::new_v4()], &["role-x"]), &[]),
                Entitlement::Unrestricted
            );
        }
    }

    #[test]
    fn test_manual_and_role_grants_combine() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let catalog = [entry(a, &[], false), entry(b, &["role-x"], false)];

        let result = resolve(&principal(UserRole::User, &[a], &["role-x"]), &catalog);

        assert_eq!(result, Entitlement::Restricted([a, b].into_iter().collect()));
    }

    #[test]
    fn test_aio_reached_through_discord_role() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let catalog = [entry(a, &[], false), entry(b, &["role-x"], true)];

        let result = resolve(&principal(UserRole::User, &[a], &["role-x"]), &catalog);

        assert_eq!(result, Entitlement::Unrestricted);
    }

    #[test]
    fn test_aio_reached_through_manual_grant() {
        let aio = Uuid::new_v4();
        let catalog = [entry(aio, &[], true)];

        let result = resolve(&principal(UserRole::User, &[aio], &[]), &catalog);

        assert_eq!(result, Entitlement::Unrestricted);
    }

    #[test]
    fn test_aio_type_not_held_does_not_unlock() {
        let a = Uuid::new_v4();
        let aio = Uuid::new_v4();
        let catalog = [entry(a, &["role-a"], false), entry(aio, &["role-aio"], true)];

        let result = resolve(&principal(UserRole::User, &[], &["role-a"]), &catalog);

        assert_eq!(result, Entitlement::Restricted([a].into_iter().collect()));
    }

    #[test]
    fn test_type_granted_both_ways_appears_once() {
        let a = Uuid::new_v4();
        let catalog = [entry(a, &["role-a"], false)];

        let effective = effective_type_ids(
            &[a].into_iter().collect(),
            &["role-a"].into_iter().collect(),
            &catalog,
        );

        assert_eq!(effective.len(), 1);
        assert!(effective.contains(&a));
    }

    #[test]
    fn test_no_grants_is_restricted_to_public() {
        let catalog = [entry(Uuid::new_v4(), &["role-a"], false)];

        let result = resolve(&principal(UserRole::User, &[], &[]), &catalog);

        assert_eq!(result, Entitlement::Restricted(BTreeSet::new()));
    }

    #[test]
    fn test_type_with_several_role_mappings() {
        let a = Uuid::new_v4();
        let catalog = [entry(a, &["role-gold", "role-platinum"], false)];

        let effective = effective_type_ids(
            &BTreeSet::new(),
            &["role-platinum"].into_iter().collect(),
            &catalog,
        );

        assert!(effective.contains(&a));
    }

    #[test]
    fn test_one_role_mapped_by_several_types() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let catalog = [entry(a, &["role-x"], false), entry(b, &["role-x"], false)];

        let effective =
            effective_type_ids(&BTreeSet::new(), &["role-x"].into_iter().collect(), &catalog);

        assert_eq!(effective, [a, b].into_iter().collect());
    }

    #[test]
    fn test_unrelated_roles_grant_nothing() {
        let a = Uuid::new_v4();
        let catalog = [entry(a, &["role-a"], false)];

        let result = resolve(
            &principal(UserRole::User, &[], &["role-b", "role-c"]),
            &catalog,
        );

        assert_eq!(result, Entitlement::Restricted(BTreeSet::new()));
    }
}
