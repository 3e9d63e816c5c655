use thiserror::Error;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal against a required permission.
///
/// - No IO
/// - No panics
/// - Exact membership in the principal's permission snapshot
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.has_permission(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use gatehouse_core::{RoleId, UserId};
    use proptest::prelude::*;

    fn principal(permissions: Vec<Permission>) -> Principal {
        Principal::new(UserId::new(1), RoleId::new(1), permissions)
    }

    #[test]
    fn snapshot_membership_decides() {
        let p = principal(vec![builtin::ROLES_LIST]);

        assert_eq!(authorize(&p, &builtin::ROLES_LIST), Ok(()));
        assert_eq!(
            authorize(&p, &builtin::ROLES_CREATE),
            Err(AuthzError::Forbidden("roles:create".to_string()))
        );
    }

    #[test]
    fn empty_snapshot_grants_nothing() {
        let p = principal(vec![]);
        for required in builtin::universe() {
            assert!(authorize(&p, &required).is_err());
        }
    }

    #[test]
    fn there_is_no_wildcard() {
        let p = principal(vec![Permission::new("*")]);
        assert!(authorize(&p, &builtin::USERS_DELETE).is_err());
    }

    proptest! {
        #[test]
        fn authorized_iff_member(mask in proptest::collection::vec(any::<bool>(), 12), pick in 0usize..12) {
            let universe = builtin::universe();
            let granted: Vec<Permission> = universe
                .iter()
                .zip(&mask)
                .filter(|(_, keep)| **keep)
                .map(|(p, _)| p.clone())
                .collect();
            let required = &universe[pick];

            prop_assert_eq!(authorize(&principal(granted), required).is_ok(), mask[pick]);
        }
    }
}
