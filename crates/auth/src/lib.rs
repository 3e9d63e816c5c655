//! `gatehouse-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod token;
pub mod user;
pub mod verification;

pub use authorize::{AuthzError, authorize};
pub use claims::{SessionClaims, TokenValidationError, validate_claims};
pub use password::{PasswordError, PasswordHasher};
pub use permissions::{DELIMITER, Permission, StoredPermission, builtin, filter_by_group};
pub use principal::Principal;
pub use roles::{NewRole, Role, RolePatch, RoleUpdate, SUPERADMIN_ROLE};
pub use token::{Hs256Tokens, JwtValidator, TokenError, TokenIssuer, issue_token};
pub use user::{NewUser, User, UserPatch, UserUpdate};
pub use verification::{VERIFICATION_TTL_HOURS, VerificationClaims, VerificationTokens};
