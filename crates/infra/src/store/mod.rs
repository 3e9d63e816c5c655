//! Persistence boundary for permissions, roles and users.
//!
//! Callers depend on the traits; `InMemoryRbacStore` serves tests/dev and
//! `PostgresRbacStore` serves production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryRbacStore;
pub use postgres::PostgresRbacStore;
pub use r#trait::{PermissionStore, RbacStore, RoleStore, StoreError, UserStore};
