//! Infrastructure layer: RBAC persistence and first-start seeding.

pub mod bootstrap;
pub mod store;

pub use bootstrap::{BootstrapReport, bootstrap};
pub use store::{
    InMemoryRbacStore, PermissionStore, PostgresRbacStore, RbacStore, RoleStore, StoreError,
    UserStore,
};
