//! Entity trait: identity + continuity across state changes.

use chrono::{DateTime, Utc};

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Soft-delete marker; `None` while the row is live.
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    /// Live rows are visible to normal reads.
    fn is_live(&self) -> bool {
        self.deleted_at().is_none()
    }
}
