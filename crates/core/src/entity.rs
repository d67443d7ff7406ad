//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;

    /// Whether the entity carries a deletion marker.
    ///
    /// Tombstoned entities stay readable for joins but are hidden from default
    /// listings and from point operations.
    fn is_tombstoned(&self) -> bool;

    /// Returns `Some(self)` only for live entities.
    fn live(self) -> Option<Self>
    where
        Self: Sized,
    {
        if self.is_tombstoned() { None } else { Some(self) }
    }
}
