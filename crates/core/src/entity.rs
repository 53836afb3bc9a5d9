//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Commissions, splits and agent ledgers are entities: two records with the same
/// amounts are still distinct facts if their ids differ.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
