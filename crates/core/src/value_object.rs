//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; they are defined entirely by their attribute
//! values. `Money` and `Rate` are the value objects of the commission domain.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one (`Money::checked_add` returns a fresh value, it never mutates).
///
/// ```ignore
/// let a = Money::from_minor(250_000);
/// let b = Money::from_minor(250_000);
/// assert_eq!(a, b); // equal by value
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
