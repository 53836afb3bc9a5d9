//! `estatehub-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, fixed-point money, basis-point rates and the shared error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod rate;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AgentId, CommissionId, CommissionSplitId, PropertyId};
pub use money::Money;
pub use rate::{BASIS_POINTS_SCALE, Rate};
pub use value_object::ValueObject;
