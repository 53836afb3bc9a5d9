//! Commission storage boundary.
//!
//! Agents' cumulative balances, commissions and their splits live behind
//! [`CommissionStore`]; every mutation goes through one [`CommissionTx`].

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryCommissionStore, InMemoryCommissionTx};
pub use postgres::{PostgresCommissionStore, PostgresCommissionTx};
pub use r#trait::{CommissionStore, CommissionTx, StoreError};
