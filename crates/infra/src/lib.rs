//! Infrastructure layer: commission storage, the commission engine, config.

pub mod commission_engine;
pub mod config;
pub mod store;


pub use commission_engine::{CommissionEngine, EngineError};
pub use config::{ConfigError, EngineConfig};
pub use store::{
    CommissionStore, CommissionTx, InMemoryCommissionStore, PostgresCommissionStore, StoreError,
};
