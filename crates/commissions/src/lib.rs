//! Commissions domain module (sale commissions and referral payouts).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. Storage and
//! transaction handling live in `estatehub-infra`.

pub mod agent;
pub mod commission;
pub mod distribution;

pub use agent::AgentLedger;
pub use commission::{Commission, CommissionSplit, CommissionWithSplits};
pub use distribution::{
    DistributionPolicy, MAX_REFERRAL_DEPTH, PlannedSplit, ReferralLevels, plan_distribution,
};
