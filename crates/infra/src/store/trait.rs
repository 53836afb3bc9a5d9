use thiserror::Error;

use estatehub_commissions::{AgentLedger, Commission, CommissionSplit};
use estatehub_core::{AgentId, CommissionId, Money};

/// Storage operation error.
///
/// These are **infrastructure errors** (lookups, constraint violations, backend
/// failures) as opposed to domain errors (validation, invariants). The engine
/// surfaces them unchanged as `EngineError::Persistence`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Persistent home of agents' commission balances, commissions and splits.
///
/// Reads that feed reporting go straight to the store; every mutation goes
/// through a [`CommissionTx`] obtained from [`CommissionStore::begin`].
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - keep commissions and splits append-only (no update, no delete)
/// - never let the splits of a commission sum to more than its referral pool
/// - return commissions in creation order and splits ordered by level, then creation
/// - apply balance increments as deltas at the storage layer, never as
///   read-modify-write of a value the caller read earlier
#[async_trait::async_trait]
pub trait CommissionStore: Send + Sync {
    type Tx: CommissionTx;

    /// Open a unit of work. Nothing it writes is visible to others until commit.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn find_agent(&self, agent_id: AgentId) -> Result<Option<AgentLedger>, StoreError>;

    /// All commissions where `agent_id` is the selling agent, oldest first.
    async fn commissions_by_selling_agent(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<Commission>, StoreError>;

    async fn splits_by_commission(
        &self,
        commission_id: CommissionId,
    ) -> Result<Vec<CommissionSplit>, StoreError>;
}

/// A single atomic unit of work against a [`CommissionStore`].
///
/// Either `commit` makes every write visible at once, or none of them happen:
/// `rollback`, or dropping the transaction without committing, discards them.
#[async_trait::async_trait]
pub trait CommissionTx: Send {
    /// Agent as seen by this transaction (including its own increments).
    async fn find_agent(&mut self, agent_id: AgentId) -> Result<Option<AgentLedger>, StoreError>;

    /// Agents whose `referred_by` is `agent_id`, ascending by id.
    async fn list_direct_referrals(
        &mut self,
        agent_id: AgentId,
    ) -> Result<Vec<AgentLedger>, StoreError>;

    /// Commission as seen by this transaction. Holds the commission against
    /// concurrent distribution until the transaction ends.
    async fn find_commission(
        &mut self,
        commission_id: CommissionId,
    ) -> Result<Option<Commission>, StoreError>;

    /// Splits of `commission_id`, including this transaction's own, ordered by
    /// level, then creation.
    async fn splits_by_commission(
        &mut self,
        commission_id: CommissionId,
    ) -> Result<Vec<CommissionSplit>, StoreError>;

    async fn insert_commission(&mut self, commission: &Commission) -> Result<(), StoreError>;

    async fn insert_split(&mut self, split: &CommissionSplit) -> Result<(), StoreError>;

    /// Atomically add `delta` to the agent's sales portfolio.
    async fn increment_sales_portfolio(
        &mut self,
        agent_id: AgentId,
        delta: Money,
    ) -> Result<(), StoreError>;

    /// Atomically add `delta` to the agent's referral earnings.
    async fn increment_referral_earnings(
        &mut self,
        agent_id: AgentId,
        delta: Money,
    ) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
