//! Commission engine (application-level orchestration).
//!
//! Records sales and pays the referral pool out over the seller's referral
//! network. Each public operation is one unit of work against a
//! [`CommissionStore`]:
//!
//! ```text
//! record_sale
//!   ↓
//! 1. begin transaction
//!   ↓
//! 2. create Commission (pool = rate applied to the transaction amount)
//!   ↓
//! 3. increment seller's sales portfolio
//!   ↓
//! 4. walk the referral tree, plan splits, persist them and increment earnings
//!   ↓
//! 5. commit (any failure above rolls everything back)
//! ```
//!
//! The engine holds no in-process counters; balances change only through the
//! store's atomic increments. Nothing is retried here.
//!
//! If the caller abandons an in-flight call the transaction is dropped and
//! rolled back. A call abandoned during `commit` itself has an unknown outcome
//! and must be reconciled by reading the store, not assumed failed.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use estatehub_commissions::{
    AgentLedger, Commission, CommissionSplit, CommissionWithSplits, DistributionPolicy,
    ReferralLevels, plan_distribution,
};
use estatehub_core::{AgentId, CommissionId, DomainError, Money, PropertyId, Rate};

use crate::config::EngineConfig;
use crate::store::{CommissionStore, CommissionTx, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Non-positive sale amount, negative pool, or any other rejected amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("commission not found: {0}")]
    CommissionNotFound(CommissionId),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Ledger invariant failure (e.g. overflow, pool exceeding its commission).
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Storage failure, surfaced unchanged.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::InvalidAmount(msg),
            DomainError::InvariantViolation(msg) => EngineError::Invariant(msg),
            DomainError::InvalidId(msg) => EngineError::InvalidId(msg),
        }
    }
}

/// Records sales and distributes referral commissions.
///
/// Generic over the store so tests run against [`crate::store::InMemoryCommissionStore`]
/// and production against [`crate::store::PostgresCommissionStore`].
#[derive(Debug)]
pub struct CommissionEngine<S> {
    store: S,
    referral_rate: Rate,
    distribution: DistributionPolicy,
}

impl<S> CommissionEngine<S> {
    /// Engine paying the whole pool to direct referrals.
    pub fn new(store: S, referral_rate: Rate) -> Self {
        Self::with_policy(store, referral_rate, DistributionPolicy::direct_only())
    }

    pub fn with_policy(store: S, referral_rate: Rate, distribution: DistributionPolicy) -> Self {
        Self {
            store,
            referral_rate,
            distribution,
        }
    }

    pub fn from_config(store: S, config: &EngineConfig) -> Self {
        Self::with_policy(store, config.referral_rate, config.distribution.clone())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn referral_rate(&self) -> Rate {
        self.referral_rate
    }

    pub fn distribution(&self) -> &DistributionPolicy {
        &self.distribution
    }
}

impl<S> CommissionEngine<S>
where
    S: CommissionStore,
{
    /// Record a completed sale and distribute its referral pool.
    ///
    /// All-or-nothing: the commission, the seller's portfolio increment and
    /// every split with its earnings increment commit together or not at all.
    #[instrument(skip(self), fields(referral_rate = %self.referral_rate), err)]
    pub async fn record_sale(
        &self,
        property_id: PropertyId,
        selling_agent_id: AgentId,
        transaction_amount: Money,
    ) -> Result<CommissionWithSplits, EngineError> {
        if !transaction_amount.is_positive() {
            return Err(EngineError::InvalidAmount(format!(
                "transaction amount must be positive, got {transaction_amount}"
            )));
        }

        let mut tx = self.store.begin().await?;
        let outcome = self
            .record_sale_in(&mut tx, property_id, selling_agent_id, transaction_amount)
            .await;

        let recorded = finish(tx, outcome).await?;
        info!(
            commission_id = %recorded.commission.id,
            referral_commission = %recorded.commission.referral_commission,
            splits = recorded.splits.len(),
            "sale recorded"
        );
        Ok(recorded)
    }

    /// Distribute `total_amount` of an already persisted commission over the
    /// referral network of `referring_agent_id`, in its own transaction.
    ///
    /// `referring_agent_id` must be the commission's selling agent, and the
    /// splits already paid from the commission plus `total_amount` may not
    /// exceed its referral pool. Returns the created splits; empty when the
    /// agent has no referrals.
    #[instrument(skip(self), err)]
    pub async fn distribute_referral_commission(
        &self,
        referring_agent_id: AgentId,
        commission_id: CommissionId,
        total_amount: Money,
    ) -> Result<Vec<CommissionSplit>, EngineError> {
        if total_amount.is_negative() {
            return Err(EngineError::InvalidAmount(format!(
                "referral pool cannot be negative, got {total_amount}"
            )));
        }

        let mut tx = self.store.begin().await?;
        let outcome = self
            .distribute_existing_in(&mut tx, referring_agent_id, commission_id, total_amount)
            .await;

        finish(tx, outcome).await
    }

    /// Every commission where `agent_id` is the seller, oldest first, each with
    /// its splits. Empty for agents without sales, including unknown agents.
    #[instrument(skip(self), err)]
    pub async fn get_agent_commissions(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<CommissionWithSplits>, EngineError> {
        let commissions = self.store.commissions_by_selling_agent(agent_id).await?;

        let mut out = Vec::with_capacity(commissions.len());
        for commission in commissions {
            let splits = self.store.splits_by_commission(commission.id).await?;
            out.push(CommissionWithSplits { commission, splits });
        }
        Ok(out)
    }

    /// Current cumulative balances of an agent.
    pub async fn agent_ledger(&self, agent_id: AgentId) -> Result<AgentLedger, EngineError> {
        self.store
            .find_agent(agent_id)
            .await?
            .ok_or(EngineError::AgentNotFound(agent_id))
    }

    async fn record_sale_in(
        &self,
        tx: &mut S::Tx,
        property_id: PropertyId,
        selling_agent_id: AgentId,
        transaction_amount: Money,
    ) -> Result<CommissionWithSplits, EngineError> {
        tx.find_agent(selling_agent_id)
            .await?
            .ok_or(EngineError::AgentNotFound(selling_agent_id))?;

        let created_at = Utc::now();
        let commission = Commission::record(
            property_id,
            selling_agent_id,
            transaction_amount,
            self.referral_rate,
            created_at,
        )?;

        tx.insert_commission(&commission).await?;
        tx.increment_sales_portfolio(selling_agent_id, transaction_amount)
            .await?;

        let splits = self
            .distribute_in(
                tx,
                selling_agent_id,
                commission.id,
                commission.referral_commission,
                created_at,
            )
            .await?;

        Ok(CommissionWithSplits { commission, splits })
    }

    async fn distribute_existing_in(
        &self,
        tx: &mut S::Tx,
        referring_agent_id: AgentId,
        commission_id: CommissionId,
        total_amount: Money,
    ) -> Result<Vec<CommissionSplit>, EngineError> {
        let commission = tx
            .find_commission(commission_id)
            .await?
            .ok_or(EngineError::CommissionNotFound(commission_id))?;
        tx.find_agent(referring_agent_id)
            .await?
            .ok_or(EngineError::AgentNotFound(referring_agent_id))?;
        if referring_agent_id != commission.agent_id {
            return Err(EngineError::Invariant(format!(
                "commission {commission_id} belongs to agent {}, not {referring_agent_id}",
                commission.agent_id
            )));
        }

        let existing = tx.splits_by_commission(commission_id).await?;
        let already_distributed = Money::checked_sum(existing.iter().map(|s| s.amount))?;
        let requested = already_distributed.checked_add(total_amount)?;
        if requested > commission.referral_commission {
            return Err(EngineError::Invariant(format!(
                "distributing {total_amount} on top of {already_distributed} exceeds referral \
                 commission {} of {commission_id}",
                commission.referral_commission
            )));
        }

        self.distribute_in(tx, referring_agent_id, commission_id, total_amount, Utc::now())
            .await
    }

    async fn distribute_in(
        &self,
        tx: &mut S::Tx,
        referring_agent_id: AgentId,
        commission_id: CommissionId,
        pool: Money,
        created_at: DateTime<Utc>,
    ) -> Result<Vec<CommissionSplit>, EngineError> {
        let levels = self.collect_levels(tx, referring_agent_id).await?;
        if levels.is_empty() {
            debug!(%referring_agent_id, %pool, "no referrals; pool retained");
            return Ok(Vec::new());
        }

        let planned = plan_distribution(pool, &levels, &self.distribution)?;
        let mut splits = Vec::with_capacity(planned.len());
        for p in planned {
            let split =
                CommissionSplit::new(commission_id, p.agent_id, p.amount, p.level, created_at)?;
            tx.insert_split(&split).await?;
            tx.increment_referral_earnings(p.agent_id, p.amount).await?;
            debug!(agent_id = %p.agent_id, amount = %p.amount, level = p.level, "split created");
            splits.push(split);
        }
        Ok(splits)
    }

    /// Breadth-first walk of the referral tree, bounded by the policy depth.
    async fn collect_levels(
        &self,
        tx: &mut S::Tx,
        origin: AgentId,
    ) -> Result<ReferralLevels, EngineError> {
        let mut levels = ReferralLevels::new(origin);
        while levels.depth() < self.distribution.depth() {
            let mut candidates = Vec::new();
            for agent_id in levels.frontier() {
                let referrals = tx.list_direct_referrals(agent_id).await?;
                candidates.extend(referrals.into_iter().map(|r| r.id));
            }
            if levels.push_level(candidates) == 0 {
                break;
            }
        }
        Ok(levels)
    }
}

/// Commit on success, roll back on failure.
async fn finish<T, R>(tx: T, outcome: Result<R, EngineError>) -> Result<R, EngineError>
where
    T: CommissionTx,
{
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed after {err}");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCommissionStore;

    fn rate_bps(bps: u32) -> Rate {
        Rate::from_basis_points(bps).unwrap()
    }

    fn engine_with(agents: &[AgentLedger]) -> CommissionEngine<InMemoryCommissionStore> {
        let store = InMemoryCommissionStore::new();
        for agent in agents {
            store.register_agent(agent.clone()).unwrap();
        }
        CommissionEngine::new(store, rate_bps(500))
    }

    #[test]
    fn domain_errors_map_to_engine_errors() {
        assert!(matches!(
            EngineError::from(DomainError::validation("x")),
            EngineError::InvalidAmount(_)
        ));
        assert!(matches!(
            EngineError::from(DomainError::invariant("x")),
            EngineError::Invariant(_)
        ));
        assert!(matches!(
            EngineError::from(DomainError::invalid_id("x")),
            EngineError::InvalidId(_)
        ));
    }

    #[test]
    fn from_config_uses_configured_policy() {
        let config = EngineConfig {
            referral_rate: rate_bps(300),
            distribution: DistributionPolicy::with_level_weights(vec![6_000, 4_000]).unwrap(),
            database_url: None,
        };
        let engine = CommissionEngine::from_config(InMemoryCommissionStore::new(), &config);
        assert_eq!(engine.referral_rate(), rate_bps(300));
        assert_eq!(engine.distribution().depth(), 2);
    }

    #[tokio::test]
    async fn zero_and_negative_sales_are_rejected_before_touching_the_store() {
        let seller = AgentLedger::new(AgentId::new(), None);
        let engine = engine_with(&[seller.clone()]);

        for amount in [0, -1] {
            let err = engine
                .record_sale(PropertyId::new(), seller.id, Money::from_minor(amount))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidAmount(_)));
        }
        assert_eq!(engine.store().commission_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn remainder_goes_to_lowest_agent_id() {
        let seller = AgentLedger::new(AgentId::new(), None);
        let mut referrals: Vec<AgentLedger> = (0..3)
            .map(|_| AgentLedger::new(AgentId::new(), Some(seller.id)))
            .collect();
        referrals.sort_by_key(|a| a.id);

        let mut agents = vec![seller.clone()];
        agents.extend(referrals.iter().cloned());
        let engine = engine_with(&agents);

        // 5% of 2_000 = 100 → 34 + 33 + 33.
        let recorded = engine
            .record_sale(PropertyId::new(), seller.id, Money::from_minor(2_000))
            .await
            .unwrap();

        let amounts: Vec<(AgentId, i64)> = recorded
            .splits
            .iter()
            .map(|s| (s.agent_id, s.amount.minor()))
            .collect();
        assert_eq!(
            amounts,
            vec![
                (referrals[0].id, 34),
                (referrals[1].id, 33),
                (referrals[2].id, 33)
            ]
        );
        assert_eq!(recorded.undistributed().unwrap(), Money::ZERO);
    }

    #[tokio::test]
    async fn tiny_pools_skip_zero_shares() {
        let seller = AgentLedger::new(AgentId::new(), None);
        let a = AgentLedger::new(AgentId::new(), Some(seller.id));
        let b = AgentLedger::new(AgentId::new(), Some(seller.id));
        let engine = engine_with(&[seller.clone(), a, b]);

        // 5% of 20 = 1: one agent gets it, the other gets no split at all.
        let recorded = engine
            .record_sale(PropertyId::new(), seller.id, Money::from_minor(20))
            .await
            .unwrap();

        assert_eq!(recorded.commission.referral_commission, Money::from_minor(1));
        assert_eq!(recorded.splits.len(), 1);
        assert_eq!(recorded.splits[0].amount, Money::from_minor(1));
    }

    #[tokio::test]
    async fn standalone_distribution_requires_a_persisted_commission() {
        let seller = AgentLedger::new(AgentId::new(), None);
        let engine = engine_with(&[seller.clone()]);
        let missing = CommissionId::new();

        let err = engine
            .distribute_referral_commission(seller.id, missing, Money::from_minor(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CommissionNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn standalone_distribution_cannot_exceed_the_commission_pool() {
        let seller = AgentLedger::new(AgentId::new(), None);
        let referral = AgentLedger::new(AgentId::new(), Some(seller.id));
        let engine = engine_with(&[seller.clone(), referral.clone()]);

        let recorded = engine
            .record_sale(PropertyId::new(), seller.id, Money::from_minor(1_000))
            .await
            .unwrap();

        let err = engine
            .distribute_referral_commission(
                seller.id,
                recorded.commission.id,
                Money::from_minor(51),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));

        let err = engine
            .distribute_referral_commission(
                seller.id,
                recorded.commission.id,
                Money::from_minor(-5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));

        // Only the sale's own split reached the referral.
        let ledger = engine.agent_ledger(referral.id).await.unwrap();
        assert_eq!(ledger.referral_earnings, Money::from_minor(50));
    }

    #[tokio::test]
    async fn redistributing_a_fully_paid_pool_is_rejected() {
        let seller = AgentLedger::new(AgentId::new(), None);
        let referral = AgentLedger::new(AgentId::new(), Some(seller.id));
        let engine = engine_with(&[seller.clone(), referral.clone()]);

        let recorded = engine
            .record_sale(PropertyId::new(), seller.id, Money::from_minor(10_000_000))
            .await
            .unwrap();
        assert_eq!(recorded.undistributed().unwrap(), Money::ZERO);

        let err = engine
            .distribute_referral_commission(
                seller.id,
                recorded.commission.id,
                recorded.commission.referral_commission,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));

        let report = engine.get_agent_commissions(seller.id).await.unwrap();
        assert_eq!(report[0].undistributed().unwrap(), Money::ZERO);
        let ledger = engine.agent_ledger(referral.id).await.unwrap();
        assert_eq!(ledger.referral_earnings, Money::from_minor(500_000));
    }

    #[tokio::test]
    async fn partial_distributions_may_not_add_up_past_the_pool() {
        let seller = AgentLedger::new(AgentId::new(), None);
        let engine = engine_with(&[seller.clone()]);
        // No referrals yet: the whole 50_000 pool stays undistributed.
        let recorded = engine
            .record_sale(PropertyId::new(), seller.id, Money::from_minor(1_000_000))
            .await
            .unwrap();
        let referral = AgentLedger::new(AgentId::new(), Some(seller.id));
        engine.store().register_agent(referral.clone()).unwrap();

        let first = engine
            .distribute_referral_commission(
                seller.id,
                recorded.commission.id,
                Money::from_minor(30_000),
            )
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let err = engine
            .distribute_referral_commission(
                seller.id,
                recorded.commission.id,
                Money::from_minor(30_000),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));

        // The exact remainder is still payable.
        engine
            .distribute_referral_commission(
                seller.id,
                recorded.commission.id,
                Money::from_minor(20_000),
            )
            .await
            .unwrap();

        let report = engine.get_agent_commissions(seller.id).await.unwrap();
        assert_eq!(report[0].distributed_total().unwrap(), Money::from_minor(50_000));
        assert_eq!(report[0].undistributed().unwrap(), Money::ZERO);
        let ledger = engine.agent_ledger(referral.id).await.unwrap();
        assert_eq!(ledger.referral_earnings, Money::from_minor(50_000));
    }

    #[tokio::test]
    async fn standalone_distribution_must_come_from_the_selling_agent() {
        let seller = AgentLedger::new(AgentId::new(), None);
        let other = AgentLedger::new(AgentId::new(), None);
        let others_referral = AgentLedger::new(AgentId::new(), Some(other.id));
        let engine = engine_with(&[seller.clone(), other.clone(), others_referral.clone()]);
        let recorded = engine
            .record_sale(PropertyId::new(), seller.id, Money::from_minor(1_000_000))
            .await
            .unwrap();

        let err = engine
            .distribute_referral_commission(
                other.id,
                recorded.commission.id,
                Money::from_minor(10_000),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));
        let ledger = engine.agent_ledger(others_referral.id).await.unwrap();
        assert_eq!(ledger.referral_earnings, Money::ZERO);
    }

    #[tokio::test]
    async fn standalone_distribution_for_unknown_agent_fails() {
        let seller = AgentLedger::new(AgentId::new(), None);
        let engine = engine_with(&[seller.clone()]);
        let recorded = engine
            .record_sale(PropertyId::new(), seller.id, Money::from_minor(1_000))
            .await
            .unwrap();

        let stranger = AgentId::new();
        let err = engine
            .distribute_referral_commission(stranger, recorded.commission.id, Money::from_minor(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AgentNotFound(id) if id == stranger));
    }

    #[tokio::test]
    async fn agent_ledger_of_unknown_agent_is_not_found() {
        let engine = engine_with(&[]);
        let id = AgentId::new();
        let err = engine.agent_ledger(id).await.unwrap_err();
        assert!(matches!(err, EngineError::AgentNotFound(found) if found == id));
    }
}
