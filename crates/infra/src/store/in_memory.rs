use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use estatehub_commissions::{AgentLedger, Commission, CommissionSplit};
use estatehub_core::{AgentId, CommissionId, Entity, Money};

use super::r#trait::{CommissionStore, CommissionTx, StoreError};

#[derive(Debug, Default)]
struct State {
    agents: BTreeMap<AgentId, AgentLedger>,
    // Vecs keep insertion (= creation) order.
    commissions: Vec<Commission>,
    splits: Vec<CommissionSplit>,
}

/// In-memory commission store.
///
/// Intended for tests/dev. Not optimized for performance.
///
/// Transactions stage their writes and apply them under a single write lock at
/// commit, so balance increments from concurrent transactions never overwrite
/// each other.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommissionStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryCommissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the agent directory. Replaces any agent with the same id.
    pub fn register_agent(&self, agent: AgentLedger) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.agents.insert(agent.id, agent);
        Ok(())
    }

    /// Number of persisted commissions (all agents).
    pub fn commission_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.commissions.len())
    }

    /// Number of persisted splits (all commissions).
    pub fn split_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.splits.len())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl CommissionStore for InMemoryCommissionStore {
    type Tx = InMemoryCommissionTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(InMemoryCommissionTx {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        })
    }

    async fn find_agent(&self, agent_id: AgentId) -> Result<Option<AgentLedger>, StoreError> {
        Ok(self.read()?.agents.get(&agent_id).cloned())
    }

    async fn commissions_by_selling_agent(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<Commission>, StoreError> {
        Ok(self
            .read()?
            .commissions
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn splits_by_commission(
        &self,
        commission_id: CommissionId,
    ) -> Result<Vec<CommissionSplit>, StoreError> {
        let mut splits: Vec<CommissionSplit> = self
            .read()?
            .splits
            .iter()
            .filter(|s| s.commission_id == commission_id)
            .cloned()
            .collect();
        // Stable sort keeps creation order within a level.
        splits.sort_by_key(|s| s.level);
        Ok(splits)
    }
}

#[derive(Debug, Clone)]
enum StagedWrite {
    Commission(Commission),
    Split(CommissionSplit),
    SalesPortfolio(AgentId, Money),
    ReferralEarnings(AgentId, Money),
}

/// Unit of work over an [`InMemoryCommissionStore`].
///
/// Dropping it without `commit` discards the staged writes.
#[derive(Debug)]
pub struct InMemoryCommissionTx {
    state: Arc<RwLock<State>>,
    staged: Vec<StagedWrite>,
}

impl InMemoryCommissionTx {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn agent_exists(&self, agent_id: AgentId) -> Result<bool, StoreError> {
        Ok(self.read()?.agents.contains_key(&agent_id))
    }

    fn staged_commission(&self, commission_id: CommissionId) -> Option<&Commission> {
        self.staged.iter().find_map(|w| match w {
            StagedWrite::Commission(c) if c.id == commission_id => Some(c),
            _ => None,
        })
    }

    /// Committed agent with this transaction's increments applied.
    fn agent_view(&self, agent_id: AgentId) -> Result<Option<AgentLedger>, StoreError> {
        let Some(mut agent) = self.read()?.agents.get(&agent_id).cloned() else {
            return Ok(None);
        };
        for write in &self.staged {
            match write {
                StagedWrite::SalesPortfolio(id, delta) if *id == agent_id => {
                    agent.credit_sale(*delta).map_err(invalid_record)?;
                }
                StagedWrite::ReferralEarnings(id, delta) if *id == agent_id => {
                    agent.credit_referral(*delta).map_err(invalid_record)?;
                }
                _ => {}
            }
        }
        Ok(Some(agent))
    }
}

fn find_by_id<'a, E: Entity>(records: &'a [E], id: &E::Id) -> Option<&'a E> {
    records.iter().find(|r| r.id() == id)
}

fn invalid_record(err: estatehub_core::DomainError) -> StoreError {
    StoreError::InvalidRecord(err.to_string())
}

#[async_trait::async_trait]
impl CommissionTx for InMemoryCommissionTx {
    async fn find_agent(&mut self, agent_id: AgentId) -> Result<Option<AgentLedger>, StoreError> {
        self.agent_view(agent_id)
    }

    async fn list_direct_referrals(
        &mut self,
        agent_id: AgentId,
    ) -> Result<Vec<AgentLedger>, StoreError> {
        let ids: Vec<AgentId> = self
            .read()?
            .agents
            .values()
            .filter(|a| a.referred_by == Some(agent_id))
            .map(|a| a.id)
            .collect();

        // BTreeMap iteration is already ascending by id.
        let mut referrals = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(agent) = self.agent_view(id)? {
                referrals.push(agent);
            }
        }
        Ok(referrals)
    }

    async fn find_commission(
        &mut self,
        commission_id: CommissionId,
    ) -> Result<Option<Commission>, StoreError> {
        if let Some(c) = self.staged_commission(commission_id) {
            return Ok(Some(c.clone()));
        }
        Ok(find_by_id(&self.read()?.commissions, &commission_id).cloned())
    }

    async fn splits_by_commission(
        &mut self,
        commission_id: CommissionId,
    ) -> Result<Vec<CommissionSplit>, StoreError> {
        let mut splits: Vec<CommissionSplit> = self
            .read()?
            .splits
            .iter()
            .filter(|s| s.commission_id == commission_id)
            .cloned()
            .collect();
        splits.extend(self.staged.iter().filter_map(|w| match w {
            StagedWrite::Split(s) if s.commission_id == commission_id => Some(s.clone()),
            _ => None,
        }));
        splits.sort_by_key(|s| s.level);
        Ok(splits)
    }

    async fn insert_commission(&mut self, commission: &Commission) -> Result<(), StoreError> {
        let duplicate = self.staged_commission(commission.id).is_some()
            || find_by_id(&self.read()?.commissions, &commission.id).is_some();
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "commission {} already exists",
                commission.id
            )));
        }
        if !self.agent_exists(commission.agent_id)? {
            return Err(StoreError::NotFound(format!("agent {}", commission.agent_id)));
        }
        self.staged.push(StagedWrite::Commission(commission.clone()));
        Ok(())
    }

    async fn insert_split(&mut self, split: &CommissionSplit) -> Result<(), StoreError> {
        let commission_known = self.staged_commission(split.commission_id).is_some()
            || find_by_id(&self.read()?.commissions, &split.commission_id).is_some();
        if !commission_known {
            return Err(StoreError::NotFound(format!(
                "commission {}",
                split.commission_id
            )));
        }
        if !self.agent_exists(split.agent_id)? {
            return Err(StoreError::NotFound(format!("agent {}", split.agent_id)));
        }
        self.staged.push(StagedWrite::Split(split.clone()));
        Ok(())
    }

    async fn increment_sales_portfolio(
        &mut self,
        agent_id: AgentId,
        delta: Money,
    ) -> Result<(), StoreError> {
        if !self.agent_exists(agent_id)? {
            return Err(StoreError::NotFound(format!("agent {agent_id}")));
        }
        self.staged.push(StagedWrite::SalesPortfolio(agent_id, delta));
        Ok(())
    }

    async fn increment_referral_earnings(
        &mut self,
        agent_id: AgentId,
        delta: Money,
    ) -> Result<(), StoreError> {
        if !self.agent_exists(agent_id)? {
            return Err(StoreError::NotFound(format!("agent {agent_id}")));
        }
        self.staged.push(StagedWrite::ReferralEarnings(agent_id, delta));
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        // Phase 1: compute every touched balance; any failure leaves state untouched.
        let mut touched: BTreeMap<AgentId, AgentLedger> = BTreeMap::new();
        for write in &self.staged {
            let (agent_id, delta, is_sale) = match write {
                StagedWrite::SalesPortfolio(id, delta) => (*id, *delta, true),
                StagedWrite::ReferralEarnings(id, delta) => (*id, *delta, false),
                _ => continue,
            };
            if !touched.contains_key(&agent_id) {
                let current = state
                    .agents
                    .get(&agent_id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("agent {agent_id}")))?;
                touched.insert(agent_id, current);
            }
            if let Some(agent) = touched.get_mut(&agent_id) {
                let credited = if is_sale {
                    agent.credit_sale(delta)
                } else {
                    agent.credit_referral(delta)
                };
                credited.map_err(invalid_record)?;
            }
        }

        // Splits committed by a concurrent transaction count against the pool too.
        let mut pools: BTreeMap<CommissionId, Money> = BTreeMap::new();
        for write in &self.staged {
            let StagedWrite::Split(split) = write else {
                continue;
            };
            if !pools.contains_key(&split.commission_id) {
                let pool = self
                    .staged_commission(split.commission_id)
                    .or_else(|| find_by_id(&state.commissions, &split.commission_id))
                    .map(|c| c.referral_commission)
                    .ok_or_else(|| {
                        StoreError::NotFound(format!("commission {}", split.commission_id))
                    })?;
                let committed = Money::checked_sum(
                    state
                        .splits
                        .iter()
                        .filter(|s| s.commission_id == split.commission_id)
                        .map(|s| s.amount),
                )
                .map_err(invalid_record)?;
                let remaining = pool.checked_sub(committed).map_err(invalid_record)?;
                pools.insert(split.commission_id, remaining);
            }
            if let Some(remaining) = pools.get_mut(&split.commission_id) {
                *remaining = remaining.checked_sub(split.amount).map_err(invalid_record)?;
                if remaining.is_negative() {
                    return Err(StoreError::Conflict(format!(
                        "splits of commission {} exceed its referral pool",
                        split.commission_id
                    )));
                }
            }
        }

        // Phase 2: infallible apply.
        for write in self.staged {
            match write {
                StagedWrite::Commission(c) => state.commissions.push(c),
                StagedWrite::Split(s) => state.splits.push(s),
                StagedWrite::SalesPortfolio(..) | StagedWrite::ReferralEarnings(..) => {}
            }
        }
        state.agents.extend(touched);

        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        // Staged writes are dropped with `self`.
        Ok(())
    }
}
