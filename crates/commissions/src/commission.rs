use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use estatehub_core::{
    AgentId, CommissionId, CommissionSplitId, DomainError, DomainResult, Entity, Money,
    PropertyId, Rate,
};

/// A completed sale and the referral pool it generated.
///
/// Created once per sale, never mutated, never deleted (audit trail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub id: CommissionId,
    pub property_id: PropertyId,
    /// The selling agent.
    pub agent_id: AgentId,
    pub transaction_amount: Money,
    /// Rate in force when the sale was recorded.
    pub referral_rate: Rate,
    /// `referral_rate` applied to `transaction_amount`, truncated.
    pub referral_commission: Money,
    pub created_at: DateTime<Utc>,
}

impl Commission {
    /// Build the commission for a sale.
    ///
    /// Fails with `Validation` unless `transaction_amount > 0`.
    pub fn record(
        property_id: PropertyId,
        agent_id: AgentId,
        transaction_amount: Money,
        referral_rate: Rate,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !transaction_amount.is_positive() {
            return Err(DomainError::validation(format!(
                "transaction amount must be positive, got {transaction_amount}"
            )));
        }

        let referral_commission = referral_rate.apply_to(transaction_amount);
        if referral_commission > transaction_amount {
            return Err(DomainError::invariant(
                "referral commission exceeds transaction amount",
            ));
        }

        Ok(Self {
            id: CommissionId::new(),
            property_id,
            agent_id,
            transaction_amount,
            referral_rate,
            referral_commission,
            created_at,
        })
    }
}

impl Entity for Commission {
    type Id = CommissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One referral-network member's share of a commission pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub id: CommissionSplitId,
    pub commission_id: CommissionId,
    pub agent_id: AgentId,
    pub amount: Money,
    /// Referral-tree depth, 1 = direct referral of the seller.
    pub level: u8,
    pub created_at: DateTime<Utc>,
}

impl CommissionSplit {
    pub fn new(
        commission_id: CommissionId,
        agent_id: AgentId,
        amount: Money,
        level: u8,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !amount.is_positive() {
            return Err(DomainError::validation(format!(
                "split amount must be positive, got {amount}"
            )));
        }
        if level == 0 {
            return Err(DomainError::validation("split level starts at 1"));
        }

        Ok(Self {
            id: CommissionSplitId::new(),
            commission_id,
            agent_id,
            amount,
            level,
            created_at,
        })
    }
}

impl Entity for CommissionSplit {
    type Id = CommissionSplitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Reporting projection: a commission with the splits it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionWithSplits {
    pub commission: Commission,
    pub splits: Vec<CommissionSplit>,
}

impl CommissionWithSplits {
    pub fn distributed_total(&self) -> DomainResult<Money> {
        Money::checked_sum(self.splits.iter().map(|s| s.amount))
    }

    /// Part of the referral pool that no split received.
    pub fn undistributed(&self) -> DomainResult<Money> {
        self.commission
            .referral_commission
            .checked_sub(self.distributed_total()?)
    }
}
