use serde::{Deserialize, Serialize};

use estatehub_core::{AgentId, DomainResult, Entity, Money};

/// The slice of an agent record this domain owns: referral edge + cumulative earnings.
///
/// Agents are created and retired elsewhere; commissions only ever add to the
/// two balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLedger {
    pub id: AgentId,
    /// The agent who referred this one, if any.
    pub referred_by: Option<AgentId>,
    /// Cumulative value of sales credited to this agent.
    pub sales_portfolio: Money,
    /// Cumulative referral payouts credited to this agent.
    pub referral_earnings: Money,
}

impl AgentLedger {
    /// A fresh agent with zero balances.
    pub fn new(id: AgentId, referred_by: Option<AgentId>) -> Self {
        Self {
            id,
            referred_by,
            sales_portfolio: Money::ZERO,
            referral_earnings: Money::ZERO,
        }
    }

    pub fn credit_sale(&mut self, amount: Money) -> DomainResult<()> {
        self.sales_portfolio = self.sales_portfolio.checked_add(amount)?;
        Ok(())
    }

    pub fn credit_referral(&mut self, amount: Money) -> DomainResult<()> {
        self.referral_earnings = self.referral_earnings.checked_add(amount)?;
        Ok(())
    }
}

impl Entity for AgentLedger {
    type Id = AgentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
