//! Referral pool distribution.
//!
//! Planning is pure: the caller walks the referral tree (through whatever storage
//! it has) into a [`ReferralLevels`], then [`plan_distribution`] decides who gets
//! how much. Nothing here touches balances.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use estatehub_core::{AgentId, BASIS_POINTS_SCALE, DomainError, DomainResult, Money};

/// Deepest referral level a policy may pay out to.
pub const MAX_REFERRAL_DEPTH: usize = 8;

/// How a referral pool is spread across referral-tree levels.
///
/// `level_weights[0]` is the weight of level 1 (direct referrals), and so on.
/// Weights are relative: only populated levels take part, and each receives
/// `pool * weight / sum(populated weights)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct DistributionPolicy {
    level_weights: Vec<u32>,
}

impl DistributionPolicy {
    /// Direct referrals share the whole pool; deeper levels get nothing.
    pub fn direct_only() -> Self {
        Self {
            level_weights: vec![BASIS_POINTS_SCALE],
        }
    }

    pub fn with_level_weights(level_weights: Vec<u32>) -> DomainResult<Self> {
        if level_weights.is_empty() {
            return Err(DomainError::validation(
                "distribution policy needs at least one level",
            ));
        }
        if level_weights.len() > MAX_REFERRAL_DEPTH {
            return Err(DomainError::validation(format!(
                "distribution policy supports at most {MAX_REFERRAL_DEPTH} levels, got {}",
                level_weights.len()
            )));
        }
        if let Some(level) = level_weights.iter().position(|w| *w == 0) {
            return Err(DomainError::validation(format!(
                "weight of level {} must be positive",
                level + 1
            )));
        }
        Ok(Self { level_weights })
    }

    /// Number of referral levels paid out.
    pub fn depth(&self) -> usize {
        self.level_weights.len()
    }

    pub fn level_weights(&self) -> &[u32] {
        &self.level_weights
    }
}

impl Default for DistributionPolicy {
    fn default() -> Self {
        Self::direct_only()
    }
}

impl TryFrom<Vec<u32>> for DistributionPolicy {
    type Error = DomainError;

    fn try_from(value: Vec<u32>) -> Result<Self, Self::Error> {
        Self::with_level_weights(value)
    }
}

impl From<DistributionPolicy> for Vec<u32> {
    fn from(value: DistributionPolicy) -> Self {
        value.level_weights
    }
}

/// Referral tree below one agent, flattened into levels.
///
/// Each agent appears at most once, at the shallowest level it was reached
/// from; the origin agent never appears. Members of a level are ascending by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralLevels {
    origin: AgentId,
    seen: BTreeSet<AgentId>,
    levels: Vec<Vec<AgentId>>,
}

impl ReferralLevels {
    pub fn new(origin: AgentId) -> Self {
        let mut seen = BTreeSet::new();
        seen.insert(origin);
        Self {
            origin,
            seen,
            levels: Vec::new(),
        }
    }

    /// Number of non-empty levels collected so far.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Agents whose direct referrals form the next level.
    pub fn frontier(&self) -> Vec<AgentId> {
        match self.levels.last() {
            Some(level) => level.clone(),
            None => vec![self.origin],
        }
    }

    /// Add the next level from raw candidates (duplicates and already-seen agents
    /// are dropped). Returns the number of agents added; an empty level is not kept.
    pub fn push_level<I>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = AgentId>,
    {
        let level: BTreeSet<AgentId> = candidates
            .into_iter()
            .filter(|id| !self.seen.contains(id))
            .collect();
        if level.is_empty() {
            return 0;
        }

        self.seen.extend(level.iter().copied());
        let added = level.len();
        self.levels.push(level.into_iter().collect());
        added
    }

    pub fn levels(&self) -> &[Vec<AgentId>] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// One payout decided by [`plan_distribution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSplit {
    pub agent_id: AgentId,
    pub amount: Money,
    pub level: u8,
}

/// Decide how `pool` is paid out over `levels` under `policy`.
///
/// - No populated level within the policy depth: nothing is paid, the pool is kept.
/// - Level allotments are truncated; the remainder goes to the shallowest level.
/// - Within a level shares are equal; the remainder goes to the first member.
/// - Zero-amount shares produce no split.
///
/// The planned amounts always sum to exactly `pool` when at least one level
/// is populated.
pub fn plan_distribution(
    pool: Money,
    levels: &ReferralLevels,
    policy: &DistributionPolicy,
) -> DomainResult<Vec<PlannedSplit>> {
    if pool.is_negative() {
        return Err(DomainError::validation(format!(
            "referral pool cannot be negative, got {pool}"
        )));
    }

    let populated: Vec<(u8, &[AgentId], u32)> = levels
        .levels()
        .iter()
        .zip(policy.level_weights())
        .enumerate()
        .filter(|(_, (members, _))| !members.is_empty())
        .map(|(idx, (members, weight))| (idx as u8 + 1, members.as_slice(), *weight))
        .collect();

    if populated.is_empty() || pool.is_zero() {
        return Ok(Vec::new());
    }

    let total_weight: u64 = populated.iter().map(|(_, _, w)| *w as u64).sum();
    let mut allotments: Vec<Money> = populated
        .iter()
        .map(|(_, _, w)| {
            let share = pool.minor() as i128 * *w as i128 / total_weight as i128;
            // share <= pool since w <= total_weight.
            Money::from_minor(share as i64)
        })
        .collect();

    let allotted = Money::checked_sum(allotments.iter().copied())?;
    let level_remainder = pool.checked_sub(allotted)?;
    allotments[0] = allotments[0].checked_add(level_remainder)?;

    let mut planned = Vec::new();
    for ((level, members, _), allotment) in populated.iter().zip(allotments) {
        let (share, remainder) = allotment.split_even(members.len())?;
        for (idx, agent_id) in members.iter().enumerate() {
            let amount = if idx == 0 {
                share.checked_add(remainder)?
            } else {
                share
            };
            if amount.is_positive() {
                planned.push(PlannedSplit {
                    agent_id: *agent_id,
                    amount,
                    level: *level,
                });
            }
        }
    }

    Ok(planned)
}
