//! Engine configuration from the process environment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use estatehub_commissions::DistributionPolicy;
use estatehub_core::{DomainError, Rate};

pub const REFERRAL_RATE_ENV: &str = "ESTATEHUB_REFERRAL_RATE_BPS";
pub const LEVEL_WEIGHTS_ENV: &str = "ESTATEHUB_REFERRAL_LEVEL_WEIGHTS_BPS";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// 5%.
pub const DEFAULT_REFERRAL_RATE_BPS: u32 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Malformed {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{var} rejected: {source}")]
    Rejected {
        var: &'static str,
        #[source]
        source: DomainError,
    },
}

/// Policy inputs of the commission engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub referral_rate: Rate,
    pub distribution: DistributionPolicy,
    /// Only needed by the Postgres store.
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            referral_rate: Rate::clamped(DEFAULT_REFERRAL_RATE_BPS),
            distribution: DistributionPolicy::default(),
            database_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or blank keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let referral_rate = match get(REFERRAL_RATE_ENV) {
            Some(raw) => parse_rate(&raw)?,
            None => {
                tracing::warn!(
                    "{REFERRAL_RATE_ENV} not set; using default of {DEFAULT_REFERRAL_RATE_BPS}bps"
                );
                Rate::clamped(DEFAULT_REFERRAL_RATE_BPS)
            }
        };

        let distribution = match get(LEVEL_WEIGHTS_ENV) {
            Some(raw) => parse_level_weights(&raw)?,
            None => {
                tracing::warn!("{LEVEL_WEIGHTS_ENV} not set; paying direct referrals only");
                DistributionPolicy::direct_only()
            }
        };

        let database_url = get(DATABASE_URL_ENV);
        if database_url.is_none() {
            tracing::debug!("{DATABASE_URL_ENV} not set");
        }

        Ok(Self {
            referral_rate,
            distribution,
            database_url,
        })
    }
}

fn parse_rate(raw: &str) -> Result<Rate, ConfigError> {
    let bps: u32 = raw.parse().map_err(|_| ConfigError::Malformed {
        var: REFERRAL_RATE_ENV,
        value: raw.to_string(),
        expected: "an integer number of basis points",
    })?;
    Rate::from_basis_points(bps).map_err(|source| ConfigError::Rejected {
        var: REFERRAL_RATE_ENV,
        source,
    })
}

fn parse_level_weights(raw: &str) -> Result<DistributionPolicy, ConfigError> {
    let weights = raw
        .split(',')
        .map(|part| {
            part.trim().parse::<u32>().map_err(|_| ConfigError::Malformed {
                var: LEVEL_WEIGHTS_ENV,
                value: raw.to_string(),
                expected: "a comma-separated list of basis points",
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    DistributionPolicy::with_level_weights(weights).map_err(|source| ConfigError::Rejected {
        var: LEVEL_WEIGHTS_ENV,
        source,
    })
}
