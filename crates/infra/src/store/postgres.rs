//! Postgres-backed commission store.
//!
//! Schema lives in `crates/infra/migrations/`. Every mutation runs inside a SQL
//! transaction; balance increments are single `UPDATE ... SET x = x + $n`
//! statements, so concurrent sales touching the same agent never lose updates.
//! `find_commission` locks the commission row (`FOR UPDATE`), so two standalone
//! distributions of one commission cannot both pass the pool check.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (check constraint violation) | `23514` | `InvalidRecord` |
//! | Database (numeric out of range) | `22003` | `InvalidRecord` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use estatehub_commissions::{AgentLedger, Commission, CommissionSplit};
use estatehub_core::{
    AgentId, CommissionId, CommissionSplitId, Money, PropertyId, Rate,
};

use super::r#trait::{CommissionStore, CommissionTx, StoreError};

/// Postgres-backed commission store.
///
/// `Send + Sync`; share it freely. The pool handles connection management.
#[derive(Debug, Clone)]
pub struct PostgresCommissionStore {
    pool: Arc<PgPool>,
}

impl PostgresCommissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl CommissionStore for PostgresCommissionStore {
    type Tx = PostgresCommissionTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresCommissionTx { tx })
    }

    #[instrument(skip(self), fields(agent_id = %agent_id), err)]
    async fn find_agent(&self, agent_id: AgentId) -> Result<Option<AgentLedger>, StoreError> {
        fetch_agent(&*self.pool, agent_id).await
    }

    #[instrument(skip(self), fields(agent_id = %agent_id), err)]
    async fn commissions_by_selling_agent(
        &self,
        agent_id: AgentId,
    ) -> Result<Vec<Commission>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                property_id,
                agent_id,
                transaction_amount,
                referral_rate_bps,
                referral_commission,
                created_at
            FROM commissions
            WHERE agent_id = $1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(agent_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("commissions_by_selling_agent", e))?;

        rows.iter().map(commission_from_row).collect()
    }

    #[instrument(skip(self), fields(commission_id = %commission_id), err)]
    async fn splits_by_commission(
        &self,
        commission_id: CommissionId,
    ) -> Result<Vec<CommissionSplit>, StoreError> {
        fetch_splits(&*self.pool, commission_id).await
    }
}

/// SQL transaction over the commission tables.
///
/// Dropping it without `commit` rolls back (sqlx semantics).
pub struct PostgresCommissionTx {
    tx: Transaction<'static, Postgres>,
}

impl PostgresCommissionTx {
    async fn increment(
        &mut self,
        operation: &'static str,
        statement: &'static str,
        agent_id: AgentId,
        delta: Money,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(statement)
            .bind(agent_id.as_uuid())
            .bind(delta.minor())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("agent {agent_id}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CommissionTx for PostgresCommissionTx {
    async fn find_agent(&mut self, agent_id: AgentId) -> Result<Option<AgentLedger>, StoreError> {
        fetch_agent(&mut *self.tx, agent_id).await
    }

    async fn list_direct_referrals(
        &mut self,
        agent_id: AgentId,
    ) -> Result<Vec<AgentLedger>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, referred_by, sales_portfolio, referral_earnings
            FROM agents
            WHERE referred_by = $1
            ORDER BY id ASC
            "#,
        )
        .bind(agent_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_direct_referrals", e))?;

        rows.iter().map(agent_from_row).collect()
    }

    async fn find_commission(
        &mut self,
        commission_id: CommissionId,
    ) -> Result<Option<Commission>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                property_id,
                agent_id,
                transaction_amount,
                referral_rate_bps,
                referral_commission,
                created_at
            FROM commissions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(commission_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_commission", e))?;

        row.as_ref().map(commission_from_row).transpose()
    }

    async fn splits_by_commission(
        &mut self,
        commission_id: CommissionId,
    ) -> Result<Vec<CommissionSplit>, StoreError> {
        fetch_splits(&mut *self.tx, commission_id).await
    }

    #[instrument(skip(self, commission), fields(commission_id = %commission.id), err)]
    async fn insert_commission(&mut self, commission: &Commission) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO commissions (
                id,
                property_id,
                agent_id,
                transaction_amount,
                referral_rate_bps,
                referral_commission,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(commission.id.as_uuid())
        .bind(commission.property_id.as_uuid())
        .bind(commission.agent_id.as_uuid())
        .bind(commission.transaction_amount.minor())
        .bind(commission.referral_rate.basis_points() as i32)
        .bind(commission.referral_commission.minor())
        .bind(commission.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_commission", e))?;
        Ok(())
    }

    #[instrument(skip(self, split), fields(split_id = %split.id, level = split.level), err)]
    async fn insert_split(&mut self, split: &CommissionSplit) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO commission_splits (
                id,
                commission_id,
                agent_id,
                amount,
                level,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(split.id.as_uuid())
        .bind(split.commission_id.as_uuid())
        .bind(split.agent_id.as_uuid())
        .bind(split.amount.minor())
        .bind(split.level as i16)
        .bind(split.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_split", e))?;
        Ok(())
    }

    async fn increment_sales_portfolio(
        &mut self,
        agent_id: AgentId,
        delta: Money,
    ) -> Result<(), StoreError> {
        self.increment(
            "increment_sales_portfolio",
            "UPDATE agents SET sales_portfolio = sales_portfolio + $2 WHERE id = $1",
            agent_id,
            delta,
        )
        .await
    }

    async fn increment_referral_earnings(
        &mut self,
        agent_id: AgentId,
        delta: Money,
    ) -> Result<(), StoreError> {
        self.increment(
            "increment_referral_earnings",
            "UPDATE agents SET referral_earnings = referral_earnings + $2 WHERE id = $1",
            agent_id,
            delta,
        )
        .await
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

async fn fetch_splits<'e, E>(
    executor: E,
    commission_id: CommissionId,
) -> Result<Vec<CommissionSplit>, StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT
            id,
            commission_id,
            agent_id,
            amount,
            level,
            created_at
        FROM commission_splits
        WHERE commission_id = $1
        ORDER BY level ASC, seq ASC
        "#,
    )
    .bind(commission_id.as_uuid())
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("splits_by_commission", e))?;

    rows.iter().map(split_from_row).collect()
}

async fn fetch_agent<'e, E>(executor: E, agent_id: AgentId) -> Result<Option<AgentLedger>, StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        SELECT id, referred_by, sales_portfolio, referral_earnings
        FROM agents
        WHERE id = $1
        "#,
    )
    .bind(agent_id.as_uuid())
    .fetch_optional(executor)
    .await
    .map_err(|e| map_sqlx_error("find_agent", e))?;

    row.as_ref().map(agent_from_row).transpose()
}

// Row mapping

fn agent_from_row(row: &PgRow) -> Result<AgentLedger, StoreError> {
    let id: uuid::Uuid = row.try_get("id").map_err(row_error)?;
    let referred_by: Option<uuid::Uuid> = row.try_get("referred_by").map_err(row_error)?;
    let sales_portfolio: i64 = row.try_get("sales_portfolio").map_err(row_error)?;
    let referral_earnings: i64 = row.try_get("referral_earnings").map_err(row_error)?;

    Ok(AgentLedger {
        id: AgentId::from_uuid(id),
        referred_by: referred_by.map(AgentId::from_uuid),
        sales_portfolio: Money::from_minor(sales_portfolio),
        referral_earnings: Money::from_minor(referral_earnings),
    })
}

fn commission_from_row(row: &PgRow) -> Result<Commission, StoreError> {
    let id: uuid::Uuid = row.try_get("id").map_err(row_error)?;
    let property_id: uuid::Uuid = row.try_get("property_id").map_err(row_error)?;
    let agent_id: uuid::Uuid = row.try_get("agent_id").map_err(row_error)?;
    let transaction_amount: i64 = row.try_get("transaction_amount").map_err(row_error)?;
    let referral_rate_bps: i32 = row.try_get("referral_rate_bps").map_err(row_error)?;
    let referral_commission: i64 = row.try_get("referral_commission").map_err(row_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(row_error)?;

    let referral_rate = u32::try_from(referral_rate_bps)
        .map_err(|_| StoreError::InvalidRecord(format!("negative rate {referral_rate_bps}")))
        .and_then(|bps| {
            Rate::from_basis_points(bps).map_err(|e| StoreError::InvalidRecord(e.to_string()))
        })?;

    Ok(Commission {
        id: CommissionId::from_uuid(id),
        property_id: PropertyId::from_uuid(property_id),
        agent_id: AgentId::from_uuid(agent_id),
        transaction_amount: Money::from_minor(transaction_amount),
        referral_rate,
        referral_commission: Money::from_minor(referral_commission),
        created_at,
    })
}

fn split_from_row(row: &PgRow) -> Result<CommissionSplit, StoreError> {
    let id: uuid::Uuid = row.try_get("id").map_err(row_error)?;
    let commission_id: uuid::Uuid = row.try_get("commission_id").map_err(row_error)?;
    let agent_id: uuid::Uuid = row.try_get("agent_id").map_err(row_error)?;
    let amount: i64 = row.try_get("amount").map_err(row_error)?;
    let level: i16 = row.try_get("level").map_err(row_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(row_error)?;

    let level = u8::try_from(level)
        .map_err(|_| StoreError::InvalidRecord(format!("split level {level} out of range")))?;

    Ok(CommissionSplit {
        id: CommissionSplitId::from_uuid(id),
        commission_id: CommissionId::from_uuid(commission_id),
        agent_id: AgentId::from_uuid(agent_id),
        amount: Money::from_minor(amount),
        level,
        created_at,
    })
}

fn row_error(err: sqlx::Error) -> StoreError {
    StoreError::InvalidRecord(format!("failed to decode row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound(msg),
                Some("23514") | Some("22003") => StoreError::InvalidRecord(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
