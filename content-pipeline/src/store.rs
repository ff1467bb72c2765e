use crate::traits::{GenerationHistory, QuotaLedger};
use crate::types::{GenerationRecord, QuotaBalance, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

/// Durable quota ledger and generation history on sqlite
pub struct SqliteStore {
    pool: SqlitePool,
    initial_quota: i64,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            initial_quota: 0,
        };
        store.setup_schema().await?;
        info!("Connected to quota store at {}", database_url);
        Ok(store)
    }

    /// Unknown users start with `initial_quota` free generations
    pub fn with_initial_quota(mut self, initial_quota: i64) -> Self {
        self.initial_quota = initial_quota.max(0);
        self
    }

    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotas (
                user_id TEXT PRIMARY KEY,
                remaining INTEGER NOT NULL CHECK (remaining >= 0),
                total_used INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generation_history (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                article_url TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_generation_history_user ON generation_history (user_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ensure_user<'e, E>(&self, executor: E, user_id: &str) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO quotas (user_id, remaining, total_used)
            VALUES (?1, ?2, 0)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(self.initial_quota)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl QuotaLedger for SqliteStore {
    async fn balance(&self, user_id: &str) -> Result<QuotaBalance> {
        let row = sqlx::query("SELECT remaining, total_used FROM quotas WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(r) => QuotaBalance {
                remaining: r.get("remaining"),
                total_used: r.get("total_used"),
            },
            None => QuotaBalance {
                remaining: self.initial_quota,
                total_used: 0,
            },
        })
    }

    async fn debit(&self, user_id: &str) -> Result<bool> {
        self.ensure_user(&self.pool, user_id).await?;

        // Single conditional statement: atomic against concurrent debits
        let result = sqlx::query(
            r#"
            UPDATE quotas
            SET remaining = remaining - 1,
                total_used = total_used + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ?1 AND remaining > 0
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let debited = result.rows_affected() == 1;
        debug!("Debit for {}: {}", user_id, if debited { "ok" } else { "refused" });
        Ok(debited)
    }

    async fn credit(&self, user_id: &str, amount: u32) -> Result<QuotaBalance> {
        let mut tx = self.pool.begin().await?;
        self.ensure_user(&mut *tx, user_id).await?;

        sqlx::query(
            r#"
            UPDATE quotas
            SET remaining = remaining + ?2,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .bind(i64::from(amount))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query("SELECT remaining, total_used FROM quotas WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        let balance = QuotaBalance {
            remaining: row.get("remaining"),
            total_used: row.get("total_used"),
        };
        info!("Credited {} with {} ({} remaining)", user_id, amount, balance.remaining);
        Ok(balance)
    }
}

#[async_trait]
impl GenerationHistory for SqliteStore {
    async fn record(&self, record: GenerationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generation_history (id, user_id, topic, article_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.topic)
        .bind(&record.article_url)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, topic, article_url, created_at
            FROM generation_history
            WHERE user_id = ?1
            ORDER BY rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| GenerationRecord {
                id: r.get("id"),
                user_id: r.get("user_id"),
                topic: r.get("topic"),
                article_url: r.get("article_url"),
                created_at: r.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect())
    }
}
