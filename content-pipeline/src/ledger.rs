use crate::traits::{GenerationHistory, QuotaLedger};
use crate::types::{GenerationRecord, QuotaBalance, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Process-local ledger. Check-and-decrement happens under one lock, so
/// concurrent debits for the same user cannot both pass on a balance of one.
pub struct InMemoryQuotaLedger {
    balances: Mutex<HashMap<String, QuotaBalance>>,
    initial_quota: i64,
}

impl InMemoryQuotaLedger {
    pub fn new() -> Self {
        Self::with_initial_quota(0)
    }

    /// Unknown users start with `initial_quota` free generations
    pub fn with_initial_quota(initial_quota: i64) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            initial_quota: initial_quota.max(0),
        }
    }

    fn fresh(&self) -> QuotaBalance {
        QuotaBalance {
            remaining: self.initial_quota,
            total_used: 0,
        }
    }
}

impl Default for InMemoryQuotaLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn balance(&self, user_id: &str) -> Result<QuotaBalance> {
        let balances = self.balances.lock().await;
        Ok(balances.get(user_id).copied().unwrap_or_else(|| self.fresh()))
    }

    async fn debit(&self, user_id: &str) -> Result<bool> {
        let mut balances = self.balances.lock().await;
        let balance = balances
            .entry(user_id.to_string())
            .or_insert_with(|| self.fresh());

        if balance.remaining <= 0 {
            debug!("Debit refused for {}: balance is zero", user_id);
            return Ok(false);
        }

        balance.remaining -= 1;
        balance.total_used += 1;
        debug!("Debited {}: {} remaining", user_id, balance.remaining);
        Ok(true)
    }

    async fn credit(&self, user_id: &str, amount: u32) -> Result<QuotaBalance> {
        let mut balances = self.balances.lock().await;
        let balance = balances
            .entry(user_id.to_string())
            .or_insert_with(|| self.fresh());

        balance.remaining += i64::from(amount);
        info!("Credited {} with {} ({} remaining)", user_id, amount, balance.remaining);
        Ok(*balance)
    }
}

#[derive(Default)]
pub struct InMemoryHistory {
    records: RwLock<Vec<GenerationRecord>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl GenerationHistory for InMemoryHistory {
    async fn record(&self, record: GenerationRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
