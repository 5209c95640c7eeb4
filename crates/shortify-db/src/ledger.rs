//! Account ledgers consumed by the pipeline.
//!
//! The pipeline only needs three things from the row store: load (or open)
//! a user's credit record, take one credit, and record published shorts.
//! Both the REST repositories and [`MemoryLedger`] implement these traits.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{DbError, DbResult};
use crate::shorts::{ShortsRecord, ShortsRepository};
use crate::user_credits::{UserCredits, UserCreditsRepository};

/// Credit balance operations.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Load the user's record, opening a starter record for new users.
    async fn fetch_or_create(&self, user_id: &str) -> DbResult<UserCredits>;

    /// Take one credit, returning the remaining balance.
    async fn decrement(&self, user_id: &str) -> DbResult<i64>;
}

/// Published shorts bookkeeping.
#[async_trait]
pub trait ShortsLedger: Send + Sync {
    async fn record(&self, record: &ShortsRecord) -> DbResult<()>;
}

#[async_trait]
impl CreditLedger for UserCreditsRepository {
    async fn fetch_or_create(&self, user_id: &str) -> DbResult<UserCredits> {
        self.get_or_create(user_id).await
    }

    async fn decrement(&self, user_id: &str) -> DbResult<i64> {
        UserCreditsRepository::decrement(self, user_id).await
    }
}

#[async_trait]
impl ShortsLedger for ShortsRepository {
    async fn record(&self, record: &ShortsRecord) -> DbResult<()> {
        self.insert(record).await
    }
}

/// In-process ledger for local development and tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    credits: Mutex<HashMap<String, UserCredits>>,
    shorts: Mutex<Vec<ShortsRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a credit record.
    pub fn set_credits(&self, record: UserCredits) {
        self.credits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.user_id.clone(), record);
    }

    pub fn credits_of(&self, user_id: &str) -> Option<i64> {
        self.credits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map(|r| r.credits)
    }

    pub fn shorts(&self) -> Vec<ShortsRecord> {
        self.shorts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CreditLedger for MemoryLedger {
    async fn fetch_or_create(&self, user_id: &str) -> DbResult<UserCredits> {
        let mut credits = self.credits.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(credits
            .entry(user_id.to_string())
            .or_insert_with(|| UserCredits::starter(user_id))
            .clone())
    }

    async fn decrement(&self, user_id: &str) -> DbResult<i64> {
        let mut credits = self.credits.lock().unwrap_or_else(PoisonError::into_inner);
        let record = credits
            .get_mut(user_id)
            .ok_or_else(|| DbError::not_found(format!("user_credits/{user_id}")))?;
        if record.credits < 1 {
            return Err(DbError::precondition_failed(format!(
                "user {user_id} has no credits left"
            )));
        }
        record.credits -= 1;
        Ok(record.credits)
    }
}

#[async_trait]
impl ShortsLedger for MemoryLedger {
    async fn record(&self, record: &ShortsRecord) -> DbResult<()> {
        self.shorts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}
