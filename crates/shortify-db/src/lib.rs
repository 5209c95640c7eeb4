//! Row store client for the Shortify backend.
//!
//! This crate provides:
//! - A PostgREST client (Supabase `rest/v1`) with retry and metrics
//! - The `user_credits` repository with compare-and-swap decrement
//! - The `shorts` repository for published short records
//! - Ledger traits used by the pipeline, plus an in-memory implementation

pub mod client;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod retry;
pub mod shorts;
pub mod user_credits;

pub use client::{DbConfig, Filter, RestClient};
pub use error::{DbError, DbResult};
pub use ledger::{CreditLedger, MemoryLedger, ShortsLedger};
pub use retry::RetryConfig;
pub use shorts::{ShortsRecord, ShortsRepository};
pub use user_credits::{UserCredits, UserCreditsRepository};
