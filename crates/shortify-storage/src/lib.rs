//! Object storage for the Shortify pipeline.
//!
//! This crate provides:
//! - The `ObjectStore` trait used by the pipeline
//! - An S3-compatible implementation (Supabase storage, R2, MinIO, S3)
//! - An in-memory implementation for local development
//! - The object key layout

pub mod client;
pub mod error;
pub mod keys;
pub mod store;

pub use client::{S3Store, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use keys::{content_type_for, short_key, temp_source_key, SHORT_CONTENT_TYPE};
pub use store::{MemoryStore, ObjectStore};
