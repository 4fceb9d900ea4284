//! Ofisu Core Library
//!
//! Office graph model, office file ingestion, fuzzy room matching, the office
//! registry and key-value storage for the Ofisu reconciler.

pub mod error;
pub mod ingest;
pub mod invariants;
pub mod matching;
pub mod models;
pub mod registry;
pub mod storage;

pub use error::{Error, Result};
pub use matching::normalize_name;
pub use models::*;
pub use registry::OfficeRegistry;
pub use storage::{
    open_store, Database, KeySpace, KeyValueStore, MemoryStore, SqliteStore,
    StoreOp,
};
