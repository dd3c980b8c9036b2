//! Cache store: named, versioned request → response storage.
//!
//! This module provides the storage half of the interception engine:
//! - [`CacheStorage`] is the generation-level contract (open/get/put/delete/list)
//! - [`SqliteStorage`] persists generations across restarts
//! - [`MemoryStorage`] backs ephemeral runs and tests
//! - [`Cache`] is a handle to one generation that enforces what may be cached

mod handle;
mod key;
mod memory;
mod storage;
mod traits;

pub use handle::Cache;
pub use key::RequestKey;
pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use traits::{CacheStorage, CachedResponse};
