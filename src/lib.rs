//! Offline resilience for a web client: versioned response caches with
//! per-route strategies, connectivity tracking, and a durable queue of
//! mutations replayed when the network comes back.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod push;
pub mod queue;
pub mod runtime;
pub mod strategy;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use runtime::{Backends, Shelter};
