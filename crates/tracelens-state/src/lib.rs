//! Shared store backends for tracelens.
//!
//! The enrichment pipeline keeps its cross-call state (content cache, rate
//! limit flags, failure counters, resolved revisions) in a store shared by
//! every worker. This crate defines that store as the [`KvBackend`] trait and
//! provides an in-memory and a Valkey/Redis implementation, plus the
//! [`cached_eval`] soft/hard TTL primitive built on top of it.

mod cached;
mod error;
mod traits;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "valkey")]
mod valkey;

#[cfg(feature = "config")]
mod config;

#[cfg(feature = "config")]
mod provider;

pub use cached::{cached_eval, CachePolicy};
pub use error::{KvError, StateError};
pub use traits::KvBackend;

#[cfg(feature = "memory")]
pub use memory::MemoryKv;

#[cfg(feature = "valkey")]
pub use valkey::ValkeyKv;

#[cfg(feature = "config")]
pub use config::KvConfig;

#[cfg(feature = "config")]
pub use provider::StateProvider;
