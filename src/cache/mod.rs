//! Like cache: sharded counters and per-user action sets over a keyspace.
//!
//! The keyspace is reached through [`CacheClient`]; [`MemoryKeyspace`] keeps it
//! in process.

pub mod config;
pub mod counters;
pub mod error;
pub mod keys;
pub(crate) mod lock;
pub mod store;
pub mod user_actions;

pub use config::CacheConfig;
pub use counters::{CounterCache, CounterLookup};
pub use error::CacheError;
pub use keys::ShardResolver;
pub use store::{CacheClient, CounterField, MemoryKeyspace, ToggleOutcome, ToggleScript};
pub use user_actions::{Membership, UserActionSet};
