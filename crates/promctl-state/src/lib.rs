//! promctl-state — durable unit state for the reconciliation engine.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the three pieces of state
//! a reconciliation pass owns: the peer registry, the last applied
//! configuration (fingerprint and command line) and the readiness latch.
//!
//! # Lifecycle
//!
//! The store is empty at creation. A pass loads a [`UnitState`] at its
//! start and persists it at its end in a single write transaction, so the
//! fingerprint and the applied command are never written separately.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
