//! # Oncely Core
//!
//! The memoization engine behind `oncely`.
//!
//! A memoized call is identified by its *context*: the call site it comes from
//! plus the arguments that discriminate it. The engine turns that context into
//! a 128-bit key, runs the computation the first time the key is seen, and
//! hands out the stored result on every later call.
//!
//! ## Features
//!
//! - **Argument normalization**: values pass through, objects are reduced to an identity token
//! - **Deterministic keys**: MD5 over a tagged, length-prefixed serialization of the context
//! - **Two store flavours**: an unsynchronized per-instance store and a thread-safe
//!   store with at-most-once execution per key
//! - **Per-type scopes**: one lazily created, process-lived scope per Rust type
//! - **Enable/disable control**: local flags plus a process-wide environment override
//! - **Failure aware**: failed computations are never cached
//! - **Statistics**: optional hit/miss/bypass counters (`stats` feature)
//!
//! ## Module Organization
//!
//! - [`argument`] - Argument normalization and identity tokens
//! - [`call_site`] - Call-site identifiers
//! - [`key`] - Cache key derivation
//! - [`store`] - Local and shared result stores
//! - [`engine`] - The `Memo` engine and its scope aliases
//! - [`registry`] - Per-type scopes
//! - [`global_override`] - The environment override
//!
pub mod argument;
pub mod call_site;
pub mod engine;
mod error;
mod flag;
pub mod global_override;
pub mod key;
pub mod registry;
pub mod store;

#[cfg(feature = "stats")]
mod stats;

pub use argument::{
    normalize, Argument, ByAddress, ByIdentity, HasIdentity, Identity, IdentityToken, MemoArg,
};
pub use call_site::{CallSiteId, Location};
pub use engine::{InstanceMemo, Memo, Prepared, SharedMemo};
pub use error::MemoError;
pub use flag::{EnabledFlag, LocalFlag, SharedFlag};
pub use global_override::{GlobalOverride, OVERRIDE_VAR};
pub use key::{derive_key, CacheKey};
pub use registry::{clear_type_scopes, registered_types, type_scope};
pub use store::{LocalStore, Lookup, MemoStore, SharedStore, Value};

#[cfg(feature = "stats")]
pub use stats::{MemoStats, StatsSnapshot};
