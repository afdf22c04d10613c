//! # Oncely
//!
//! Run a computation once per *context* and hand out the stored result
//! afterwards.
//!
//! A context is the call site a computation comes from plus the arguments
//! that discriminate it. Results live in a *scope*: per instance (dropped
//! with the owning value), per type (shared by every value of the type, kept
//! for the life of the process) or per function.
//!
//! ## Features
//!
//! - **Easy to use**: add `#[memoize]` to a function or method
//! - **Identity-aware arguments**: values are compared by value, objects by identity
//! - **Scoped**: per-instance, per-type and per-function stores
//! - **Thread-safe where it matters**: shared scopes run each computation at most once
//! - **Result-aware**: only `Ok` values are cached, failures are retried
//! - **Switchable**: enable or disable a scope at runtime, or switch memoization
//!   off for the whole process with `MEMOIZATION_GLOBALLY_DISABLED`
//!
//! ## Quick Start
//!
//! ```rust
//! use oncely::memoize;
//!
//! #[memoize]
//! fn fibonacci(n: u32) -> u64 {
//!     if n <= 1 {
//!         return n as u64;
//!     }
//!     fibonacci(n - 1) + fibonacci(n - 2)
//! }
//!
//! assert_eq!(fibonacci(50), 12_586_269_025);
//! ```
//!
//! ## Per-Instance Memoization
//!
//! Types embed an [`InstanceMemo`] and implement [`Memoize`]:
//!
//! ```rust
//! use oncely::{call_site, InstanceMemo, Memoize};
//!
//! struct Letters {
//!     memo: InstanceMemo,
//! }
//!
//! impl Memoize for Letters {
//!     fn memo(&self) -> &InstanceMemo {
//!         &self.memo
//!     }
//! }
//!
//! impl Letters {
//!     fn number_for(&self, letter: char) -> u32 {
//!         self.memoize(&call_site!("number_for"), &[&letter], || {
//!             fastrand::u32(1..=10_000_000)
//!         })
//!         .unwrap()
//!     }
//! }
//!
//! let letters = Letters { memo: InstanceMemo::new() };
//! assert_eq!(letters.number_for('A'), letters.number_for('A'));
//! ```
//!
//! ## Per-Type Memoization
//!
//! ```rust
//! use oncely::{call_site, DoOnce};
//!
//! struct Settings;
//!
//! impl DoOnce for Settings {}
//!
//! let first: String = Settings::do_once(&call_site!(), &[], || "loaded".to_string()).unwrap();
//! assert_eq!(first, "loaded");
//! ```
//!
//! ## Global Switch
//!
//! Setting `MEMOIZATION_GLOBALLY_DISABLED` to `1`, `true`, `yes` or `on`
//! makes every scope run its computations directly; `0`, `false`, `no` or
//! `off` forces memoization on even for locally disabled scopes. The variable
//! is read on every call.
//!
//! ## Statistics
//!
//! With the `stats` feature (enabled by default) every scope counts hits,
//! misses and bypasses:
//!
//! ```rust
//! use oncely::{call_site, InstanceMemo};
//!
//! let memo = InstanceMemo::new();
//! let site = call_site!("answer");
//! for _ in 0..3 {
//!     memo.memoize(&site, &[], || 42).unwrap();
//! }
//!
//! #[cfg(feature = "stats")]
//! {
//!     assert_eq!(memo.stats().misses(), 1);
//!     assert_eq!(memo.stats().hits(), 2);
//! }
//! ```

extern crate self as oncely;

pub use oncely_core::*;
pub use oncely_macros::memoize;

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

/// Builds a [`CallSiteId`] for the current source position.
///
/// Without an argument the operation name is the module path.
///
/// ```rust
/// use oncely::call_site;
///
/// let a = call_site!("load");
/// let b = call_site!("load");
/// assert_ne!(a, b); // different columns
/// assert_eq!(a.operation(), "load");
/// ```
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::CallSiteId::new(
            ::core::module_path!(),
            ::core::file!(),
            ::core::line!(),
            ::core::column!(),
        )
    };
    ($name:expr) => {
        $crate::CallSiteId::new($name, ::core::file!(), ::core::line!(), ::core::column!())
    };
}

/// Builds an argument set from a list of expressions.
///
/// ```rust
/// use oncely::{args, call_site, SharedMemo};
///
/// let memo = SharedMemo::new();
/// let (x, y) = (3, "three");
/// let value = memo.memoize(&call_site!(), args![x, y], || x * 2).unwrap();
/// assert_eq!(value, 6);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        &[] as &[&dyn $crate::MemoArg]
    };
    ($($arg:expr),+ $(,)?) => {
        &[$(&$arg as &dyn $crate::MemoArg),+]
    };
}

/// Per-instance memoization.
///
/// Implementors hand out the [`InstanceMemo`] they own; the provided
/// methods cache results in it. Two instances never share results, and the
/// results are dropped with the instance.
pub trait Memoize {
    fn memo(&self) -> &InstanceMemo;

    /// See [`Memo::memoize`].
    fn memoize<R, C>(
        &self,
        site: &CallSiteId,
        args: &[&dyn MemoArg],
        callback: C,
    ) -> Result<R, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> R,
    {
        self.memo().memoize(site, args, callback)
    }

    /// See [`Memo::try_memoize`].
    fn try_memoize<R, E, C>(
        &self,
        site: &CallSiteId,
        args: &[&dyn MemoArg],
        callback: C,
    ) -> Result<R, E>
    where
        R: Clone + Send + Sync + 'static,
        E: From<MemoError>,
        C: FnOnce() -> Result<R, E>,
    {
        self.memo().try_memoize(site, args, callback)
    }

    fn enable_memoization(&self) {
        self.memo().enable();
    }

    fn disable_memoization(&self) {
        self.memo().disable();
    }

    /// Effective state, taking `MEMOIZATION_GLOBALLY_DISABLED` into account.
    fn is_memoization_enabled(&self) -> bool {
        self.memo().is_enabled()
    }
}

/// Per-type memoization.
///
/// Every method works on the scope shared by all values of the implementing
/// type (see [`type_scope`]). An empty argument set runs a computation once
/// for the whole type.
pub trait DoOnce: 'static {
    /// See [`Memo::memoize`].
    fn do_once<R, C>(site: &CallSiteId, args: &[&dyn MemoArg], callback: C) -> Result<R, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> R,
    {
        type_scope::<Self>().memoize(site, args, callback)
    }

    /// See [`Memo::try_memoize`].
    fn try_do_once<R, E, C>(site: &CallSiteId, args: &[&dyn MemoArg], callback: C) -> Result<R, E>
    where
        R: Clone + Send + Sync + 'static,
        E: From<MemoError>,
        C: FnOnce() -> Result<R, E>,
    {
        type_scope::<Self>().try_memoize(site, args, callback)
    }

    fn enable_do_once() {
        type_scope::<Self>().enable();
    }

    fn disable_do_once() {
        type_scope::<Self>().disable();
    }

    fn is_do_once_enabled() -> bool {
        type_scope::<Self>().is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        memo: InstanceMemo,
        runs: Cell<u32>,
    }

    impl Memoize for Counter {
        fn memo(&self) -> &InstanceMemo {
            &self.memo
        }
    }

    impl Counter {
        fn new() -> Self {
            Self {
                memo: InstanceMemo::new(),
                runs: Cell::new(0),
            }
        }

        #[memoize]
        fn square(&self, n: u64) -> u64 {
            self.runs.set(self.runs.get() + 1);
            n * n
        }
    }

    struct Marker;

    impl DoOnce for Marker {}

    #[test]
    fn test_call_site_macro() {
        let named = call_site!("op");
        assert_eq!(named.operation(), "op");
        assert!(named.location().is_some());

        let unnamed = call_site!();
        assert_eq!(unnamed.operation(), module_path!());
    }

    #[test]
    fn test_args_macro() {
        let empty = args![];
        assert!(empty.is_empty());
        let two = args![1u8, "x"];
        assert_eq!(normalize(two).unwrap().len(), 2);
    }

    #[test]
    fn test_memoize_trait_toggle() {
        let counter = Counter::new();
        assert!(counter.is_memoization_enabled());
        counter.disable_memoization();
        assert!(!counter.memo().is_enabled());
        counter.enable_memoization();
        assert!(counter.memo().is_enabled());
    }

    #[test]
    fn test_memoize_attribute_on_method() {
        let counter = Counter::new();
        assert_eq!(counter.square(4), 16);
        assert_eq!(counter.square(4), 16);
        assert_eq!(counter.square(5), 25);
        assert_eq!(counter.runs.get(), 2);
    }

    #[test]
    fn test_do_once_trait() {
        let site = CallSiteId::named("marker");
        let a = Marker::do_once(&site, &[], || 1).unwrap();
        let b = Marker::do_once(&site, &[], || 2).unwrap();
        assert_eq!((a, b), (1, 1));
        assert!(Marker::is_do_once_enabled());
    }
}
