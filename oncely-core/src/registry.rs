use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::{type_name, TypeId};
use std::collections::HashMap;

use crate::SharedMemo;

struct TypeScope {
    name: &'static str,
    memo: &'static SharedMemo,
}

/// Per-type memoization scopes, created on first use.
///
/// Scopes are leaked on creation and live until the process exits; there is
/// no teardown. Use [`clear_type_scopes`] (or `clear()` on a single scope) to
/// reset cached results, e.g. between tests.
static TYPE_SCOPES: Lazy<RwLock<HashMap<TypeId, TypeScope>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the memoization scope shared by every instance of `T`.
///
/// The first call for a type creates the scope; every later call, from any
/// thread, returns the same reference.
///
/// # Examples
///
/// ```
/// use oncely_core::{type_scope, CallSiteId};
///
/// struct Dice;
///
/// let site = CallSiteId::named("roll");
/// let first = type_scope::<Dice>().memoize(&site, &[], || 4u8).unwrap();
/// let second = type_scope::<Dice>().memoize(&site, &[], || 6u8).unwrap();
/// assert_eq!(first, second);
/// assert!(std::ptr::eq(type_scope::<Dice>(), type_scope::<Dice>()));
/// ```
pub fn type_scope<T: ?Sized + 'static>() -> &'static SharedMemo {
    let id = TypeId::of::<T>();
    let existing = TYPE_SCOPES.read().get(&id).map(|scope| scope.memo);
    if let Some(memo) = existing {
        return memo;
    }

    let mut scopes = TYPE_SCOPES.write();
    // Another thread may have won the race between the two locks.
    scopes
        .entry(id)
        .or_insert_with(|| {
            tracing::debug!(type_name = type_name::<T>(), "creating type memoization scope");
            TypeScope {
                name: type_name::<T>(),
                memo: Box::leak(Box::new(SharedMemo::new())),
            }
        })
        .memo
}

/// Names of all types that have a memoization scope.
///
/// # Examples
///
/// ```
/// use oncely_core::{registered_types, type_scope};
///
/// struct Registered;
/// type_scope::<Registered>();
/// assert!(registered_types().iter().any(|name| name.ends_with("Registered")));
/// ```
pub fn registered_types() -> Vec<&'static str> {
    TYPE_SCOPES.read().values().map(|scope| scope.name).collect()
}

/// Clears the cached results of every type scope.
///
/// Enabled flags are left untouched.
pub fn clear_type_scopes() {
    for scope in TYPE_SCOPES.read().values() {
        scope.memo.clear();
    }
}
