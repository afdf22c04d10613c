use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::CacheKey;

/// Type-erased cached result.
///
/// Results of every type share one store; the engine downcasts on the way out.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Outcome of [`MemoStore::get_or_try_compute`].
#[derive(Clone)]
pub struct Lookup {
    pub value: Value,
    /// `true` if the computation ran during this call, `false` on a cache hit
    pub computed: bool,
}

/// Mapping from [`CacheKey`] to a cached result.
///
/// Presence is decided by key existence only. A stored `()` or `None` is a
/// cached result like any other and is never recomputed.
///
/// Stores are unbounded: entries live until [`clear`](MemoStore::clear) or
/// until the store is dropped.
pub trait MemoStore {
    /// Returns the value stored under `key`, running `compute` if there is none.
    ///
    /// `compute` runs at most once per successful insertion. If it fails the
    /// error is returned unchanged and nothing is stored, so the next call for
    /// the same key runs the computation again.
    fn get_or_try_compute<E, F>(&self, key: CacheKey, compute: F) -> Result<Lookup, E>
    where
        F: FnOnce() -> Result<Value, E>;

    /// Infallible form of [`get_or_try_compute`](MemoStore::get_or_try_compute).
    fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Lookup
    where
        F: FnOnce() -> Value,
    {
        match self.get_or_try_compute::<Infallible, _>(key, || Ok(compute())) {
            Ok(lookup) => lookup,
            Err(never) => match never {},
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Value>;

    fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Number of stored results.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every stored result.
    fn clear(&self);
}

/// Unsynchronized store for a single owner.
///
/// Backed by a `RefCell<HashMap>`, so it is `!Sync`: the owning instance is
/// only ever used from one thread at a time. The map is not borrowed while a
/// computation runs, which lets a computation make memoized calls of its own
/// on the same store.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use oncely_core::{CacheKey, LocalStore, MemoStore};
///
/// let store = LocalStore::new();
/// let key = CacheKey::from_bytes([1; 16]);
///
/// let first = store.get_or_compute(key, || Arc::new(42u32));
/// assert!(first.computed);
///
/// let second = store.get_or_compute(key, || Arc::new(0u32));
/// assert!(!second.computed);
/// assert_eq!(second.value.downcast_ref::<u32>(), Some(&42));
/// ```
#[derive(Default)]
pub struct LocalStore {
    entries: RefCell<HashMap<CacheKey, Value>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoStore for LocalStore {
    fn get_or_try_compute<E, F>(&self, key: CacheKey, compute: F) -> Result<Lookup, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        let cached = self.entries.borrow().get(&key).cloned();
        if let Some(value) = cached {
            return Ok(Lookup {
                value,
                computed: false,
            });
        }

        let value = compute()?;

        // A re-entrant computation may have filled the slot already; the first
        // stored result wins so every caller observes the same value.
        let value = self
            .entries
            .borrow_mut()
            .entry(key)
            .or_insert(value)
            .clone();
        Ok(Lookup {
            value,
            computed: true,
        })
    }

    fn get(&self, key: &CacheKey) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// Thread-safe store with at-most-once computation per key.
///
/// Each key maps to its own `OnceCell`. Concurrent callers for a key that is
/// not yet stored all wait on that cell while exactly one of them runs the
/// computation; afterwards every caller receives the same value. Calls for
/// other keys are not blocked. A failed computation leaves the cell empty,
/// and the next caller retries it.
///
/// A computation must not recursively request its own key from the same
/// store: it would wait on itself forever.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use oncely_core::{CacheKey, MemoStore, SharedStore};
///
/// let store = SharedStore::new();
/// let key = CacheKey::from_bytes([7; 16]);
///
/// let failed: Result<_, &str> = store.get_or_try_compute(key, || Err("offline"));
/// assert!(failed.is_err());
/// assert!(!store.contains(&key));
///
/// let lookup = store
///     .get_or_try_compute::<&str, _>(key, || Ok(Arc::new("online")))
///     .unwrap();
/// assert!(lookup.computed);
/// assert!(store.contains(&key));
/// ```
#[derive(Default)]
pub struct SharedStore {
    entries: DashMap<CacheKey, Arc<OnceCell<Value>>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoStore for SharedStore {
    fn get_or_try_compute<E, F>(&self, key: CacheKey, compute: F) -> Result<Lookup, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        // Clone the cell out so the shard lock is released before computing.
        let cell = Arc::clone(self.entries.entry(key).or_default().value());

        let mut computed = false;
        let value = match cell.get_or_try_init(|| {
            computed = true;
            compute()
        }) {
            Ok(value) => value.clone(),
            Err(err) => {
                // Drop the empty cell unless another caller is waiting on it.
                self.entries.remove_if(&key, |_, entry| {
                    Arc::ptr_eq(entry, &cell)
                        && entry.get().is_none()
                        && Arc::strong_count(entry) == 2
                });
                return Err(err);
            }
        };

        Ok(Lookup { value, computed })
    }

    fn get(&self, key: &CacheKey) -> Option<Value> {
        self.entries.get(key).and_then(|cell| cell.get().cloned())
    }

    fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    /// Forgets every stored result.
    ///
    /// Computations already running finish into cells that are no longer
    /// reachable: a caller arriving after `clear` computes its key again, even
    /// while the earlier computation for that key is still in flight.
    fn clear(&self) {
        self.entries.clear();
    }
}
