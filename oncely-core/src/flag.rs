use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Local enable/disable switch of a memoization scope.
///
/// The flag is scoped exactly like the store it guards. It does not account
/// for the process-wide [`GlobalOverride`](crate::GlobalOverride); the engine
/// combines both.
pub trait EnabledFlag {
    fn with_state(enabled: bool) -> Self
    where
        Self: Sized;

    fn get(&self) -> bool;

    fn set(&self, enabled: bool);
}

/// Flag for single-owner scopes.
#[derive(Debug)]
pub struct LocalFlag(Cell<bool>);

impl EnabledFlag for LocalFlag {
    fn with_state(enabled: bool) -> Self {
        Self(Cell::new(enabled))
    }

    #[inline]
    fn get(&self) -> bool {
        self.0.get()
    }

    #[inline]
    fn set(&self, enabled: bool) {
        self.0.set(enabled);
    }
}

/// Flag for scopes shared between threads.
#[derive(Debug)]
pub struct SharedFlag(AtomicBool);

impl EnabledFlag for SharedFlag {
    fn with_state(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    #[inline]
    fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }
}
