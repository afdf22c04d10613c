/// Integration tests for failing computations: nothing is cached until one succeeds

use oncely::{CallSiteId, InstanceMemo, MemoError, SharedMemo};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, PartialEq)]
enum FetchError {
    Timeout,
    Memo(MemoError),
}

impl From<MemoError> for FetchError {
    fn from(err: MemoError) -> Self {
        FetchError::Memo(err)
    }
}

#[test]
fn test_failure_then_success() {
    let memo = InstanceMemo::new();
    let site = CallSiteId::named("fetch");
    let attempts = Cell::new(0);

    let fetch = || -> Result<String, FetchError> {
        memo.try_memoize(&site, &[&"https://example.invalid"], || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(FetchError::Timeout)
            } else {
                Ok(String::from("body"))
            }
        })
    };

    assert_eq!(fetch(), Err(FetchError::Timeout));
    assert_eq!(fetch(), Err(FetchError::Timeout));
    assert!(memo.is_empty());
    assert_eq!(fetch(), Ok(String::from("body")));
    assert_eq!(fetch(), Ok(String::from("body")));
    assert_eq!(attempts.get(), 3);
}

#[test]
fn test_panic_leaves_slot_empty() {
    let memo = InstanceMemo::new();
    let site = CallSiteId::named("explode");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        memo.memoize(&site, &[], || -> u32 { panic!("boom") })
    }));
    assert!(result.is_err());
    assert!(memo.is_empty());

    assert_eq!(memo.memoize(&site, &[], || 5u32).unwrap(), 5);
}

#[test]
fn test_shared_failure_is_retried_by_next_caller() {
    let memo = Arc::new(SharedMemo::new());
    let attempts = Arc::new(AtomicU32::new(0));

    let worker = {
        let memo = Arc::clone(&memo);
        let attempts = Arc::clone(&attempts);
        thread::spawn(move || -> Result<u32, FetchError> {
            memo.try_memoize(&CallSiteId::named("remote"), &[], || {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Timeout)
            })
        })
    };
    assert_eq!(worker.join().unwrap(), Err(FetchError::Timeout));

    let value: Result<u32, FetchError> = memo.try_memoize(&CallSiteId::named("remote"), &[], || {
        attempts.fetch_add(1, Ordering::SeqCst);
        Ok(99)
    });
    assert_eq!(value, Ok(99));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(memo.len(), 1);
}

#[test]
fn test_invalid_argument_reported_as_error() {
    let memo = InstanceMemo::new();
    let site = CallSiteId::named("weak");
    let weak = {
        let strong = Arc::new(1);
        Arc::downgrade(&strong)
    };

    let result: Result<u8, FetchError> = memo.try_memoize(&site, &[&1, &weak], || Ok(1));
    match result {
        Err(FetchError::Memo(MemoError::InvalidArgument { position, .. })) => {
            assert_eq!(position, 1)
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
