use std::any::type_name;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "stats")]
use crate::MemoStats;
use crate::{
    derive_key, normalize, Argument, CallSiteId, EnabledFlag, GlobalOverride, LocalFlag,
    LocalStore, MemoArg, MemoError, MemoStore, SharedFlag, SharedStore, Value,
};

/// Per-instance memoization scope: unsynchronized, owned by one value and
/// dropped with it.
pub type InstanceMemo = Memo<LocalStore, LocalFlag>;

/// Thread-safe memoization scope. Used for per-type scopes (see
/// [`type_scope`](crate::type_scope)), per-function statics, and as a
/// per-instance field on types that must be `Sync`.
pub type SharedMemo = Memo<SharedStore, SharedFlag>;

/// The memoization engine.
///
/// A `Memo` owns one store and one enabled flag. Every call goes through the
/// same steps:
///
/// 1. Resolve the effective enabled state: the [`GlobalOverride`] if set,
///    otherwise the local flag.
/// 2. Disabled: run the callback and return its result. The store is not
///    touched and arguments are not even normalized.
/// 3. Enabled: normalize the arguments, derive the [`CacheKey`](crate::CacheKey)
///    from the call site and the arguments, and let the store return the
///    cached result or run the callback exactly once to produce it.
///
/// Results of different types can live in one `Memo`; they are stored
/// type-erased and downcast on retrieval.
///
/// # Type Parameters
///
/// * `S` - The store ([`LocalStore`] or [`SharedStore`])
/// * `F` - The enabled flag ([`LocalFlag`] or [`SharedFlag`])
///
/// # Examples
///
/// ```
/// use oncely_core::{CallSiteId, InstanceMemo};
///
/// let memo = InstanceMemo::new();
/// let site = CallSiteId::named("number_for_letter");
///
/// let a = memo.memoize(&site, &[&'A'], || fastrand::u32(..)).unwrap();
/// let again = memo.memoize(&site, &[&'A'], || fastrand::u32(..)).unwrap();
/// assert_eq!(a, again);
///
/// let b = memo.memoize(&site, &[&'B'], || "B".to_string()).unwrap();
/// assert_eq!(b, "B");
/// ```
pub struct Memo<S, F> {
    store: S,
    flag: F,
    #[cfg(feature = "stats")]
    stats: MemoStats,
}

enum Args<'a> {
    Raw(&'a [&'a dyn MemoArg]),
    Normalized(&'a [Argument]),
}

/// Normalized arguments of a call that found its scope enabled.
///
/// Only [`Memo::prepare`] creates one, so holding a `Prepared` means the
/// enabled state has already been resolved for this call.
#[derive(Debug)]
pub struct Prepared {
    args: Vec<Argument>,
}

impl Prepared {
    pub fn args(&self) -> &[Argument] {
        &self.args
    }
}

impl<S: MemoStore + Default, F: EnabledFlag> Memo<S, F> {
    /// Creates an enabled, empty scope.
    pub fn new() -> Self {
        Self::with_state(true)
    }

    /// Creates an empty scope whose local flag starts disabled.
    pub fn disabled() -> Self {
        Self::with_state(false)
    }

    fn with_state(enabled: bool) -> Self {
        Self {
            store: S::default(),
            flag: F::with_state(enabled),
            #[cfg(feature = "stats")]
            stats: MemoStats::new(),
        }
    }
}

impl<S: MemoStore + Default, F: EnabledFlag> Default for Memo<S, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MemoStore, F: EnabledFlag> Memo<S, F> {
    pub fn enable(&self) {
        self.flag.set(true);
    }

    pub fn disable(&self) {
        self.flag.set(false);
    }

    /// Effective enabled state: the global override when set, otherwise the
    /// local flag.
    pub fn is_enabled(&self) -> bool {
        GlobalOverride::read().unwrap_or_else(|| self.flag.get())
    }

    /// Runs `callback` once per `(site, args)` and returns the cached result afterwards.
    ///
    /// # Errors
    ///
    /// * [`MemoError::InvalidArgument`] if an argument cannot be normalized;
    ///   the callback does not run.
    /// * [`MemoError::TypeMismatch`] if `site` already cached a result of
    ///   another type for these arguments.
    ///
    /// # Examples
    ///
    /// ```
    /// use oncely_core::{CallSiteId, InstanceMemo};
    ///
    /// let memo = InstanceMemo::new();
    /// let site = CallSiteId::named("nothing");
    /// let mut runs = 0;
    ///
    /// for _ in 0..3 {
    ///     memo.memoize(&site, &[], || runs += 1).unwrap();
    /// }
    /// assert_eq!(runs, 1);
    /// ```
    pub fn memoize<R, C>(
        &self,
        site: &CallSiteId,
        args: &[&dyn MemoArg],
        callback: C,
    ) -> Result<R, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> R,
    {
        unwrap_infallible(self.execute(site, Args::Raw(args), || Ok(callback()))?)
    }

    /// Fallible form of [`memoize`](Memo::memoize).
    ///
    /// Only `Ok` results are cached. An `Err` from `callback` is returned
    /// unchanged and the next call with the same context runs the callback
    /// again. Engine errors are converted into `E`.
    ///
    /// # Examples
    ///
    /// ```
    /// use oncely_core::{CallSiteId, MemoError, SharedMemo};
    ///
    /// #[derive(Debug)]
    /// enum FetchError {
    ///     Offline,
    ///     Memo(MemoError),
    /// }
    ///
    /// impl From<MemoError> for FetchError {
    ///     fn from(err: MemoError) -> Self {
    ///         FetchError::Memo(err)
    ///     }
    /// }
    ///
    /// let memo = SharedMemo::new();
    /// let site = CallSiteId::named("fetch");
    ///
    /// let first: Result<u32, FetchError> = memo.try_memoize(&site, &[&1], || Err(FetchError::Offline));
    /// assert!(first.is_err());
    ///
    /// let second: Result<u32, FetchError> = memo.try_memoize(&site, &[&1], || Ok(200));
    /// assert_eq!(second.unwrap(), 200);
    /// ```
    pub fn try_memoize<R, E, C>(
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
        self.execute(site, Args::Raw(args), callback)?
    }

    /// [`memoize`](Memo::memoize) with arguments that were already normalized.
    pub fn memoize_normalized<R, C>(
        &self,
        site: &CallSiteId,
        args: &[Argument],
        callback: C,
    ) -> Result<R, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> R,
    {
        unwrap_infallible(self.execute(site, Args::Normalized(args), || Ok(callback()))?)
    }

    /// [`try_memoize`](Memo::try_memoize) with arguments that were already
    /// normalized.
    ///
    /// Engine failures and callback failures are kept apart: the outer `Err`
    /// is a [`MemoError`], the inner one is the callback's own error.
    pub fn try_memoize_normalized<R, E, C>(
        &self,
        site: &CallSiteId,
        args: &[Argument],
        callback: C,
    ) -> Result<Result<R, E>, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> Result<R, E>,
    {
        self.execute(site, Args::Normalized(args), callback)
    }

    /// Resolves the enabled state once and, if enabled, normalizes `args`.
    ///
    /// Returns `Ok(None)` when memoization is disabled: the bypass is already
    /// recorded and the caller runs its computation directly. Arguments are
    /// not normalized in that case, so a disabled scope never rejects them.
    /// This is the entry point of `#[memoize]` expansions, which must
    /// normalize before the computation can take ownership of the arguments.
    ///
    /// # Examples
    ///
    /// ```
    /// use oncely_core::{CallSiteId, InstanceMemo};
    ///
    /// let memo = InstanceMemo::new();
    /// let site = CallSiteId::named("double");
    /// let x = 21;
    ///
    /// let value = match memo.prepare(&[&x]).unwrap() {
    ///     Some(prepared) => memo.memoize_prepared(&site, &prepared, || x * 2).unwrap(),
    ///     None => x * 2,
    /// };
    /// assert_eq!(value, 42);
    ///
    /// memo.disable();
    /// assert!(memo.prepare(&[&f64::NAN]).unwrap().is_none());
    /// ```
    pub fn prepare(&self, args: &[&dyn MemoArg]) -> Result<Option<Prepared>, MemoError> {
        if !self.is_enabled() {
            self.record_bypass();
            return Ok(None);
        }
        Ok(Some(Prepared {
            args: normalize(args)?,
        }))
    }

    /// Memoizes with arguments from [`prepare`](Memo::prepare), without
    /// reading the enabled state again.
    pub fn memoize_prepared<R, C>(
        &self,
        site: &CallSiteId,
        prepared: &Prepared,
        callback: C,
    ) -> Result<R, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> R,
    {
        unwrap_infallible(self.lookup(site, &prepared.args, || Ok(callback()))?)
    }

    /// Fallible form of [`memoize_prepared`](Memo::memoize_prepared); only
    /// `Ok` results are cached.
    pub fn try_memoize_prepared<R, E, C>(
        &self,
        site: &CallSiteId,
        prepared: &Prepared,
        callback: C,
    ) -> Result<Result<R, E>, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> Result<R, E>,
    {
        self.lookup(site, &prepared.args, callback)
    }

    /// Runs `callback` once for this call expression.
    ///
    /// The call site is the caller's source location and the argument set is
    /// empty, so every call from the same line and column shares one slot.
    ///
    /// # Examples
    ///
    /// ```
    /// use oncely_core::InstanceMemo;
    ///
    /// let memo = InstanceMemo::new();
    /// let values: Vec<u64> = (0..3u64)
    ///     .map(|i| memo.once(|| i * 100).unwrap())
    ///     .collect();
    /// assert_eq!(values, vec![0, 0, 0]);
    /// ```
    #[track_caller]
    pub fn once<R, C>(&self, callback: C) -> Result<R, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> R,
    {
        let site = CallSiteId::caller();
        self.memoize_normalized(&site, &[], callback)
    }

    /// Returns `true` if a result is stored for `(site, args)`.
    pub fn is_cached(&self, site: &CallSiteId, args: &[&dyn MemoArg]) -> Result<bool, MemoError> {
        let args = normalize(args)?;
        Ok(self.store.contains(&derive_key(site, &args)))
    }

    /// Drops every cached result. The enabled flag is left as it is.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns the hit, miss and bypass counters of this scope.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &MemoStats {
        &self.stats
    }

    fn execute<R, E, C>(
        &self,
        site: &CallSiteId,
        args: Args<'_>,
        callback: C,
    ) -> Result<Result<R, E>, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> Result<R, E>,
    {
        if !self.is_enabled() {
            tracing::debug!(call_site = %site, "memoization disabled, running computation directly");
            self.record_bypass();
            return Ok(callback());
        }

        match args {
            Args::Raw(raw) => self.lookup(site, &normalize(raw)?, callback),
            Args::Normalized(args) => self.lookup(site, args, callback),
        }
    }

    #[inline]
    fn record_bypass(&self) {
        #[cfg(feature = "stats")]
        self.stats.record_bypass();
    }

    fn lookup<R, E, C>(
        &self,
        site: &CallSiteId,
        args: &[Argument],
        callback: C,
    ) -> Result<Result<R, E>, MemoError>
    where
        R: Clone + Send + Sync + 'static,
        C: FnOnce() -> Result<R, E>,
    {
        let key = derive_key(site, args);

        let lookup = self.store.get_or_try_compute(key, || {
            tracing::trace!(call_site = %site, %key, "cache miss");
            #[cfg(feature = "stats")]
            self.stats.record_miss();
            callback().map(|value| Arc::new(value) as Value)
        });
        let lookup = match lookup {
            Ok(lookup) => lookup,
            Err(err) => return Ok(Err(err)),
        };

        if !lookup.computed {
            tracing::trace!(call_site = %site, %key, "cache hit");
            #[cfg(feature = "stats")]
            self.stats.record_hit();
        }

        match lookup.value.downcast_ref::<R>() {
            Some(value) => Ok(Ok(value.clone())),
            None => Err(MemoError::TypeMismatch {
                key,
                expected: type_name::<R>(),
            }),
        }
    }
}

fn unwrap_infallible<R>(result: Result<R, Infallible>) -> Result<R, MemoError> {
    match result {
        Ok(value) => Ok(value),
        Err(never) => match never {},
    }
}

impl<S: MemoStore, F: EnabledFlag> fmt::Debug for Memo<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("enabled", &self.flag.get())
            .field("entries", &self.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Failed,
        Memo(MemoError),
    }

    impl From<MemoError> for TestError {
        fn from(err: MemoError) -> Self {
            TestError::Memo(err)
        }
    }

    fn site(name: &'static str) -> CallSiteId {
        CallSiteId::named(name)
    }

    #[test]
    fn test_runs_once_per_context() {
        let memo = InstanceMemo::new();
        let calls = Cell::new(0);
        let first = memo
            .memoize(&site("random"), &[], || {
                calls.set(calls.get() + 1);
                fastrand::u32(1..=10_000_000)
            })
            .unwrap();
        for _ in 0..100 {
            let again = memo
                .memoize(&site("random"), &[], || {
                    calls.set(calls.get() + 1);
                    fastrand::u32(1..=10_000_000)
                })
                .unwrap();
            assert_eq!(again, first);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_arguments_discriminate() {
        let memo = InstanceMemo::new();
        let a = memo.memoize(&site("letter"), &[&'A'], || "A1".to_string()).unwrap();
        let b = memo.memoize(&site("letter"), &[&'B'], || "B1".to_string()).unwrap();
        assert_eq!(a, "A1");
        assert_eq!(b, "B1");
        assert_eq!(
            memo.memoize(&site("letter"), &[&'A'], || "A2".to_string()).unwrap(),
            "A1"
        );
        assert_eq!(memo.len(), 2);
    }

    #[test]
    fn test_call_sites_do_not_share_slots() {
        let memo = SharedMemo::new();
        let a = memo.memoize(&site("first"), &[], || 1).unwrap();
        let b = memo.memoize(&site("second"), &[], || 2).unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[test]
    fn test_unit_result_cached() {
        let memo = InstanceMemo::new();
        let calls = Cell::new(0);
        for _ in 0..3 {
            memo.memoize(&site("unit"), &[], || calls.set(calls.get() + 1))
                .unwrap();
        }
        assert_eq!(calls.get(), 1);
        assert!(memo.is_cached(&site("unit"), &[]).unwrap());
    }

    #[test]
    fn test_none_result_cached() {
        let memo = InstanceMemo::new();
        let calls = Cell::new(0);
        for _ in 0..3 {
            let value: Option<u8> = memo
                .memoize(&site("none"), &[], || {
                    calls.set(calls.get() + 1);
                    None
                })
                .unwrap();
            assert_eq!(value, None);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_disabled_bypasses_store() {
        let memo = InstanceMemo::disabled();
        assert!(!memo.is_enabled());
        let calls = Cell::new(0);
        for i in 0..3 {
            let value = memo
                .memoize(&site("bypass"), &[], || {
                    calls.set(calls.get() + 1);
                    i
                })
                .unwrap();
            assert_eq!(value, i);
        }
        assert_eq!(calls.get(), 3);
        assert!(memo.is_empty());
    }

    #[test]
    fn test_disabled_skips_normalization() {
        let memo = InstanceMemo::disabled();
        let value = memo.memoize(&site("nan"), &[&f64::NAN], || 5).unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_enable_after_disable_caches_again() {
        let memo = SharedMemo::new();
        memo.disable();
        assert_ne!(
            memo.memoize(&site("toggle"), &[], || 1).unwrap(),
            memo.memoize(&site("toggle"), &[], || 2).unwrap()
        );
        memo.enable();
        assert!(memo.is_enabled());
        assert_eq!(
            memo.memoize(&site("toggle"), &[], || 3).unwrap(),
            memo.memoize(&site("toggle"), &[], || 4).unwrap()
        );
    }

    #[test]
    fn test_invalid_argument_stops_before_callback() {
        let memo = InstanceMemo::new();
        let ran = Cell::new(false);
        let err = memo
            .memoize(&site("nan"), &[&1, &f64::NAN], || ran.set(true))
            .unwrap_err();
        assert!(matches!(err, MemoError::InvalidArgument { position: 1, .. }));
        assert!(!ran.get());
        assert!(memo.is_empty());
    }

    #[test]
    fn test_failure_is_retried() {
        let memo = InstanceMemo::new();
        let calls = Cell::new(0);
        let fail: Result<u32, TestError> = memo.try_memoize(&site("fallible"), &[&7], || {
            calls.set(calls.get() + 1);
            Err(TestError::Failed)
        });
        assert_eq!(fail, Err(TestError::Failed));
        assert!(memo.is_empty());

        for _ in 0..3 {
            let ok: Result<u32, TestError> = memo.try_memoize(&site("fallible"), &[&7], || {
                calls.set(calls.get() + 1);
                Ok(70)
            });
            assert_eq!(ok, Ok(70));
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_try_memoize_converts_engine_errors() {
        let memo = SharedMemo::new();
        let result: Result<u32, TestError> =
            memo.try_memoize(&site("nan"), &[&f32::NAN], || Ok(1));
        assert!(matches!(
            result,
            Err(TestError::Memo(MemoError::InvalidArgument { .. }))
        ));
    }

    #[test]
    fn test_try_memoize_normalized_separates_errors() {
        let memo = InstanceMemo::new();
        let args = normalize(&[&"x"]).unwrap();
        let inner: Result<Result<u8, &str>, MemoError> =
            memo.try_memoize_normalized(&site("sep"), &args, || Err("callback"));
        assert_eq!(inner, Ok(Err("callback")));
    }

    #[test]
    fn test_type_mismatch() {
        let memo = InstanceMemo::new();
        memo.memoize(&site("typed"), &[], || 1u32).unwrap();
        let err = memo
            .memoize(&site("typed"), &[], || String::from("oops"))
            .unwrap_err();
        match err {
            MemoError::TypeMismatch { expected, .. } => {
                assert_eq!(expected, type_name::<String>())
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_once_uses_call_expression() {
        let memo = InstanceMemo::new();
        let a = memo.once(|| 1).unwrap();
        let b = memo.once(|| 2).unwrap();
        assert_eq!((a, b), (1, 2));

        let repeated: Vec<i32> = (0..5).map(|i| memo.once(|| i).unwrap()).collect();
        assert_eq!(repeated, vec![0; 5]);
    }

    #[test]
    fn test_instances_are_isolated() {
        let x = InstanceMemo::new();
        let y = InstanceMemo::new();
        let vx = x.memoize(&site("same"), &[&1], || "x").unwrap();
        let vy = y.memoize(&site("same"), &[&1], || "y").unwrap();
        assert_eq!((vx, vy), ("x", "y"));
    }

    #[test]
    fn test_clear_keeps_flag() {
        let memo = SharedMemo::new();
        memo.memoize(&site("c"), &[], || 1).unwrap();
        memo.disable();
        memo.clear();
        assert!(memo.is_empty());
        assert!(!memo.is_enabled());
    }

    #[test]
    fn test_nested_memoized_calls() {
        let memo = InstanceMemo::new();
        let outer = memo
            .memoize(&site("outer"), &[], || {
                let inner = memo.memoize(&site("inner"), &[], || 20).unwrap();
                inner + 1
            })
            .unwrap();
        assert_eq!(outer, 21);
        assert_eq!(memo.len(), 2);
    }

    #[cfg(feature = "stats")]
    #[test]
    fn test_stats_counts() {
        let memo = InstanceMemo::new();
        for _ in 0..4 {
            memo.memoize(&site("s"), &[], || 0).unwrap();
        }
        memo.disable();
        memo.memoize(&site("s"), &[], || 0).unwrap();

        let stats = memo.stats();
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.hits(), 3);
        assert_eq!(stats.bypasses(), 1);
    }

    #[test]
    fn test_prepare_disabled_skips_normalization() {
        let memo = SharedMemo::disabled();
        assert!(memo.prepare(&[&f64::NAN]).unwrap().is_none());
        #[cfg(feature = "stats")]
        assert_eq!(memo.stats().bypasses(), 1);
    }

    #[test]
    fn test_prepare_enabled_normalizes() {
        let memo = InstanceMemo::new();
        let prepared = memo.prepare(&[&1u8, &"a"]).unwrap().unwrap();
        assert_eq!(prepared.args(), normalize(&[&1u8, &"a"]).unwrap().as_slice());

        let err = memo.prepare(&[&f32::NAN]).unwrap_err();
        assert!(matches!(err, MemoError::InvalidArgument { position: 0, .. }));
    }

    #[test]
    fn test_memoize_prepared_caches() {
        let memo = InstanceMemo::new();
        let prepared = memo.prepare(&[&3]).unwrap().unwrap();
        let a = memo.memoize_prepared(&site("p"), &prepared, || 9).unwrap();
        let b = memo.memoize_prepared(&site("p"), &prepared, || 10).unwrap();
        assert_eq!((a, b), (9, 9));

        let failed: Result<Result<u8, &str>, MemoError> =
            memo.try_memoize_prepared(&site("q"), &prepared, || Err("no"));
        assert_eq!(failed, Ok(Err("no")));
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn test_debug_output() {
        let memo = InstanceMemo::new();
        memo.memoize(&site("d"), &[], || 0).unwrap();
        assert_eq!(format!("{:?}", memo), "Memo { enabled: true, entries: 1 }");
    }
}
