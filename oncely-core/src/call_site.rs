use std::borrow::Cow;
use std::fmt;

/// Source position of a memoized call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl From<&'static std::panic::Location<'static>> for Location {
    fn from(location: &'static std::panic::Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Identifies where a memoized call happens.
///
/// A call site is an operation name plus an optional source location. Two
/// `CallSiteId`s are equal exactly when both parts are equal, and only equal
/// call sites can share cache entries.
///
/// There are three ways to obtain one:
///
/// - [`CallSiteId::named`] - an explicit, location-free identifier
/// - [`CallSiteId::new`] - operation plus `file!()`/`line!()`/`column!()`,
///   which is what the `call_site!` macro expands to
/// - [`CallSiteId::caller`] - the location of the `#[track_caller]` caller
///
/// # Examples
///
/// ```
/// use oncely_core::CallSiteId;
///
/// let a = CallSiteId::named("load_config");
/// let b = CallSiteId::named("load_config");
/// assert_eq!(a, b);
///
/// let here = CallSiteId::new("load_config", file!(), line!(), column!());
/// assert_ne!(a, here);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSiteId {
    operation: Cow<'static, str>,
    location: Option<Location>,
}

impl CallSiteId {
    pub const fn new(operation: &'static str, file: &'static str, line: u32, column: u32) -> Self {
        Self {
            operation: Cow::Borrowed(operation),
            location: Some(Location { file, line, column }),
        }
    }

    pub fn named(operation: impl Into<Cow<'static, str>>) -> Self {
        Self {
            operation: operation.into(),
            location: None,
        }
    }

    /// Call site of whoever called the current `#[track_caller]` function.
    ///
    /// The operation name is empty: the location alone is unique per call
    /// expression.
    #[track_caller]
    pub fn caller() -> Self {
        Self {
            operation: Cow::Borrowed(""),
            location: Some(std::panic::Location::caller().into()),
        }
    }

    /// Same call site under a different operation name.
    pub fn with_operation(mut self, operation: impl Into<Cow<'static, str>>) -> Self {
        self.operation = operation.into();
        self
    }

    #[inline]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[inline]
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }
}

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.location, self.operation.is_empty()) {
            (Some(location), true) => write!(f, "{}", location),
            (Some(location), false) => write!(f, "{}@{}", self.operation, location),
            (None, _) => f.write_str(&self.operation),
        }
    }
}
