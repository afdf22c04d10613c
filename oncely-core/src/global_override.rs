use std::env;

/// Environment variable that can switch memoization off (or on) process-wide.
pub const OVERRIDE_VAR: &str = "MEMOIZATION_GLOBALLY_DISABLED";

/// Process-wide memoization override sourced from the environment.
///
/// The variable is read again on every check, so changing it at runtime takes
/// effect on the next memoized call.
///
/// | `MEMOIZATION_GLOBALLY_DISABLED`         | override            |
/// |-----------------------------------------|---------------------|
/// | unset or empty                          | none (local flag)   |
/// | `1`, `true`, `yes`, `on`                | `Some(false)`: off  |
/// | `0`, `false`, `no`, `off`               | `Some(true)`: on    |
/// | anything else                           | none, with a warning|
///
/// Values are trimmed and matched case-insensitively.
pub struct GlobalOverride;

impl GlobalOverride {
    /// Reads the override from [`OVERRIDE_VAR`].
    ///
    /// Returns the forced *enabled* state, or `None` to defer to the local flag.
    pub fn read() -> Option<bool> {
        Self::read_var(OVERRIDE_VAR)
    }

    /// Reads the override from an arbitrary variable.
    pub fn read_var(name: &str) -> Option<bool> {
        let raw = env::var_os(name)?;
        let Some(raw) = raw.to_str() else {
            tracing::warn!(variable = name, "ignoring non UTF-8 memoization override");
            return None;
        };
        if raw.trim().is_empty() {
            return None;
        }
        let parsed = Self::parse(raw);
        if parsed.is_none() {
            tracing::warn!(
                variable = name,
                value = raw,
                "ignoring unrecognized memoization override"
            );
        }
        parsed
    }

    /// Parses a "globally disabled" value into the forced enabled state.
    ///
    /// # Examples
    ///
    /// ```
    /// use oncely_core::GlobalOverride;
    ///
    /// assert_eq!(GlobalOverride::parse("true"), Some(false));
    /// assert_eq!(GlobalOverride::parse(" OFF "), Some(true));
    /// assert_eq!(GlobalOverride::parse("maybe"), None);
    /// ```
    pub fn parse(value: &str) -> Option<bool> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(false),
            "0" | "false" | "no" | "off" => Some(true),
            _ => None,
        }
    }
}
