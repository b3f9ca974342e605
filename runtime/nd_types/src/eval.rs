//! Evaluation context: process-wide defaults that kernel compilation reads.

use std::fmt;
use std::str::FromStr;

use nd_ckernel::{AssignErrorMode, DEFAULT_ERROR_MODE};

/// Environment variable overriding [`EvalContext::default_errmode`].
pub const ERRMODE_ENV: &str = "ND_ASSIGN_ERRMODE";

/// Environment variable overriding [`EvalContext::century_window`].
pub const CENTURY_WINDOW_ENV: &str = "ND_CENTURY_WINDOW";

/// How ambiguous numeric dates such as `01/02/03` are read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DateParseOrder {
    /// Reject ambiguous dates.
    #[default]
    NoAmbig,
    Ymd,
    Mdy,
    Dmy,
}

impl DateParseOrder {
    pub const fn name(self) -> &'static str {
        match self {
            DateParseOrder::NoAmbig => "NoAmbig",
            DateParseOrder::Ymd => "YMD",
            DateParseOrder::Mdy => "MDY",
            DateParseOrder::Dmy => "DMY",
        }
    }
}

impl fmt::Display for DateParseOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown date parse order {0:?}, expected NoAmbig, YMD, MDY or DMY")]
pub struct ParseDateOrderError(String);

impl FromStr for DateParseOrder {
    type Err = ParseDateOrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "noambig" => Ok(DateParseOrder::NoAmbig),
            "ymd" => Ok(DateParseOrder::Ymd),
            "mdy" => Ok(DateParseOrder::Mdy),
            "dmy" => Ok(DateParseOrder::Dmy),
            _ => Err(ParseDateOrderError(s.to_owned())),
        }
    }
}

/// Defaults consulted while compiling kernels.
///
/// Passed by reference through every compile call; kernels never read it at
/// execution time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalContext {
    /// What [`AssignErrorMode::Default`] resolves to. Never `Default` itself.
    pub default_errmode: AssignErrorMode,
    pub date_parse_order: DateParseOrder,
    /// Two-digit years below this value are read as 20xx, the rest as 19xx.
    pub century_window: u32,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            default_errmode: DEFAULT_ERROR_MODE,
            date_parse_order: DateParseOrder::NoAmbig,
            century_window: 70,
        }
    }
}

impl EvalContext {
    /// Defaults with overrides from `ND_ASSIGN_ERRMODE` and `ND_CENTURY_WINDOW`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Malformed values are logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ERRMODE_ENV) {
            match raw.trim().parse::<AssignErrorMode>() {
                Ok(AssignErrorMode::Default) => {
                    tracing::warn!(var = ERRMODE_ENV, value = %raw, "default error mode cannot be `default`");
                }
                Ok(mode) => self.default_errmode = mode,
                Err(err) => tracing::warn!(var = ERRMODE_ENV, %err, "ignoring malformed override"),
            }
        }
        if let Some(raw) = lookup(CENTURY_WINDOW_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(window) if window < 100 => self.century_window = window,
                _ => tracing::warn!(var = CENTURY_WINDOW_ENV, value = %raw, "ignoring malformed override"),
            }
        }
        self
    }

    pub fn with_errmode(mut self, errmode: AssignErrorMode) -> Self {
        if errmode != AssignErrorMode::Default {
            self.default_errmode = errmode;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn defaults() {
        let ectx = EvalContext::default();
        assert_eq!(ectx.default_errmode, AssignErrorMode::Fractional);
        assert_eq!(ectx.date_parse_order, DateParseOrder::NoAmbig);
        assert_eq!(ectx.century_window, 70);
    }

    #[test]
    fn overrides_apply() {
        let ectx = EvalContext::default()
            .with_overrides(lookup(&[(ERRMODE_ENV, "overflow"), (CENTURY_WINDOW_ENV, "30")]));
        assert_eq!(ectx.default_errmode, AssignErrorMode::Overflow);
        assert_eq!(ectx.century_window, 30);
    }

    #[test]
    fn malformed_overrides_are_ignored() {
        let ectx = EvalContext::default().with_overrides(lookup(&[
            (ERRMODE_ENV, "default"),
            (CENTURY_WINDOW_ENV, "1999"),
        ]));
        assert_eq!(ectx, EvalContext::default());

        let ectx = EvalContext::default().with_overrides(lookup(&[(ERRMODE_ENV, "loose")]));
        assert_eq!(ectx.default_errmode, AssignErrorMode::Fractional);
    }

    #[test]
    fn date_order_parses_case_insensitively() {
        assert_eq!("ymd".parse::<DateParseOrder>(), Ok(DateParseOrder::Ymd));
        assert_eq!("DMY".parse::<DateParseOrder>(), Ok(DateParseOrder::Dmy));
        assert!("YDM".parse::<DateParseOrder>().is_err());
        assert_eq!(DateParseOrder::Mdy.to_string(), "MDY");
    }
}
