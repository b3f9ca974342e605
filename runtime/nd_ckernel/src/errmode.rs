use std::fmt;
use std::str::FromStr;

/// Strictness applied when a conversion can alter a value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AssignErrorMode {
    /// No checking.
    None,
    /// Reject values outside the destination range.
    Overflow,
    /// Also reject non-integral values narrowed to integers.
    Fractional,
    /// Also reject any floating-point precision loss.
    Inexact,
    /// Whatever the evaluation context is configured with.
    #[default]
    Default,
}

/// Library default for [`AssignErrorMode::Default`].
pub const DEFAULT_ERROR_MODE: AssignErrorMode = AssignErrorMode::Fractional;

/// Number of concrete modes, i.e. the innermost dispatch table dimension.
pub const ERROR_MODE_COUNT: usize = 4;

impl AssignErrorMode {
    /// Replace `Default` with `fallback`.
    #[inline]
    pub const fn resolve(self, fallback: AssignErrorMode) -> AssignErrorMode {
        match self {
            AssignErrorMode::Default => fallback,
            mode => mode,
        }
    }

    /// Table column for a concrete mode; `Default` maps to the library default.
    pub const fn index(self) -> usize {
        match self {
            AssignErrorMode::None => 0,
            AssignErrorMode::Overflow => 1,
            AssignErrorMode::Fractional => 2,
            AssignErrorMode::Inexact => 3,
            AssignErrorMode::Default => DEFAULT_ERROR_MODE.index(),
        }
    }

    pub const fn from_index(index: u8) -> AssignErrorMode {
        match index {
            0 => AssignErrorMode::None,
            1 => AssignErrorMode::Overflow,
            2 => AssignErrorMode::Fractional,
            _ => AssignErrorMode::Inexact,
        }
    }

    #[inline]
    pub const fn checks_overflow(self) -> bool {
        !matches!(self, AssignErrorMode::None)
    }

    #[inline]
    pub const fn checks_fractional(self) -> bool {
        matches!(self, AssignErrorMode::Fractional | AssignErrorMode::Inexact)
    }

    #[inline]
    pub const fn checks_inexact(self) -> bool {
        matches!(self, AssignErrorMode::Inexact)
    }

    pub const fn name(self) -> &'static str {
        match self {
            AssignErrorMode::None => "none",
            AssignErrorMode::Overflow => "overflow",
            AssignErrorMode::Fractional => "fractional",
            AssignErrorMode::Inexact => "inexact",
            AssignErrorMode::Default => "default",
        }
    }
}

impl fmt::Display for AssignErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown assignment error mode `{0}`")]
pub struct ParseErrorModeError(pub String);

impl FromStr for AssignErrorMode {
    type Err = ParseErrorModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(AssignErrorMode::None),
            "overflow" => Ok(AssignErrorMode::Overflow),
            "fractional" => Ok(AssignErrorMode::Fractional),
            "inexact" => Ok(AssignErrorMode::Inexact),
            "default" => Ok(AssignErrorMode::Default),
            _ => Err(ParseErrorModeError(s.to_owned())),
        }
    }
}
