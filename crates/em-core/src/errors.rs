//! Error types for emphasis.
//!
//! A single `thiserror`-derived enum covers every fatal condition in the
//! workspace.  The counted rejection classes of the sampling step (overrun,
//! lambda, zero-weight) are deliberately *not* represented here — they are
//! statistics, not errors, and surface as tallies on the E-step result.

use thiserror::Error;

/// The top-level error type used throughout emphasis.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Fewer than the requested number of augmented trees were accepted
    /// within the attempt budget.  Carries the rejection tallies so callers
    /// can still see why sampling failed.
    #[error("{accepted} of {requested} trees accepted within {max_attempts} attempts")]
    MaxAttemptsExceeded {
        /// Number of trees requested.
        requested: usize,
        /// Number of trees accepted before the budget ran out.
        accepted: usize,
        /// The attempt budget.
        max_attempts: usize,
        /// Attempts rejected for exceeding the missing-species limit.
        rejected_overruns: usize,
        /// Attempts rejected for exceeding the thinning-envelope limit.
        rejected_lambda: usize,
        /// Attempts rejected for a zero or non-finite importance weight.
        rejected_zero_weights: usize,
    },

    /// The E-step produced no trees, so there is nothing to optimize.
    #[error("no trees, no optimization")]
    NoTrees,

    /// A diversification model signalled an exceptional failure.
    #[error("model failure: {0}")]
    Model(String),

    /// The optimizer could not make progress.
    #[error("optimizer failure: {0}")]
    Optimizer(String),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Shorthand `Result` type used throughout emphasis.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Returns `Err(Error::InvalidArgument(...))` if `$cond` is false.
///
/// # Example
/// ```
/// use em_core::ensure;
/// fn positive(x: f64) -> em_core::Result<f64> {
///     ensure!(x > 0.0, "x must be positive, got {x}");
///     Ok(x)
/// }
/// assert!(positive(1.0).is_ok());
/// assert!(positive(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::InvalidArgument(
                format!($($msg)*)
            ));
        }
    };
}

/// Returns `Err(Error::Model(...))` immediately.
///
/// # Example
/// ```
/// use em_core::fail;
/// fn always_err() -> em_core::Result<()> {
///     fail!("something went wrong");
/// }
/// assert!(always_err().is_err());
/// ```
#[macro_export]
macro_rules! fail {
    ($($msg:tt)*) => {
        return Err($crate::errors::Error::Model(format!($($msg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = Error::MaxAttemptsExceeded {
            requested: 100,
            accepted: 7,
            max_attempts: 10,
            rejected_overruns: 0,
            rejected_lambda: 3,
            rejected_zero_weights: 0,
        };
        assert_eq!(e.to_string(), "7 of 100 trees accepted within 10 attempts");
        assert_eq!(Error::NoTrees.to_string(), "no trees, no optimization");
    }
}
