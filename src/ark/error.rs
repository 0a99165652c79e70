//! Return conditions of the adaptive stepper.

use thiserror::Error;

/// Failures reported by [`ArkStep`](crate::ark::ArkStep).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArkError {
    /// Inconsistent input: bad table, bad tolerance, bad mode combination.
    #[error("illegal input: {0}")]
    IllegalInput(String),

    /// The vector provider could not supply another vector.
    #[error("vector allocation failed: {0}")]
    MemoryFail(String),

    /// A vector operation failed in the provider.
    #[error("vector operation failed: {0}")]
    Vector(String),

    /// A right-hand-side callback failed.
    #[error("{which} RHS failed at t = {time}: {message}")]
    RhsFailed {
        which: &'static str,
        time: f64,
        message: String,
    },

    /// The error test failed too many times within one step.
    #[error("error test failed {failures} times at t = {time} (h = {h:.3e})")]
    ErrorTestFailure { time: f64, h: f64, failures: usize },

    /// The nonlinear solver failed too many times within one step.
    #[error("nonlinear solver failed to converge {failures} times at t = {time} (h = {h:.3e})")]
    ConvergenceFailure { time: f64, h: f64, failures: usize },

    /// The step size underflowed relative to the current time.
    #[error("step size {h:.3e} too small at t = {time}")]
    StepTooSmall { time: f64, h: f64 },

    /// The accepted solution contains NaN or infinite values.
    #[error("solution is not finite at t = {time}")]
    NonFinite { time: f64 },

    /// Too many internal steps were taken before reaching the output time.
    #[error("{steps} internal steps taken before reaching t = {tout} (stopped at t = {time})")]
    TooMuchWork { time: f64, tout: f64, steps: usize },
}
