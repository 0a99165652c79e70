//! Step-size selection.

/// Safety factor on the predicted step.
const SAFETY: f64 = 0.9;
/// Smallest step reduction after a failed error test.
const MIN_ETA: f64 = 0.2;
/// Largest growth on the first step.
const FIRST_STEP_GROWTH: f64 = 20.0;
/// Largest growth on later steps.
const GROWTH: f64 = 10.0;
/// Step reduction after a nonlinear solver failure.
pub(crate) const CONVERGENCE_FAILURE_ETA: f64 = 0.25;

/// Elementary integral controller, eta = safety * dsm^(-1/(p+1)).
#[derive(Clone, Copy, Debug)]
pub(crate) struct StepController {
    exponent: f64,
}

impl StepController {
    /// Controller for an embedding of order `p`.
    pub(crate) fn new(embedded_order: usize) -> Self {
        Self {
            exponent: 1.0 / (embedded_order as f64 + 1.0),
        }
    }

    /// Step-size ratio for a local error norm `dsm`.
    ///
    /// `accepted` disables growth after a rejection; `first` allows a larger
    /// jump on the very first step, whose size is only an estimate.
    pub(crate) fn eta(&self, dsm: f64, accepted: bool, first: bool) -> f64 {
        let max_growth = if !accepted {
            1.0
        } else if first {
            FIRST_STEP_GROWTH
        } else {
            GROWTH
        };
        if dsm <= 0.0 {
            return max_growth;
        }
        (SAFETY * dsm.powf(-self.exponent)).clamp(MIN_ETA, max_growth)
    }
}

/// Initial step estimate from the norms of y and y'.
///
/// `d0 = |y0|`, `d1 = |f(t0, y0)|`, both in the weighted norm.
pub(crate) fn initial_step(d0: f64, d1: f64, span: f64) -> f64 {
    let h = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
    h.min(span.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eta_limits() {
        let c = StepController::new(2);
        assert_eq!(c.eta(0.0, true, true), FIRST_STEP_GROWTH);
        assert_eq!(c.eta(1e-30, true, false), GROWTH);
        assert_eq!(c.eta(1e6, false, false), MIN_ETA);
        // Never grows after a rejection
        assert!(c.eta(0.5, false, false) <= 1.0);
    }

    #[test]
    fn test_eta_targets_unit_error() {
        let c = StepController::new(2);
        // dsm = 8 with p = 2: 0.9 * 8^(-1/3) = 0.45
        assert!((c.eta(8.0, true, false) - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_initial_step() {
        assert_eq!(initial_step(1.0, 1e-9, 1.0), 1e-6);
        assert!((initial_step(1.0, 2.0, 1.0) - 0.005).abs() < 1e-15);
        assert_eq!(initial_step(1e3, 1.0, 0.5), 0.5);
    }
}
