//! Numerically-stable accumulators.

use em_core::Real;

/// Below this running product, fold into the log term.
const LOGSUM_LOWER_THRESHOLD: Real = 10e-40;

/// Above this running product, fold into the log term.
const LOGSUM_UPPER_THRESHOLD: Real = 10e+40;

/// Accumulates the logarithm of a long product `∏ xᵢ` without underflow or
/// overflow.
///
/// The accumulator keeps the pair `(prod, sum)` with the invariant
/// `log(result) = log(prod) + sum`.  While `prod` stays inside a safe range
/// it is multiplied directly; once it leaves that range, `log(prod)` is
/// folded into `sum` and `prod` resets to 1.
///
/// # Example
/// ```
/// use em_math::accumulators::LogSum;
/// let mut acc = LogSum::default();
/// for _ in 0..5000 {
///     acc += 100.0;
/// }
/// assert!((acc.result() - 5000.0 * 100.0_f64.ln()).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct LogSum {
    prod: Real,
    sum: Real,
}

impl Default for LogSum {
    fn default() -> Self {
        Self { prod: 1.0, sum: 0.0 }
    }
}

impl LogSum {
    /// Multiply the accumulated product by `val`.
    pub fn add(&mut self, val: Real) {
        if (self.prod > LOGSUM_LOWER_THRESHOLD) && (self.prod < LOGSUM_UPPER_THRESHOLD) {
            self.prod *= val;
        } else {
            self.sum += self.prod.ln() + val.ln();
            self.prod = 1.0;
        }
    }

    /// The logarithm of the accumulated product.
    ///
    /// If the combination `log(prod) + sum` is non-finite, returns infinity
    /// with the sign of `sum`.
    pub fn result(&self) -> Real {
        let r = self.prod.ln() + self.sum;
        if !r.is_finite() {
            let s = if self.sum.is_sign_negative() { -1.0 } else { 1.0 };
            return s * Real::INFINITY;
        }
        r
    }
}

impl std::ops::AddAssign<Real> for LogSum {
    fn add_assign(&mut self, val: Real) {
        self.add(val);
    }
}
