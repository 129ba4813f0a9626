//! Analytic integrals used by the diversification models.

use em_core::Real;

/// Evaluates `∫_{t0}^{t1} (1 − exp(−μ·(t_end − t))) dt` in closed form:
///
/// `(t1 − t0) − s·(exp(μ·t1) − exp(μ·t0))` with `s = 1/(μ·exp(μ·t_end))`.
///
/// The previous `exp(μ·t1)` is memoized, so a sequence of calls on abutting
/// intervals `(t0, t1), (t1, t2), …` computes one exponential per call.
#[derive(Debug, Clone)]
pub struct MuIntegral {
    mu: Real,
    s: Real,
    prev_t1: Real,
    exp_t1: Real,
}

impl MuIntegral {
    /// Set up the integral for extinction rate `mu` and present time `t_end`.
    pub fn new(mu: Real, t_end: Real) -> Self {
        Self {
            mu,
            s: 1.0 / (mu * (mu * t_end).exp()),
            prev_t1: -1.0,
            exp_t1: 0.0,
        }
    }

    /// Evaluate the integral over `[t0, t1]`.
    pub fn integrate(&mut self, t0: Real, t1: Real) -> Real {
        let exp_t0 = if self.prev_t1 == t0 {
            self.exp_t1
        } else {
            (self.mu * t0).exp()
        };
        self.exp_t1 = (self.mu * t1).exp();
        self.prev_t1 = t1;
        (t1 - t0) - self.s * (self.exp_t1 - exp_t0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn reference(mu: Real, t_end: Real, t0: Real, t1: Real) -> Real {
        // straightforward evaluation, no memo
        let s = 1.0 / (mu * (mu * t_end).exp());
        (t1 - t0) - s * ((mu * t1).exp() - (mu * t0).exp())
    }

    #[test]
    fn closed_form_value() {
        // 10 - 2*(1 - e^-5)
        let mut muint = MuIntegral::new(0.5, 10.0);
        assert_relative_eq!(muint.integrate(0.0, 10.0), 8.013475893998170, max_relative = 1e-10);
    }

    #[test]
    fn abutting_intervals_sum_to_whole() {
        let mut muint = MuIntegral::new(0.3, 8.0);
        let split = muint.integrate(0.0, 3.0) + muint.integrate(3.0, 5.5) + muint.integrate(5.5, 8.0);
        assert_relative_eq!(split, reference(0.3, 8.0, 0.0, 8.0), max_relative = 1e-12);
    }

    #[test]
    fn memo_reuse_does_not_change_results() {
        let mut muint = MuIntegral::new(0.9, 6.0);
        // abutting, then a jump that must bypass the memo
        let a = muint.integrate(0.0, 2.0);
        let b = muint.integrate(2.0, 4.0);
        let c = muint.integrate(1.0, 3.0);
        assert_relative_eq!(a, reference(0.9, 6.0, 0.0, 2.0), max_relative = 1e-12);
        assert_relative_eq!(b, reference(0.9, 6.0, 2.0, 4.0), max_relative = 1e-12);
        assert_relative_eq!(c, reference(0.9, 6.0, 1.0, 3.0), max_relative = 1e-12);
    }

    proptest! {
        #[test]
        fn agrees_with_quadrature(
            mu in 0.05_f64..2.0,
            t_end in 1.0_f64..20.0,
            a in 0.0_f64..1.0,
            w in 0.0_f64..1.0,
        ) {
            let t0 = a * t_end;
            let t1 = t0 + w * (t_end - t0);
            // composite Simpson on the integrand
            let n = 2000;
            let h = (t1 - t0) / n as Real;
            let f = |t: Real| 1.0 - (-mu * (t_end - t)).exp();
            let mut acc = f(t0) + f(t1);
            for i in 1..n {
                let c = if i % 2 == 0 { 2.0 } else { 4.0 };
                acc += c * f(t0 + i as Real * h);
            }
            let quad = acc * h / 3.0;
            let mut muint = MuIntegral::new(mu, t_end);
            prop_assert!((muint.integrate(t0, t1) - quad).abs() <= 1e-8 * quad.abs().max(1.0));
        }
    }
}
