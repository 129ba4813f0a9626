//! Bounded derivative-free optimization.
//!
//! Provides [`Subplex`], a local minimizer that runs Nelder–Mead on a
//! sequence of restarted, rescaled simplices inside a box, and
//! [`golden_section_max`], a bounded 1-D maximizer used to bound
//! non-monotone thinning rates.

use crate::array::Array;
use em_core::{ensure, errors::Result, Real};

const DEFAULT_MAX_EVALUATIONS: usize = 10_000;
const MAX_OUTER_PASSES: usize = 50;
const STATIONARY_LIMIT: usize = 50;
const FUNCTION_EPSILON: Real = 1e-14;

// ── Status & result ───────────────────────────────────────────────────────────

/// The reason an optimization terminated.
///
/// `code()` follows the convention: negative ⇒ failure, 0 ⇒ generic success,
/// positive ⇒ a specific stop reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptStatus {
    /// Converged by function-value stagnation.
    Success,
    /// Converged by the relative parameter tolerance.
    XtolReached,
    /// Evaluation budget exhausted.
    MaxEvaluations,
    /// No finite objective value was found.
    Failure,
}

impl OptStatus {
    /// Integer return code.
    pub fn code(self) -> i32 {
        match self {
            OptStatus::Success => 0,
            OptStatus::XtolReached => 1,
            OptStatus::MaxEvaluations => 2,
            OptStatus::Failure => -1,
        }
    }

    /// Whether this status denotes a failed optimization.
    pub fn is_failure(self) -> bool {
        self.code() < 0
    }
}

/// Result of a [`Subplex`] minimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Final parameter values.
    pub x: Array,
    /// Final objective value.
    pub fmin: Real,
    /// Number of objective evaluations.
    pub evaluations: usize,
    /// Reason for termination.
    pub status: OptStatus,
}

// ── Subplex ───────────────────────────────────────────────────────────────────

/// Local derivative-free minimizer over a box.
///
/// Runs Nelder–Mead on a sequence of simplices: each pass starts from the
/// previous best point with steps rescaled to the progress just made, and the
/// whole search stops once a pass moves every coordinate by less than
/// `xtol_rel` relative to the current point.
pub struct Subplex {
    xtol_rel: Real,
    max_evaluations: usize,
}

impl Subplex {
    /// Create a minimizer with the given relative parameter tolerance.
    ///
    /// Non-positive `xtol_rel` falls back to `1e-8`.
    pub fn new(xtol_rel: Real) -> Self {
        Self {
            xtol_rel: if xtol_rel > 0.0 { xtol_rel } else { 1e-8 },
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
        }
    }

    /// Override the evaluation budget.
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    /// Minimize `f` starting from `x0`, constrained to `[lower, upper]`.
    ///
    /// `lower` and `upper` may be empty (unbounded); otherwise their length
    /// must match `x0`.  NaN objective values are treated as `+∞`.
    pub fn minimize<F>(
        &self,
        mut f: F,
        x0: &Array,
        lower: &[Real],
        upper: &[Real],
    ) -> Result<OptimizationResult>
    where
        F: FnMut(&Array) -> Real,
    {
        let n = x0.size();
        ensure!(n > 0, "cannot optimize over zero parameters");
        ensure!(
            lower.is_empty() || lower.len() == n,
            "lower bound has {} entries, expected {n}",
            lower.len()
        );
        ensure!(
            upper.is_empty() || upper.len() == n,
            "upper bound has {} entries, expected {n}",
            upper.len()
        );

        let clamp = |mut x: Array| -> Array {
            for i in 0..n {
                if !lower.is_empty() {
                    x[i] = x[i].max(lower[i]);
                }
                if !upper.is_empty() {
                    x[i] = x[i].min(upper[i]);
                }
            }
            x
        };
        let mut eval = |x: &Array, evals: &mut usize| -> Real {
            *evals += 1;
            let v = f(x);
            if v.is_nan() {
                Real::INFINITY
            } else {
                v
            }
        };

        let mut x = clamp(x0.clone());
        let mut evals = 0usize;
        let mut fx = eval(&x, &mut evals);
        let mut step = initial_step(&x, lower, upper);
        let mut status = OptStatus::Success;

        for _ in 0..MAX_OUTER_PASSES {
            let pass = nelder_mead_pass(
                &mut eval,
                &clamp,
                &x,
                fx,
                &step,
                self.xtol_rel,
                &mut evals,
                self.max_evaluations,
            );
            let dx: Vec<Real> = (0..n).map(|i| (pass.x[i] - x[i]).abs()).collect();
            x = pass.x;
            fx = pass.fmin;
            if evals >= self.max_evaluations {
                status = OptStatus::MaxEvaluations;
                break;
            }
            let converged = dx
                .iter()
                .enumerate()
                .all(|(i, &d)| d <= self.xtol_rel * x[i].abs().max(1.0));
            if converged {
                status = if pass.by_xtol {
                    OptStatus::XtolReached
                } else {
                    OptStatus::Success
                };
                break;
            }
            // rescale steps to the progress just made
            let progress: Real = dx.iter().sum::<Real>() / dx.len() as Real;
            let scale = if progress > 0.0 {
                let mean_step = step.iter().sum::<Real>() / n as Real;
                (progress / mean_step).clamp(0.1, 2.0)
            } else {
                0.5
            };
            for s in step.iter_mut() {
                *s *= scale;
            }
        }

        if !fx.is_finite() {
            status = OptStatus::Failure;
        }
        Ok(OptimizationResult {
            x,
            fmin: fx,
            evaluations: evals,
            status,
        })
    }
}

fn initial_step(x: &Array, lower: &[Real], upper: &[Real]) -> Vec<Real> {
    let n = x.size();
    (0..n)
        .map(|i| {
            let width = match (lower.is_empty(), upper.is_empty()) {
                (false, false) => upper[i] - lower[i],
                _ => Real::INFINITY,
            };
            let fallback = 0.1 * x[i].abs().max(1.0);
            if width.is_finite() && width > 0.0 {
                fallback.min(0.5 * width)
            } else {
                fallback
            }
        })
        .collect()
}

struct PassResult {
    x: Array,
    fmin: Real,
    by_xtol: bool,
}

/// One Nelder–Mead run from `x0` with per-coordinate steps `step`.
#[allow(clippy::too_many_arguments)]
fn nelder_mead_pass<E, C>(
    eval: &mut E,
    clamp: &C,
    x0: &Array,
    f0: Real,
    step: &[Real],
    xtol_rel: Real,
    evals: &mut usize,
    max_evals: usize,
) -> PassResult
where
    E: FnMut(&Array, &mut usize) -> Real,
    C: Fn(Array) -> Array,
{
    let n = x0.size();
    let np1 = n + 1;

    // Build initial simplex; fall back to the negative direction when a
    // vertex lands on the starting point after clamping.
    let mut vertices: Vec<Array> = Vec::with_capacity(np1);
    vertices.push(x0.clone());
    for i in 0..n {
        let mut v = x0.clone();
        v[i] += step[i];
        v = clamp(v);
        if v[i] == x0[i] {
            v[i] = x0[i] - step[i];
            v = clamp(v);
        }
        vertices.push(v);
    }
    let mut values: Vec<Real> = Vec::with_capacity(np1);
    values.push(f0);
    for v in vertices.iter().skip(1) {
        values.push(eval(v, evals));
    }

    let mut stationary_count = 0;
    let mut prev_best = Real::MAX;

    loop {
        // Find best, worst, second-worst
        let (mut ilo, mut ihi, mut inhi) = (0usize, 0, 0);
        for i in 0..np1 {
            if values[i] < values[ilo] {
                ilo = i;
            }
            if values[i] > values[ihi] {
                inhi = ihi;
                ihi = i;
            } else if i != ihi && values[i] > values[inhi] {
                inhi = i;
            }
        }

        // Convergence checks
        let small = (0..n).all(|j| {
            let diam = vertices
                .iter()
                .map(|v| (v[j] - vertices[ilo][j]).abs())
                .fold(0.0, Real::max);
            diam <= xtol_rel * vertices[ilo][j].abs().max(1.0)
        });
        if small {
            return PassResult {
                x: vertices[ilo].clone(),
                fmin: values[ilo],
                by_xtol: true,
            };
        }
        let delta = (prev_best - values[ilo]).abs();
        if delta.is_nan() || delta < FUNCTION_EPSILON {
            stationary_count += 1;
            if stationary_count >= STATIONARY_LIMIT {
                return PassResult {
                    x: vertices[ilo].clone(),
                    fmin: values[ilo],
                    by_xtol: false,
                };
            }
        } else {
            stationary_count = 0;
        }
        prev_best = values[ilo];

        if *evals >= max_evals {
            return PassResult {
                x: vertices[ilo].clone(),
                fmin: values[ilo],
                by_xtol: false,
            };
        }

        // Centroid (excluding worst)
        let mut centroid = Array::zeros(n);
        for (i, v) in vertices.iter().enumerate() {
            if i != ihi {
                centroid = centroid + v.clone();
            }
        }
        centroid = centroid / n as Real;

        // Reflection
        let reflected = clamp(&centroid * 2.0 - vertices[ihi].clone());
        let fr = eval(&reflected, evals);

        if fr < values[ilo] {
            // Expansion
            let expanded = clamp(&reflected * 2.0 - centroid.clone());
            let fe = eval(&expanded, evals);
            if fe < fr {
                vertices[ihi] = expanded;
                values[ihi] = fe;
            } else {
                vertices[ihi] = reflected;
                values[ihi] = fr;
            }
        } else if fr < values[inhi] {
            vertices[ihi] = reflected;
            values[ihi] = fr;
        } else {
            // Contraction
            let contracted = if fr < values[ihi] {
                // Outside contraction
                (&centroid + &reflected) / 2.0
            } else {
                // Inside contraction
                (&centroid + &vertices[ihi]) / 2.0
            };
            let fc = eval(&contracted, evals);
            if fc < values[ihi] {
                vertices[ihi] = contracted;
                values[ihi] = fc;
            } else {
                // Shrink all towards best
                for i in 0..np1 {
                    if i != ilo {
                        vertices[i] = (&vertices[ilo] + &vertices[i]) / 2.0;
                        values[i] = eval(&vertices[i], evals);
                    }
                }
            }
        }
    }
}

// ── 1-D bounded maximization ──────────────────────────────────────────────────

/// Maximize `f` on `[x_min, x_max]` by golden-section search.
///
/// Returns `(x, f(x))` for the best point evaluated, including the interval
/// endpoints, so a monotone `f` still yields its endpoint maximum.
pub fn golden_section_max<F>(mut f: F, x_min: Real, x_max: Real, xtol: Real) -> (Real, Real)
where
    F: FnMut(Real) -> Real,
{
    const INVPHI: Real = 0.618_033_988_749_894_9;
    let (mut a, mut b) = if x_min <= x_max {
        (x_min, x_max)
    } else {
        (x_max, x_min)
    };

    let mut best_x = a;
    let mut best_f = f(a);
    let fb = f(b);
    if fb > best_f {
        best_x = b;
        best_f = fb;
    }

    let mut c = b - INVPHI * (b - a);
    let mut d = a + INVPHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    while (b - a) > xtol * a.abs().max(b.abs()).max(1.0) {
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INVPHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INVPHI * (b - a);
            fd = f(d);
        }
        let (x, v) = if fc > fd { (c, fc) } else { (d, fd) };
        if v > best_f {
            best_x = x;
            best_f = v;
        }
    }
    (best_x, best_f)
}
