//! The single-pass MCEM driver and its options.

use em_core::{ensure, Error, Params, Real, Result};
use em_models::Model;
use log::info;

use crate::e_step::{e_step, EStep};
use crate::m_step::{m_step, MStep};
use crate::{DEFAULT_MAX_AUG_LAMBDA, DEFAULT_MAX_MISSING};

/// Configuration for the E- and M-steps.
#[derive(Debug, Clone)]
pub struct McemOptions {
    /// Target number of accepted augmented trees per E-step.
    pub sample_size: usize,
    /// Maximum augmentation attempts before the E-step fails.
    pub max_attempts: usize,
    /// Initial lineage count at the root (2 = crown, 1 = stem).
    pub soc: u32,
    /// Hard limit on latent species per tree.
    pub max_missing: usize,
    /// Hard upper bound on the thinning envelope.
    pub max_lambda: Real,
    /// Optimizer box, lower side; empty uses the model's hint.
    pub lower_bound: Params,
    /// Optimizer box, upper side; empty uses the model's hint.
    pub upper_bound: Params,
    /// Optimizer stopping tolerance on relative parameter change.
    pub xtol_rel: Real,
    /// Worker count; 0 means hardware concurrency.  Forced to 1 when the
    /// model is not thread-safe.
    pub num_threads: usize,
    /// Whether the returned result keeps the augmented trees.
    pub copy_trees: bool,
    /// Use the two-endpoint envelope; disable for models whose thinning
    /// rate is not monotone between nodes.
    pub continuous: bool,
}

impl Default for McemOptions {
    fn default() -> Self {
        Self {
            sample_size: 100,
            max_attempts: 100_000,
            soc: 2,
            max_missing: DEFAULT_MAX_MISSING,
            max_lambda: DEFAULT_MAX_AUG_LAMBDA,
            lower_bound: Params::new(),
            upper_bound: Params::new(),
            xtol_rel: 0.001,
            num_threads: 0,
            copy_trees: false,
            continuous: true,
        }
    }
}

/// Result of one MCEM pass.
#[derive(Debug)]
pub struct Mcem {
    /// The expectation step's trees, weights, and rejection statistics.
    pub e: EStep,
    /// The maximization step's estimates and optimizer status.
    pub m: MStep,
}

impl Mcem {
    /// Total elapsed wall time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.e.elapsed_ms + self.m.elapsed_ms
    }
}

/// Run one MCEM pass: an E-step followed by an M-step on the surviving
/// trees.
///
/// Callers wanting multiple rounds re-invoke this with the previous
/// estimates.  Fails with [`Error::NoTrees`] when the E-step yields nothing
/// to optimize.
pub fn mcem<M: Model>(
    pars: &[Real],
    brts: &[Real],
    model: &M,
    options: &McemOptions,
) -> Result<Mcem> {
    ensure!(
        pars.len() == model.nparams(),
        "expected {} parameters, got {}",
        model.nparams(),
        pars.len()
    );
    info!(
        "mcem: {} speciations, model '{}', N = {}",
        brts.len(),
        model.description(),
        options.sample_size
    );
    let mut e = e_step(pars, brts, model, options)?;
    if e.trees.is_empty() {
        return Err(Error::NoTrees);
    }
    let m = m_step(pars, &e.trees, &e.weights, model, options)?;
    info!(
        "mcem: opt {} ({}), estimates {:?}, fhat {:.6}",
        m.opt.code(),
        if m.opt.is_failure() { "fail" } else { "ok" },
        m.estimates,
        e.fhat
    );
    if !options.copy_trees {
        e.trees.clear();
    }
    Ok(Mcem { e, m })
}

#[cfg(test)]
mod tests {
    use super::*;
    use em_models::Rpd1;

    const BRTS: [Real; 5] = [5.0, 4.0, 3.0, 2.0, 1.0];

    fn options() -> McemOptions {
        McemOptions {
            sample_size: 5,
            max_attempts: 2000,
            lower_bound: vec![1e-8, 1e-8, -1.0],
            upper_bound: vec![5.0, 5.0, 1.0],
            xtol_rel: 1e-4,
            num_threads: 2,
            copy_trees: true,
            ..McemOptions::default()
        }
    }

    #[test]
    fn full_pass_produces_estimates() {
        let result = mcem(&[0.1, 0.5, 0.0], &BRTS, &Rpd1, &options()).unwrap();
        assert_eq!(result.e.trees.len(), 5);
        assert_eq!(result.e.weights.len(), 5);
        assert_eq!(result.m.estimates.len(), 3);
        assert!(result.m.estimates.iter().all(|p| p.is_finite()));
        assert!(!result.m.opt.is_failure());
        assert!(result.elapsed_ms() >= 0.0);
    }

    #[test]
    fn trees_are_dropped_unless_requested() {
        let opts = McemOptions {
            copy_trees: false,
            ..options()
        };
        let result = mcem(&[0.1, 0.5, 0.0], &BRTS, &Rpd1, &opts).unwrap();
        assert!(result.e.trees.is_empty());
        assert_eq!(result.e.weights.len(), 5);
    }

    #[test]
    fn exhausted_budget_surfaces_the_e_step_error() {
        let opts = McemOptions {
            max_attempts: 3,
            sample_size: 50,
            max_lambda: 1e-30,
            ..options()
        };
        let err = mcem(&[0.1, 0.5, 0.0], &BRTS, &Rpd1, &opts).unwrap_err();
        assert!(matches!(err, Error::MaxAttemptsExceeded { .. }));
    }
}
