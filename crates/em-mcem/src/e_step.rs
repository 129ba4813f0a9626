//! The weighted Monte-Carlo expectation step.
//!
//! Workers race to produce `sample_size` accepted augmented trees, each
//! weighted by `loglik − sampling_prob`.  Acceptance bookkeeping lives
//! behind one mutex; a stop flag set under that same mutex suppresses all
//! later appends.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use em_core::{ensure, Error, Real, Result};
use em_math::random_numbers::{make_random_engine, Reng};
use em_models::{Model, StateGuard};
use em_tree::Tree;
use log::debug;
use rayon::prelude::*;

use crate::augment::{augment_tree, AugmentationError};
use crate::mcem::McemOptions;
use crate::resolve_threads;

/// Result of one E-step.
#[derive(Debug, Default)]
pub struct EStep {
    /// Accepted augmented trees, in arrival order (unspecified).
    pub trees: Vec<Tree>,
    /// Importance weights aligned with `trees`, rescaled by the maximum
    /// log-weight.
    pub weights: Vec<Real>,
    /// Log-mean importance weight: the log of the estimated marginal
    /// likelihood.
    pub fhat: Real,
    /// Attempts rejected for exceeding the missing-species limit.
    pub rejected_overruns: usize,
    /// Attempts rejected for exceeding the thinning-envelope limit.
    pub rejected_lambda: usize,
    /// Attempts rejected for a zero or non-finite importance weight.
    pub rejected_zero_weights: usize,
    /// Elapsed wall time in milliseconds.
    pub elapsed_ms: f64,
}

impl EStep {
    /// Total number of rejected attempts.
    pub fn rejected(&self) -> usize {
        self.rejected_overruns + self.rejected_lambda + self.rejected_zero_weights
    }
}

#[derive(Default)]
struct Shared {
    trees: Vec<Tree>,
    log_weights: Vec<Real>,
    rejected_overruns: usize,
    rejected_lambda: usize,
    rejected_zero_weights: usize,
    error: Option<Error>,
}

thread_local! {
    // reusing these per worker reduces the load on the memory allocator
    static POOLED_TREE: RefCell<Tree> = RefCell::new(Tree::default());
    static ENGINE: RefCell<Reng> = RefCell::new(make_random_engine());
}

/// Rescale log-weights in place by their maximum and return `fhat`, the
/// numerically-stable log-mean weight.
///
/// `fhat = log(Σ exp(log_wᵢ − max)/count) + max`; shifting every `log_wᵢ`
/// by a constant shifts `fhat` by the same constant.
pub fn normalize_log_weights(log_weights: &mut [Real]) -> Real {
    let max_log_w = log_weights.iter().fold(Real::NEG_INFINITY, |a, &b| a.max(b));
    let mut sum_w = 0.0;
    for w in log_weights.iter_mut() {
        *w = (*w - max_log_w).exp();
        sum_w += *w;
    }
    (sum_w / log_weights.len() as Real).ln() + max_log_w
}

/// Run the expectation step: sample `options.sample_size` accepted augmented
/// trees with importance weights.
///
/// Fails with [`Error::MaxAttemptsExceeded`] when the attempt budget runs
/// out first, and re-raises any model failure recorded by a worker.
pub fn e_step<M: Model>(
    pars: &[Real],
    brts: &[Real],
    model: &M,
    options: &McemOptions,
) -> Result<EStep> {
    ensure!(
        pars.len() == model.nparams(),
        "expected {} parameters, got {}",
        model.nparams(),
        pars.len()
    );
    let t0 = Instant::now();
    let num_threads = resolve_threads(options.num_threads, model.is_threadsafe());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| Error::InvalidArgument(format!("thread pool: {e}")))?;

    let init_tree = Tree::from_branching_times(brts, options.soc as Real)?;
    let shared = Mutex::new(Shared::default());
    let stop = AtomicBool::new(false);

    pool.install(|| {
        (0..options.max_attempts).into_par_iter().for_each(|_| {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            POOLED_TREE.with(|buf| {
                ENGINE.with(|engine| {
                    let mut buf = buf.borrow_mut();
                    let mut rng = engine.borrow_mut();
                    run_attempt(
                        pars, &init_tree, model, options, &mut buf, &mut rng, &shared, &stop,
                    );
                })
            });
        })
    });

    let shared = shared.into_inner().unwrap();
    if let Some(error) = shared.error {
        return Err(error);
    }
    let accepted = shared.trees.len();
    if accepted < options.sample_size {
        return Err(Error::MaxAttemptsExceeded {
            requested: options.sample_size,
            accepted,
            max_attempts: options.max_attempts,
            rejected_overruns: shared.rejected_overruns,
            rejected_lambda: shared.rejected_lambda,
            rejected_zero_weights: shared.rejected_zero_weights,
        });
    }

    let mut result = EStep {
        trees: shared.trees,
        weights: shared.log_weights,
        fhat: 0.0,
        rejected_overruns: shared.rejected_overruns,
        rejected_lambda: shared.rejected_lambda,
        rejected_zero_weights: shared.rejected_zero_weights,
        elapsed_ms: 0.0,
    };
    result.fhat = normalize_log_weights(&mut result.weights);
    result.elapsed_ms = t0.elapsed().as_secs_f64() * 1e3;
    debug!(
        "E-step: {} accepted, {} rejected (overrun {}, lambda {}, zero-weight {}), fhat {:.6}, {:.1} ms",
        accepted,
        result.rejected(),
        result.rejected_overruns,
        result.rejected_lambda,
        result.rejected_zero_weights,
        result.fhat,
        result.elapsed_ms
    );
    Ok(result)
}

#[allow(clippy::too_many_arguments)]
fn run_attempt<M: Model>(
    pars: &[Real],
    init_tree: &Tree,
    model: &M,
    options: &McemOptions,
    buf: &mut Tree,
    rng: &mut Reng,
    shared: &Mutex<Shared>,
    stop: &AtomicBool,
) {
    let augmented = augment_tree(
        pars,
        init_tree,
        model,
        options.max_missing,
        options.max_lambda,
        buf,
        options.continuous,
        rng,
    );
    match augmented {
        Ok(()) => {
            let log_w = {
                let mut state = StateGuard::new(model);
                state.invalidate();
                model
                    .loglik(state.state(), pars, buf)
                    .and_then(|logf| Ok(logf - model.sampling_prob(state.state(), pars, buf)?))
            };
            match log_w {
                Ok(log_w) if log_w.is_finite() && log_w.exp() > 0.0 => {
                    let mut sh = shared.lock().unwrap();
                    if !stop.load(Ordering::Relaxed) {
                        sh.trees.push(buf.clone());
                        sh.log_weights.push(log_w);
                        if sh.trees.len() == options.sample_size {
                            stop.store(true, Ordering::Relaxed);
                        }
                    }
                }
                Ok(_) => {
                    shared.lock().unwrap().rejected_zero_weights += 1;
                }
                Err(e) => {
                    record_error(shared, stop, e);
                }
            }
        }
        Err(AugmentationError::Overrun) => {
            shared.lock().unwrap().rejected_overruns += 1;
        }
        Err(AugmentationError::Lambda) => {
            shared.lock().unwrap().rejected_lambda += 1;
        }
        Err(AugmentationError::Model(e)) => {
            record_error(shared, stop, e);
        }
    }
}

fn record_error(shared: &Mutex<Shared>, stop: &AtomicBool, error: Error) {
    let mut sh = shared.lock().unwrap();
    if sh.error.is_none() {
        sh.error = Some(error);
    }
    stop.store(true, Ordering::Relaxed);
}
