//! Tree augmentation by thinning of a non-homogeneous Poisson process.
//!
//! Candidate speciation times are drawn from a homogeneous process at an
//! envelope rate bounding the model's thinning rate on the current
//! inter-node interval, then accepted with probability `rate/envelope`.
//! Accepted candidates insert a missing-speciation/extinction pair and the
//! walk continues from the candidate time.

use em_core::{Real, Time};
use em_math::optimization::golden_section_max;
use em_math::random_numbers::{uniform01, Reng};
use em_models::{Model, StateGuard};
use em_tree::Tree;
use thiserror::Error;

/// Relative tolerance of the envelope maximization in the numerical variant.
const ENVELOPE_XTOL: Real = 1e-4;

/// Why an augmentation attempt was abandoned.
///
/// `Overrun` and `Lambda` are counted rejections, not fatal conditions;
/// `Model` is fatal to the surrounding E-step.
#[derive(Debug, Error)]
pub enum AugmentationError {
    /// The number of inserted missing species exceeded the configured limit.
    #[error("augmentation overrun: too many missing species")]
    Overrun,
    /// The thinning envelope exceeded the configured maximum.
    #[error("augmentation envelope exceeded the lambda limit")]
    Lambda,
    /// The model signalled an exceptional failure.
    #[error(transparent)]
    Model(#[from] em_core::Error),
}

/// Augment `input_tree` into `pooled`, inserting missing species under
/// `model` with parameters `pars`.
///
/// `pooled` is overwritten; reusing one buffer per worker avoids allocator
/// pressure.  With `cont` the envelope is the two-endpoint maximum of the
/// thinning rate; otherwise the rate is maximized numerically on each
/// interval.  The `pd` column is recomputed before returning.
pub fn augment_tree<M: Model>(
    pars: &[Real],
    input_tree: &Tree,
    model: &M,
    max_missing: usize,
    max_lambda: Real,
    pooled: &mut Tree,
    cont: bool,
    rng: &mut Reng,
) -> Result<(), AugmentationError> {
    pooled.clone_from(input_tree);
    if cont {
        augment_continuous(pars, pooled, model, max_missing, max_lambda, rng)?;
    } else {
        augment_numerical(pars, pooled, model, max_missing, max_lambda, rng)?;
    }
    pooled.calculate_pd();
    Ok(())
}

/// Continuous variant: the envelope on `[cbt, next_bt]` is the larger of the
/// endpoint rates.  The left endpoint is reused from the previous interval's
/// right endpoint while the tree is unchanged.
fn augment_continuous<M: Model>(
    pars: &[Real],
    tree: &mut Tree,
    model: &M,
    max_missing: usize,
    max_lambda: Real,
    rng: &mut Reng,
) -> Result<(), AugmentationError> {
    let mut cbt: Time = 0.0;
    tree.reserve(4 * tree.len());
    let mut num_missing = 0usize;
    let b = tree.present_time();
    let mut state = StateGuard::new(model);
    state.invalidate();
    let mut lambda2 = 0.0;
    let mut dirty = true;
    while cbt < b {
        let next_bt = tree.next_branching_time(cbt);
        let lambda1 = if dirty {
            model.nh_rate(state.state(), cbt, pars, tree)?.max(0.0)
        } else {
            lambda2
        };
        lambda2 = model.nh_rate(state.state(), next_bt, pars, tree)?.max(0.0);
        let lambda_max = lambda1.max(lambda2);
        if lambda_max > max_lambda {
            return Err(AugmentationError::Lambda);
        }
        let u1 = uniform01(rng);
        let next_speciation_time = cbt - u1.ln() / lambda_max;
        dirty = false;
        if next_speciation_time < next_bt {
            let u2 = uniform01(rng);
            let pt = model
                .nh_rate(state.state(), next_speciation_time, pars, tree)?
                .max(0.0)
                / lambda_max;
            if u2 < pt {
                let t_ext =
                    model.extinction_time(state.state(), next_speciation_time, pars, tree, rng)?;
                tree.insert_species(next_speciation_time, t_ext);
                num_missing += 1;
                if num_missing > max_missing {
                    return Err(AugmentationError::Overrun);
                }
                dirty = true;
                state.invalidate();
            }
        }
        cbt = next_speciation_time.min(next_bt);
    }
    Ok(())
}

/// Numerical variant: the envelope is found by bounded 1-D maximization of
/// the thinning rate on each interval.  Needed when the rate is not
/// monotone between nodes.
fn augment_numerical<M: Model>(
    pars: &[Real],
    tree: &mut Tree,
    model: &M,
    max_missing: usize,
    max_lambda: Real,
    rng: &mut Reng,
) -> Result<(), AugmentationError> {
    let mut cbt: Time = 0.0;
    tree.reserve(4 * tree.len());
    let mut num_missing = 0usize;
    let b = tree.present_time();
    let mut state = StateGuard::new(model);
    state.invalidate();
    while cbt < b {
        let next_bt = tree.next_branching_time(cbt);
        let lambda_max = maximize_nh_rate(&mut state, cbt, next_bt, pars, tree, model)?;
        if lambda_max > max_lambda {
            return Err(AugmentationError::Lambda);
        }
        let u1 = uniform01(rng);
        let next_speciation_time = cbt - u1.ln() / lambda_max;
        if next_speciation_time < next_bt {
            let u2 = uniform01(rng);
            let pt = model
                .nh_rate(state.state(), next_speciation_time, pars, tree)?
                .max(0.0)
                / lambda_max;
            if u2 < pt {
                let t_ext =
                    model.extinction_time(state.state(), next_speciation_time, pars, tree, rng)?;
                tree.insert_species(next_speciation_time, t_ext);
                num_missing += 1;
                if num_missing > max_missing {
                    return Err(AugmentationError::Overrun);
                }
                state.invalidate();
            }
        }
        cbt = next_speciation_time.min(next_bt);
    }
    Ok(())
}

fn maximize_nh_rate<M: Model>(
    state: &mut StateGuard<'_, M>,
    t0: Time,
    t1: Time,
    pars: &[Real],
    tree: &Tree,
    model: &M,
) -> Result<Real, AugmentationError> {
    let mut model_err: Option<em_core::Error> = None;
    let (_, lambda_max) = golden_section_max(
        |t| match model.nh_rate(state.state(), t, pars, tree) {
            Ok(v) => v.max(0.0),
            Err(e) => {
                model_err.get_or_insert(e);
                Real::NEG_INFINITY
            }
        },
        t0,
        t1,
        ENVELOPE_XTOL,
    );
    match model_err {
        Some(e) => Err(e.into()),
        None => Ok(lambda_max),
    }
}
