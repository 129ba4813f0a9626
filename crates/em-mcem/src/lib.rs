//! # em-mcem
//!
//! The coupled numerical engines of emphasis: non-homogeneous Poisson
//! thinning that augments a reconstructed tree with missing species, the
//! parallel weighted expectation step, the Subplex maximization step, and
//! the single-pass MCEM driver that sequences them.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod augment;
mod e_step;
mod m_step;
mod mcem;

pub use augment::{augment_tree, AugmentationError};
pub use e_step::{e_step, normalize_log_weights, EStep};
pub use m_step::{m_step, MStep};
pub use mcem::{mcem, Mcem, McemOptions};

/// Default hard limit on latent species per tree.
pub const DEFAULT_MAX_MISSING: usize = 10_000;

/// Default hard upper bound on the thinning envelope.
pub const DEFAULT_MAX_AUG_LAMBDA: f64 = 500.0;

pub(crate) fn resolve_threads(requested: usize, threadsafe: bool) -> usize {
    if !threadsafe {
        1
    } else if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}
