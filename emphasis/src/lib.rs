//! # emphasis
//!
//! Monte-Carlo Expectation-Maximization estimation of birth–death
//! diversification models from reconstructed phylogenies.
//!
//! The observed data are the branching times of present-day species; the
//! latent data are the lineages that went extinct or were never sampled.
//! An E-step samples many augmented trees by Poisson thinning and weighs
//! them by importance, an M-step maximizes the weighted complete-data
//! log-likelihood with a derivative-free optimizer.
//!
//! This crate is a **façade** that re-exports all public items from the
//! underlying workspace crates. Application code should depend on this
//! crate rather than the individual `em-*` crates.
//!
//! ## Quick start
//!
//! ```rust
//! use emphasis::mcem::{mcem, McemOptions};
//! use emphasis::models::Rpd1;
//!
//! // branching times in reverse-age convention, crown age 5
//! let brts = [5.0, 4.0, 3.0, 2.0, 1.0];
//! let options = McemOptions {
//!     sample_size: 2,
//!     max_attempts: 1000,
//!     lower_bound: vec![1e-8, 1e-8, -1.0],
//!     upper_bound: vec![5.0, 5.0, 1.0],
//!     num_threads: 1,
//!     ..McemOptions::default()
//! };
//! let fit = mcem(&[0.1, 0.5, 0.0], &brts, &Rpd1, &options).unwrap();
//! assert_eq!(fit.m.estimates.len(), 3);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Core types, aliases, and error definitions.
pub use em_core as core;

/// Numerical utilities, RNG, and derivative-free optimization.
pub use em_math as math;

/// The ordered tree representation.
pub use em_tree as tree;

/// The diversification-model interface and the shipped models.
pub use em_models as models;

/// Tree augmentation, the weighted E-step, the M-step, and the driver.
pub use em_mcem as mcem;
