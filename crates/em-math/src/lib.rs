//! # em-math
//!
//! Numerical utilities for emphasis: the stable log-product accumulator,
//! truncated-exponential sampling, the analytic mu-integral, low-entropy
//! seeded random engines, and bounded derivative-free optimization over a
//! small array newtype (backed by nalgebra).

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod accumulators;
pub mod array;
pub mod distributions;
pub mod integrals;
pub mod optimization;
pub mod random_numbers;
