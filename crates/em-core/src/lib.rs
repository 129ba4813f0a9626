//! # em-core
//!
//! Core types, traits, and error definitions for emphasis.
//!
//! This crate provides the foundational building blocks shared across all
//! other crates in the workspace – type aliases, the error taxonomy, and the
//! `ensure!` / `fail!` convenience macros.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Floating-point type used throughout the library.
pub type Real = f64;

/// A point in time on a phylogeny, measured from the root forward.
pub type Time = Real;

/// Alias used for array sizes / indices.
pub type Size = usize;

/// A vector of model parameters.
///
/// The meaning of each entry is model-specific, except for the first, which
/// is universally the per-lineage extinction rate μ.
pub type Params = Vec<Real>;

pub mod errors;

pub use errors::{Error, Result};
