//! # em-models
//!
//! The diversification-model interface and the concrete models shipped with
//! emphasis: `rpd1`, `ddd`, `rpd5`, and `rpd5c`.
//!
//! A model answers rate, likelihood, and sampling-probability queries about
//! a (possibly augmented) tree and may keep opaque per-tree scratch state,
//! owned by a [`StateGuard`].

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod ddd;
mod model;
mod rpd1;
mod rpd5;
mod rpd5c;
mod state;

pub use ddd::Ddd;
pub use model::Model;
pub use rpd1::Rpd1;
pub use rpd5::Rpd5;
pub use rpd5c::Rpd5c;
pub use state::StateGuard;
