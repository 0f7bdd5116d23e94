//! Statistic computation and merge engine
//!
//! This module provides the per-bin statistics that make up a binned result
//! and the rules for combining independently computed ones.
//!
//! # Organization
//!
//! This module is organized into submodules:
//! - [`operations`]: The statistic registry and the core/derived capability traits
//! - [`engine`]: [`Statistic`], which calculates, merges and evaluates one field of a grid
//! - [`binning`]: Record-to-bin lookup and per-bin reductions
//! - [`numeric`]: NaN- and zero-guarded elementwise helpers

pub mod binning;
pub mod engine;
pub mod numeric;
pub mod operations;

pub use binning::Binner;
pub use engine::Statistic;
pub use operations::{
    Computable, CoreStatistic, Derivable, DerivedStatistic, StatisticKind, StatisticRole,
    StatisticSource,
};
