//! obsbin: binned statistics of observation-space diagnostics
//!
//! obsbin reduces large sets of observation records (observed values, model
//! equivalents, departures) to compact statistics on an N-dimensional grid,
//! typically latitude and longitude. Each bin keeps `count`, `sum`, `sum2`,
//! `min` and `max`, from which `mean`, `variance`, `stddev` and `rmsd` are
//! derived on demand. Results computed separately, for example one file per
//! observing window, can be merged exactly.
//!
//! ## Module Organization
//!
//! - [`dimension`]: binning dimensions and their edges
//! - [`diagnostic`]: named diagnostics and the statistics they carry
//! - [`statistics`]: statistic registry, calc/merge engine and record binning
//! - [`grid`]: the binned field container
//! - [`records`]: unbinned observation records
//! - [`filters`]: record filters and the filter pipeline
//! - [`binned_statistics`]: the top-level [`BinnedStatistics`] container
//! - [`data_source`] and [`netcdf_io`]: persistence and observation input
//! - [`metadata`]: summaries of binned results
//! - [`parallel`]: thread pool configuration and the merge tree
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use obsbin::prelude::*;
//! use std::path::Path;
//!
//! let bins = vec!["latitude:r=10".parse::<Dimension>().unwrap()];
//! let diags = vec!["ombg".parse::<Diagnostic>().unwrap()];
//! let records = NetCDFObsReader.read_records(Path::new("obs.nc4")).unwrap();
//!
//! let binned = BinnedStatistics::bin(
//!     "example",
//!     bins,
//!     diags,
//!     &["brightnessTemperature".to_string()],
//!     Vec::new(),
//!     records,
//! )
//! .unwrap();
//! binned.write("binned.nc4", false).unwrap();
//! ```

pub mod binned_statistics;
pub mod cli;
pub mod data_source;
pub mod diagnostic;
pub mod dimension;
pub mod errors;
pub mod filters;
pub mod grid;
pub mod metadata;
pub mod netcdf_io;
pub mod parallel;
pub mod records;
pub mod statistics;

pub use binned_statistics::{BinnedFields, BinnedStatistics, Query};
pub use diagnostic::Diagnostic;
pub use dimension::Dimension;
pub use errors::{ErrorCategory, ObsBinError, Result};
pub use grid::{Coordinate, FieldKey, Grid};
pub use records::RecordSet;
pub use statistics::{Statistic, StatisticKind};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::binned_statistics::{BinnedFields, BinnedStatistics, Query};
    pub use crate::data_source::{BinnedStore, RecordSource};
    pub use crate::diagnostic::Diagnostic;
    pub use crate::dimension::Dimension;
    pub use crate::errors::{ObsBinError, Result};
    pub use crate::filters::{Filter, FilterRegistry};
    pub use crate::netcdf_io::{NetCDFObsReader, NetCDFStore};
    pub use crate::parallel::ParallelConfig;
    pub use crate::records::RecordSet;
    pub use crate::statistics::StatisticKind;
}
