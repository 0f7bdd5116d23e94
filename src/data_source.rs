//! Storage abstractions for binned results and unbinned records
//!
//! [`BinnedStore`] persists and restores [`BinnedState`], the plain-data
//! snapshot of a [`crate::BinnedStatistics`]. [`RecordSource`] produces the
//! [`RecordSet`] that binning consumes. The NetCDF implementations live in
//! [`crate::netcdf_io`].

use crate::diagnostic::Diagnostic;
use crate::dimension::Dimension;
use crate::errors::Result;
use crate::grid::Grid;
use crate::records::RecordSet;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Label used when the source of the observations is not known
pub const UNKNOWN_LABEL: &str = "unknown";

/// File-level description of a binned result
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalAttributes {
    pub obs_source: String,
    pub experiment: String,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

impl Default for GlobalAttributes {
    fn default() -> Self {
        Self {
            obs_source: UNKNOWN_LABEL.to_string(),
            experiment: UNKNOWN_LABEL.to_string(),
            window_start: None,
            window_end: None,
        }
    }
}

/// Everything a store needs to persist a binned result
#[derive(Debug, Clone)]
pub struct BinnedState {
    pub name: String,
    pub bins: Vec<Dimension>,
    pub diagnostics: Vec<Diagnostic>,
    pub variables: Vec<String>,
    pub grid: Grid,
    pub attributes: GlobalAttributes,
}

/// Persistence of binned results
pub trait BinnedStore {
    /// Write `state` to `path`, returning the path actually written.
    ///
    /// # Errors
    ///
    /// Fails when the file exists and `overwrite` is false, or on I/O errors.
    fn write_state(&self, state: &BinnedState, path: &Path, overwrite: bool) -> Result<PathBuf>;

    /// Read a state previously written by [`BinnedStore::write_state`]
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or when the file does not follow the layout.
    fn read_state(&self, path: &Path) -> Result<BinnedState>;
}

/// Producer of unbinned observation records
pub trait RecordSource {
    /// Load every usable field of the file at `path`
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    fn read_records(&self, path: &Path) -> Result<RecordSet>;
}
