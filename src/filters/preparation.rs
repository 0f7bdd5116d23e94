//! Filters that bring observation files into the shape binning expects

use super::{expect_args, Filter, FilterContext};
use crate::errors::Result;
use crate::records::RecordSet;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Groups searched, in order, for coordinates and timestamps
pub const METADATA_GROUPS: [&str; 3] = ["MetaData", "varMetaData", "recMetaData"];

/// Lift binning coordinates out of the metadata groups.
///
/// For every binning dimension `x` not already present, the first of
/// `MetaData/x`, `varMetaData/x` and `recMetaData/x` found is renamed to `x`.
/// The observation window is taken from the range of `dateTime` (seconds
/// since the epoch) in the same groups.
#[derive(Debug, Clone)]
pub struct MetadataGroups {
    bin_names: Vec<String>,
}

impl MetadataGroups {
    pub const NAME: &'static str = "metadata_groups";

    #[must_use]
    pub fn new(bin_names: Vec<String>) -> Self {
        Self { bin_names }
    }

    /// `metadata_groups:lat,lon,...`
    ///
    /// # Errors
    ///
    /// Never fails, the signature matches the filter registry.
    pub fn create(args: &[String]) -> Result<Box<dyn Filter>> {
        let names = args
            .iter()
            .flat_map(|a| a.split(','))
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Box::new(Self::new(names)))
    }
}

impl Filter for MetadataGroups {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter(&self, mut data: RecordSet, _ctx: &FilterContext<'_>) -> Result<RecordSet> {
        for name in &self.bin_names {
            if data.contains(name) {
                continue;
            }
            let found = METADATA_GROUPS
                .iter()
                .map(|group| format!("{group}/{name}"))
                .find(|source| data.contains(source));
            if let Some(source) = found {
                debug!("renaming {source} to {name}");
                data.rename(&source, name)?;
            }
        }

        let times = METADATA_GROUPS
            .iter()
            .find_map(|group| data.field(&format!("{group}/dateTime")));
        if let Some(times) = times {
            let finite = times.iter().copied().filter(|t| t.is_finite());
            let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
                (lo.min(t), hi.max(t))
            });
            if lo <= hi {
                let (start, end) = (epoch_to_datetime(lo), epoch_to_datetime(hi));
                data.set_window(start, end);
            }
        }

        Ok(data)
    }
}

/// Seconds since 1970-01-01 as a UTC timestamp
fn epoch_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    let whole = seconds.floor();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = (((seconds - whole) * 1e9).round() as u32).min(999_999_999);
    #[allow(clippy::cast_possible_truncation)]
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Wrap negative longitudes into [0, 360)
#[derive(Debug, Clone, Copy, Default)]
pub struct LonWrap;

impl LonWrap {
    pub const NAME: &'static str = "lon_wrap";

    /// `lon_wrap`
    ///
    /// # Errors
    ///
    /// Fails when arguments are given.
    pub fn create(args: &[String]) -> Result<Box<dyn Filter>> {
        expect_args(Self::NAME, args, 0)?;
        Ok(Box::new(Self))
    }
}

impl Filter for LonWrap {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter(&self, mut data: RecordSet, _ctx: &FilterContext<'_>) -> Result<RecordSet> {
        if let Some(lon) = data.field_mut("longitude") {
            lon.mapv_inplace(|x| if x < 0.0 { x + 360.0 } else { x });
        }
        Ok(data)
    }
}

/// Keep only the fields needed to bin one variable: `<diag>/<variable>` for
/// every diagnostic and the binning coordinates
#[derive(Debug, Clone)]
pub struct TrimVars {
    diagnostics: Vec<String>,
    dimensions: Vec<String>,
}

impl TrimVars {
    pub const NAME: &'static str = "trim_vars";

    #[must_use]
    pub fn new(diagnostics: Vec<String>, dimensions: Vec<String>) -> Self {
        Self {
            diagnostics,
            dimensions,
        }
    }

    /// `trim_vars:diag1,diag2:dim1,dim2`
    ///
    /// # Errors
    ///
    /// Fails unless exactly two arguments are given.
    pub fn create(args: &[String]) -> Result<Box<dyn Filter>> {
        let args = expect_args(Self::NAME, args, 2)?;
        let split = |s: &str| -> Vec<String> {
            s.split(',')
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        };
        Ok(Box::new(Self::new(split(&args[0]), split(&args[1]))))
    }
}

impl Filter for TrimVars {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn per_variable(&self) -> bool {
        true
    }

    fn filter(&self, mut data: RecordSet, ctx: &FilterContext<'_>) -> Result<RecordSet> {
        let variable = ctx.require_variable(Self::NAME)?;
        let keep: Vec<String> = self
            .diagnostics
            .iter()
            .map(|diag| format!("{diag}/{variable}"))
            .chain(self.dimensions.iter().cloned())
            .collect();
        data.retain_fields(|name| keep.iter().any(|k| k == name));
        Ok(data)
    }
}
