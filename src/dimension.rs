//! Binning axes
//!
//! A [`Dimension`] partitions one coordinate (latitude, depth, ...) into
//! contiguous bins. It is built once, from explicit edges or from a
//! resolution and bounds, and never changes afterwards.

use crate::errors::{ObsBinError, Result};
use ndarray::{Array1, ArrayView1};
use std::fmt;
use std::str::FromStr;

/// Default bounds for common dimension names
const DEFAULT_BOUNDS: &[(&str, (f64, f64))] =
    &[("latitude", (-90.0, 90.0)), ("longitude", (0.0, 360.0))];

/// Upper limit on the number of edges a resolution may produce
pub const MAX_EDGES: usize = 10_000_000;

/// Default units for common dimension names
const DEFAULT_UNITS: &[(&str, &str)] = &[("latitude", "degrees"), ("longitude", "degrees")];

fn default_bounds(name: &str) -> Option<(f64, f64)> {
    DEFAULT_BOUNDS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, b)| *b)
}

fn default_units(name: &str) -> Option<String> {
    DEFAULT_UNITS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, u)| (*u).to_string())
}

/// A single axis used for binning.
///
/// Two dimensions are equal only when the name, units and every edge match
/// exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    name: String,
    units: Option<String>,
    edges: Array1<f64>,
}

impl Dimension {
    /// Create a dimension from either `edges` or `resolution` (+ optional `bounds`).
    ///
    /// Exactly one of `edges` and `resolution` must be given, and `bounds`
    /// is only meaningful together with `resolution`.
    ///
    /// # Errors
    ///
    /// Returns [`ObsBinError::InvalidDimension`] for a wrong combination of
    /// arguments or for bad values.
    pub fn new(
        name: &str,
        edges: Option<Vec<f64>>,
        resolution: Option<f64>,
        bounds: Option<(f64, f64)>,
    ) -> Result<Self> {
        match (edges, resolution) {
            (Some(edges), None) => {
                if bounds.is_some() {
                    return Err(invalid(name, "must define \"resolution\" if \"bounds\" is defined"));
                }
                Self::from_edges(name, edges)
            }
            (None, Some(resolution)) => Self::from_resolution(name, resolution, bounds),
            (None, None) if bounds.is_some() => Err(invalid(
                name,
                "must define \"resolution\" if \"bounds\" is defined",
            )),
            _ => Err(invalid(
                name,
                "must set exactly ONE of \"edges\" or \"resolution\"",
            )),
        }
    }

    /// Create a dimension from a list of bin edges
    ///
    /// # Errors
    ///
    /// Fails for names outside `[A-Za-z0-9_]`, when fewer than two edges are
    /// given, or when the edges are not finite and strictly increasing.
    pub fn from_edges(name: &str, edges: Vec<f64>) -> Result<Self> {
        if !is_dimension_name(name) {
            return Err(invalid(name, "name is not in correct format"));
        }
        if edges.len() < 2 {
            return Err(invalid(name, "at least 2 edges need to be given to define bins"));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(invalid(name, "bin edges must be finite"));
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid(name, "bin edges must be strictly increasing"));
        }

        Ok(Self {
            name: name.to_string(),
            units: default_units(name),
            edges: Array1::from(edges),
        })
    }

    /// Create a dimension with evenly spaced bins of width `resolution`.
    ///
    /// When `bounds` is `None` the defaults for well known names are used
    /// (`latitude` is [-90, 90], `longitude` is [0, 360]).
    ///
    /// # Errors
    ///
    /// Fails for a non-positive resolution, for bounds that cannot be
    /// determined, or for empty bounds.
    pub fn from_resolution(name: &str, resolution: f64, bounds: Option<(f64, f64)>) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(invalid(name, "resolution must be > 0"));
        }
        let (lo, hi) = bounds
            .or_else(|| default_bounds(name))
            .ok_or_else(|| invalid(name, "bounds must be provided if resolution is set"))?;
        if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
            return Err(invalid(
                name,
                &format!("bounds should be in the form [start, end], got [{lo}, {hi}]"),
            ));
        }

        // lo, lo + r, ... while below hi + r/2, so hi itself is an edge
        let stop = hi + resolution / 2.0;
        let count = ((stop - lo) / resolution).ceil();
        #[allow(clippy::cast_precision_loss)]
        let limit = MAX_EDGES as f64;
        if !count.is_finite() || count > limit {
            return Err(invalid(
                name,
                &format!("resolution {resolution} gives more than {MAX_EDGES} bin edges"),
            ));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n_edges = count as usize;
        #[allow(clippy::cast_precision_loss)]
        let edges: Vec<f64> = (0..n_edges).map(|i| lo + i as f64 * resolution).collect();

        Self::from_edges(name, edges)
    }

    /// Override the unit label
    #[must_use]
    pub fn with_units(mut self, units: Option<&str>) -> Self {
        self.units = units.map(str::to_string);
        self
    }

    /// Name of the dimension
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit label, if any
    #[must_use]
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Number of bins (one less than the number of edges)
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len() - 1
    }

    /// Always false, a dimension has at least one bin
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw edge values
    #[must_use]
    pub fn bin_edges(&self) -> ArrayView1<'_, f64> {
        self.edges.view()
    }

    /// Midpoints of consecutive edges
    #[must_use]
    pub fn bin_centers(&self) -> Array1<f64> {
        let n = self.len();
        Array1::from_iter((0..n).map(|i| (self.edges[i] + self.edges[i + 1]) / 2.0))
    }

    /// The outermost edges
    #[must_use]
    pub fn bounds(&self) -> (f64, f64) {
        (self.edges[0], self.edges[self.edges.len() - 1])
    }

    /// Index of the bin holding `value`.
    ///
    /// Bins are closed on the left; the last bin also includes its right
    /// edge. NaN and values outside the bounds fall in no bin.
    #[must_use]
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        let (lo, hi) = self.bounds();
        if !(value >= lo && value <= hi) {
            return None;
        }
        if value == hi {
            return Some(self.len() - 1);
        }

        let edges = self.edges.as_slice()?;
        let index = edges
            .binary_search_by(|probe| probe.total_cmp(&value))
            // Ok is an exact edge match, Err is the insertion point
            .unwrap_or_else(|i| i - 1);
        Some(index)
    }
}

impl fmt::Display for Dimension {
    /// Lossless string form, parsable by [`Dimension::from_str`]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges: Vec<String> = self.edges.iter().map(f64::to_string).collect();
        write!(f, "{}:e={}", self.name, edges.join(","))
    }
}

impl FromStr for Dimension {
    type Err = ObsBinError;

    /// Parse `<name>:<arg1>[:<arg2>]` where each argument is one of
    /// `r=<float>` (resolution), `b=<lo>,<hi>` (bounds) or `e=<e0>,<e1>,...`
    /// (edges).
    ///
    /// Examples: `latitude:r=1.0`, `longitude:r=1.0:b=0,180.0`,
    /// `depth:e=0,10,20,30,50,100,500`.
    fn from_str(s: &str) -> Result<Self> {
        let fail = |reason: &str| ObsBinError::InvalidDimension {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(fail("incorrect number of argument strings"));
        }

        let name = parts[0];
        if !is_dimension_name(name) {
            return Err(fail("name is not in correct format"));
        }

        let mut resolution: Option<Vec<f64>> = None;
        let mut bounds: Option<Vec<f64>> = None;
        let mut edges: Option<Vec<f64>> = None;
        for arg in &parts[1..] {
            let (key, value) = arg
                .split_once('=')
                .ok_or_else(|| fail(&format!("argument string \"{arg}\" is not valid")))?;
            let values = value
                .split(',')
                .map(|v| v.trim().parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| fail(&format!("argument string \"{arg}\" is not valid: {e}")))?;
            let slot = match key {
                "r" => &mut resolution,
                "b" => &mut bounds,
                "e" => &mut edges,
                _ => return Err(fail(&format!("argument string \"{arg}\" is not valid"))),
            };
            if slot.replace(values).is_some() {
                return Err(fail(&format!("argument \"{key}\" given more than once")));
            }
        }

        let resolution = match resolution.as_deref() {
            None => None,
            Some([r]) => Some(*r),
            Some(_) => return Err(fail("resolution must be a single number")),
        };
        let bounds = match bounds.as_deref() {
            None => None,
            Some([lo, hi]) => Some((*lo, *hi)),
            Some(_) => return Err(fail("bounds must be exactly two numbers")),
        };

        Self::new(name, edges, resolution, bounds).map_err(|e| match e {
            ObsBinError::InvalidDimension { reason, .. } => fail(&reason),
            other => other,
        })
    }
}

/// Dimension names double as NetCDF dimension names, so no `/`
fn is_dimension_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(name: &str, reason: &str) -> ObsBinError {
    ObsBinError::InvalidDimension {
        spec: name.to_string(),
        reason: reason.to_string(),
    }
}
