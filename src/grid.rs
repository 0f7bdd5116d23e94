//! The binned data model
//!
//! A [`Grid`] holds every binned field of a [`crate::BinnedStatistics`]
//! container on a shared set of coordinate axes. Fields are keyed by
//! [`FieldKey`] and always have the grid's base shape, or the base shape
//! followed by the channel axis.

use crate::dimension::Dimension;
use crate::errors::{ObsBinError, Result};
use crate::records::CHANNEL_COORDINATE;
use crate::statistics::StatisticKind;
use ndarray::{Array1, ArrayD, ArrayView1};
use std::collections::BTreeMap;
use std::fmt;

/// A named, labelled coordinate axis of a grid
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub values: Array1<f64>,
    pub units: Option<String>,
}

impl Coordinate {
    #[must_use]
    pub fn new(name: &str, values: Array1<f64>, units: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            values,
            units: units.map(str::to_string),
        }
    }

    /// Coordinate of bin centres for a binning dimension
    #[must_use]
    pub fn from_dimension(dim: &Dimension) -> Self {
        Self::new(dim.name(), dim.bin_centers(), dim.units())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Identity of one stored field.
///
/// Variable-scoped statistics (count) have no diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldKey {
    pub variable: String,
    pub diagnostic: Option<String>,
    pub statistic: StatisticKind,
}

impl FieldKey {
    /// Build a key, dropping the diagnostic for variable-scoped statistics
    #[must_use]
    pub fn new(variable: &str, diagnostic: Option<&str>, statistic: StatisticKind) -> Self {
        let diagnostic = if statistic.is_global() {
            None
        } else {
            diagnostic.map(str::to_string)
        };
        Self {
            variable: variable.to_string(),
            diagnostic,
            statistic,
        }
    }

    /// `<variable>.<diagnostic>.<statistic>`, or `<variable>.<statistic>`
    /// without a diagnostic
    #[must_use]
    pub fn name(&self) -> String {
        match &self.diagnostic {
            Some(diag) => format!("{}.{}.{}", self.variable, diag, self.statistic),
            None => format!("{}.{}", self.variable, self.statistic),
        }
    }

    /// Parse a persisted field name.
    ///
    /// `diagnostics` lists the diagnostic names that may appear as the
    /// middle segment.
    ///
    /// # Errors
    ///
    /// Fails for unknown statistics, or when a diagnostic-scoped statistic
    /// does not name a known diagnostic.
    pub fn parse(name: &str, diagnostics: &[&str]) -> Result<Self> {
        let segments: Vec<&str> = name.split('.').collect();
        let (stat, rest) = segments
            .split_last()
            .filter(|(_, rest)| !rest.is_empty())
            .ok_or_else(|| ObsBinError::UnknownStatistic {
                name: name.to_string(),
            })?;
        let statistic: StatisticKind = stat.parse()?;

        if statistic.is_global() {
            return Ok(Self::new(&rest.join("."), None, statistic));
        }

        match rest.split_last() {
            Some((diag, variable)) if !variable.is_empty() && diagnostics.contains(diag) => {
                Ok(Self::new(&variable.join("."), Some(*diag), statistic))
            }
            _ => Err(ObsBinError::DiagnosticNotFound {
                diag: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// N-D array space over the bin centres of each binning dimension.
///
/// A grid without coordinates has a single global bin and stores 0-d
/// arrays (or 1-d arrays along the channel axis).
#[derive(Debug, Clone, Default)]
pub struct Grid {
    coordinates: Vec<Coordinate>,
    channel: Option<Coordinate>,
    fields: BTreeMap<FieldKey, ArrayD<f64>>,
}

impl Grid {
    #[must_use]
    pub fn new(coordinates: Vec<Coordinate>) -> Self {
        Self {
            coordinates,
            channel: None,
            fields: BTreeMap::new(),
        }
    }

    /// Empty grid whose axes are the bin centres of `bins`
    #[must_use]
    pub fn from_dimensions(bins: &[Dimension]) -> Self {
        Self::new(bins.iter().map(Coordinate::from_dimension).collect())
    }

    /// A grid with the same axes and no fields
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self {
            coordinates: self.coordinates.clone(),
            channel: self.channel.clone(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    /// Shape spanned by the coordinates, without the channel axis
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.coordinates.iter().map(Coordinate::len).collect()
    }

    #[must_use]
    pub fn channel_axis(&self) -> Option<&Coordinate> {
        self.channel.as_ref()
    }

    /// Attach a channel axis read from storage
    #[must_use]
    pub fn with_channel_axis(mut self, channel: Coordinate) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Register the channel axis the first time it is seen, or check that
    /// `values` matches the one already registered.
    ///
    /// # Errors
    ///
    /// Fails when the channel values differ from the registered ones.
    pub fn ensure_channel_axis(&mut self, values: ArrayView1<'_, f64>) -> Result<()> {
        match &self.channel {
            None => {
                self.channel = Some(Coordinate::new(CHANNEL_COORDINATE, values.to_owned(), None));
                Ok(())
            }
            Some(existing) if existing.values.len() != values.len() => {
                Err(ObsBinError::ShapeMismatch {
                    field: CHANNEL_COORDINATE.to_string(),
                    expected: vec![existing.values.len()],
                    found: vec![values.len()],
                })
            }
            Some(existing) if existing.values != values => Err(ObsBinError::NotEquivalent(
                format!("{CHANNEL_COORDINATE} values differ from the registered channel axis"),
            )),
            Some(_) => Ok(()),
        }
    }

    #[must_use]
    pub fn field(&self, key: &FieldKey) -> Option<&ArrayD<f64>> {
        self.fields.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &FieldKey) -> bool {
        self.fields.contains_key(key)
    }

    /// Store a field, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Fails when the array has neither the base shape nor the base shape
    /// plus the channel axis.
    pub fn insert(&mut self, key: FieldKey, values: ArrayD<f64>) -> Result<()> {
        let base = self.shape();
        let mut with_channel = base.clone();
        if let Some(channel) = &self.channel {
            with_channel.push(channel.len());
        }
        if values.shape() != base.as_slice() && values.shape() != with_channel.as_slice() {
            return Err(ObsBinError::ShapeMismatch {
                field: key.name(),
                expected: with_channel,
                found: values.shape().to_vec(),
            });
        }
        self.fields.insert(key, values);
        Ok(())
    }

    /// Move the fields of `staged`, a grid built with [`Grid::empty_like`],
    /// into this one. A channel axis registered on `staged` is registered
    /// here too.
    ///
    /// # Errors
    ///
    /// Fails when the channel axes disagree or a field does not fit.
    pub fn absorb(&mut self, staged: Self) -> Result<()> {
        if let Some(channel) = &staged.channel {
            self.ensure_channel_axis(channel.values.view())?;
        }
        for (key, values) in staged.fields {
            self.insert(key, values)?;
        }
        Ok(())
    }

    /// Stored fields in key order
    pub fn fields(&self) -> impl Iterator<Item = (&FieldKey, &ArrayD<f64>)> {
        self.fields.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.keys()
    }

    /// Number of stored fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when both grids have the same coordinates and channel axis
    #[must_use]
    pub fn same_coordinates(&self, other: &Self) -> bool {
        self.coordinates == other.coordinates && self.channel == other.channel
    }

    /// A grid without the coordinate at position `axis`, every field taken at
    /// `index` along it
    ///
    /// # Errors
    ///
    /// Fails when `axis` or `index` is out of range.
    pub fn select(&self, axis: usize, index: usize) -> Result<Self> {
        let coordinate = self
            .coordinates
            .get(axis)
            .ok_or_else(|| ObsBinError::DimensionNotFound {
                dim: format!("axis {axis}"),
            })?;
        if index >= coordinate.len() {
            #[allow(clippy::cast_precision_loss)]
            return Err(ObsBinError::CoordinateOutOfRange {
                dim: coordinate.name.clone(),
                value: index as f64,
            });
        }

        let mut coordinates = self.coordinates.clone();
        coordinates.remove(axis);
        let fields = self
            .fields
            .iter()
            .map(|(key, values)| {
                (
                    key.clone(),
                    values.index_axis(ndarray::Axis(axis), index).to_owned(),
                )
            })
            .collect();

        Ok(Self {
            coordinates,
            channel: self.channel.clone(),
            fields,
        })
    }
}
