//! Binned statistics of observation diagnostics
//!
//! [`BinnedStatistics`] ties the pieces together: it runs the filter
//! pipeline over unbinned records, bins every variable's diagnostics into a
//! [`Grid`], and combines independently binned results with
//! [`BinnedStatistics::merge`] so that the outcome matches binning all
//! inputs at once.

use crate::data_source::{BinnedState, BinnedStore, GlobalAttributes};
use crate::diagnostic::Diagnostic;
use crate::dimension::Dimension;
use crate::errors::{ObsBinError, Result};
use crate::filters::{Filter, FilterPipeline};
use crate::grid::{Coordinate, FieldKey, Grid};
use crate::netcdf_io::NetCDFStore;
use crate::parallel::merge_tree;
use crate::records::RecordSet;
use crate::statistics::numeric::nan_mean;
use crate::statistics::{Binner, Statistic, StatisticKind};
use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayD, IxDyn, Zip};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default relative tolerance of [`BinnedStatistics::equals`]
pub const DEFAULT_TOLERANCE: f64 = 1e-14;

/// Statistics of several variables and diagnostics binned on one grid
#[derive(Debug, Clone)]
pub struct BinnedStatistics {
    name: String,
    bins: Vec<Dimension>,
    diagnostics: Vec<Diagnostic>,
    variables: Vec<String>,
    grid: Grid,
    attributes: GlobalAttributes,
    sliced_dims: Vec<(String, f64)>,
}

impl BinnedStatistics {
    /// An empty container, ready for [`BinnedStatistics::bin_variable`].
    ///
    /// # Errors
    ///
    /// Fails on repeated dimension or diagnostic names, or when a diagnostic
    /// lists a statistic without the statistics it depends on.
    pub fn new(name: &str, bins: Vec<Dimension>, diagnostics: Vec<Diagnostic>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for dim in &bins {
            if !seen.insert(dim.name()) {
                return Err(ObsBinError::InvalidDimension {
                    spec: dim.name().to_string(),
                    reason: "dimension given more than once".to_string(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for diag in &diagnostics {
            if !seen.insert(diag.name()) {
                return Err(ObsBinError::InvalidDiagnostic {
                    spec: diag.name().to_string(),
                    reason: "diagnostic given more than once".to_string(),
                });
            }
            for kind in diag.statistics() {
                let missing = kind
                    .depends()
                    .iter()
                    .find(|dep| !dep.is_global() && !diag.has_statistic(**dep));
                if let Some(dep) = missing {
                    return Err(ObsBinError::InvalidDiagnostic {
                        spec: diag.to_string(),
                        reason: format!("statistic '{kind}' requires '{dep}'"),
                    });
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            grid: Grid::from_dimensions(&bins),
            bins,
            diagnostics,
            variables: Vec::new(),
            attributes: GlobalAttributes::default(),
            sliced_dims: Vec::new(),
        })
    }

    /// Set the labels describing where the observations came from
    #[must_use]
    pub fn with_labels(mut self, obs_source: &str, experiment: &str) -> Self {
        self.attributes.obs_source = obs_source.to_string();
        self.attributes.experiment = experiment.to_string();
        self
    }

    pub fn set_window(&mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) {
        self.attributes.window_start = start;
        self.attributes.window_end = end;
    }

    /// Filter `data` and bin every variable in `variables`.
    ///
    /// The standard filter pipeline runs first, with the user `filters`
    /// inserted in order. The observation window is taken from the filtered
    /// records.
    ///
    /// # Errors
    ///
    /// Fails for invalid definitions, filter errors, or missing input fields.
    pub fn bin(
        name: &str,
        bins: Vec<Dimension>,
        diagnostics: Vec<Diagnostic>,
        variables: &[String],
        filters: Vec<Box<dyn Filter>>,
        data: RecordSet,
    ) -> Result<Self> {
        let mut binned = Self::new(name, bins, diagnostics)?;
        let pipeline = FilterPipeline::standard(&binned.bins, &binned.diagnostics, filters);
        debug!(
            "filter pipeline: {}",
            pipeline.names().collect::<Vec<_>>().join(", ")
        );

        let data = pipeline.apply_global(data)?;
        binned.set_window(data.window_start(), data.window_end());

        for variable in variables {
            let prepared = pipeline.apply_variable(data.clone(), variable)?;
            binned.bin_variable(variable, &prepared)?;
        }

        info!(
            "binned {} variable(s) into '{}' ({} fields)",
            binned.variables.len(),
            binned.name,
            binned.grid.len()
        );
        Ok(binned)
    }

    /// Bin one variable from records already passed through the filters.
    ///
    /// For every diagnostic `d` the field `d/<variable>` is binned. 2-D
    /// fields register the channel axis on first use. Nothing is stored if
    /// any step fails.
    ///
    /// # Errors
    ///
    /// Fails when the variable was already binned, when an input field is
    /// missing, has more than 2 dimensions, or differs in shape from the
    /// other diagnostics of the variable.
    pub fn bin_variable(&mut self, variable: &str, data: &RecordSet) -> Result<()> {
        if self.has_variable(variable) {
            return Err(ObsBinError::VariableExists {
                var: variable.to_string(),
            });
        }

        let mut inputs: Vec<(&Diagnostic, &ArrayD<f64>)> =
            Vec::with_capacity(self.diagnostics.len());
        for diag in &self.diagnostics {
            let field = format!("{}/{variable}", diag.name());
            let values = data.require(&field)?;
            if values.ndim() > 2 {
                return Err(ObsBinError::UnsupportedRank {
                    field,
                    ndim: values.ndim(),
                });
            }
            if let Some((_, first)) = inputs.first() {
                if first.shape() != values.shape() {
                    return Err(ObsBinError::ShapeMismatch {
                        field,
                        expected: first.shape().to_vec(),
                        found: values.shape().to_vec(),
                    });
                }
            }
            inputs.push((diag, values));
        }

        // only the new fields, so a failure leaves `self.grid` untouched
        let mut grid = self.grid.empty_like();
        if let Some((_, first)) = inputs.first() {
            if first.ndim() == 2 {
                let channels = channel_values(variable, data, first.shape()[1])?;
                grid.ensure_channel_axis(channels.view())?;
            }
        }

        let binner = Binner::new(&self.bins, data)?;
        let placeholder;
        let count_source = match inputs.first() {
            Some((_, values)) => values.view(),
            None => {
                placeholder = ArrayD::<f64>::zeros(IxDyn(&[binner.n_records()]));
                placeholder.view()
            }
        };
        Statistic::new(StatisticKind::Count, variable, None).calc(
            &mut grid,
            &binner,
            count_source,
        )?;

        for (diag, values) in &inputs {
            for kind in diag.ordered_statistics() {
                if !kind.is_core() {
                    continue;
                }
                Statistic::new(kind, variable, Some(diag.name())).calc(
                    &mut grid,
                    &binner,
                    values.view(),
                )?;
            }
        }

        debug!(
            "binned '{variable}': {} records, {} diagnostic(s)",
            binner.n_records(),
            inputs.len()
        );
        self.grid.absorb(grid)?;
        self.variables.push(variable.to_string());
        Ok(())
    }

    /// Combine with another result binned the same way.
    ///
    /// Neither operand is modified. The observation window of the result
    /// spans both windows.
    ///
    /// # Errors
    ///
    /// Returns [`ObsBinError::NotEquivalent`] when the two results differ in
    /// name, bins, diagnostics, variables or coordinates.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        self.check_equivalent(other)?;

        let mut merged = Self {
            name: self.name.clone(),
            bins: self.bins.clone(),
            diagnostics: self.diagnostics.clone(),
            variables: self.variables.clone(),
            grid: self.grid.empty_like(),
            attributes: GlobalAttributes {
                window_start: pick(self.window_start(), other.window_start(), std::cmp::min),
                window_end: pick(self.window_end(), other.window_end(), std::cmp::max),
                ..self.attributes.clone()
            },
            sliced_dims: self.sliced_dims.clone(),
        };

        for variable in &self.variables {
            Statistic::new(StatisticKind::Count, variable, None).merge(
                &mut merged.grid,
                &self.grid,
                &other.grid,
            )?;
            for diag in &self.diagnostics {
                for kind in diag.ordered_statistics() {
                    if !kind.is_core() {
                        continue;
                    }
                    Statistic::new(kind, variable, Some(diag.name())).merge(
                        &mut merged.grid,
                        &self.grid,
                        &other.grid,
                    )?;
                }
            }
        }

        Ok(merged)
    }

    /// Merge any number of results with a parallel merge tree
    ///
    /// # Errors
    ///
    /// Fails for an empty input or when any two results are not equivalent.
    pub fn merge_all(items: Vec<Self>) -> Result<Self> {
        let n = items.len();
        let merged = merge_tree(items, Self::merge)?
            .ok_or_else(|| ObsBinError::Generic("no binned statistics to merge".to_string()))?;
        info!("merged {n} binned statistics into '{}'", merged.name);
        Ok(merged)
    }

    /// Values of the requested fields, see [`Query`]
    ///
    /// # Errors
    ///
    /// With [`Query::require_all`], fails on the first requested combination
    /// that is not available.
    pub fn get(&self, query: &Query) -> Result<BinnedFields> {
        let variables = query.variables.clone().unwrap_or_else(|| self.variables.clone());
        let diagnostics: Vec<Option<String>> = std::iter::once(None)
            .chain(
                query
                    .diagnostics
                    .clone()
                    .unwrap_or_else(|| self.diagnostic_names().map(str::to_string).collect())
                    .into_iter()
                    .map(Some),
            )
            .collect();
        let statistics = query
            .statistics
            .clone()
            .unwrap_or_else(|| StatisticKind::ALL.to_vec());

        let mut fields = BTreeMap::new();
        for variable in &variables {
            for diagnostic in &diagnostics {
                for &kind in &statistics {
                    // count is reported once per variable, the rest per diagnostic
                    if kind.is_global() != diagnostic.is_none() {
                        continue;
                    }
                    let statistic = Statistic::new(kind, variable, diagnostic.as_deref());
                    match statistic.value(&self.grid) {
                        Ok(values) => {
                            fields.insert(statistic.key().name(), values);
                        }
                        Err(e) if query.strict => return Err(e),
                        Err(e) => debug!("skipping {}: {e}", statistic.key()),
                    }
                }
            }
        }

        Ok(BinnedFields {
            coordinates: self.grid.coordinates().to_vec(),
            channel: self.grid.channel_axis().cloned(),
            fields,
            window_start: self.window_start(),
            window_end: self.window_end(),
            sliced_dims: self.sliced_dims.clone(),
        })
    }

    /// Remove dimension `name` by keeping only the bin that holds `value`.
    ///
    /// The centre of the kept bin is recorded in [`BinnedStatistics::sliced_dims`]
    /// of the returned instance.
    ///
    /// # Errors
    ///
    /// Fails for unknown dimensions or values outside every bin.
    pub fn select_dim(&self, name: &str, value: f64) -> Result<Self> {
        let axis = self.axis_of(name)?;
        let index = self.bins[axis]
            .bin_index(value)
            .ok_or_else(|| ObsBinError::CoordinateOutOfRange {
                dim: name.to_string(),
                value,
            })?;
        self.slice(axis, index, true)
    }

    /// Remove dimension `name` by keeping only bin `index`
    ///
    /// # Errors
    ///
    /// Fails for unknown dimensions or an index out of range.
    pub fn select_dim_index(&self, name: &str, index: usize) -> Result<Self> {
        let axis = self.axis_of(name)?;
        self.slice(axis, index, true)
    }

    /// Remove dimension `name` by merging all of its bins
    ///
    /// # Errors
    ///
    /// Fails for unknown dimensions.
    pub fn collapse_dim(&self, name: &str) -> Result<Self> {
        let axis = self.axis_of(name)?;
        let slices = (0..self.bins[axis].len())
            .map(|index| self.slice(axis, index, false))
            .collect::<Result<Vec<_>>>()?;
        let collapsed = merge_tree(slices, Self::merge)?
            .ok_or_else(|| ObsBinError::DimensionNotFound {
                dim: name.to_string(),
            })?;
        debug!("collapsed dimension '{name}' of '{}'", self.name);
        Ok(collapsed)
    }

    fn slice(&self, axis: usize, index: usize, record: bool) -> Result<Self> {
        let dim = &self.bins[axis];
        #[allow(clippy::cast_precision_loss)]
        let requested = index as f64;
        let center = *dim.bin_centers().get(index).ok_or_else(|| {
            ObsBinError::CoordinateOutOfRange {
                dim: dim.name().to_string(),
                value: requested,
            }
        })?;

        let mut sliced = self.clone();
        sliced.grid = self.grid.select(axis, index)?;
        let removed = sliced.bins.remove(axis);
        if record {
            sliced.sliced_dims.push((removed.name().to_string(), center));
        }
        Ok(sliced)
    }

    fn axis_of(&self, name: &str) -> Result<usize> {
        self.bins
            .iter()
            .position(|d| d.name() == name)
            .ok_or_else(|| ObsBinError::DimensionNotFound {
                dim: name.to_string(),
            })
    }

    /// [`BinnedStatistics::equals_within`] at [`DEFAULT_TOLERANCE`]
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.equals_within(other, DEFAULT_TOLERANCE)
    }

    /// True when both results are equivalent, store the same fields, and
    /// every field agrees within `tolerance`.
    ///
    /// A field agrees when the mean of `|(other - self) / self|` over the
    /// entries where it is defined is at most `tolerance`. A field where it
    /// is defined nowhere agrees.
    #[must_use]
    pub fn equals_within(&self, other: &Self, tolerance: f64) -> bool {
        if !self.equivalent(other) {
            return false;
        }
        let mine: BTreeSet<&FieldKey> = self.grid.keys().collect();
        let theirs: BTreeSet<&FieldKey> = other.grid.keys().collect();
        if mine != theirs {
            return false;
        }

        self.grid.fields().all(|(key, mine)| {
            let Some(theirs) = other.grid.field(key) else {
                return false;
            };
            if mine.shape() != theirs.shape() {
                return false;
            }
            let relative = Zip::from(mine)
                .and(theirs)
                .map_collect(|&a, &b| ((b - a) / a).abs());
            nan_mean(relative.iter().copied()).map_or(true, |mean| mean <= tolerance)
        })
    }

    /// True when the two results can be merged
    #[must_use]
    pub fn equivalent(&self, other: &Self) -> bool {
        self.check_equivalent(other).is_ok()
    }

    fn check_equivalent(&self, other: &Self) -> Result<()> {
        let fail = |what: &str| -> Result<()> {
            Err(ObsBinError::NotEquivalent(format!("{what} differ")))
        };

        if self.name != other.name {
            return fail("names");
        }
        if self.bins != other.bins {
            return fail("binning dimensions");
        }
        let same_diagnostics = self.diagnostics.len() == other.diagnostics.len()
            && self
                .diagnostics
                .iter()
                .all(|d| other.diagnostic(d.name()) == Some(d));
        if !same_diagnostics {
            return fail("diagnostics");
        }
        let mine: BTreeSet<&String> = self.variables.iter().collect();
        let theirs: BTreeSet<&String> = other.variables.iter().collect();
        if mine != theirs {
            return fail("variables");
        }
        if !self.grid.same_coordinates(&other.grid) {
            return fail("grid coordinates");
        }
        Ok(())
    }

    /// Join results along a dimension. Not available yet.
    ///
    /// # Errors
    ///
    /// Always returns [`ObsBinError::Unsupported`].
    pub fn concat(&self, _other: &Self, dimension: &str) -> Result<Self> {
        Err(ObsBinError::Unsupported(format!("concat along '{dimension}'")))
    }

    /// Read a result written by [`BinnedStatistics::write`]
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or files that do not follow the layout.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let state = NetCDFStore.read_state(path.as_ref())?;
        Self::from_state(state)
    }

    /// Write to NetCDF, returning the path written (`.nc4` is appended when
    /// the name has no NetCDF suffix)
    ///
    /// # Errors
    ///
    /// Fails when the file exists and `overwrite` is false, or on I/O errors.
    pub fn write(&self, path: impl AsRef<Path>, overwrite: bool) -> Result<PathBuf> {
        NetCDFStore.write_state(&self.to_state(), path.as_ref(), overwrite)
    }

    /// Snapshot for a [`BinnedStore`]
    #[must_use]
    pub fn to_state(&self) -> BinnedState {
        BinnedState {
            name: self.name.clone(),
            bins: self.bins.clone(),
            diagnostics: self.diagnostics.clone(),
            variables: self.variables.clone(),
            grid: self.grid.clone(),
            attributes: self.attributes.clone(),
        }
    }

    /// Rebuild from a [`BinnedStore`] snapshot
    ///
    /// # Errors
    ///
    /// Fails when the grid axes do not match the bins.
    pub fn from_state(state: BinnedState) -> Result<Self> {
        let mut binned = Self::new(&state.name, state.bins, state.diagnostics)?;
        let expected: Vec<Coordinate> = binned.bins.iter().map(Coordinate::from_dimension).collect();
        let same_axes = expected.len() == state.grid.coordinates().len()
            && expected
                .iter()
                .zip(state.grid.coordinates())
                .all(|(a, b)| a.name == b.name && a.values == b.values);
        if !same_axes {
            return Err(ObsBinError::NotEquivalent(
                "grid coordinates do not match the binning dimensions".to_string(),
            ));
        }
        binned.grid = state.grid;
        binned.variables = state.variables;
        binned.attributes = state.attributes;
        Ok(binned)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bins(&self) -> &[Dimension] {
        &self.bins
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn diagnostic(&self, name: &str) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.name() == name)
    }

    pub fn diagnostic_names(&self) -> impl Iterator<Item = &str> {
        self.diagnostics.iter().map(Diagnostic::name)
    }

    /// Binned variables, in the order they were binned
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    #[must_use]
    pub fn has_variable(&self, variable: &str) -> bool {
        self.variables.iter().any(|v| v == variable)
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub fn attributes(&self) -> &GlobalAttributes {
        &self.attributes
    }

    #[must_use]
    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.attributes.window_start
    }

    #[must_use]
    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        self.attributes.window_end
    }

    /// Dimensions removed by `select_dim`, with the centre of the kept bin
    #[must_use]
    pub fn sliced_dims(&self) -> &[(String, f64)] {
        &self.sliced_dims
    }
}

/// Channel coordinate values for a 2-D input with `n` channels
fn channel_values(variable: &str, data: &RecordSet, n: usize) -> Result<Array1<f64>> {
    match data.channels() {
        Some(channels) if channels.len() == n => Ok(channels.to_owned()),
        Some(channels) => Err(ObsBinError::ShapeMismatch {
            field: format!("channel coordinate of '{variable}'"),
            expected: vec![n],
            found: vec![channels.len()],
        }),
        None => {
            warn!("'{variable}' is 2-D but has no channel coordinate, numbering channels 1..={n}");
            #[allow(clippy::cast_precision_loss)]
            Ok(Array1::from_iter((1..=n).map(|c| c as f64)))
        }
    }
}

fn pick<T: Copy>(a: Option<T>, b: Option<T>, choose: impl Fn(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(choose(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Selection for [`BinnedStatistics::get`].
///
/// Every list defaults to "all": all binned variables, all diagnostics and
/// all registered statistics. Combinations that are not available are
/// skipped unless [`Query::require_all`] is set.
#[derive(Debug, Clone, Default)]
pub struct Query {
    variables: Option<Vec<String>>,
    diagnostics: Option<Vec<String>>,
    statistics: Option<Vec<StatisticKind>>,
    strict: bool,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn variable(mut self, name: &str) -> Self {
        self.variables.get_or_insert_with(Vec::new).push(name.to_string());
        self
    }

    #[must_use]
    pub fn diagnostic(mut self, name: &str) -> Self {
        self.diagnostics.get_or_insert_with(Vec::new).push(name.to_string());
        self
    }

    #[must_use]
    pub fn statistic(mut self, kind: StatisticKind) -> Self {
        self.statistics.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Fail instead of skipping unavailable combinations
    #[must_use]
    pub fn require_all(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Result of [`BinnedStatistics::get`]: values keyed by
/// `<variable>.<diagnostic>.<statistic>` (or `<variable>.count`)
#[derive(Debug, Clone)]
pub struct BinnedFields {
    pub coordinates: Vec<Coordinate>,
    pub channel: Option<Coordinate>,
    pub fields: BTreeMap<String, ArrayD<f64>>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub sliced_dims: Vec<(String, f64)>,
}

impl BinnedFields {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.fields.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
