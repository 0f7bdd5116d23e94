//! Filters applied to unbinned records before binning
//!
//! Filters are created by name through a [`FilterRegistry`], either directly
//! or from the `name:arg1:arg2` strings accepted on the command line. A
//! [`FilterPipeline`] strings them together in the order binning needs:
//! whole-dataset filters once, then per-variable filters for each variable.
//!
//! # Organization
//!
//! - [`preparation`]: `metadata_groups`, `lon_wrap` and `trim_vars`, which the
//!   standard pipeline always runs
//! - [`fields`]: `copy`, `rename` and `sub`, which create or move fields
//! - [`selection`]: `range`, `remove_nan` and `domain_clip`, which drop records

pub mod fields;
pub mod preparation;
pub mod selection;

use crate::diagnostic::Diagnostic;
use crate::dimension::Dimension;
use crate::errors::{ObsBinError, Result};
use crate::records::RecordSet;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub use fields::{CopyField, RenameField, Subtract};
pub use preparation::{LonWrap, MetadataGroups, TrimVars};
pub use selection::{DomainClip, RemoveNan, ValueRange};

/// What a filter is being applied for
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterContext<'a> {
    /// The variable being prepared, for per-variable filters
    pub variable: Option<&'a str>,
}

impl<'a> FilterContext<'a> {
    #[must_use]
    pub fn for_variable(variable: &'a str) -> Self {
        Self {
            variable: Some(variable),
        }
    }

    /// Substitute `{variable}` in `pattern`
    #[must_use]
    pub fn expand(&self, pattern: &str) -> String {
        match self.variable {
            Some(variable) => pattern.replace("{variable}", variable),
            None => pattern.to_string(),
        }
    }

    /// The variable, for filters that cannot run without one
    ///
    /// # Errors
    ///
    /// Fails when the filter runs outside a per-variable context.
    pub fn require_variable(&self, filter: &str) -> Result<&'a str> {
        self.variable.ok_or_else(|| ObsBinError::InvalidFilter {
            spec: filter.to_string(),
            reason: "must be applied per variable".to_string(),
        })
    }
}

/// A transformation of unbinned records
pub trait Filter: fmt::Debug + Send + Sync {
    /// Registered name of the filter
    fn name(&self) -> &'static str;

    /// True if the filter runs once per binned variable
    fn per_variable(&self) -> bool {
        false
    }

    /// Apply the filter
    ///
    /// # Errors
    ///
    /// Fails when required fields are missing or have unexpected shapes.
    fn filter(&self, data: RecordSet, ctx: &FilterContext<'_>) -> Result<RecordSet>;
}

/// Creates a filter from positional arguments
pub type FilterFactory = fn(&[String]) -> Result<Box<dyn Filter>>;

/// Named filter factories
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    factories: BTreeMap<String, FilterFactory>,
}

impl FilterRegistry {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in filter
    #[must_use]
    pub fn with_builtin() -> Self {
        let builtin: [(&str, FilterFactory); 9] = [
            (MetadataGroups::NAME, MetadataGroups::create),
            (LonWrap::NAME, LonWrap::create),
            (TrimVars::NAME, TrimVars::create),
            (CopyField::NAME, CopyField::create),
            (RenameField::NAME, RenameField::create),
            (Subtract::NAME, Subtract::create),
            (ValueRange::NAME, ValueRange::create),
            (RemoveNan::NAME, RemoveNan::create),
            (DomainClip::NAME, DomainClip::create),
        ];
        Self {
            factories: builtin
                .into_iter()
                .map(|(name, factory)| (name.to_string(), factory))
                .collect(),
        }
    }

    /// Add a factory under `name`
    ///
    /// # Errors
    ///
    /// Returns [`ObsBinError::DuplicateFilter`] if the name is taken.
    pub fn register(&mut self, name: &str, factory: FilterFactory) -> Result<()> {
        let name = name.to_lowercase();
        if self.factories.contains_key(&name) {
            return Err(ObsBinError::DuplicateFilter { name });
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Create the filter registered as `name` (case-insensitive)
    ///
    /// # Errors
    ///
    /// Fails for unknown names or arguments the filter rejects.
    pub fn create(&self, name: &str, args: &[String]) -> Result<Box<dyn Filter>> {
        let factory = self
            .factories
            .get(&name.to_lowercase())
            .ok_or_else(|| ObsBinError::UnknownFilter {
                name: name.to_string(),
            })?;
        factory(args)
    }

    /// Create a filter from `name[:arg1[:arg2...]]`
    ///
    /// # Errors
    ///
    /// See [`FilterRegistry::create`].
    pub fn parse(&self, spec: &str) -> Result<Box<dyn Filter>> {
        let mut parts = spec.split(':');
        let name = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.map(str::to_string).collect();
        self.create(name, &args)
    }

    /// Names of the registered filters, sorted
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }
}

/// Check the argument count of a filter string
pub(crate) fn expect_args<'a>(
    name: &str,
    args: &'a [String],
    expected: usize,
) -> Result<&'a [String]> {
    if args.len() == expected {
        Ok(args)
    } else {
        Err(ObsBinError::InvalidFilter {
            spec: name.to_string(),
            reason: format!("expected {expected} argument(s), got {}", args.len()),
        })
    }
}

/// Filters in the order binning applies them
#[derive(Debug, Default)]
pub struct FilterPipeline {
    global: Vec<Box<dyn Filter>>,
    per_variable: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    /// The standard pipeline: `metadata_groups` and `lon_wrap`, then the
    /// user's whole-dataset filters; per variable the user's per-variable
    /// filters followed by `trim_vars`.
    #[must_use]
    pub fn standard(
        bins: &[Dimension],
        diagnostics: &[Diagnostic],
        user: Vec<Box<dyn Filter>>,
    ) -> Self {
        let bin_names: Vec<String> = bins.iter().map(|d| d.name().to_string()).collect();
        let diag_names: Vec<String> = diagnostics.iter().map(|d| d.name().to_string()).collect();

        // lon_wrap and domain_clip read the top-level coordinates
        let mut lifted = bin_names.clone();
        for name in ["latitude", "longitude"] {
            if !lifted.iter().any(|n| n == name) {
                lifted.push(name.to_string());
            }
        }

        let mut global: Vec<Box<dyn Filter>> = vec![
            Box::new(MetadataGroups::new(lifted)),
            Box::new(LonWrap),
        ];
        let mut per_variable: Vec<Box<dyn Filter>> = Vec::new();
        for filter in user {
            if filter.per_variable() {
                per_variable.push(filter);
            } else {
                global.push(filter);
            }
        }
        per_variable.push(Box::new(TrimVars::new(diag_names, bin_names)));

        Self {
            global,
            per_variable,
        }
    }

    /// Run the whole-dataset filters
    ///
    /// # Errors
    ///
    /// Returns the first filter error.
    pub fn apply_global(&self, data: RecordSet) -> Result<RecordSet> {
        let ctx = FilterContext::default();
        self.global.iter().try_fold(data, |data, filter| {
            debug!("applying filter {}", filter.name());
            filter.filter(data, &ctx)
        })
    }

    /// Run the per-variable filters for `variable`
    ///
    /// # Errors
    ///
    /// Returns the first filter error.
    pub fn apply_variable(&self, data: RecordSet, variable: &str) -> Result<RecordSet> {
        let ctx = FilterContext::for_variable(variable);
        self.per_variable.iter().try_fold(data, |data, filter| {
            debug!("applying filter {} to {variable}", filter.name());
            filter.filter(data, &ctx)
        })
    }

    /// Names of the filters, whole-dataset ones first
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.global
            .iter()
            .chain(&self.per_variable)
            .map(|f| f.name())
    }
}
