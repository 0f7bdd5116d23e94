//! Statistic instances bound to a variable and diagnostic
//!
//! A [`Statistic`] is a short-lived accessor: it names one field of a
//! [`Grid`] and knows how to calculate, merge or evaluate it while enforcing
//! the dependency rules of its [`StatisticKind`].

use super::binning::Binner;
use super::operations::{
    Computable, CoreStatistic, Derivable, StatisticKind, StatisticRole, StatisticSource,
};
use crate::errors::{ObsBinError, Result};
use crate::grid::{FieldKey, Grid};
use ndarray::{ArrayD, ArrayViewD};
use tracing::debug;

/// One statistic of one variable (and diagnostic) in a grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistic {
    kind: StatisticKind,
    variable: String,
    diagnostic: Option<String>,
}

impl Statistic {
    /// The diagnostic is ignored for variable-scoped kinds
    #[must_use]
    pub fn new(kind: StatisticKind, variable: &str, diagnostic: Option<&str>) -> Self {
        let key = FieldKey::new(variable, diagnostic, kind);
        Self {
            kind,
            variable: key.variable,
            diagnostic: key.diagnostic,
        }
    }

    #[must_use]
    pub fn kind(&self) -> StatisticKind {
        self.kind
    }

    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// Key of the field this statistic reads and writes
    #[must_use]
    pub fn key(&self) -> FieldKey {
        self.sibling_key(self.kind)
    }

    fn sibling_key(&self, kind: StatisticKind) -> FieldKey {
        FieldKey::new(&self.variable, self.diagnostic.as_deref(), kind)
    }

    fn sibling_view<'a>(&'a self, grid: &'a Grid) -> Sibling<'a> {
        Sibling {
            grid,
            statistic: self,
        }
    }

    /// True when the field is stored in `grid`
    #[must_use]
    pub fn is_computed(&self, grid: &Grid) -> bool {
        grid.contains(&self.key())
    }

    /// Bin `values` into `grid`.
    ///
    /// Calculating count again is a no-op.
    ///
    /// # Errors
    ///
    /// Fails for derived kinds, for missing dependencies, when the field is
    /// already stored, or when `values` does not fit the binner.
    pub fn calc(&self, grid: &mut Grid, binner: &Binner, values: ArrayViewD<'_, f64>) -> Result<()> {
        let Some(core) = self.prepare(grid)? else {
            return Ok(());
        };
        debug!("calculating {}", self.key());
        let result = core.calc(binner, values, &self.sibling_view(grid))?;
        grid.insert(self.key(), result)
    }

    /// Store the merge of this statistic from `left` and `right` in `target`
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`Statistic::calc`], or when either
    /// operand lacks the statistic or its dependencies.
    pub fn merge(&self, target: &mut Grid, left: &Grid, right: &Grid) -> Result<()> {
        let Some(core) = self.prepare(target)? else {
            return Ok(());
        };
        debug!("merging {}", self.key());
        let result = core.merge(&self.sibling_view(left), &self.sibling_view(right))?;
        target.insert(self.key(), result)
    }

    /// Checks shared by calc and merge. `None` means nothing is left to do.
    fn prepare(&self, target: &Grid) -> Result<Option<CoreStatistic>> {
        let core = match self.kind.role() {
            StatisticRole::Core(core) => core,
            StatisticRole::Derived(_) => {
                return Err(ObsBinError::NotComputable {
                    name: self.kind.to_string(),
                })
            }
        };

        let key = self.key();
        if target.contains(&key) {
            if self.kind.is_global() {
                return Ok(None);
            }
            return Err(ObsBinError::AlreadyComputed { field: key.name() });
        }

        for dep in self.kind.depends() {
            if !target.contains(&self.sibling_key(*dep)) {
                return Err(ObsBinError::MissingDependency {
                    field: key.name(),
                    dependency: self.sibling_key(*dep).name(),
                });
            }
        }
        Ok(Some(core))
    }

    /// The value of this statistic in `grid`, evaluating derived kinds
    ///
    /// # Errors
    ///
    /// Returns [`ObsBinError::NotComputed`] if the field or any dependency is
    /// not stored.
    pub fn value(&self, grid: &Grid) -> Result<ArrayD<f64>> {
        let siblings = self.sibling_view(grid);
        for dep in self.kind.depends() {
            siblings.stored(*dep)?;
        }
        match self.kind.role() {
            StatisticRole::Core(core) => siblings.stored(core.kind()).cloned(),
            StatisticRole::Derived(derived) => derived.value(&siblings),
        }
    }
}

/// Grid fields as seen from one statistic
struct Sibling<'a> {
    grid: &'a Grid,
    statistic: &'a Statistic,
}

impl StatisticSource for Sibling<'_> {
    fn stored(&self, kind: StatisticKind) -> Result<&ArrayD<f64>> {
        let key = self.statistic.sibling_key(kind);
        self.grid
            .field(&key)
            .ok_or_else(|| ObsBinError::NotComputed { field: key.name() })
    }
}
