//! Statistic registry and capability traits
//!
//! [`StatisticKind`] is the registry of every statistic name the crate knows,
//! together with its declared dependencies. Each kind is either a
//! [`CoreStatistic`], which can bin raw values and merge two binned results
//! ([`Computable`]), or a [`DerivedStatistic`], which is only ever evaluated
//! from core statistics already stored in a grid ([`Derivable`]).

use super::binning::Binner;
use super::numeric::{clamp_non_negative, divide_where, nan_max, nan_mean, nan_min};
use crate::errors::{ObsBinError, Result};
use ndarray::{ArrayD, ArrayViewD, Zip};
use std::fmt;
use std::str::FromStr;

/// Every registered statistic type.
///
/// Declaration order is a valid evaluation order: no kind depends on a kind
/// declared after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatisticKind {
    /// Number of records in a bin
    Count,
    /// Sum of values
    Sum,
    /// Sum of squared deviations from the bin mean
    Sum2,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Arithmetic mean
    Mean,
    /// Population variance
    Variance,
    /// Population standard deviation
    StdDev,
    /// Root mean square deviation
    Rmsd,
}

/// Whether a statistic is binned directly or derived from others
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticRole {
    Core(CoreStatistic),
    Derived(DerivedStatistic),
}

impl StatisticKind {
    /// All registered kinds, in evaluation order
    pub const ALL: [Self; 9] = [
        Self::Count,
        Self::Sum,
        Self::Sum2,
        Self::Min,
        Self::Max,
        Self::Mean,
        Self::Variance,
        Self::StdDev,
        Self::Rmsd,
    ];

    /// Registered name of the statistic
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Sum2 => "sum2",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
            Self::Variance => "variance",
            Self::StdDev => "stddev",
            Self::Rmsd => "rmsd",
        }
    }

    /// Statistics that must already be stored before this one can be
    /// calculated, merged or evaluated
    #[must_use]
    pub const fn depends(self) -> &'static [Self] {
        match self {
            Self::Count | Self::Min | Self::Max => &[],
            Self::Sum => &[Self::Count],
            Self::Sum2 | Self::Mean => &[Self::Count, Self::Sum],
            Self::Variance | Self::StdDev | Self::Rmsd => &[Self::Count, Self::Sum, Self::Sum2],
        }
    }

    /// Core or derived capability of this kind
    #[must_use]
    pub const fn role(self) -> StatisticRole {
        match self {
            Self::Count => StatisticRole::Core(CoreStatistic::Count),
            Self::Sum => StatisticRole::Core(CoreStatistic::Sum),
            Self::Sum2 => StatisticRole::Core(CoreStatistic::Sum2),
            Self::Min => StatisticRole::Core(CoreStatistic::Min),
            Self::Max => StatisticRole::Core(CoreStatistic::Max),
            Self::Mean => StatisticRole::Derived(DerivedStatistic::Mean),
            Self::Variance => StatisticRole::Derived(DerivedStatistic::Variance),
            Self::StdDev => StatisticRole::Derived(DerivedStatistic::StdDev),
            Self::Rmsd => StatisticRole::Derived(DerivedStatistic::Rmsd),
        }
    }

    /// True if the statistic is stored once per variable rather than once
    /// per diagnostic
    #[must_use]
    pub const fn is_global(self) -> bool {
        matches!(self, Self::Count)
    }

    /// True for kinds that bin raw data
    #[must_use]
    pub const fn is_core(self) -> bool {
        matches!(self.role(), StatisticRole::Core(_))
    }

    /// Names of every registered statistic
    pub fn types() -> impl Iterator<Item = &'static str> {
        Self::ALL.iter().map(|k| k.as_str())
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatisticKind {
    type Err = ObsBinError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ObsBinError::UnknownStatistic {
                name: s.to_string(),
            })
    }
}

/// Read access to the sibling statistics of the one being evaluated
pub trait StatisticSource {
    /// The stored array for `kind`, or [`ObsBinError::NotComputed`]
    ///
    /// # Errors
    ///
    /// Fails when the array is not stored.
    fn stored(&self, kind: StatisticKind) -> Result<&ArrayD<f64>>;
}

/// Statistics that can be binned from raw values and merged
pub trait Computable {
    /// Bin `values` (records, or records × channels) into a new array
    ///
    /// # Errors
    ///
    /// Fails when a dependency is missing or shapes do not line up.
    fn calc(
        &self,
        binner: &Binner,
        values: ArrayViewD<'_, f64>,
        siblings: &dyn StatisticSource,
    ) -> Result<ArrayD<f64>>;

    /// Combine two binned results of the same statistic
    ///
    /// # Errors
    ///
    /// Fails when either side lacks the statistic or its dependencies.
    fn merge(&self, left: &dyn StatisticSource, right: &dyn StatisticSource) -> Result<ArrayD<f64>>;
}

/// Statistics that are only evaluated from other stored statistics
pub trait Derivable {
    /// Evaluate from stored siblings
    ///
    /// # Errors
    ///
    /// Fails when a dependency has not been calculated.
    fn value(&self, siblings: &dyn StatisticSource) -> Result<ArrayD<f64>>;
}

/// The statistics that do the actual binning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreStatistic {
    Count,
    Sum,
    Sum2,
    Min,
    Max,
}

impl CoreStatistic {
    #[must_use]
    pub const fn kind(self) -> StatisticKind {
        match self {
            Self::Count => StatisticKind::Count,
            Self::Sum => StatisticKind::Sum,
            Self::Sum2 => StatisticKind::Sum2,
            Self::Min => StatisticKind::Min,
            Self::Max => StatisticKind::Max,
        }
    }
}

impl Computable for CoreStatistic {
    fn calc(
        &self,
        binner: &Binner,
        values: ArrayViewD<'_, f64>,
        siblings: &dyn StatisticSource,
    ) -> Result<ArrayD<f64>> {
        match self {
            Self::Count => binner.count(values),
            Self::Sum => binner.sum(values),
            Self::Min => binner.min(values),
            Self::Max => binner.max(values),
            Self::Sum2 => {
                let count = siblings.stored(StatisticKind::Count)?;
                let sum = siblings.stored(StatisticKind::Sum)?;

                // offset by the batch mean to keep the squares small
                let offset = nan_mean(values.iter().copied()).unwrap_or(0.0);
                let squared = values.mapv(|x| (x - offset) * (x - offset));
                let raw = binner.sum(squared.view())?;
                check_shape("sum2", count, &raw)?;
                check_shape("sum2", sum, &raw)?;

                let shifted = Zip::from(sum)
                    .and(count)
                    .map_collect(|&s, &n| (s - offset * n) * (s - offset * n));
                let correction = divide_where(&shifted, count, 0.0, |n| n > 0.0);

                Ok(Zip::from(&raw)
                    .and(&correction)
                    .map_collect(|&r, &c| clamp_non_negative(r - c)))
            }
        }
    }

    fn merge(&self, left: &dyn StatisticSource, right: &dyn StatisticSource) -> Result<ArrayD<f64>> {
        let kind = self.kind();
        let a = left.stored(kind)?;
        let b = right.stored(kind)?;
        check_shape(kind.as_str(), a, b)?;

        match self {
            Self::Count | Self::Sum => Ok(a + b),
            Self::Min => Ok(Zip::from(a).and(b).map_collect(|&x, &y| nan_min(x, y))),
            Self::Max => Ok(Zip::from(a).and(b).map_collect(|&x, &y| nan_max(x, y))),
            Self::Sum2 => {
                let count_a = left.stored(StatisticKind::Count)?;
                let count_b = right.stored(StatisticKind::Count)?;
                let sum_a = left.stored(StatisticKind::Sum)?;
                let sum_b = right.stored(StatisticKind::Sum)?;
                for other in [count_a, count_b, sum_a, sum_b] {
                    check_shape("sum2", a, other)?;
                }

                let mean_a = divide_where(sum_a, count_a, 0.0, |n| n > 0.0);
                let mean_b = divide_where(sum_b, count_b, 0.0, |n| n > 0.0);
                let count = count_a + count_b;
                let numerator = Zip::from(&mean_a)
                    .and(&mean_b)
                    .and(count_a)
                    .and(count_b)
                    .map_collect(|&ma, &mb, &na, &nb| {
                        let delta = ma - mb;
                        delta * delta * na * nb
                    });
                let correction = divide_where(&numerator, &count, 0.0, |n| n > 0.0);

                Ok(a + b + correction)
            }
        }
    }
}

/// Statistics computed from already binned core statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedStatistic {
    Mean,
    Variance,
    StdDev,
    Rmsd,
}

impl Derivable for DerivedStatistic {
    fn value(&self, siblings: &dyn StatisticSource) -> Result<ArrayD<f64>> {
        let count = siblings.stored(StatisticKind::Count)?;
        match self {
            Self::Mean => {
                let sum = siblings.stored(StatisticKind::Sum)?;
                check_shape("mean", count, sum)?;
                Ok(divide_where(sum, count, f64::NAN, |n| n > 0.0))
            }
            Self::Variance => variance(count, siblings),
            Self::StdDev => {
                Ok(variance(count, siblings)?.mapv(|v| clamp_non_negative(v).sqrt()))
            }
            Self::Rmsd => {
                let var = variance(count, siblings)?;
                let mean = Self::Mean.value(siblings)?;
                Ok(Zip::from(&var)
                    .and(&mean)
                    .map_collect(|&v, &m| clamp_non_negative(v + m * m).sqrt()))
            }
        }
    }
}

fn variance(count: &ArrayD<f64>, siblings: &dyn StatisticSource) -> Result<ArrayD<f64>> {
    let sum2 = siblings.stored(StatisticKind::Sum2)?;
    check_shape("variance", count, sum2)?;
    Ok(divide_where(sum2, count, f64::NAN, |n| n > 1.0))
}

fn check_shape(field: &str, expected: &ArrayD<f64>, found: &ArrayD<f64>) -> Result<()> {
    if expected.shape() == found.shape() {
        Ok(())
    } else {
        Err(ObsBinError::ShapeMismatch {
            field: field.to_string(),
            expected: expected.shape().to_vec(),
            found: found.shape().to_vec(),
        })
    }
}
