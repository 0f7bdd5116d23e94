//! Diagnostics: which statistics to bin for a named quantity
//!
//! A diagnostic `omb` with statistics `count,sum,sum2` means the
//! `omb/<variable>` field of the input is binned into those three
//! statistics for every variable.

use crate::errors::{ObsBinError, Result};
use crate::statistics::StatisticKind;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Statistics used when a diagnostic string lists none
pub const DEFAULT_STATISTICS: [StatisticKind; 3] =
    [StatisticKind::Count, StatisticKind::Sum, StatisticKind::Sum2];

/// A named diagnostic and the statistics to bin for it.
///
/// Equality compares the name and the statistic set, ignoring order.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    name: String,
    statistics: Vec<StatisticKind>,
}

impl Diagnostic {
    /// # Errors
    ///
    /// Fails when `name` is not a valid identifier, no statistic is given, or
    /// a statistic is unknown.
    pub fn new<S: AsRef<str>>(name: &str, statistics: &[S]) -> Result<Self> {
        let fail = |reason: &str| ObsBinError::InvalidDiagnostic {
            spec: name.to_string(),
            reason: reason.to_string(),
        };
        if !is_identifier(name) {
            return Err(fail("name must be a valid identifier"));
        }
        // `name:` does not parse, so an empty list could not be written back
        if statistics.is_empty() {
            return Err(fail("at least one statistic is required"));
        }
        let statistics = statistics
            .iter()
            .map(|s| s.as_ref().parse::<StatisticKind>())
            .collect::<Result<Vec<_>>>()
            .map_err(|e| fail(&e.to_string()))?;
        Ok(Self::with_kinds(name, statistics))
    }

    /// Diagnostic with the default statistics
    ///
    /// # Errors
    ///
    /// Fails when `name` is not a valid identifier.
    pub fn with_defaults(name: &str) -> Result<Self> {
        let names: Vec<&str> = DEFAULT_STATISTICS.iter().map(|k| k.as_str()).collect();
        Self::new(name, &names)
    }

    fn with_kinds(name: &str, statistics: Vec<StatisticKind>) -> Self {
        let mut unique = Vec::with_capacity(statistics.len());
        for kind in statistics {
            if !unique.contains(&kind) {
                unique.push(kind);
            }
        }
        Self {
            name: name.to_string(),
            statistics: unique,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statistics in the order they were given
    #[must_use]
    pub fn statistics(&self) -> &[StatisticKind] {
        &self.statistics
    }

    /// Statistics sorted so that every kind follows its dependencies
    #[must_use]
    pub fn ordered_statistics(&self) -> Vec<StatisticKind> {
        let mut ordered = self.statistics.clone();
        ordered.sort();
        ordered
    }

    #[must_use]
    pub fn has_statistic(&self, kind: StatisticKind) -> bool {
        self.statistics.contains(&kind)
    }

    fn statistic_set(&self) -> BTreeSet<StatisticKind> {
        self.statistics.iter().copied().collect()
    }
}

impl PartialEq for Diagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.statistic_set() == other.statistic_set()
    }
}

impl Eq for Diagnostic {}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats: Vec<&str> = self.statistics.iter().map(|k| k.as_str()).collect();
        write!(f, "{}:{}", self.name, stats.join(","))
    }
}

impl FromStr for Diagnostic {
    type Err = ObsBinError;

    /// Parse `<name>[:<stat1>,<stat2>,...]`, e.g. `omb` or `omb:count,sum`
    fn from_str(s: &str) -> Result<Self> {
        let fail = |reason: &str| ObsBinError::InvalidDiagnostic {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default();
        let stats = parts.next();
        if parts.next().is_some() {
            return Err(fail("too many ':' separated groups"));
        }
        if !is_identifier(name) {
            return Err(fail("name must be a valid identifier"));
        }

        match stats {
            None => Self::with_defaults(name),
            Some(list) => {
                let names: Vec<&str> = list.split(',').map(str::trim).collect();
                if names.iter().any(|n| n.is_empty()) {
                    return Err(fail("empty statistic name"));
                }
                Self::new(name, &names).map_err(|e| match e {
                    ObsBinError::InvalidDiagnostic { reason, .. } => fail(&reason),
                    other => other,
                })
            }
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
