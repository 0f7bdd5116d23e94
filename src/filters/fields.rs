//! Filters that create or move fields

use super::{expect_args, Filter, FilterContext};
use crate::errors::{ObsBinError, Result};
use crate::records::RecordSet;

/// `copy:src:dst`, duplicate a field under a new name
#[derive(Debug, Clone)]
pub struct CopyField {
    source: String,
    target: String,
}

impl CopyField {
    pub const NAME: &'static str = "copy";

    #[must_use]
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    /// # Errors
    ///
    /// Fails unless exactly two arguments are given.
    pub fn create(args: &[String]) -> Result<Box<dyn Filter>> {
        let args = expect_args(Self::NAME, args, 2)?;
        Ok(Box::new(Self::new(&args[0], &args[1])))
    }
}

impl Filter for CopyField {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter(&self, mut data: RecordSet, _ctx: &FilterContext<'_>) -> Result<RecordSet> {
        let values = data.require(&self.source)?.clone();
        data.insert(self.target.clone(), values)?;
        Ok(data)
    }
}

/// `rename:src:dst`, move a field. Both names may contain `{variable}`.
#[derive(Debug, Clone)]
pub struct RenameField {
    source: String,
    target: String,
}

impl RenameField {
    pub const NAME: &'static str = "rename";

    #[must_use]
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    /// # Errors
    ///
    /// Fails unless exactly two arguments are given.
    pub fn create(args: &[String]) -> Result<Box<dyn Filter>> {
        let args = expect_args(Self::NAME, args, 2)?;
        Ok(Box::new(Self::new(&args[0], &args[1])))
    }
}

impl Filter for RenameField {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn per_variable(&self) -> bool {
        true
    }

    fn filter(&self, mut data: RecordSet, ctx: &FilterContext<'_>) -> Result<RecordSet> {
        data.rename(&ctx.expand(&self.source), &ctx.expand(&self.target))?;
        Ok(data)
    }
}

/// `sub:grp1:grp2:dst`, store `grp1/<variable> - grp2/<variable>` as
/// `dst/<variable>`
#[derive(Debug, Clone)]
pub struct Subtract {
    minuend: String,
    subtrahend: String,
    target: String,
}

impl Subtract {
    pub const NAME: &'static str = "sub";

    #[must_use]
    pub fn new(minuend: &str, subtrahend: &str, target: &str) -> Self {
        Self {
            minuend: minuend.to_string(),
            subtrahend: subtrahend.to_string(),
            target: target.to_string(),
        }
    }

    /// # Errors
    ///
    /// Fails unless exactly three arguments are given.
    pub fn create(args: &[String]) -> Result<Box<dyn Filter>> {
        let args = expect_args(Self::NAME, args, 3)?;
        Ok(Box::new(Self::new(&args[0], &args[1], &args[2])))
    }
}

impl Filter for Subtract {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn per_variable(&self) -> bool {
        true
    }

    fn filter(&self, mut data: RecordSet, ctx: &FilterContext<'_>) -> Result<RecordSet> {
        let variable = ctx.require_variable(Self::NAME)?;
        let a = data.require(&format!("{}/{variable}", self.minuend))?;
        let b = data.require(&format!("{}/{variable}", self.subtrahend))?;
        if a.shape() != b.shape() {
            return Err(ObsBinError::ShapeMismatch {
                field: format!("{}/{variable}", self.subtrahend),
                expected: a.shape().to_vec(),
                found: b.shape().to_vec(),
            });
        }
        let difference = a - b;
        data.insert(format!("{}/{variable}", self.target), difference)?;
        Ok(data)
    }
}
