//! Projection of records onto the bins of a grid
//!
//! A [`Binner`] resolves, once per variable, which grid cell each record
//! falls into. Every core statistic of that variable then reduces its values
//! through the same lookup table.

use super::numeric::{propagating_max, propagating_min};
use crate::dimension::Dimension;
use crate::errors::{ObsBinError, Result};
use crate::records::RecordSet;
use ndarray::{ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix1, Ix2, IxDyn};
use rayon::prelude::*;
use tracing::debug;

/// Cell lookup table for one batch of records
#[derive(Debug, Clone)]
pub struct Binner {
    shape: Vec<usize>,
    /// Row-major cell index of each record, `None` when outside the grid
    locations: Vec<Option<usize>>,
}

impl Binner {
    /// Locate the records of `records` on the grid spanned by `bins`.
    ///
    /// Each dimension reads the record field of the same name.
    ///
    /// # Errors
    ///
    /// Fails when a coordinate field is missing or is not 1-D.
    pub fn new(bins: &[Dimension], records: &RecordSet) -> Result<Self> {
        let coordinates = bins
            .iter()
            .map(|dim| {
                let field = records.require(dim.name())?;
                field
                    .view()
                    .into_dimensionality::<Ix1>()
                    .map_err(|_| ObsBinError::ShapeMismatch {
                        field: dim.name().to_string(),
                        expected: vec![field.len_of(Axis(0))],
                        found: field.shape().to_vec(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_coordinates(bins, &coordinates, records.n_records().unwrap_or(0))
    }

    /// Locate `n_records` records given one coordinate array per dimension
    ///
    /// # Errors
    ///
    /// Fails when the number of coordinate arrays or their lengths disagree
    /// with the bins.
    pub fn from_coordinates(
        bins: &[Dimension],
        coordinates: &[ArrayView1<'_, f64>],
        n_records: usize,
    ) -> Result<Self> {
        if bins.len() != coordinates.len() {
            return Err(ObsBinError::ShapeMismatch {
                field: "coordinates".to_string(),
                expected: vec![bins.len()],
                found: vec![coordinates.len()],
            });
        }
        for (dim, coord) in bins.iter().zip(coordinates) {
            if coord.len() != n_records {
                return Err(ObsBinError::ShapeMismatch {
                    field: dim.name().to_string(),
                    expected: vec![n_records],
                    found: vec![coord.len()],
                });
            }
        }

        let locations: Vec<Option<usize>> = (0..n_records)
            .into_par_iter()
            .map(|i| {
                bins.iter().zip(coordinates).try_fold(0_usize, |flat, (dim, coord)| {
                    dim.bin_index(coord[i]).map(|index| flat * dim.len() + index)
                })
            })
            .collect();

        let outside = locations.iter().filter(|l| l.is_none()).count();
        if outside > 0 {
            debug!("{outside} of {n_records} records fall outside the grid");
        }

        Ok(Self {
            shape: bins.iter().map(Dimension::len).collect(),
            locations,
        })
    }

    /// Shape of the grid, without any channel axis
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn n_records(&self) -> usize {
        self.locations.len()
    }

    /// Number of records per bin, regardless of their values
    ///
    /// # Errors
    ///
    /// Fails for values of the wrong rank or record count.
    pub fn count(&self, values: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
        let ones = values.mapv(|_| 1.0);
        self.reduce(ones.view(), 0.0, |a, b| a + b)
    }

    /// Sum per bin, 0 for empty bins
    ///
    /// # Errors
    ///
    /// Fails for values of the wrong rank or record count.
    pub fn sum(&self, values: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
        self.reduce(values, 0.0, |a, b| a + b)
    }

    /// Minimum per bin, NaN for empty bins
    ///
    /// # Errors
    ///
    /// Fails for values of the wrong rank or record count.
    pub fn min(&self, values: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
        self.reduce(values, f64::NAN, propagating_min)
    }

    /// Maximum per bin, NaN for empty bins
    ///
    /// # Errors
    ///
    /// Fails for values of the wrong rank or record count.
    pub fn max(&self, values: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
        self.reduce(values, f64::NAN, propagating_max)
    }

    /// Fold every value into its cell, channel by channel.
    ///
    /// Output shape is the grid shape, plus a trailing channel axis for 2-D
    /// input. Cells that receive no record hold `empty`.
    fn reduce(
        &self,
        values: ArrayViewD<'_, f64>,
        empty: f64,
        fold: impl Fn(f64, f64) -> f64,
    ) -> Result<ArrayD<f64>> {
        let (matrix, channels) = self.as_matrix(values)?;
        let n_channels = matrix.ncols();
        let n_cells: usize = self.shape.iter().product();

        let mut acc: Vec<Option<f64>> = vec![None; n_cells * n_channels];
        for (row, location) in matrix.outer_iter().zip(&self.locations) {
            let Some(cell) = location else { continue };
            for (c, &v) in row.iter().enumerate() {
                let slot = &mut acc[cell * n_channels + c];
                *slot = Some(slot.map_or(v, |a| fold(a, v)));
            }
        }

        let mut shape = self.shape.clone();
        if let Some(n) = channels {
            shape.push(n);
        }
        let data = acc.into_iter().map(|a| a.unwrap_or(empty)).collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
    }

    /// View 1-D or 2-D values as records × channels
    fn as_matrix<'a>(
        &self,
        values: ArrayViewD<'a, f64>,
    ) -> Result<(ArrayView2<'a, f64>, Option<usize>)> {
        let found = values.shape().to_vec();
        if !(1..=2).contains(&values.ndim()) {
            return Err(ObsBinError::UnsupportedRank {
                field: "values".to_string(),
                ndim: values.ndim(),
            });
        }
        if found[0] != self.n_records() {
            return Err(ObsBinError::ShapeMismatch {
                field: "values".to_string(),
                expected: vec![self.n_records()],
                found,
            });
        }

        if values.ndim() == 2 {
            let n = found[1];
            Ok((values.into_dimensionality::<Ix2>()?, Some(n)))
        } else {
            Ok((values.insert_axis(Axis(1)).into_dimensionality::<Ix2>()?, None))
        }
    }
}
