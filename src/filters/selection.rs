//! Filters that drop records

use super::{expect_args, Filter, FilterContext};
use crate::errors::{ObsBinError, Result};
use crate::records::RecordSet;
use ndarray::{ArrayD, ArrayView1, Ix1, Zip};

/// `range:field:lo,hi`, keep values inside the closed range `[lo, hi]`.
///
/// For a 1-D field the other records are dropped. For a 2-D field the
/// out-of-range entries (in every field of the same shape) become NaN and
/// records without any in-range channel are dropped. NaN is never in range.
#[derive(Debug, Clone)]
pub struct ValueRange {
    field: String,
    lo: f64,
    hi: f64,
}

impl ValueRange {
    pub const NAME: &'static str = "range";

    #[must_use]
    pub fn new(field: &str, lo: f64, hi: f64) -> Self {
        Self {
            field: field.to_string(),
            lo,
            hi,
        }
    }

    /// # Errors
    ///
    /// Fails unless given a field name and a `lo,hi` pair with `lo <= hi`.
    pub fn create(args: &[String]) -> Result<Box<dyn Filter>> {
        let args = expect_args(Self::NAME, args, 2)?;
        let invalid = |reason: String| ObsBinError::InvalidFilter {
            spec: Self::NAME.to_string(),
            reason,
        };
        let bounds = args[1]
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| invalid(format!("range \"{}\" is not valid: {e}", args[1])))?;
        match bounds.as_slice() {
            [lo, hi] if lo <= hi => Ok(Box::new(Self::new(&args[0], *lo, *hi))),
            _ => Err(invalid(format!(
                "range must be given as \"lo,hi\" with lo <= hi, got \"{}\"",
                args[1]
            ))),
        }
    }

    fn contains(&self, x: f64) -> bool {
        x >= self.lo && x <= self.hi
    }
}

impl Filter for ValueRange {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn per_variable(&self) -> bool {
        true
    }

    fn filter(&self, mut data: RecordSet, ctx: &FilterContext<'_>) -> Result<RecordSet> {
        let name = ctx.expand(&self.field);
        let values = data.require(&name)?;
        let mask: ArrayD<bool> = values.mapv(|x| self.contains(x));

        match mask.ndim() {
            1 => {
                let keep: Vec<bool> = mask.iter().copied().collect();
                data.select_records(&keep)
            }
            2 => {
                let keep: Vec<bool> = mask.outer_iter().map(|row| row.iter().any(|&m| m)).collect();
                let shaped: Vec<String> = data
                    .fields()
                    .filter(|(_, f)| f.shape() == mask.shape())
                    .map(|(n, _)| n.to_string())
                    .collect();
                for field in shaped {
                    if let Some(values) = data.field_mut(&field) {
                        Zip::from(values).and(&mask).for_each(|v, &m| {
                            if !m {
                                *v = f64::NAN;
                            }
                        });
                    }
                }
                data.select_records(&keep)
            }
            ndim => Err(ObsBinError::UnsupportedRank { field: name, ndim }),
        }
    }
}

/// `remove_nan`, drop every record holding NaN in any field
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveNan;

impl RemoveNan {
    pub const NAME: &'static str = "remove_nan";

    /// # Errors
    ///
    /// Fails when arguments are given.
    pub fn create(args: &[String]) -> Result<Box<dyn Filter>> {
        expect_args(Self::NAME, args, 0)?;
        Ok(Box::new(Self))
    }
}

impl Filter for RemoveNan {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn per_variable(&self) -> bool {
        true
    }

    fn filter(&self, data: RecordSet, _ctx: &FilterContext<'_>) -> Result<RecordSet> {
        let mut keep = vec![true; data.n_records().unwrap_or(0)];
        for (_, values) in data.fields() {
            for (i, record) in values.outer_iter().enumerate() {
                if record.iter().any(|v| v.is_nan()) {
                    keep[i] = false;
                }
            }
        }
        data.select_records(&keep)
    }
}

/// `domain_clip:lat,lon:lat,lon:...`, keep records whose `latitude` and
/// `longitude` lie inside a polygon.
///
/// Vertices are (latitude, longitude) pairs; negative longitudes are
/// wrapped into [0, 360). Points on the boundary may fall either way.
#[derive(Debug, Clone)]
pub struct DomainClip {
    vertices: Vec<(f64, f64)>,
}

impl DomainClip {
    pub const NAME: &'static str = "domain_clip";

    /// # Errors
    ///
    /// Fails for fewer than three vertices.
    pub fn new(vertices: Vec<(f64, f64)>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(ObsBinError::InvalidFilter {
                spec: Self::NAME.to_string(),
                reason: format!("at least 3 vertices are needed, got {}", vertices.len()),
            });
        }
        let vertices = vertices
            .into_iter()
            .map(|(lat, lon)| (lat, if lon < 0.0 { lon + 360.0 } else { lon }))
            .collect();
        Ok(Self { vertices })
    }

    /// # Errors
    ///
    /// Fails for malformed `lat,lon` pairs or fewer than three of them.
    pub fn create(args: &[String]) -> Result<Box<dyn Filter>> {
        let vertices = args
            .iter()
            .map(|arg| match arg.split(',').collect::<Vec<_>>().as_slice() {
                [lat, lon] => match (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
                    (Ok(lat), Ok(lon)) => Ok((lat, lon)),
                    _ => Err(bad_vertex(arg)),
                },
                _ => Err(bad_vertex(arg)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(Self::new(vertices)?))
    }

    /// Even-odd rule point in polygon test
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (lat_i, lon_i) = self.vertices[i];
            let (lat_j, lon_j) = self.vertices[j];
            if (lon_i > lon) != (lon_j > lon)
                && lat < (lat_j - lat_i) * (lon - lon_i) / (lon_j - lon_i) + lat_i
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

fn bad_vertex(arg: &str) -> ObsBinError {
    ObsBinError::InvalidFilter {
        spec: DomainClip::NAME.to_string(),
        reason: format!("vertex \"{arg}\" is not a \"lat,lon\" pair"),
    }
}

impl Filter for DomainClip {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter(&self, data: RecordSet, _ctx: &FilterContext<'_>) -> Result<RecordSet> {
        let lat = coordinate(&data, "latitude")?;
        let lon = coordinate(&data, "longitude")?;
        let keep: Vec<bool> = lat
            .iter()
            .zip(lon.iter())
            .map(|(&la, &lo)| self.contains(la, lo))
            .collect();
        data.select_records(&keep)
    }
}

fn coordinate<'a>(data: &'a RecordSet, name: &str) -> Result<ArrayView1<'a, f64>> {
    let field = data.require(name)?;
    field
        .view()
        .into_dimensionality::<Ix1>()
        .map_err(|_| ObsBinError::UnsupportedRank {
            field: name.to_string(),
            ndim: field.ndim(),
        })
}
