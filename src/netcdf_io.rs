//! NetCDF I/O for binned results and observation files
//!
//! [`NetCDFStore`] writes and reads binned statistics in a NetCDF-4 layout
//! with three groups:
//!
//! - `Diagnostics`: the bin centre coordinates, the optional channel
//!   coordinate and one variable per stored field, named
//!   `<variable>.<diagnostic>.<statistic>` (`<variable>.count` for counts).
//!   Group attributes `diagnostics` and `<diag>.stats` describe the
//!   diagnostics.
//! - `Bins`: the raw edges of every binning dimension.
//! - `Filters`: reserved.
//!
//! [`NetCDFObsReader`] loads the 1-D and 2-D variables of an observation file
//! into a [`RecordSet`]. The record axis is the file's location dimension,
//! whatever order the groups were created in.

use crate::data_source::{BinnedState, BinnedStore, GlobalAttributes, RecordSource, UNKNOWN_LABEL};
use crate::diagnostic::Diagnostic;
use crate::dimension::Dimension;
use crate::errors::{ObsBinError, Result};
use crate::grid::{Coordinate, FieldKey, Grid};
use crate::records::{RecordSet, CHANNEL_COORDINATE};
use chrono::{DateTime, NaiveDateTime, Utc};
use ndarray::{Array1, ArrayD, Ix1, IxDyn};
use netcdf::{AttributeValue, Variable};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DIAGNOSTICS_GROUP: &str = "Diagnostics";
const BINS_GROUP: &str = "Bins";
const FILTERS_GROUP: &str = "Filters";

/// Append `.nc4` unless the file name already ends in `.nc` or `.nc4`
#[must_use]
pub fn with_default_suffix(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some("nc" | "nc4") => path.to_path_buf(),
        _ => {
            let mut name = OsString::from(path.as_os_str());
            name.push(".nc4");
            PathBuf::from(name)
        }
    }
}

/// NetCDF-4 persistence of binned statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct NetCDFStore;

impl BinnedStore for NetCDFStore {
    fn write_state(&self, state: &BinnedState, path: &Path, overwrite: bool) -> Result<PathBuf> {
        let path = with_default_suffix(path);
        if path.exists() && !overwrite {
            return Err(ObsBinError::FileExists { path });
        }

        // build the file beside the target and move it into place only once
        // complete, so a failed write leaves any existing file untouched
        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let staging = tempfile::Builder::new()
            .prefix(".obsbin-")
            .tempdir_in(parent)?;
        let staged = staging.path().join("binned.nc4");
        write_layout(state, &staged)?;
        fs::rename(&staged, &path)?;

        info!(
            "wrote '{}' with {} fields to {}",
            state.name,
            state.grid.len(),
            path.display()
        );
        Ok(path)
    }

    fn read_state(&self, path: &Path) -> Result<BinnedState> {
        let path = with_default_suffix(path);
        let invalid = |reason: String| ObsBinError::InvalidFile {
            path: path.clone(),
            reason,
        };

        let file = netcdf::open(&path)?;

        let name = string_attribute(file.attribute("binning"))?
            .ok_or_else(|| invalid("missing global attribute 'binning'".to_string()))?;
        let timestamp = |attr: &str| -> Result<Option<DateTime<Utc>>> {
            string_attribute(file.attribute(attr))?
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| invalid(format!("bad '{attr}' timestamp '{s}': {e}")))
                })
                .transpose()
        };
        let attributes = GlobalAttributes {
            obs_source: string_attribute(file.attribute("obs_source"))?
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            experiment: string_attribute(file.attribute("experiment"))?
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            window_start: timestamp("window_start")?,
            window_end: timestamp("window_end")?,
        };
        let variables: Vec<String> = string_attribute(file.attribute("variables"))?
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let bins_group = file
            .group(BINS_GROUP)?
            .ok_or_else(|| invalid(format!("missing group '{BINS_GROUP}'")))?;
        let mut bins = Vec::new();
        for var in bins_group.variables() {
            let edges = var.get_values::<f64, _>(..)?;
            let units = string_attribute(var.attribute("units"))?;
            bins.push(Dimension::from_edges(&var.name(), edges)?.with_units(units.as_deref()));
        }

        let group = file
            .group(DIAGNOSTICS_GROUP)?
            .ok_or_else(|| invalid(format!("missing group '{DIAGNOSTICS_GROUP}'")))?;
        let diag_names = strings_attribute(group.attribute("diagnostics"))?.unwrap_or_default();
        let diagnostics = diag_names
            .iter()
            .map(|diag| {
                let attr = format!("{diag}.stats");
                let stats = strings_attribute(group.attribute(&attr))?
                    .ok_or_else(|| invalid(format!("missing attribute '{attr}'")))?;
                Diagnostic::new(diag, &stats)
            })
            .collect::<Result<Vec<_>>>()?;

        let coordinate = |name: &str| -> Result<Option<Coordinate>> {
            let Some(var) = group.variable(name) else {
                return Ok(None);
            };
            let values = Array1::from(var.get_values::<f64, _>(..)?);
            let units = string_attribute(var.attribute("units"))?;
            Ok(Some(Coordinate::new(name, values, units.as_deref())))
        };
        let coordinates = bins
            .iter()
            .map(|dim| {
                coordinate(dim.name())?
                    .ok_or_else(|| invalid(format!("missing coordinate '{}'", dim.name())))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut grid = Grid::new(coordinates);
        if let Some(channel) = coordinate(CHANNEL_COORDINATE)? {
            grid = grid.with_channel_axis(channel);
        }

        let diag_refs: Vec<&str> = diag_names.iter().map(String::as_str).collect();
        for var in group.variables() {
            let var_name = var.name();
            if var_name == CHANNEL_COORDINATE || bins.iter().any(|d| d.name() == var_name) {
                continue;
            }
            let key = FieldKey::parse(&var_name, &diag_refs)?;
            grid.insert(key, read_array(&var)?)?;
        }

        debug!("read '{name}' with {} fields from {}", grid.len(), path.display());
        Ok(BinnedState {
            name,
            bins,
            diagnostics,
            variables,
            grid,
            attributes,
        })
    }
}

/// Write the binned layout to a new file at `path`
fn write_layout(state: &BinnedState, path: &Path) -> Result<()> {
    let mut file = netcdf::create(path)?;

    let attrs = &state.attributes;
    file.add_attribute("binning", state.name.as_str())?;
    file.add_attribute("obs_source", attrs.obs_source.as_str())?;
    file.add_attribute("experiment", attrs.experiment.as_str())?;
    if let Some(start) = attrs.window_start {
        file.add_attribute("window_start", start.to_rfc3339())?;
    }
    if let Some(end) = attrs.window_end {
        file.add_attribute("window_end", end.to_rfc3339())?;
    }
    file.add_attribute("variables", state.variables.join(" "))?;
    file.add_attribute(
        "history",
        format!("Created by obsbin on {}", Utc::now().to_rfc3339()),
    )?;

    {
        let grid = &state.grid;
        let mut group = file.add_group(DIAGNOSTICS_GROUP)?;

        let mut axes: Vec<&Coordinate> = grid.coordinates().iter().collect();
        axes.extend(grid.channel_axis());
        for axis in &axes {
            group.add_dimension(&axis.name, axis.len())?;
            let mut var = group.add_variable::<f64>(&axis.name, &[axis.name.as_str()])?;
            var.put_values(&axis.values.to_vec(), ..)?;
            if let Some(units) = &axis.units {
                var.put_attribute("units", units.as_str())?;
            }
        }

        let base: Vec<&str> = grid.coordinates().iter().map(|c| c.name.as_str()).collect();
        for (key, values) in grid.fields() {
            let mut dims = base.clone();
            if values.ndim() > base.len() {
                dims.push(CHANNEL_COORDINATE);
            }
            let mut var = group.add_variable::<f64>(&key.name(), &dims)?;
            var.put_values(&values.iter().copied().collect::<Vec<f64>>(), ..)?;
        }

        let names: Vec<String> = state.diagnostics.iter().map(|d| d.name().to_string()).collect();
        if !names.is_empty() {
            group.add_attribute("diagnostics", names)?;
        }
        for diag in &state.diagnostics {
            let stats: Vec<String> = diag.statistics().iter().map(ToString::to_string).collect();
            group.add_attribute(&format!("{}.stats", diag.name()), stats)?;
        }
    }

    {
        let mut group = file.add_group(BINS_GROUP)?;
        for dim in &state.bins {
            let edges_dim = format!("{}_edges", dim.name());
            group.add_dimension(&edges_dim, dim.bin_edges().len())?;
            let mut var = group.add_variable::<f64>(dim.name(), &[edges_dim.as_str()])?;
            var.put_values(&dim.bin_edges().to_vec(), ..)?;
            if let Some(units) = dim.units() {
                var.put_attribute("units", units)?;
            }
        }
    }

    file.add_group(FILTERS_GROUP)?;
    Ok(())
}

/// Dimensions indexing observation locations (IODA v2, v1, other writers)
const LOCATION_DIMENSIONS: [&str; 3] = ["Location", "nlocs", "nobs"];
/// Dimensions indexing sensor channels (IODA v2, v1)
const CHANNEL_DIMENSIONS: [&str; 2] = ["Channel", "nchans"];

/// Reader for flat observation files (one group per quantity, e.g.
/// `MetaData/latitude`, `ombg/brightnessTemperature`)
///
/// Variables led by the location dimension become records. 1-D variables
/// along the channel dimension, such as `VarMetaData/frequency`, become
/// channel metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetCDFObsReader;

/// Names of the record and channel dimensions of one file
#[derive(Debug, Default)]
struct ObsLayout {
    record: Option<String>,
    channel: Option<String>,
}

impl RecordSource for NetCDFObsReader {
    fn read_records(&self, path: &Path) -> Result<RecordSet> {
        let file = netcdf::open(path)?;
        let find = |candidates: &[&str]| {
            candidates
                .iter()
                .find(|name| file.dimension(name).is_some())
                .map(|name| (*name).to_string())
        };
        let layout = ObsLayout {
            record: find(&LOCATION_DIMENSIONS),
            channel: find(&CHANNEL_DIMENSIONS),
        };
        if layout.record.is_none() {
            warn!(
                "no location dimension ({}) in {}, the first field sets the record count",
                LOCATION_DIMENSIONS.join(", "),
                path.display()
            );
        }

        let mut records = RecordSet::new();
        for var in file.variables() {
            load_variable(&mut records, &var, var.name(), &layout)?;
        }
        for group in file.groups()? {
            let prefix = group.name();
            for var in group.variables() {
                load_variable(&mut records, &var, format!("{prefix}/{}", var.name()), &layout)?;
            }
        }

        info!(
            "read {} fields ({} records) from {}",
            records.len(),
            records.n_records().unwrap_or(0),
            path.display()
        );
        Ok(records)
    }
}

fn load_variable(
    records: &mut RecordSet,
    var: &Variable<'_>,
    name: String,
    layout: &ObsLayout,
) -> Result<()> {
    let dims: Vec<String> = var.dimensions().iter().map(netcdf::Dimension::name).collect();
    let leaf = name.rsplit('/').next().unwrap_or(&name);

    if leaf == CHANNEL_COORDINATE && dims.len() == 1 {
        records.set_channels(Array1::from(var.get_values::<f64, _>(..)?));
        return Ok(());
    }
    // dimension coordinates such as `Location` or `nchans`
    if dims.len() == 1 && dims[0] == leaf {
        // IODA v2 keeps the channel numbers in the `Channel` coordinate
        if layout.channel.as_deref() == Some(leaf) && records.channels().is_none() {
            records.set_channels(Array1::from(var.get_values::<f64, _>(..)?));
        }
        return Ok(());
    }
    if !(1..=2).contains(&dims.len()) {
        debug!("skipping '{name}' with {} dimensions", dims.len());
        return Ok(());
    }

    let leading = dims[0].as_str();
    let per_channel = dims.len() == 1 && layout.channel.as_deref() == Some(leading);
    if !per_channel {
        if let Some(record) = layout.record.as_deref() {
            if leading != record {
                debug!("skipping '{name}', indexed by '{leading}' rather than '{record}'");
                return Ok(());
            }
        }
    }

    let mut values = match read_array(var) {
        Ok(values) => values,
        Err(e) => {
            debug!("skipping non-numeric '{name}': {e}");
            return Ok(());
        }
    };
    if let Some(fill) = fill_value(var)? {
        values.mapv_inplace(|v| if v == fill { f64::NAN } else { v });
    }

    if per_channel {
        records.insert_channel_metadata(name, values.into_dimensionality::<Ix1>()?);
        return Ok(());
    }

    if leaf == "dateTime" {
        let units = string_attribute(var.attribute("units"))?;
        match units.as_deref().and_then(epoch_offset) {
            Some(offset) => values.mapv_inplace(|v| v + offset),
            None => warn!("'{name}' has no 'seconds since' units, using values as epoch seconds"),
        }
    }

    if let Err(e) = records.insert(name.clone(), values) {
        warn!("skipping '{name}': {e}");
    }
    Ok(())
}

fn read_array(var: &Variable<'_>) -> Result<ArrayD<f64>> {
    let shape: Vec<usize> = var.dimensions().iter().map(netcdf::Dimension::len).collect();
    let values = var.get_values::<f64, _>(..)?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
}

fn fill_value(var: &Variable<'_>) -> Result<Option<f64>> {
    let Some(attr) = var.attribute("_FillValue") else {
        return Ok(None);
    };
    Ok(match attr.value()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        _ => None,
    })
}

/// Seconds between the epoch and the origin of `seconds since <origin>` units
fn epoch_offset(units: &str) -> Option<f64> {
    const FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

    let origin = units.trim().strip_prefix("seconds since ")?.trim();
    let timestamp = DateTime::parse_from_rfc3339(origin)
        .map(|t| t.timestamp())
        .ok()
        .or_else(|| {
            FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(origin, fmt).ok())
                .map(|t| t.and_utc().timestamp())
        })?;
    #[allow(clippy::cast_precision_loss)]
    let seconds = timestamp as f64;
    Some(seconds)
}

fn string_attribute(attr: Option<netcdf::Attribute<'_>>) -> Result<Option<String>> {
    Ok(strings_attribute(attr)?.map(|v| v.join(" ")))
}

fn strings_attribute(attr: Option<netcdf::Attribute<'_>>) -> Result<Option<Vec<String>>> {
    let Some(attr) = attr else {
        return Ok(None);
    };
    Ok(match attr.value()? {
        AttributeValue::Str(s) => Some(vec![s]),
        AttributeValue::Strs(v) => Some(v),
        _ => None,
    })
}
