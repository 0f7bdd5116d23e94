//! Inspection of binned statistics
//!
//! This module summarizes a [`BinnedStatistics`] result: its binning
//! dimensions, diagnostics, variables and stored fields. The summary can be
//! printed for humans or rendered as JSON.

use crate::binned_statistics::BinnedStatistics;
use serde_json::{json, Value as JsonValue};

/// Summary of one binning dimension
#[derive(Debug, Clone)]
pub struct DimensionSummary {
    pub name: String,
    pub units: Option<String>,
    pub n_bins: usize,
    pub bounds: (f64, f64),
}

/// Summary of one stored field
#[derive(Debug, Clone)]
pub struct FieldSummary {
    pub name: String,
    pub shape: Vec<usize>,
    /// Number of finite entries
    pub populated: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Structured overview of a binned statistics result
#[derive(Debug, Clone)]
pub struct BinnedSummary {
    pub name: String,
    pub obs_source: String,
    pub experiment: String,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub dimensions: Vec<DimensionSummary>,
    pub channels: Option<usize>,
    pub diagnostics: Vec<(String, Vec<String>)>,
    pub variables: Vec<String>,
    pub fields: Vec<FieldSummary>,
}

impl BinnedSummary {
    /// Summarize `binned`
    #[must_use]
    pub fn from_binned(binned: &BinnedStatistics) -> Self {
        let dimensions = binned
            .bins()
            .iter()
            .map(|d| DimensionSummary {
                name: d.name().to_string(),
                units: d.units().map(str::to_string),
                n_bins: d.len(),
                bounds: d.bounds(),
            })
            .collect();

        let diagnostics = binned
            .diagnostics()
            .iter()
            .map(|d| {
                let stats = d.statistics().iter().map(ToString::to_string).collect();
                (d.name().to_string(), stats)
            })
            .collect();

        let fields = binned
            .grid()
            .fields()
            .map(|(key, values)| {
                let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
                FieldSummary {
                    name: key.name(),
                    shape: values.shape().to_vec(),
                    populated: finite.len(),
                    min: finite.iter().copied().reduce(f64::min),
                    max: finite.iter().copied().reduce(f64::max),
                }
            })
            .collect();

        let attrs = binned.attributes();
        Self {
            name: binned.name().to_string(),
            obs_source: attrs.obs_source.clone(),
            experiment: attrs.experiment.clone(),
            window_start: attrs.window_start.map(|t| t.to_rfc3339()),
            window_end: attrs.window_end.map(|t| t.to_rfc3339()),
            dimensions,
            channels: binned.grid().channel_axis().map(|c| c.len()),
            diagnostics,
            variables: binned.variables().to_vec(),
            fields,
        }
    }

    /// JSON rendering, used by `obsbin info --json`
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        json!({
            "name": self.name,
            "obs_source": self.obs_source,
            "experiment": self.experiment,
            "window_start": self.window_start,
            "window_end": self.window_end,
            "dimensions": self.dimensions.iter().map(|d| json!({
                "name": d.name,
                "units": d.units,
                "bins": d.n_bins,
                "bounds": [d.bounds.0, d.bounds.1],
            })).collect::<Vec<_>>(),
            "channels": self.channels,
            "diagnostics": self.diagnostics.iter().map(|(name, stats)| json!({
                "name": name,
                "statistics": stats,
            })).collect::<Vec<_>>(),
            "variables": self.variables,
            "fields": self.fields.iter().map(|f| json!({
                "name": f.name,
                "shape": f.shape,
                "populated": f.populated,
                "min": f.min,
                "max": f.max,
            })).collect::<Vec<_>>(),
        })
    }

    /// Print the summary in a readable layout
    pub fn print(&self) {
        println!("\n Binned statistics: {}", self.name);
        println!("================================");
        println!("   Observation source: {}", self.obs_source);
        println!("   Experiment: {}", self.experiment);
        println!(
            "   Window: {} to {}",
            self.window_start.as_deref().unwrap_or("?"),
            self.window_end.as_deref().unwrap_or("?")
        );

        println!("\n Dimensions");
        println!("==============");
        if self.dimensions.is_empty() {
            println!("   (none, single global bin)");
        }
        for d in &self.dimensions {
            println!(
                "    {} = {} bins over [{}, {}]{}",
                d.name,
                d.n_bins,
                d.bounds.0,
                d.bounds.1,
                d.units.as_ref().map(|u| format!(" {u}")).unwrap_or_default()
            );
        }
        if let Some(n) = self.channels {
            println!("    channels = {n}");
        }

        println!("\n Diagnostics");
        println!("===============");
        for (name, stats) in &self.diagnostics {
            println!("    {name}: {}", stats.join(", "));
        }

        println!("\n Variables");
        println!("=============");
        for v in &self.variables {
            println!("    {v}");
        }

        println!("\n Fields");
        println!("==========");
        for f in &self.fields {
            let range = match (f.min, f.max) {
                (Some(lo), Some(hi)) => format!("[{lo:.4}, {hi:.4}]"),
                _ => "(empty)".to_string(),
            };
            println!(
                "    {:<40} shape {:?}, {} populated, range {}",
                f.name, f.shape, f.populated, range
            );
        }
    }
}
