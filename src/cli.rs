//! Defines command-line interface options using `clap` for the obsbin application,
//! and the work each subcommand performs.

use crate::binned_statistics::BinnedStatistics;
use crate::data_source::RecordSource;
use crate::diagnostic::Diagnostic;
use crate::dimension::Dimension;
use crate::errors::{ObsBinError, Result};
use crate::filters::{Filter, FilterRegistry};
use crate::metadata::BinnedSummary;
use crate::netcdf_io::NetCDFObsReader;
use crate::records::RecordSet;
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Groups searched, in order, for the variables to bin when none are given
pub const DEFAULT_VARIABLE_GROUPS: [&str; 3] = ["hofx0", "hofx", "ObsValue"];

/// Bin observation diagnostics into mergeable statistics grids
#[derive(Parser, Debug)]
#[command(
    version,
    name = "obsbin",
    about = "Bin observation-space diagnostics into NetCDF statistics grids"
)]
pub struct Cli {
    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// Enable verbose output.
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bin one or more observation files
    Bin {
        /// Observation files to bin
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file (".nc4" is appended when missing)
        #[arg(short, long)]
        output: PathBuf,

        /// Diagnostic, formatted as <name> or <name>:<stat>,<stat>,...
        #[arg(short, long = "diag", value_parser = parse_diagnostic)]
        diagnostics: Vec<Diagnostic>,

        /// Binning dimension, e.g. latitude:r=5, longitude:r=10:b=0,180 or depth:e=0,10,50
        #[arg(short, long = "bin", value_parser = parse_dimension)]
        bins: Vec<Dimension>,

        /// Filter, formatted as <name>:<arg>:<arg>...
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Variable to bin. Defaults to the members of the first of hofx0, hofx or ObsValue
        #[arg(short, long = "var")]
        variables: Vec<String>,

        /// Name of the binned result. Defaults to the output file stem
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite the output file if it exists
        #[arg(short = 'O', long, default_value_t = false)]
        overwrite: bool,
    },

    /// Merge binned statistics files
    Merge {
        /// Binned files to merge (at least two)
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,

        /// Output file (".nc4" is appended when missing)
        #[arg(short, long)]
        output: PathBuf,

        /// Overwrite the output file if it exists
        #[arg(short = 'O', long, default_value_t = false)]
        overwrite: bool,
    },

    /// Concatenate binned statistics files along a new dimension
    Concat {
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        /// Dimension to concatenate along
        #[arg(long, default_value = "time")]
        dimension: String,
    },

    /// Print a summary of a binned statistics file
    Info {
        file: PathBuf,

        /// Print the summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn parse_dimension(s: &str) -> std::result::Result<Dimension, String> {
    s.parse().map_err(|e: ObsBinError| e.to_string())
}

fn parse_diagnostic(s: &str) -> std::result::Result<Diagnostic, String> {
    s.parse().map_err(|e: ObsBinError| e.to_string())
}

/// Fail when `items` holds the same entry twice
fn reject_duplicates<T: Ord + std::fmt::Debug>(what: &str, items: &[T]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for item in items {
        if !seen.insert(item) {
            return Err(ObsBinError::Generic(format!(
                "{what} {item:?} was given more than once"
            )));
        }
    }
    Ok(())
}

/// Run the parsed subcommand
///
/// # Errors
///
/// Propagates any failure of the subcommand.
pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Bin {
            files,
            output,
            diagnostics,
            bins,
            filters,
            variables,
            name,
            overwrite,
        } => {
            let name = name.unwrap_or_else(|| default_name(&output));
            let request = BinRequest {
                name,
                bins,
                diagnostics,
                filters,
                variables,
            };
            let binned = bin_files(&files, &request)?;
            let written = binned.write(&output, overwrite)?;
            println!("✅ Saved binned statistics to {}", written.display());
            Ok(())
        }
        Command::Merge {
            files,
            output,
            overwrite,
        } => {
            let merged = merge_files(&files)?;
            let written = merged.write(&output, overwrite)?;
            println!("✅ Saved merged statistics to {}", written.display());
            Ok(())
        }
        Command::Concat {
            files, dimension, ..
        } => {
            let parts = files
                .iter()
                .map(BinnedStatistics::read)
                .collect::<Result<Vec<_>>>()?;
            match parts.as_slice() {
                [first, rest @ ..] => rest
                    .iter()
                    .try_fold(first.clone(), |combined, part| combined.concat(part, &dimension))
                    .map(|_| ()),
                [] => Err(ObsBinError::Generic("no files to concatenate".to_string())),
            }
        }
        Command::Info { file, json } => {
            let summary = BinnedSummary::from_binned(&BinnedStatistics::read(&file)?);
            if json {
                let text = serde_json::to_string_pretty(&summary.to_json())
                    .map_err(|e| ObsBinError::Generic(e.to_string()))?;
                println!("{text}");
            } else {
                summary.print();
            }
            Ok(())
        }
    }
}

/// Everything `bin` needs besides the input files
#[derive(Debug, Clone)]
pub struct BinRequest {
    pub name: String,
    pub bins: Vec<Dimension>,
    pub diagnostics: Vec<Diagnostic>,
    /// Filter strings, parsed through the built-in registry
    pub filters: Vec<String>,
    /// Variables to bin; empty selects the default group members
    pub variables: Vec<String>,
}

/// Bin every file in `files` and merge the results
///
/// # Errors
///
/// Fails for duplicate arguments, unreadable files, unknown filters or any
/// binning error.
pub fn bin_files(files: &[PathBuf], request: &BinRequest) -> Result<BinnedStatistics> {
    reject_duplicates("input file", files)?;
    reject_duplicates("variable", &request.variables)?;
    let registry = FilterRegistry::with_builtin();
    // Parse up front so a bad filter fails before any file is read
    for spec in &request.filters {
        registry.parse(spec)?;
    }

    let reader = NetCDFObsReader;
    let mut parts = Vec::with_capacity(files.len());
    for file in files {
        info!("binning {}", file.display());
        let records = reader.read_records(file)?;
        let variables = if request.variables.is_empty() {
            default_variables(&records)?
        } else {
            request.variables.clone()
        };
        let filters: Vec<Box<dyn Filter>> = request
            .filters
            .iter()
            .map(|spec| registry.parse(spec))
            .collect::<Result<_>>()?;
        parts.push(BinnedStatistics::bin(
            &request.name,
            request.bins.clone(),
            request.diagnostics.clone(),
            &variables,
            filters,
            records,
        )?);
    }
    BinnedStatistics::merge_all(parts)
}

/// Read and merge binned files
///
/// # Errors
///
/// Fails for fewer than two distinct files, unreadable files, or results
/// that are not equivalent.
pub fn merge_files(files: &[PathBuf]) -> Result<BinnedStatistics> {
    reject_duplicates("input file", files)?;
    if files.len() < 2 {
        return Err(ObsBinError::Generic(
            "merge needs at least two input files".to_string(),
        ));
    }
    let parts = files
        .iter()
        .map(BinnedStatistics::read)
        .collect::<Result<Vec<_>>>()?;
    BinnedStatistics::merge_all(parts)
}

/// Members of the first of [`DEFAULT_VARIABLE_GROUPS`] present in `records`
///
/// # Errors
///
/// Fails when none of the groups has any member.
pub fn default_variables(records: &RecordSet) -> Result<Vec<String>> {
    for group in DEFAULT_VARIABLE_GROUPS {
        let prefix = format!("{group}/");
        let members: Vec<String> = records
            .names()
            .filter_map(|name| name.strip_prefix(&prefix))
            .filter(|member| !member.is_empty() && !member.contains('/'))
            .map(str::to_string)
            .collect();
        if !members.is_empty() {
            return Ok(members);
        }
    }
    Err(ObsBinError::Generic(format!(
        "no variables given and none of {} has any members",
        DEFAULT_VARIABLE_GROUPS.join(", ")
    )))
}

fn default_name(output: &Path) -> String {
    output
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("binned")
        .to_string()
}
