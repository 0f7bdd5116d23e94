//! NetCDF round trips and end-to-end binning of observation files

use ndarray::{arr1, arr2};
use obsbin::{
    binned_statistics::{BinnedFields, BinnedStatistics, Query},
    cli::{bin_files, default_variables, merge_files, BinRequest},
    data_source::RecordSource,
    errors::{ObsBinError, Result},
    metadata::BinnedSummary,
    netcdf_io::{with_default_suffix, NetCDFObsReader},
    records::RecordSet,
    statistics::StatisticKind,
};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const LAT: [f64; 6] = [10.0, -10.0, -25.0, -30.0, -40.0, -50.0];
const LON: [f64; 6] = [200.0, 95.0, 12.0, 190.0, 200.0, 210.0];
const VALUES: [f64; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
const FILL: f64 = -9999.0;
/// 2020-01-01T00:00:00Z
const ORIGIN: i64 = 1_577_836_800;

fn records() -> RecordSet {
    RecordSet::new()
        .with_field("latitude", arr1(&LAT).into_dyn())
        .and_then(|r| r.with_field("longitude", arr1(&LON).into_dyn()))
        .and_then(|r| r.with_field("omb/t", arr1(&VALUES).into_dyn()))
        .expect("Failed to build records")
}

fn bin(bins: &[&str], diag: &str, data: RecordSet) -> BinnedStatistics {
    BinnedStatistics::bin(
        "test",
        bins.iter().map(|b| b.parse().unwrap()).collect(),
        vec![diag.parse().unwrap()],
        &["t".to_string()],
        Vec::new(),
        data,
    )
    .expect("Failed to bin records")
}

/// Observation file holding records `range` of the test data
fn write_obs_file(path: &Path, range: Range<usize>) -> Result<()> {
    let n = range.len();
    let hours: Vec<f64> = range.clone().map(|i| i as f64 * 3600.0).collect();
    let observed: Vec<f64> = range
        .clone()
        .map(|i| if i == 5 { FILL } else { VALUES[i] + 10.0 })
        .collect();

    let groups: [(&str, Vec<(&str, Vec<f64>, Option<&str>)>); 4] = [
        (
            "MetaData",
            vec![
                ("latitude", LAT[range.clone()].to_vec(), Some("degrees_north")),
                ("longitude", LON[range.clone()].to_vec(), Some("degrees_east")),
                ("dateTime", hours, Some("seconds since 2020-01-01T00:00:00Z")),
            ],
        ),
        ("ObsValue", vec![("t", observed, Some("K"))]),
        ("hofx", vec![("t", vec![10.0; n], Some("K"))]),
        ("ombg", vec![("t", VALUES[range].to_vec(), Some("K"))]),
    ];

    let mut file = netcdf::create(path)?;
    file.add_dimension("Location", n)?;
    {
        let mut index = file.add_variable::<f64>("Location", &["Location"])?;
        index.put_values(&(0..n).map(|i| i as f64).collect::<Vec<_>>(), ..)?;
    }
    for (group_name, columns) in groups {
        let mut group = file.add_group(group_name)?;
        for (name, values, units) in columns {
            let mut var = group.add_variable::<f64>(name, &["Location"])?;
            if let Some(units) = units {
                var.put_attribute("units", units)?;
            }
            var.put_attribute("_FillValue", FILL)?;
            var.put_values(&values, ..)?;
        }
    }
    Ok(())
}

/// Row-major values of a returned field
fn values(fields: &BinnedFields, name: &str) -> Vec<f64> {
    fields
        .get(name)
        .unwrap_or_else(|| panic!("missing field {name}"))
        .iter()
        .copied()
        .collect()
}

fn request(diag: &str, filters: &[&str]) -> BinRequest {
    BinRequest {
        name: "obs".to_string(),
        bins: vec!["latitude:r=90".parse().unwrap()],
        diagnostics: vec![diag.parse().unwrap()],
        filters: filters.iter().map(|f| f.to_string()).collect(),
        variables: Vec::new(),
    }
}

#[test]
fn test_default_suffix() {
    assert_eq!(with_default_suffix(Path::new("out")), PathBuf::from("out.nc4"));
    assert_eq!(with_default_suffix(Path::new("out.nc")), PathBuf::from("out.nc"));
    assert_eq!(with_default_suffix(Path::new("out.nc4")), PathBuf::from("out.nc4"));
    assert_eq!(
        with_default_suffix(Path::new("run.2020")),
        PathBuf::from("run.2020.nc4")
    );
}

#[test]
fn test_round_trip_two_dimensions() -> Result<()> {
    let temp_dir = tempdir()?;
    let mut binned = bin(
        &["latitude:r=90", "longitude:r=180"],
        "omb:count,sum,sum2,min,max,mean",
        records(),
    )
    .with_labels("amsua_n19", "control");
    let start = chrono::DateTime::from_timestamp(ORIGIN, 0);
    let end = chrono::DateTime::from_timestamp(ORIGIN + 6 * 3600, 0);
    binned.set_window(start, end);

    let written = binned.write(temp_dir.path().join("binned"), false)?;
    assert_eq!(written, temp_dir.path().join("binned.nc4"));
    assert!(written.exists());

    let read = BinnedStatistics::read(&written)?;
    assert!(read.equals(&binned));
    assert_eq!(read.name(), "test");
    assert_eq!(read.variables(), &["t".to_string()]);
    assert_eq!(read.diagnostics(), binned.diagnostics());
    assert_eq!(read.bins(), binned.bins());
    assert_eq!(read.attributes(), binned.attributes());
    assert_eq!(read.window_start(), start);

    let fields = read.get(&Query::new().statistic(StatisticKind::Count))?;
    assert_eq!(fields.len(), 1);
    assert_eq!(values(&fields, "t.count"), vec![2.0, 3.0, 0.0, 1.0]);
    Ok(())
}

#[test]
fn test_round_trip_scalar_and_channels() -> Result<()> {
    let temp_dir = tempdir()?;

    let scalar = bin(&[], "omb:count,sum,sum2,min,max", records());
    let path = scalar.write(temp_dir.path().join("scalar.nc"), false)?;
    let read = BinnedStatistics::read(&path)?;
    assert!(read.equals(&scalar));
    assert!(read.bins().is_empty());

    let mut data = records();
    let channels = arr2(&[
        [1.0, 10.0],
        [2.0, 20.0],
        [3.0, 30.0],
        [4.0, 40.0],
        [5.0, 50.0],
        [6.0, 60.0],
    ]);
    data.insert("omb/t", channels.into_dyn())?;
    data.set_channels(arr1(&[183.0, 190.0]));
    let banded = bin(&["depth:e=-90,0,90", "latitude:r=90"], "omb", {
        let mut d = data;
        d.insert("depth", arr1(&LAT).into_dyn())?;
        d
    });
    let path = banded.write(temp_dir.path().join("channels"), false)?;
    let read = BinnedStatistics::read(&path)?;
    assert!(read.equals(&banded));
    assert_eq!(
        read.grid().channel_axis().map(|c| c.values.to_vec()),
        Some(vec![183.0, 190.0])
    );
    assert_eq!(read.bins()[0].units(), None);
    assert_eq!(read.bins()[1].units(), Some("degrees"));
    Ok(())
}

#[test]
fn test_write_refuses_to_overwrite() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("binned.nc4");
    let first = bin(&["latitude:r=90"], "omb", records());
    first.write(&path, false)?;

    match first.write(&path, false) {
        Err(ObsBinError::FileExists { path: existing }) => assert_eq!(existing, path),
        other => panic!("expected FileExists, got {other:?}"),
    }

    let second = bin(&["latitude:r=45"], "omb", records());
    second.write(&path, true)?;
    let read = BinnedStatistics::read(&path)?;
    assert!(read.equals(&second));
    Ok(())
}

#[test]
fn test_read_adds_default_suffix() -> Result<()> {
    let temp_dir = tempdir()?;
    let binned = bin(&["latitude:r=90"], "omb", records());
    let written = binned.write(temp_dir.path().join("out"), false)?;
    assert_eq!(written, temp_dir.path().join("out.nc4"));

    let read = BinnedStatistics::read(temp_dir.path().join("out"))?;
    assert!(read.equals(&binned));
    Ok(())
}

#[test]
fn test_failed_overwrite_keeps_old_file() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("binned.nc4");
    let first = bin(&["latitude:r=90"], "omb", records());
    first.write(&path, false)?;

    // '/' is not allowed in NetCDF variable names, so this write fails
    let mut data = RecordSet::new();
    data.insert("latitude", arr1(&LAT).into_dyn())?;
    data.insert("omb/x/y", arr1(&VALUES).into_dyn())?;
    let mut broken = BinnedStatistics::new(
        "broken",
        vec!["latitude:r=90".parse()?],
        vec!["omb".parse()?],
    )?;
    broken.bin_variable("x/y", &data)?;
    assert!(broken.write(&path, true).is_err());

    let read = BinnedStatistics::read(&path)?;
    assert!(read.equals(&first));
    let entries: Vec<_> = std::fs::read_dir(temp_dir.path())?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<std::io::Result<_>>()?;
    assert_eq!(entries, vec![std::ffi::OsString::from("binned.nc4")]);
    Ok(())
}

#[test]
fn test_read_rejects_foreign_files() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("plain.nc");
    {
        let mut file = netcdf::create(&path)?;
        file.add_dimension("x", 2)?;
        let mut var = file.add_variable::<f64>("x", &["x"])?;
        var.put_values(&[1.0, 2.0], ..)?;
    }
    assert!(matches!(
        BinnedStatistics::read(&path),
        Err(ObsBinError::InvalidFile { .. })
    ));
    Ok(())
}

#[test]
fn test_obs_reader() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("obs.nc4");
    write_obs_file(&path, 0..6)?;

    let records = NetCDFObsReader.read_records(&path)?;
    assert_eq!(records.n_records(), Some(6));
    // dimension coordinates are not records
    assert!(!records.contains("Location"));
    for name in ["MetaData/latitude", "MetaData/longitude", "hofx/t", "ombg/t"] {
        assert!(records.contains(name), "{name}");
    }

    let observed: Vec<f64> = records.require("ObsValue/t")?.iter().copied().collect();
    assert_eq!(&observed[..5], &[11.0, 12.0, 13.0, 14.0, 15.0]);
    assert!(observed[5].is_nan());

    let times: Vec<f64> = records.require("MetaData/dateTime")?.iter().copied().collect();
    assert_eq!(times[0], ORIGIN as f64);
    assert_eq!(times[2], (ORIGIN + 7200) as f64);

    assert_eq!(default_variables(&records)?, vec!["t".to_string()]);
    Ok(())
}

#[test]
fn test_obs_reader_uses_location_dimension() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("radiance.nc4");
    {
        let mut file = netcdf::create(&path)?;
        file.add_dimension("nlocs", 4)?;
        file.add_dimension("nchans", 3)?;
        // channel metadata comes first, ahead of any per-location group
        {
            let mut group = file.add_group("VarMetaData")?;
            let mut channels = group.add_variable::<i32>("sensor_channel", &["nchans"])?;
            channels.put_values(&[7, 8, 9], ..)?;
            let mut frequency = group.add_variable::<f64>("frequency", &["nchans"])?;
            frequency.put_values(&[23.8, 31.4, 50.3], ..)?;
        }
        {
            let mut group = file.add_group("MetaData")?;
            let mut lat = group.add_variable::<f64>("latitude", &["nlocs"])?;
            lat.put_values(&LAT[..4], ..)?;
            let mut lon = group.add_variable::<f64>("longitude", &["nlocs"])?;
            lon.put_values(&LON[..4], ..)?;
        }
        {
            let mut group = file.add_group("ObsValue")?;
            let mut bt = group.add_variable::<f64>("bt", &["nlocs", "nchans"])?;
            bt.put_values(&(0..12).map(f64::from).collect::<Vec<_>>(), ..)?;
        }
    }

    let records = NetCDFObsReader.read_records(&path)?;
    assert_eq!(records.n_records(), Some(4));
    assert!(records.contains("MetaData/latitude"));
    assert!(records.contains("MetaData/longitude"));
    assert_eq!(records.require("ObsValue/bt")?.shape(), &[4, 3]);
    assert_eq!(
        records.channels().map(|c| c.to_vec()),
        Some(vec![7.0, 8.0, 9.0])
    );

    assert!(!records.contains("VarMetaData/frequency"));
    assert_eq!(
        records.channel_metadata("VarMetaData/frequency").map(|f| f.to_vec()),
        Some(vec![23.8, 31.4, 50.3])
    );
    Ok(())
}

#[test]
fn test_bin_and_merge_files() -> Result<()> {
    let temp_dir = tempdir()?;
    let whole = temp_dir.path().join("whole.nc4");
    let first = temp_dir.path().join("first.nc4");
    let second = temp_dir.path().join("second.nc4");
    write_obs_file(&whole, 0..6)?;
    write_obs_file(&first, 0..2)?;
    write_obs_file(&second, 2..6)?;

    let diag = "ombg:count,sum,sum2,min,max,mean,variance";
    let expected = bin_files(&[whole], &request(diag, &[]))?;
    let fields = expected.get(&Query::new())?;
    assert_eq!(values(&fields, "t.ombg.sum"), vec![20.0, 1.0]);
    assert_eq!(values(&fields, "t.count"), vec![5.0, 1.0]);
    assert_eq!(
        expected.window_start().map(|t| t.timestamp()),
        Some(ORIGIN)
    );
    assert_eq!(
        expected.window_end().map(|t| t.timestamp()),
        Some(ORIGIN + 5 * 3600)
    );

    let together = bin_files(&[first.clone(), second.clone()], &request(diag, &[]))?;
    assert!(together.equals_within(&expected, 1e-12));
    assert_eq!(together.window_start(), expected.window_start());
    assert_eq!(together.window_end(), expected.window_end());

    let first_binned = bin_files(&[first.clone()], &request(diag, &[]))?
        .write(temp_dir.path().join("first_binned"), false)?;
    let second_binned = bin_files(&[second], &request(diag, &[]))?
        .write(temp_dir.path().join("second_binned"), false)?;
    let merged = merge_files(&[first_binned.clone(), second_binned])?;
    assert!(merged.equals_within(&expected, 1e-12));

    assert!(merge_files(&[first_binned.clone()]).is_err());
    assert!(merge_files(&[first_binned.clone(), first_binned]).is_err());
    assert!(bin_files(&[first.clone(), first.clone()], &request(diag, &[])).is_err());
    Ok(())
}

#[test]
fn test_bin_files_with_filters() -> Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("obs.nc4");
    write_obs_file(&path, 0..6)?;

    let diag = "ombg:count,sum";
    let filtered = bin_files(
        &[path.clone()],
        &request(diag, &["range:ombg/{variable}:2,5"]),
    )?;
    let fields = filtered.get(&Query::new())?;
    assert_eq!(values(&fields, "t.count"), vec![4.0, 0.0]);

    match bin_files(&[path], &request(diag, &["smooth:3"])) {
        Err(ObsBinError::UnknownFilter { name }) => assert_eq!(name, "smooth"),
        other => panic!("expected UnknownFilter, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_summary() -> Result<()> {
    let binned = bin(&["latitude:r=90"], "omb:count,sum,min", records()).with_labels("sonde", "exp");
    let summary = BinnedSummary::from_binned(&binned);
    assert_eq!(summary.name, "test");
    assert_eq!(summary.dimensions.len(), 1);
    assert_eq!(summary.dimensions[0].n_bins, 2);
    assert_eq!(summary.dimensions[0].bounds, (-90.0, 90.0));
    assert_eq!(summary.fields.len(), 3);

    let min = summary
        .fields
        .iter()
        .find(|f| f.name == "t.omb.min")
        .expect("min field missing");
    assert_eq!(min.populated, 2);
    assert_eq!(min.min, Some(1.0));
    assert_eq!(min.max, Some(2.0));

    let json = summary.to_json();
    assert_eq!(json["name"], "test");
    assert_eq!(json["obs_source"], "sonde");
    assert_eq!(json["dimensions"][0]["bins"], 2);
    assert_eq!(json["diagnostics"][0]["statistics"][2], "min");
    assert_eq!(json["variables"][0], "t");
    summary.print();
    Ok(())
}
