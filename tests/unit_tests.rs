//! Unit tests for the obsbin building blocks
//!
//! Dimensions, diagnostics, the statistic engine, record sets, filters and
//! the parallel helpers, each exercised on small hand-built inputs.

use ndarray::{arr1, arr2, Array1, ArrayD, IxDyn};
use obsbin::{
    diagnostic::Diagnostic,
    dimension::Dimension,
    errors::{ErrorCategory, ObsBinError, Result},
    filters::{
        CopyField, DomainClip, Filter, FilterContext, FilterRegistry, LonWrap, MetadataGroups,
        RemoveNan, RenameField, Subtract, TrimVars, ValueRange,
    },
    grid::{FieldKey, Grid},
    parallel::{get_parallel_info, merge_tree, ParallelConfig},
    records::RecordSet,
    statistics::{Binner, Statistic, StatisticKind},
};

fn dim(s: &str) -> Dimension {
    s.parse().unwrap()
}

fn field(values: &[f64]) -> ArrayD<f64> {
    arr1(values).into_dyn()
}

#[test]
fn test_dimension_from_resolution() {
    assert_eq!(dim("latitude:r=10:b=0,90").len(), 9);
    assert_eq!(dim("latitude:r=1").len(), 180);
    assert_eq!(dim("longitude:r=1").len(), 360);
    assert_eq!(dim("longitude:r=1:b=0,180.0").len(), 180);

    let lat = dim("latitude:r=90");
    assert_eq!(lat.bin_edges().to_vec(), vec![-90.0, 0.0, 90.0]);
    assert_eq!(lat.bin_centers().to_vec(), vec![-45.0, 45.0]);
    assert_eq!(lat.bounds(), (-90.0, 90.0));
    assert_eq!(lat.units(), Some("degrees"));
}

#[test]
fn test_dimension_from_edges() {
    let depth = dim("depth:e=1,3,5");
    assert_eq!(depth.len(), 2);
    assert_eq!(depth.bin_centers().to_vec(), vec![2.0, 4.0]);
    assert_eq!(depth.units(), None);

    let explicit = Dimension::new("depth", Some(vec![1.0, 3.0, 5.0]), None, None).unwrap();
    assert_eq!(explicit, depth);
}

#[test]
fn test_dimension_bin_index() {
    let lat = dim("latitude:r=90");
    assert_eq!(lat.bin_index(-90.0), Some(0));
    assert_eq!(lat.bin_index(-0.5), Some(0));
    assert_eq!(lat.bin_index(0.0), Some(1));
    // the last bin includes its right edge
    assert_eq!(lat.bin_index(90.0), Some(1));
    assert_eq!(lat.bin_index(-90.1), None);
    assert_eq!(lat.bin_index(90.1), None);
    assert_eq!(lat.bin_index(f64::NAN), None);
}

#[test]
fn test_dimension_invalid_strings() {
    let bad = [
        "latitude",
        "latitude:r=1:b=-90,90:e=1,2",
        "latitude:r=0",
        "latitude:r=-1",
        "depth:r=1",
        "depth:b=0,10",
        "depth:e=1",
        "depth:e=3,1",
        "depth:e=1,1,2",
        "depth:e=1,2:r=1",
        "depth:x=1",
        "depth:r",
        "depth:r=a",
        "depth:r=1,2:b=0,10",
        "depth:r=1:b=10,0",
        "depth:r=1:b=0,10,20",
        "dep th:r=1:b=0,10",
        ":r=1:b=0,10",
        // names become NetCDF dimension names
        "MetaData/latitude:r=1:b=0,1",
        "höhe:r=1:b=0,10",
        // geographic defaults only exist for latitude and longitude
        "time:r=1.0",
        "x:r=1e-300:b=0,1",
        "x:r=1e-3:b=-1e300,1e300",
    ];
    for spec in bad {
        match spec.parse::<Dimension>() {
            Err(ObsBinError::InvalidDimension { .. }) => {}
            other => panic!("{spec} should be rejected, got {other:?}"),
        }
    }
}

#[test]
fn test_dimension_limits() {
    let lat = dim("latitude:r=1:b=-10,90");
    assert_eq!(lat.len(), 100);
    let edges = lat.bin_edges();
    assert_eq!(edges.len(), 101);
    assert_eq!(edges[0], -10.0);
    assert_eq!(edges[edges.len() - 1], 90.0);
    assert_eq!(lat.bounds(), (-10.0, 90.0));

    assert_eq!(dim("level_2:e=0,1").name(), "level_2");
    assert!(matches!(
        Dimension::from_edges("a/b", vec![0.0, 1.0]),
        Err(ObsBinError::InvalidDimension { .. })
    ));
    assert!(matches!(
        Dimension::from_resolution("x", f64::MIN_POSITIVE, Some((0.0, 1.0))),
        Err(ObsBinError::InvalidDimension { .. })
    ));
}

#[test]
fn test_dimension_constructor_combinations() {
    assert!(Dimension::new("depth", None, None, None).is_err());
    assert!(Dimension::new("depth", Some(vec![0.0, 1.0]), Some(1.0), None).is_err());
    assert!(Dimension::new("depth", Some(vec![0.0, 1.0]), None, Some((0.0, 1.0))).is_err());
    assert!(Dimension::new("depth", None, None, Some((0.0, 1.0))).is_err());
    assert!(Dimension::new("depth", None, Some(1.0), Some((0.0, 10.0))).is_ok());
}

#[test]
fn test_dimension_display_round_trip() {
    for spec in ["latitude:r=90", "depth:e=0,10,20,30,50,100,500", "longitude:r=2.5:b=0,180"] {
        let original = dim(spec);
        let parsed: Dimension = original.to_string().parse().unwrap();
        assert_eq!(parsed, original, "{spec}");
    }
}

#[test]
fn test_diagnostic_parsing() {
    let omb: Diagnostic = "omb".parse().unwrap();
    assert_eq!(omb.name(), "omb");
    assert_eq!(
        omb.statistics(),
        &[StatisticKind::Count, StatisticKind::Sum, StatisticKind::Sum2]
    );

    let custom: Diagnostic = "oma:max,count,min".parse().unwrap();
    assert_eq!(
        custom.ordered_statistics(),
        vec![StatisticKind::Count, StatisticKind::Min, StatisticKind::Max]
    );
    assert!(custom.has_statistic(StatisticKind::Max));
    assert!(!custom.has_statistic(StatisticKind::Sum));

    // order and repetition do not matter for equality
    let a: Diagnostic = "omb:sum,count,sum".parse().unwrap();
    let b: Diagnostic = "omb:count,sum".parse().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.statistics().len(), 2);
    assert_ne!(a, omb);

    let shown: Diagnostic = custom.to_string().parse().unwrap();
    assert_eq!(shown, custom);
}

#[test]
fn test_diagnostic_invalid_strings() {
    for spec in ["", "1omb", "om-b", "omb:", "omb:count,,sum", "omb:count:sum", "omb:bogus"] {
        match spec.parse::<Diagnostic>() {
            Err(ObsBinError::InvalidDiagnostic { .. }) => {}
            other => panic!("{spec} should be rejected, got {other:?}"),
        }
    }
}

#[test]
fn test_diagnostic_needs_statistics() {
    assert!(matches!(
        Diagnostic::new("omb", &[] as &[&str]),
        Err(ObsBinError::InvalidDiagnostic { .. })
    ));
    let single = Diagnostic::new("omb", &["max"]).unwrap();
    assert_eq!(single.to_string(), "omb:max");
    let defaults = Diagnostic::with_defaults("oma").unwrap();
    assert_eq!(defaults.to_string().parse::<Diagnostic>().unwrap(), defaults);
}

#[test]
fn test_statistic_kind_registry() {
    assert_eq!(StatisticKind::types().count(), 9);
    for kind in StatisticKind::ALL {
        assert_eq!(kind.as_str().parse::<StatisticKind>().unwrap(), kind);
        // every dependency is declared earlier
        for dep in kind.depends() {
            assert!(dep < &kind, "{dep} should precede {kind}");
        }
    }
    assert!(matches!(
        "median".parse::<StatisticKind>(),
        Err(ObsBinError::UnknownStatistic { .. })
    ));
    assert!(StatisticKind::Count.is_global());
    assert!(!StatisticKind::Sum.is_global());
    assert!(StatisticKind::Max.is_core());
    assert!(!StatisticKind::Rmsd.is_core());
}

#[test]
fn test_field_key_names() -> Result<()> {
    let count = FieldKey::new("brightnessTemperature", Some("omb"), StatisticKind::Count);
    assert_eq!(count.diagnostic, None);
    assert_eq!(count.name(), "brightnessTemperature.count");

    let mean = FieldKey::new("brightnessTemperature", Some("omb"), StatisticKind::Mean);
    assert_eq!(mean.name(), "brightnessTemperature.omb.mean");

    let diags = ["omb", "oma"];
    assert_eq!(FieldKey::parse(&mean.name(), &diags)?, mean);
    assert_eq!(FieldKey::parse(&count.name(), &diags)?, count);

    // variables may contain dots themselves
    let dotted = FieldKey::parse("air.temperature.oma.sum2", &diags)?;
    assert_eq!(dotted.variable, "air.temperature");
    assert_eq!(dotted.diagnostic.as_deref(), Some("oma"));
    assert_eq!(dotted.statistic, StatisticKind::Sum2);

    assert!(matches!(
        FieldKey::parse("t.ombg.sum", &diags),
        Err(ObsBinError::DiagnosticNotFound { .. })
    ));
    assert!(matches!(
        FieldKey::parse("t.omb.median", &diags),
        Err(ObsBinError::UnknownStatistic { .. })
    ));
    assert!(FieldKey::parse("count", &diags).is_err());
    Ok(())
}

/// Three records in the two bins of `latitude:r=90`
fn engine_setup() -> (Grid, Binner) {
    let bins = vec![dim("latitude:r=90")];
    let lat = arr1(&[-10.0, 10.0, 20.0]);
    let binner = Binner::from_coordinates(&bins, &[lat.view()], 3).unwrap();
    (Grid::from_dimensions(&bins), binner)
}

#[test]
fn test_statistic_dependencies() -> Result<()> {
    let (mut grid, binner) = engine_setup();
    let values = field(&[1.0, 2.0, 4.0]);
    let sum = Statistic::new(StatisticKind::Sum, "t", Some("omb"));

    match sum.calc(&mut grid, &binner, values.view()) {
        Err(ObsBinError::MissingDependency { field, dependency }) => {
            assert_eq!(field, "t.omb.sum");
            assert_eq!(dependency, "t.count");
        }
        other => panic!("expected MissingDependency, got {other:?}"),
    }

    let count = Statistic::new(StatisticKind::Count, "t", Some("omb"));
    count.calc(&mut grid, &binner, values.view())?;
    // count is shared by the diagnostics of a variable, a second calc is a no-op
    Statistic::new(StatisticKind::Count, "t", Some("oma")).calc(&mut grid, &binner, values.view())?;
    assert_eq!(grid.len(), 1);

    sum.calc(&mut grid, &binner, values.view())?;
    assert!(matches!(
        sum.calc(&mut grid, &binner, values.view()),
        Err(ObsBinError::AlreadyComputed { .. })
    ));

    let mean = Statistic::new(StatisticKind::Mean, "t", Some("omb"));
    assert!(matches!(
        mean.calc(&mut grid, &binner, values.view()),
        Err(ObsBinError::NotComputable { .. })
    ));
    assert_eq!(mean.value(&grid)?.into_raw_vec(), vec![1.0, 3.0]);

    let variance = Statistic::new(StatisticKind::Variance, "t", Some("omb"));
    assert!(matches!(
        variance.value(&grid),
        Err(ObsBinError::NotComputed { .. })
    ));

    Statistic::new(StatisticKind::Sum2, "t", Some("omb")).calc(&mut grid, &binner, values.view())?;
    let var = variance.value(&grid)?;
    assert!(var[[0]].is_nan());
    assert!((var[[1]] - 1.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_statistic_merge_and_nan_handling() -> Result<()> {
    let (mut left, binner) = engine_setup();
    let mut right = left.clone();
    let a = field(&[1.0, f64::NAN, 4.0]);
    let b = field(&[3.0, 2.0, 6.0]);

    let min = Statistic::new(StatisticKind::Min, "t", Some("omb"));
    let count = Statistic::new(StatisticKind::Count, "t", None);
    for (grid, values) in [(&mut left, &a), (&mut right, &b)] {
        count.calc(grid, &binner, values.view())?;
        min.calc(grid, &binner, values.view())?;
    }

    // calc propagates NaN, count does not look at values
    let left_min = min.value(&left)?;
    assert_eq!(left_min[[0]], 1.0);
    assert!(left_min[[1]].is_nan());
    assert_eq!(count.value(&left)?.into_raw_vec(), vec![1.0, 2.0]);

    // merge ignores NaN on one side
    let mut merged = left.empty_like();
    count.merge(&mut merged, &left, &right)?;
    min.merge(&mut merged, &left, &right)?;
    assert_eq!(min.value(&merged)?.into_raw_vec(), vec![1.0, 2.0]);
    assert_eq!(count.value(&merged)?.into_raw_vec(), vec![2.0, 4.0]);

    let mut missing = left.empty_like();
    assert!(matches!(
        Statistic::new(StatisticKind::Sum, "t", Some("omb")).merge(&mut missing, &left, &right),
        Err(ObsBinError::MissingDependency { .. })
    ));
    Ok(())
}

#[test]
fn test_binner_channels_and_out_of_grid() -> Result<()> {
    let bins = vec![dim("depth:e=0,10,20")];
    let depth = arr1(&[5.0, 15.0, 25.0, 10.0]);
    let binner = Binner::from_coordinates(&bins, &[depth.view()], 4)?;
    assert_eq!(binner.shape(), &[2]);
    assert_eq!(binner.n_records(), 4);

    let values = arr2(&[[1.0, 10.0], [2.0, 20.0], [100.0, 100.0], [3.0, 30.0]]).into_dyn();
    let sum = binner.sum(values.view())?;
    assert_eq!(sum.shape(), &[2, 2]);
    assert_eq!(sum.into_raw_vec(), vec![1.0, 10.0, 5.0, 50.0]);

    let max = binner.max(field(&[1.0, 2.0, 3.0, 4.0]).view())?;
    assert_eq!(max.into_raw_vec(), vec![1.0, 4.0]);

    assert!(matches!(
        binner.sum(field(&[1.0, 2.0]).view()),
        Err(ObsBinError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        binner.sum(ArrayD::zeros(vec![4, 1, 1]).view()),
        Err(ObsBinError::UnsupportedRank { .. })
    ));
    Ok(())
}

#[test]
fn test_record_set_shape_rules() -> Result<()> {
    let mut records = RecordSet::new()
        .with_field("latitude", field(&[1.0, 2.0, 3.0]))?
        .with_field("omb/t", arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn())?;
    assert_eq!(records.n_records(), Some(3));

    assert!(matches!(
        records.insert("longitude", field(&[1.0, 2.0])),
        Err(ObsBinError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        records.insert("scalar", ArrayD::<f64>::zeros(IxDyn(&[]))),
        Err(ObsBinError::UnsupportedRank { .. })
    ));
    assert!(matches!(
        records.require("missing"),
        Err(ObsBinError::MissingField { .. })
    ));

    records.set_channels(arr1(&[7.0, 8.0]));
    let kept = records.select_records(&[true, false, true])?;
    assert_eq!(kept.n_records(), Some(2));
    assert_eq!(kept.require("latitude")?.iter().copied().collect::<Vec<_>>(), vec![1.0, 3.0]);
    assert_eq!(kept.require("omb/t")?.shape(), &[2, 2]);
    assert_eq!(kept.channels().map(|c| c.to_vec()), Some(vec![7.0, 8.0]));

    assert!(records.select_records(&[true]).is_err());
    Ok(())
}

#[test]
fn test_filter_registry() -> Result<()> {
    let mut registry = FilterRegistry::with_builtin();
    let names: Vec<&str> = registry.types().collect();
    assert_eq!(names.len(), 9);
    for name in ["copy", "domain_clip", "lon_wrap", "metadata_groups", "range", "remove_nan"] {
        assert!(registry.contains(name), "{name}");
    }

    match registry.register("copy", CopyField::create) {
        Err(ObsBinError::DuplicateFilter { name }) => assert_eq!(name, "copy"),
        other => panic!("expected DuplicateFilter, got {other:?}"),
    }
    registry.register("Drop_NaN", RemoveNan::create)?;
    assert!(registry.contains("drop_nan"));
    assert_eq!(registry.parse("DROP_NAN")?.name(), RemoveNan::NAME);

    assert!(matches!(
        registry.create("smooth", &[]),
        Err(ObsBinError::UnknownFilter { .. })
    ));
    assert!(matches!(registry.parse("smooth:1"), Err(ObsBinError::UnknownFilter { .. })));

    let range = registry.parse("range:omb/{variable}:-1,1")?;
    assert!(range.per_variable());
    assert!(!registry.parse("lon_wrap")?.per_variable());

    for bad in ["range:x", "range:x:2,1", "range:x:a,b", "lon_wrap:1", "sub:a:b", "domain_clip:0,0:1,1"] {
        assert!(
            matches!(registry.parse(bad), Err(ObsBinError::InvalidFilter { .. })),
            "{bad}"
        );
    }
    Ok(())
}

#[test]
fn test_metadata_groups_and_lon_wrap() -> Result<()> {
    let records = RecordSet::new()
        .with_field("MetaData/latitude", field(&[1.0, 2.0, 3.0]))?
        .with_field("recMetaData/longitude", field(&[-10.0, 20.0, 190.0]))?
        .with_field("MetaData/dateTime", field(&[100.0, 50.0, 200.0]))?;
    let ctx = FilterContext::default();

    let names = vec!["latitude".to_string(), "longitude".to_string()];
    let lifted = MetadataGroups::new(names).filter(records, &ctx)?;
    assert!(lifted.contains("latitude"));
    assert!(lifted.contains("longitude"));
    assert!(!lifted.contains("MetaData/latitude"));
    assert_eq!(lifted.window_start().map(|t| t.timestamp()), Some(50));
    assert_eq!(lifted.window_end().map(|t| t.timestamp()), Some(200));

    let wrapped = LonWrap.filter(lifted, &ctx)?;
    let lon: Vec<f64> = wrapped.require("longitude")?.iter().copied().collect();
    assert_eq!(lon, vec![350.0, 20.0, 190.0]);
    Ok(())
}

#[test]
fn test_trim_vars() -> Result<()> {
    let records = RecordSet::new()
        .with_field("latitude", field(&[1.0, 2.0]))?
        .with_field("omb/t", field(&[1.0, 2.0]))?
        .with_field("omb/u", field(&[1.0, 2.0]))?
        .with_field("ObsValue/t", field(&[1.0, 2.0]))?;
    let trim = TrimVars::new(vec!["omb".to_string()], vec!["latitude".to_string()]);

    assert!(matches!(
        trim.filter(records.clone(), &FilterContext::default()),
        Err(ObsBinError::InvalidFilter { .. })
    ));

    let trimmed = trim.filter(records, &FilterContext::for_variable("t"))?;
    let names: Vec<&str> = trimmed.names().collect();
    assert_eq!(names, vec!["latitude", "omb/t"]);
    Ok(())
}

#[test]
fn test_field_filters() -> Result<()> {
    let records = RecordSet::new()
        .with_field("ObsValue/t", field(&[10.0, 20.0]))?
        .with_field("hofx/t", field(&[7.0, 25.0]))?;
    let ctx = FilterContext::for_variable("t");

    let records = Subtract::new("ObsValue", "hofx", "omb").filter(records, &ctx)?;
    assert_eq!(records.require("omb/t")?.iter().copied().collect::<Vec<_>>(), vec![3.0, -5.0]);

    let records = CopyField::new("omb/t", "departure/t").filter(records, &ctx)?;
    assert!(records.contains("omb/t"));
    assert!(records.contains("departure/t"));

    let records = RenameField::new("departure/{variable}", "fg_dep/{variable}").filter(records, &ctx)?;
    assert!(!records.contains("departure/t"));
    assert!(records.contains("fg_dep/t"));

    assert!(matches!(
        RenameField::new("nope/{variable}", "x").filter(records, &ctx),
        Err(ObsBinError::MissingField { .. })
    ));
    Ok(())
}

#[test]
fn test_value_range_filter() -> Result<()> {
    let ctx = FilterContext::for_variable("t");

    let flat = RecordSet::new()
        .with_field("latitude", field(&[1.0, 2.0, 3.0, 4.0]))?
        .with_field("omb/t", field(&[0.5, -3.0, f64::NAN, 1.0]))?;
    let kept = ValueRange::new("omb/{variable}", -1.0, 1.0).filter(flat, &ctx)?;
    assert_eq!(kept.require("latitude")?.iter().copied().collect::<Vec<_>>(), vec![1.0, 4.0]);

    let channels = RecordSet::new()
        .with_field("latitude", field(&[1.0, 2.0, 3.0]))?
        .with_field("omb/t", arr2(&[[0.0, 5.0], [5.0, 5.0], [1.0, 0.0]]).into_dyn())?
        .with_field("oma/t", arr2(&[[9.0, 9.0], [9.0, 9.0], [9.0, 9.0]]).into_dyn())?;
    let kept = ValueRange::new("omb/t", 0.0, 1.0).filter(channels, &ctx)?;
    assert_eq!(kept.n_records(), Some(2));
    assert_eq!(kept.require("latitude")?.iter().copied().collect::<Vec<_>>(), vec![1.0, 3.0]);
    let oma = kept.require("oma/t")?;
    assert_eq!(oma[[0, 0]], 9.0);
    assert!(oma[[0, 1]].is_nan());
    assert_eq!(oma[[1, 0]], 9.0);
    assert_eq!(oma[[1, 1]], 9.0);
    Ok(())
}

#[test]
fn test_remove_nan_filter() -> Result<()> {
    let records = RecordSet::new()
        .with_field("latitude", field(&[1.0, f64::NAN, 3.0, 4.0]))?
        .with_field("omb/t", arr2(&[[0.0, 1.0], [1.0, 1.0], [f64::NAN, 1.0], [2.0, 2.0]]).into_dyn())?;
    let kept = RemoveNan.filter(records, &FilterContext::for_variable("t"))?;
    assert_eq!(kept.require("latitude")?.iter().copied().collect::<Vec<_>>(), vec![1.0, 4.0]);
    Ok(())
}

#[test]
fn test_domain_clip_filter() -> Result<()> {
    // negative vertex longitudes are wrapped into [0, 360)
    let square = DomainClip::new(vec![(0.0, -20.0), (0.0, -10.0), (10.0, -10.0), (10.0, -20.0)])?;
    assert!(square.contains(5.0, 345.0));
    assert!(!square.contains(5.0, 15.0));

    let triangle = DomainClip::new(vec![(0.0, 0.0), (0.0, 40.0), (40.0, 0.0)])?;
    assert!(triangle.contains(10.0, 10.0));
    assert!(!triangle.contains(30.0, 30.0));
    assert!(!triangle.contains(-5.0, 10.0));

    let records = RecordSet::new()
        .with_field("latitude", field(&[10.0, 30.0, -5.0, 5.0]))?
        .with_field("longitude", field(&[10.0, 30.0, 10.0, 1.0]))?;
    let kept = triangle.filter(records, &FilterContext::default())?;
    assert_eq!(kept.require("latitude")?.iter().copied().collect::<Vec<_>>(), vec![10.0, 5.0]);

    assert!(DomainClip::new(vec![(0.0, 0.0), (1.0, 1.0)]).is_err());
    Ok(())
}

#[test]
fn test_error_categories() {
    let cases = [
        (
            ObsBinError::InvalidDimension {
                spec: "x".to_string(),
                reason: "bad".to_string(),
            },
            ErrorCategory::Configuration,
        ),
        (
            ObsBinError::MissingDependency {
                field: "t.omb.sum".to_string(),
                dependency: "t.count".to_string(),
            },
            ErrorCategory::Dependency,
        ),
        (
            ObsBinError::MissingField {
                field: "omb/t".to_string(),
            },
            ErrorCategory::DataShape,
        ),
        (
            ObsBinError::VariableExists {
                var: "t".to_string(),
            },
            ErrorCategory::Conflict,
        ),
        (
            ObsBinError::NotComputed {
                field: "t.count".to_string(),
            },
            ErrorCategory::MissingResult,
        ),
        (
            ObsBinError::Unsupported("concat".to_string()),
            ErrorCategory::Internal,
        ),
    ];
    for (error, category) in cases {
        assert_eq!(error.category(), category, "{error}");
    }

    let generic: ObsBinError = "Test error".into();
    assert_eq!(format!("{generic}"), "Test error");
    let missing = ObsBinError::MissingField {
        field: "omb/t".to_string(),
    };
    assert!(missing.to_string().contains("omb/t"));
}

#[test]
fn test_parallel_config() {
    let default_config = ParallelConfig::default();
    assert!(default_config.threads.is_none());
    assert!(default_config.resolved_threads() > 0);
    assert_eq!(ParallelConfig::new(Some(3)).threads, Some(3));
    assert_eq!(ParallelConfig::new(Some(3)).resolved_threads(), 3);
    assert!(matches!(
        ParallelConfig::new(Some(0)).setup_global_pool(),
        Err(ObsBinError::ThreadPoolError(_))
    ));

    let info = get_parallel_info();
    assert!(info.current_threads > 0);
    assert!(info.available_cores > 0);
    assert!(info.available_parallelism > 0);
    info.log();
}

#[test]
fn test_merge_tree() -> Result<()> {
    let sum = merge_tree((1..=100).collect::<Vec<i64>>(), |a, b| Ok(a + b))?;
    assert_eq!(sum, Some(5050));

    // operand order is kept
    let letters: Vec<String> = "abcdefg".chars().map(String::from).collect();
    let joined = merge_tree(letters, |a, b| Ok(format!("{a}{b}")))?;
    assert_eq!(joined.as_deref(), Some("abcdefg"));

    let empty = merge_tree(Vec::<i64>::new(), |a, b| Ok(a + b))?;
    assert_eq!(empty, None);

    let failing = merge_tree(vec![1, 2, 3], |_, _| -> Result<i32> {
        Err(ObsBinError::Generic("boom".to_string()))
    });
    assert!(failing.is_err());
    Ok(())
}

#[test]
fn test_grid_insert_and_select() -> Result<()> {
    let bins = vec![dim("latitude:r=90"), dim("depth:e=0,1,2,3")];
    let mut grid = Grid::from_dimensions(&bins);
    assert_eq!(grid.shape(), vec![2, 3]);

    let key = FieldKey::new("t", None, StatisticKind::Count);
    assert!(matches!(
        grid.insert(key.clone(), ArrayD::zeros(vec![3, 2])),
        Err(ObsBinError::ShapeMismatch { .. })
    ));
    let values = ArrayD::from_shape_vec(vec![2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
        .map_err(ObsBinError::from)?;
    grid.insert(key.clone(), values)?;

    // channel axis is registered once and must match afterwards
    grid.ensure_channel_axis(Array1::from(vec![1.0, 2.0]).view())?;
    grid.ensure_channel_axis(Array1::from(vec![1.0, 2.0]).view())?;
    assert!(grid.ensure_channel_axis(Array1::from(vec![1.0, 3.0]).view()).is_err());
    assert!(grid.ensure_channel_axis(Array1::from(vec![1.0]).view()).is_err());
    grid.insert(
        FieldKey::new("u", None, StatisticKind::Count),
        ArrayD::zeros(vec![2, 3, 2]),
    )?;

    let row = grid.select(0, 1)?;
    assert_eq!(row.shape(), vec![3]);
    assert_eq!(
        row.field(&key).map(|f| f.iter().copied().collect::<Vec<_>>()),
        Some(vec![3.0, 4.0, 5.0])
    );
    assert!(grid.select(0, 2).is_err());
    assert!(grid.select(5, 0).is_err());
    Ok(())
}
