use chrono::NaiveDate;
use grid_extract::{
    AttributeValue, BoundRange, Boundary, DistanceMode, ExtractError, ExtractOptions,
    MemoryDataset, QueryPoint, Value, extract,
};

fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, AttributeValue)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), AttributeValue::from(*v)))
        .collect()
}

/// lon = [10, 20, 30], lat = [40, 50], temp(lon, lat) = 1..6
fn grid() -> MemoryDataset {
    MemoryDataset::new()
        .with_dimension("lon", vec![10.0, 20.0, 30.0], attrs(&[("units", "degrees_east")]))
        .with_dimension("lat", vec![40.0, 50.0], attrs(&[("units", "degrees_north")]))
        .with_variable(
            "temp",
            &["lon", "lat"],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            attrs(&[("units", "K")]),
        )
        .unwrap()
}

/// time(3) x lat(2) x lon(3) with CF time units
fn cube(units: &str, calendar: &str) -> MemoryDataset {
    let data: Vec<f64> = (0..18).map(|v| v as f64).collect();
    MemoryDataset::new()
        .with_dimension(
            "time",
            vec![0.0, 30.0, 59.0],
            attrs(&[("units", units), ("calendar", calendar)]),
        )
        .with_dimension("lat", vec![-10.0, 10.0], attrs(&[("standard_name", "latitude")]))
        .with_dimension("lon", vec![100.0, 110.0, 120.0], attrs(&[("standard_name", "longitude")]))
        .with_variable("pr", &["time", "lat", "lon"], data, attrs(&[("units", "mm/day")]))
        .unwrap()
        .with_global_attribute("title", "cube")
}

fn vars(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn date(y: i32, m: u32, d: u32) -> Value {
    Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

#[test]
fn test_grid_row_count_is_product_of_dimensions() {
    let table = extract(&cube("days since 2000-01-01", "standard"), &vars(&["pr"]), &ExtractOptions::default())
        .unwrap();
    assert_eq!(table.num_rows(), 3 * 2 * 3);
    assert_eq!(
        table.column_names(),
        vec!["time", "lat", "lon", "pr", "date", "datetime"]
    );
    // Last dimension varies fastest
    assert_eq!(
        table.column("pr").unwrap().numbers(),
        (0..18).map(|v| Some(v as f64)).collect::<Vec<_>>()
    );
}

#[test]
fn test_longitude_boundary_scenario() {
    let options = ExtractOptions {
        boundary: Some(Boundary::from([("lon".to_string(), BoundRange::new(15.0, 25.0))])),
        ..Default::default()
    };
    let table = extract(&grid(), &vars(&["temp"]), &options).unwrap();

    assert_eq!(table.num_rows(), 2);
    assert_eq!(table.column("lon").unwrap().numbers(), vec![Some(20.0), Some(20.0)]);
    assert_eq!(table.column("lat").unwrap().numbers(), vec![Some(40.0), Some(50.0)]);
    assert_eq!(table.column("temp").unwrap().numbers(), vec![Some(3.0), Some(4.0)]);
}

#[test]
fn test_point_scenario() {
    let options = ExtractOptions {
        query_points: Some(vec![QueryPoint::new(21.0, 41.0)]),
        distance_mode: DistanceMode::Planar,
        ..Default::default()
    };
    let table = extract(&grid(), &vars(&["temp"]), &options).unwrap();

    assert_eq!(table.num_rows(), 1);
    assert_eq!(table.row(0), vec![
        &Value::Number(20.0),
        &Value::Number(40.0),
        &Value::Number(3.0),
        &Value::Number(21.0),
        &Value::Number(41.0),
    ]);
    assert_eq!(
        table.column_names(),
        vec!["lon", "lat", "temp", "lon_point", "lat_point"]
    );
}

#[test]
fn test_points_are_not_deduplicated() {
    let options = ExtractOptions {
        query_points: Some(vec![
            QueryPoint::new(11.0, 41.0),
            QueryPoint::new(12.0, 42.0),
            QueryPoint::new(-50.0, 80.0),
        ]),
        echo_points: false,
        distance_mode: DistanceMode::GreatCircle,
        ..Default::default()
    };
    let table = extract(&grid(), &vars(&["temp"]), &options).unwrap();
    assert_eq!(table.num_rows(), 3);
    assert_eq!(table.column_names(), vec!["lon", "lat", "temp"]);
    assert_eq!(
        table.column("temp").unwrap().numbers(),
        vec![Some(1.0), Some(1.0), Some(2.0)]
    );
}

#[test]
fn test_point_mode_with_time_boundary() {
    let options = ExtractOptions {
        boundary: Some(Boundary::from([(
            "time".to_string(),
            BoundRange::new(
                NaiveDate::from_ymd_opt(2000, 1, 15).unwrap(),
                NaiveDate::from_ymd_opt(2000, 3, 1).unwrap(),
            ),
        )])),
        query_points: Some(vec![QueryPoint::new(118.0, 9.0).with_id("s1")]),
        ..Default::default()
    };
    let table = extract(&cube("days since 2000-01-01", "standard"), &vars(&["pr"]), &options).unwrap();

    // Days 30 and 59 are 2000-01-31 and 2000-02-29
    assert_eq!(table.num_rows(), 2);
    assert_eq!(
        table.column("date").unwrap().values,
        vec![date(2000, 1, 31), date(2000, 2, 29)]
    );
    // time=1, lat=1, lon=2 -> 6 + 3 + 2
    assert_eq!(table.column("pr").unwrap().numbers(), vec![Some(11.0), Some(17.0)]);
    assert_eq!(table.column("station").unwrap().values, vec![Value::from("s1"); 2]);
}

#[test]
fn test_noleap_calendar() {
    let table = extract(&cube("days since 2001-01-01", "noleap"), &vars(&["pr"]), &ExtractOptions::default())
        .unwrap();
    let dates = &table.column("date").unwrap().values;
    assert_eq!(dates[0], date(2001, 1, 1));
    assert_eq!(dates[17], date(2001, 3, 1));
}

#[test]
fn test_julian_day_time() {
    let data: Vec<f64> = vec![1.0, 2.0];
    let ds = MemoryDataset::new()
        .with_dimension("day", vec![2_451_545.0, 2_451_546.5], attrs(&[("units", "julian_day")]))
        .with_variable("tmax", &["day"], data, attrs(&[]))
        .unwrap();

    let options = ExtractOptions {
        keep_raw_time: false,
        ..Default::default()
    };
    let table = extract(&ds, &vars(&["tmax"]), &options).unwrap();
    assert_eq!(table.column_names(), vec!["tmax", "date"]);
    assert_eq!(
        table.column("date").unwrap().values,
        vec![date(2000, 1, 1), date(2000, 1, 2)]
    );
}

#[test]
fn test_bad_time_units_keep_raw_values() {
    let options = ExtractOptions {
        keep_raw_time: false,
        ..Default::default()
    };
    let table = extract(&cube("days since the beginning", "standard"), &vars(&["pr"]), &options).unwrap();
    assert_eq!(table.column_names(), vec!["time", "lat", "lon", "pr"]);
    assert_eq!(table.num_rows(), 18);
}

#[test]
fn test_unsupported_calendar_keeps_raw_values() {
    let table = extract(&cube("days since 2000-01-01", "julian"), &vars(&["pr"]), &ExtractOptions::default())
        .unwrap();
    assert!(table.column("date").is_none());
    assert!(table.column("time").is_some());
}

#[test]
fn test_metadata_annotation_is_additive() {
    let ds = cube("days since 2000-01-01", "standard");
    let plain = extract(&ds, &vars(&["pr"]), &ExtractOptions::default()).unwrap();
    let annotated = extract(
        &ds,
        &vars(&["pr"]),
        &ExtractOptions {
            include_metadata: true,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(plain.column_names(), annotated.column_names());
    for (a, b) in plain.columns.iter().zip(&annotated.columns) {
        assert_eq!(a.values, b.values);
    }
    assert_eq!(annotated.column("pr").unwrap().attributes["units"].as_str(), Some("mm/day"));
    assert_eq!(annotated.attributes["title"].as_str(), Some("cube"));
    assert!(plain.attributes.is_empty());
}

#[test]
fn test_unlabelled_axes_fail_point_mode() {
    let ds = MemoryDataset::new()
        .with_bare_dimension("x", 2)
        .with_bare_dimension("y", 2)
        .with_variable("v", &["x", "y"], vec![1.0, 2.0, 3.0, 4.0], attrs(&[]))
        .unwrap();

    // Grid mode tolerates unclassified dimensions
    let table = extract(&ds, &vars(&["v"]), &ExtractOptions::default()).unwrap();
    assert_eq!(table.num_rows(), 4);

    let options = ExtractOptions {
        query_points: Some(vec![QueryPoint::new(0.0, 0.0)]),
        ..Default::default()
    };
    let err = extract(&ds, &vars(&["v"]), &options).unwrap_err();
    assert!(matches!(err, ExtractError::AxesNotFound { .. }));
}

#[test]
fn test_boundary_on_foreign_dimension() {
    let options = ExtractOptions {
        boundary: Some(Boundary::from([("time".to_string(), BoundRange::new(0.0, 1.0))])),
        ..Default::default()
    };
    let err = extract(&grid(), &vars(&["temp"]), &options).unwrap_err();
    assert!(matches!(
        err,
        ExtractError::UnknownBoundaryDimension { ref dimension, ref variable, .. }
            if dimension == "time" && variable == "temp"
    ));
}

#[test]
fn test_single_level_tolerance() {
    let ds = MemoryDataset::new()
        .with_dimension("lon", vec![10.0, 20.0], attrs(&[("units", "degrees_east")]))
        .with_dimension("plev", vec![85000.0001], attrs(&[("units", "Pa")]))
        .with_variable("ta", &["plev", "lon"], vec![280.0, 281.0], attrs(&[]))
        .unwrap();

    let options = ExtractOptions {
        boundary: Some(Boundary::from([(
            "plev".to_string(),
            BoundRange::new(85000.0002, 85000.0003),
        )])),
        ..Default::default()
    };
    let table = extract(&ds, &vars(&["ta"]), &options).unwrap();
    assert_eq!(table.num_rows(), 2);
}

#[test]
fn test_station_variable_survives_point_ids() {
    let ds = grid()
        .with_variable("station", &["lon", "lat"], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], attrs(&[]))
        .unwrap();
    let options = ExtractOptions {
        query_points: Some(vec![QueryPoint::new(21.0, 41.0).with_id("p1")]),
        ..Default::default()
    };

    let table = extract(&ds, &vars(&["station"]), &options).unwrap();
    assert_eq!(
        table.column_names(),
        vec!["lon", "lat", "station", "lon_point", "lat_point", "station_1"]
    );
    assert_eq!(table.column("station").unwrap().values, vec![Value::Number(3.0)]);
    assert_eq!(table.column("station_1").unwrap().values, vec![Value::from("p1")]);
}
