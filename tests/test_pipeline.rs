//! Integration test: pipeline stages, report shape and error taxonomy

use fdr_anomaly::anomaly::BackendKind;
use fdr_anomaly::data::TimeInterpretation;
use fdr_anomaly::prelude::*;
use polars::prelude::*;
use serde_json::Value;

fn clock(seconds: f64) -> String {
    let h = (seconds / 3600.0).floor();
    let m = ((seconds - h * 3600.0) / 60.0).floor();
    let s = seconds - h * 3600.0 - m * 60.0;
    format!("{:02}:{:02}:{:04.1}", h as u32, m as u32, s)
}

/// Flight with a duration-string clock, two varying signals and a flag column
fn duration_flight(n: usize) -> DataFrame {
    let time: Vec<String> = (0..n).map(|i| clock(i as f64 * 0.5)).collect();
    let alt: Vec<f64> = (0..n).map(|i| 3000.0 + ((i * 13) % 41) as f64 * 2.5).collect();
    let ias: Vec<f64> = (0..n).map(|i| 95.0 + ((i * 7) % 23) as f64).collect();
    let gear: Vec<i64> = (0..n).map(|i| (i % 2) as i64).collect();
    df!(
        "Session Time" => &time,
        "AltMSL (ft)" => &alt,
        "IAS (kt)" => &ias,
        "Gear Down" => &gear
    )
    .unwrap()
}

fn linear_pipeline(config: DetectionConfig) -> AnomalyPipeline {
    AnomalyPipeline::new(config).with_capabilities(RuntimeCapabilities::none())
}

// ============================================================================
// Report shape
// ============================================================================

#[test]
fn test_report_json_shape() {
    let table = FlightTable::from_dataframe(&duration_flight(120)).unwrap();
    let report = linear_pipeline(DetectionConfig::default().with_window(20, 5))
        .run(&table)
        .unwrap();
    let json: Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();

    let summary = &json["summary"];
    for key in [
        "n_rows",
        "n_params_used",
        "segments_found",
        "top_parameters",
        "flaggedRowCount",
        "flaggedPercent",
        "window_size",
        "stride",
        "threshold_percentile",
        "threshold_value",
    ] {
        assert!(summary.get(key).is_some(), "summary missing {}", key);
    }
    assert_eq!(summary["n_params_used"], 2);
    assert_eq!(summary["window_size"], 20);

    let segment = &json["segments"][0];
    for key in [
        "start_time",
        "end_time",
        "duration",
        "points",
        "severity",
        "score_peak",
        "top_drivers",
        "explanation",
        "driver_stats",
    ] {
        assert!(segment.get(key).is_some(), "segment missing {}", key);
    }
    assert!(segment["top_drivers"][0].get("error").is_some());

    let times = json["timeline"]["time"].as_array().unwrap();
    assert_eq!(times.len(), 120);
    assert_eq!(times[3], 1.5);
    assert!(json.get("debugInfo").is_none());
}

#[test]
fn test_debug_info() {
    let table = FlightTable::from_dataframe(&duration_flight(80)).unwrap();
    let report = linear_pipeline(DetectionConfig::default().with_window(10, 2).with_debug(true))
        .run(&table)
        .unwrap();

    let debug = report.debug_info.as_ref().unwrap();
    assert_eq!(debug.backend, BackendKind::LinearReconstructor);
    assert_eq!(debug.columns_used, vec!["AltMSL (ft)".to_string(), "IAS (kt)".to_string()]);
    assert_eq!(debug.epochs, Some(30));
    assert!(debug.max_score >= debug.threshold);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["debugInfo"]["backend"], "linear-reconstructor");
    assert!(json["debugInfo"]["scaling"]["spread"]["IAS (kt)"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_robust_report_shape() {
    let table = FlightTable::from_dataframe(&duration_flight(150)).unwrap();
    let config = DetectionConfig {
        iforest_estimators: 50,
        ..DetectionConfig::default()
            .with_strategy(DetectionStrategy::RobustEnsemble)
            .with_debug(true)
    };
    let report = AnomalyPipeline::new(config).run(&table).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    // natively numeric flag columns are kept on the robust path
    assert_eq!(json["summary"]["n_params_used"], 3);
    assert_eq!(json["summary"]["robust_z_threshold"], 8.0);
    assert!(json["summary"].get("window_size").is_none());
    for key in ["time", "score", "robust_z_max", "iforest_score", "is_anomaly"] {
        assert_eq!(json["timeline"][key].as_array().unwrap().len(), 150, "{}", key);
    }
    if let Some(driver) = json["segments"][0]["top_drivers"].get(0) {
        assert!(driver.get("max_robust_z").is_some());
    }

    let center = json["debugInfo"]["scaling"]["center"].as_object().unwrap();
    let mut keys: Vec<&str> = center.keys().map(|k| k.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["AltMSL (ft)", "Gear Down", "IAS (kt)"]);
    assert_eq!(json["debugInfo"]["scaling"]["kind"], "Robust");
}

// ============================================================================
// Time handling
// ============================================================================

#[test]
fn test_rows_sorted_by_time() {
    let n = 60;
    let mut time: Vec<f64> = (0..n).map(|i| i as f64).collect();
    time.reverse();
    let value: Vec<f64> = (0..n).map(|i| ((i * 11) % 31) as f64).collect();
    let df = df!("Session Time" => &time, "EGT (F)" => &value).unwrap();
    let table = FlightTable::from_dataframe(&df).unwrap();

    let pipeline = linear_pipeline(DetectionConfig::default().with_window(10, 1));
    let prepared = pipeline.prepare(&table).unwrap();
    assert_eq!(prepared.interpretation, TimeInterpretation::Numeric);
    assert!(prepared.timestamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(prepared.values[[0, 0]], value[n - 1]);
}

#[test]
fn test_custom_time_column() {
    let n = 50;
    let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.25).collect();
    let value: Vec<f64> = (0..n).map(|i| ((i * 3) % 17) as f64).collect();
    let df = df!("Clock" => &time, "FF (gph)" => &value).unwrap();
    let table = FlightTable::from_dataframe(&df).unwrap();

    let config = DetectionConfig::default().with_time_column("Clock").with_window(8, 2);
    let report = linear_pipeline(config).run(&table).unwrap();
    assert_eq!(report.summary.n_params_used, 1);
    assert_eq!(report.timeline.time[4], 1.0);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_missing_time_column_message() {
    let df = df!("Clock" => &[0.0, 1.0], "x" => &[1.0, 2.0]).unwrap();
    let table = FlightTable::from_dataframe(&df).unwrap();
    let err = AnomalyPipeline::new(DetectionConfig::default()).run(&table).unwrap_err();
    assert!(matches!(err, FdrError::MissingTimeColumn(_)));
    assert_eq!(err.to_string(), "Input file must include a 'Session Time' column.");
}

#[test]
fn test_unparseable_time() {
    let df = df!("Session Time" => &["takeoff", "cruise", "landing"], "x" => &[1.0, 2.0, 3.0]).unwrap();
    let table = FlightTable::from_dataframe(&df).unwrap();
    let err = AnomalyPipeline::new(DetectionConfig::default()).run(&table);
    assert!(matches!(err, Err(FdrError::TimeParse(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let table = FlightTable::from_dataframe(&duration_flight(30)).unwrap();
    let config = DetectionConfig::default().with_threshold_percentile(120.0);
    let err = AnomalyPipeline::new(config).run(&table);
    assert!(matches!(err, Err(FdrError::InvalidParameter { .. })));
}

#[test]
fn test_windower_insufficient_rows() {
    let windower = Windower::new(WindowPlan {
        window_size: 10,
        stride: 1,
        shrunk: false,
    });
    let values = ndarray::Array2::<f64>::zeros((4, 2));
    assert!(matches!(
        windower.build(&values),
        Err(FdrError::InsufficientData { rows: 4, window: 10 })
    ));
}
