//! End-to-end cross-match workflow against an in-memory TAP service.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use approx::assert_abs_diff_eq;
use catalog_access::catalog::{GAIA, SIMBAD};
use catalog_access::crossmatch::EMPTY_RESULT;
use catalog_access::tap::{AdqlRequest, HttpReply, JobHandle, JobPhase, TableUpload};
use catalog_access::{
    build, votable, CatalogKey, CatalogQueryExecutor, CatalogService, Column, CrossMatchCoordinator,
    CrossMatchSettings, CrossMatchStage, DataType, FilterSet, QueryText, ResultTable, TapService,
    TransportError, Value,
};

/// Serves a fixed source table synchronously and a scripted asynchronous job.
struct FakeTap {
    source: Result<HttpReply, TransportError>,
    /// Phases reported by successive polls; the last one repeats.
    phases: Mutex<VecDeque<JobPhase>>,
    job_result: HttpReply,
    calls: Mutex<Vec<String>>,
    uploaded: Mutex<Option<(String, ResultTable)>>,
}

impl FakeTap {
    fn new(source: ResultTable, phases: Vec<JobPhase>, job_result: ResultTable) -> Self {
        Self {
            source: Ok(ok(votable::write(&source, "results"))),
            phases: Mutex::new(phases.into()),
            job_result: ok(votable::write(&job_result, "results")),
            calls: Mutex::new(Vec::new()),
            uploaded: Mutex::new(None),
        }
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn ok(body: String) -> HttpReply {
    HttpReply {
        status: 200,
        body: body.into_bytes(),
    }
}

impl TapService for FakeTap {
    fn run_sync(&self, _request: &AdqlRequest) -> Result<HttpReply, TransportError> {
        self.record("run_sync");
        self.source.clone()
    }

    fn submit_job(
        &self,
        request: &AdqlRequest,
        upload: TableUpload<'_>,
    ) -> Result<JobHandle, TransportError> {
        self.record("submit_job");
        assert!(request.query.contains(&format!("TAP_UPLOAD.{}", upload.name)));
        *self.uploaded.lock().unwrap() = Some((upload.name.to_string(), upload.table.clone()));
        Ok(JobHandle {
            url: "memory://async/1".to_string(),
        })
    }

    fn run_job(&self, _job: &JobHandle) -> Result<(), TransportError> {
        self.record("run_job");
        Ok(())
    }

    fn job_phase(&self, _job: &JobHandle) -> Result<JobPhase, TransportError> {
        self.record("job_phase");
        let mut phases = self.phases.lock().unwrap();
        if phases.len() > 1 {
            Ok(phases.pop_front().unwrap())
        } else {
            Ok(phases.front().cloned().unwrap_or(JobPhase::Completed))
        }
    }

    fn fetch_job_result(&self, _job: &JobHandle) -> Result<HttpReply, TransportError> {
        self.record("fetch_job_result");
        Ok(self.job_result.clone())
    }

    fn job_error_summary(&self, _job: &JobHandle) -> Result<String, TransportError> {
        self.record("job_error_summary");
        Ok("Unknown table TAP_UPLOAD.tmp_table".to_string())
    }

    fn abort_job(&self, _job: &JobHandle) -> Result<(), TransportError> {
        self.record("abort_job");
        Ok(())
    }

    fn delete_job(&self, _job: &JobHandle) -> Result<(), TransportError> {
        self.record("delete_job");
        Ok(())
    }
}

fn gaia_rows() -> ResultTable {
    let mut table = ResultTable::new(vec![
        Column::new("gaia_id", DataType::Long),
        Column::new("RA", DataType::Double).with_unit("deg"),
        Column::new("Dec", DataType::Double).with_unit("deg"),
        Column::new("PMRA", DataType::Double).with_unit("mas.yr**-1"),
        Column::new("PMDec", DataType::Double).with_unit("mas.yr**-1"),
        Column::new("GMagnitude", DataType::Double).with_unit("mag"),
    ])
    .unwrap();
    table
        .push_row(vec![100_i64.into(), 10.0.into(), 20.0.into(), 0.0.into(), 0.0.into(), 11.2.into()])
        .unwrap();
    table
        .push_row(vec![200_i64.into(), 30.0.into(), (-5.0).into(), 100.0.into(), (-50.0).into(), 9.8.into()])
        .unwrap();
    table
        .push_row(vec![300_i64.into(), 50.0.into(), 45.0.into(), Value::Null, Value::Null, 12.0.into()])
        .unwrap();
    table
}

fn simbad_columns() -> Vec<Column> {
    vec![
        Column::new("simbad_id", DataType::Char),
        Column::new("simbad_name", DataType::Char),
        Column::new("simbad_otype", DataType::Char),
        Column::new("simbad_type_description", DataType::Char),
        Column::new("simbad_ra", DataType::Double),
        Column::new("simbad_dec", DataType::Double),
        Column::new("gaia_id", DataType::Long),
    ]
}

fn simbad_matches() -> ResultTable {
    let mut table = ResultTable::new(simbad_columns()).unwrap();
    for (id, name, gaia_id) in [("HD 1", "HD 1", 100_i64), ("HD 2", "HD 2", 200), ("HD 2", "CCDM J00002", 200)] {
        table
            .push_row(vec![
                id.into(),
                name.into(),
                "*".into(),
                "Star".into(),
                10.0.into(),
                20.0.into(),
                gaia_id.into(),
            ])
            .unwrap();
    }
    table
}

fn settings() -> CrossMatchSettings {
    CrossMatchSettings {
        poll_interval: Duration::from_millis(2),
        job_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

fn coordinator(tap: &Arc<FakeTap>, settings: CrossMatchSettings) -> CrossMatchCoordinator {
    let executor = CatalogQueryExecutor::new().with_service(CatalogKey::Gaia, tap.clone());
    CrossMatchCoordinator::new(executor, tap.clone(), settings)
}

fn source_query() -> QueryText {
    build(&GAIA, &FilterSet::new().with_object_type("Star"), Some(3)).unwrap()
}

#[test]
fn test_cross_match_merges_and_orders_columns() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tap = Arc::new(FakeTap::new(
        gaia_rows(),
        vec![JobPhase::Queued, JobPhase::Running, JobPhase::Completed],
        simbad_matches(),
    ));

    let outcome = coordinator(&tap, settings())
        .cross_match(&GAIA, &source_query(), &SIMBAD)
        .unwrap();

    assert_eq!(outcome.source_catalog, "gaia");
    assert_eq!(outcome.target_catalog, "simbad");
    assert_eq!(outcome.source_query, source_query().as_str());
    assert!(outcome.crossmatch_query.contains("TAP_UPLOAD.tmp_table"));
    assert_eq!(
        outcome.columns,
        vec![
            "gaia_id",
            "simbad_id",
            "simbad_name",
            "simbad_otype",
            "simbad_type_description",
            "RA",
            "Dec",
            "PMRA",
            "PMDec",
            "GMagnitude",
            "adjusted_ra",
            "adjusted_dec",
            "simbad_ra",
            "simbad_dec",
        ]
    );

    // Every source row survives; the doubly matched one appears twice.
    let ids: Vec<_> = outcome.rows.iter().map(|r| r.get("gaia_id").cloned()).collect();
    assert_eq!(
        ids,
        vec![
            Some(Value::Int(100)),
            Some(Value::Int(200)),
            Some(Value::Int(200)),
            Some(Value::Int(300))
        ]
    );
    assert_eq!(outcome.rows[2].get("simbad_name"), Some(&Value::from("CCDM J00002")));
    assert_eq!(outcome.rows[3].get("simbad_id"), Some(&Value::Null));

    // Zero proper motion leaves the position unchanged across epochs.
    let table = &outcome.table;
    assert_abs_diff_eq!(table.value(0, "adjusted_ra").unwrap().as_f64().unwrap(), 10.0, epsilon = 1e-12);
    assert_abs_diff_eq!(table.value(0, "adjusted_dec").unwrap().as_f64().unwrap(), 20.0, epsilon = 1e-12);
    // Moving back 16 years from J2016 to J2000: -50 mas/yr in Dec moves north.
    let dec = table.value(1, "adjusted_dec").unwrap().as_f64().unwrap();
    assert_abs_diff_eq!(dec, -5.0 + 800.0 / 3.6e6, epsilon = 1e-9);

    let (name, uploaded) = tap.uploaded.lock().unwrap().clone().unwrap();
    assert_eq!(name, "tmp_table");
    assert_eq!(uploaded.column_names(), vec!["gaia_id", "adjusted_ra", "adjusted_dec"]);
    assert_eq!(uploaded.num_rows(), 3);

    assert_eq!(
        tap.calls(),
        vec![
            "run_sync",
            "submit_job",
            "run_job",
            "job_phase",
            "job_phase",
            "job_phase",
            "fetch_job_result",
            "delete_job"
        ]
    );
}

#[test]
fn test_empty_match_is_a_failure() {
    let tap = Arc::new(FakeTap::new(
        gaia_rows(),
        vec![JobPhase::Completed],
        ResultTable::new(simbad_columns()).unwrap(),
    ));

    let err = coordinator(&tap, settings())
        .cross_match(&GAIA, &source_query(), &SIMBAD)
        .unwrap_err();

    assert_eq!(err.stage, CrossMatchStage::MergeResults);
    assert_eq!(err.phase, EMPTY_RESULT);
    assert!(err.detail.contains("COMPLETED"));
    assert_eq!(err.source_query, source_query().as_str());
    assert!(!err.crossmatch_query.is_empty());
    assert_eq!(tap.calls().last().map(String::as_str), Some("delete_job"));
}

#[test]
fn test_source_failure_is_wrapped() {
    let tap = Arc::new(FakeTap {
        source: Err(TransportError::Timeout("read timed out".into())),
        ..FakeTap::new(gaia_rows(), vec![], simbad_matches())
    });

    let err = coordinator(&tap, settings())
        .cross_match(&GAIA, &source_query(), &SIMBAD)
        .unwrap_err();

    assert_eq!(err.stage, CrossMatchStage::QuerySource);
    assert_eq!(err.phase, "Request to source catalog failed");
    assert_eq!(err.source_catalog, "gaia");
    assert_eq!(err.target_catalog, "simbad");
    assert!(err.source_query.is_empty());
    assert!(err.crossmatch_query.is_empty());
    let cause = err.cause.as_ref().unwrap();
    assert_eq!(cause.phase, "Error processing request");
    assert_eq!(tap.calls(), vec!["run_sync"]);
}

#[test]
fn test_failed_job_reports_phase_and_reason() {
    let tap = Arc::new(FakeTap::new(
        gaia_rows(),
        vec![JobPhase::Running, JobPhase::Error],
        simbad_matches(),
    ));

    let err = coordinator(&tap, settings())
        .cross_match(&GAIA, &source_query(), &SIMBAD)
        .unwrap_err();

    assert_eq!(err.stage, CrossMatchStage::AwaitJob);
    assert_eq!(err.phase, "ERROR");
    assert_eq!(err.detail, "Unknown table TAP_UPLOAD.tmp_table");
    assert!(tap.calls().contains(&"delete_job".to_string()));
    assert!(!tap.calls().contains(&"fetch_job_result".to_string()));
}

#[test]
fn test_stalled_job_is_aborted() {
    let tap = Arc::new(FakeTap::new(gaia_rows(), vec![JobPhase::Running], simbad_matches()));
    let settings = CrossMatchSettings {
        poll_interval: Duration::from_millis(5),
        job_timeout: Duration::from_millis(30),
        ..Default::default()
    };

    let err = coordinator(&tap, settings)
        .cross_match(&GAIA, &source_query(), &SIMBAD)
        .unwrap_err();

    assert_eq!(err.stage, CrossMatchStage::AwaitJob);
    assert_eq!(err.phase, "AwaitJob");
    let calls = tap.calls();
    let abort = calls.iter().position(|c| c == "abort_job").unwrap();
    let delete = calls.iter().position(|c| c == "delete_job").unwrap();
    assert!(abort < delete);
}

#[test]
fn test_source_without_proper_motion_fails_adjustment() {
    let source = gaia_rows()
        .select(&["gaia_id", "RA", "Dec", "GMagnitude"])
        .unwrap();
    let tap = Arc::new(FakeTap::new(source, vec![JobPhase::Completed], simbad_matches()));

    let err = coordinator(&tap, settings())
        .cross_match(&GAIA, &source_query(), &SIMBAD)
        .unwrap_err();

    assert_eq!(err.stage, CrossMatchStage::AdjustAstrometry);
    assert_eq!(err.phase, "AdjustAstrometry");
    assert!(err.detail.contains("PMRA"));
    assert_eq!(tap.calls(), vec!["run_sync"]);
}

#[test]
fn test_missing_limit_makes_no_remote_call() {
    let tap = Arc::new(FakeTap::new(gaia_rows(), vec![JobPhase::Completed], simbad_matches()));
    let service = CatalogService::new(
        CatalogQueryExecutor::new().with_service(CatalogKey::Gaia, tap.clone()),
        Some(coordinator(&tap, settings())),
        CatalogKey::Simbad,
    );

    let (status, response) = service.process_cross_match(
        r#"{"db_name_src": "gaia", "query_params": "{\"object_types\": \"Star\"}"}"#,
    );

    assert_eq!(status, 400);
    assert_eq!(response.status, "Input error");
    assert!(response.error.unwrap().contains("limit"));
    assert!(tap.calls().is_empty());
}

#[test]
fn test_service_cross_match_envelope() {
    let tap = Arc::new(FakeTap::new(gaia_rows(), vec![JobPhase::Completed], simbad_matches()));
    let service = CatalogService::new(
        CatalogQueryExecutor::new().with_service(CatalogKey::Gaia, tap.clone()),
        Some(coordinator(&tap, settings())),
        CatalogKey::Simbad,
    );

    let outcome = service
        .cross_match("GAIA", r#"{"object_types": "star"}"#, Some(3), None)
        .unwrap();
    assert_eq!(outcome.columns[0], "gaia_id");
    assert_eq!(outcome.rows.len(), 4);

    let (status, response) = service.process_cross_match(
        r#"{"db_name_src": "gaia", "query_params": {"limit": "3", "object_types": "Star"}}"#,
    );
    assert_eq!(status, 200);
    assert_eq!(response.status, "success");
    assert_eq!(response.catalog_to_match, "simbad");
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["data"][3]["simbad_id"], serde_json::Value::Null);
    assert_eq!(json["data"][0]["gaia_id"], serde_json::json!(100));
}
