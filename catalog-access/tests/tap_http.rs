//! The blocking TAP client against a mock HTTP server.

use std::time::Duration;

use catalog_access::config::{CatalogEndpoints, CrossMatchConfig};
use catalog_access::tap::{AdqlRequest, JobPhase, TableUpload};
use catalog_access::{
    CatalogService, Column, DataType, ResultTable, ServiceConfig, StellarisError, TapService,
    UreqTapService, Value,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GAIA_VOTABLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VOTABLE version="1.4">
  <RESOURCE type="results">
    <INFO name="QUERY_STATUS" value="OK"/>
    <TABLE>
      <FIELD name="RA" datatype="double" unit="deg"/>
      <FIELD name="gaia_id" datatype="long"/>
      <FIELD name="Dec" datatype="double" unit="deg"/>
      <FIELD name="PMRA" datatype="double" unit="mas.yr**-1"/>
      <FIELD name="PMDec" datatype="double" unit="mas.yr**-1"/>
      <DATA><TABLEDATA>
        <TR><TD>10.0</TD><TD>100</TD><TD>20.0</TD><TD>0</TD><TD>0</TD></TR>
        <TR><TD>30.0</TD><TD>200</TD><TD>-5.0</TD><TD>12.5</TD><TD>-3.0</TD></TR>
      </TABLEDATA></DATA>
    </TABLE>
  </RESOURCE>
</VOTABLE>"#;

const SIMBAD_VOTABLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VOTABLE version="1.4">
  <RESOURCE type="results">
    <TABLE>
      <FIELD name="simbad_id" datatype="char" arraysize="*"/>
      <FIELD name="simbad_name" datatype="char" arraysize="*"/>
      <FIELD name="simbad_otype" datatype="char" arraysize="*"/>
      <FIELD name="simbad_type_description" datatype="char" arraysize="*"/>
      <FIELD name="simbad_ra" datatype="double"/>
      <FIELD name="simbad_dec" datatype="double"/>
      <FIELD name="gaia_id" datatype="long"/>
      <DATA><TABLEDATA>
        <TR><TD>* alf Tst</TD><TD>HD 1</TD><TD>*</TD><TD>Star</TD><TD>10.0</TD><TD>20.0</TD><TD>100</TD></TR>
      </TABLEDATA></DATA>
    </TABLE>
  </RESOURCE>
</VOTABLE>"#;

fn config_for(server: &MockServer) -> ServiceConfig {
    ServiceConfig {
        endpoints: CatalogEndpoints {
            gaia: Some(format!("{}/gaia", server.uri())),
            simbad: Some(format!("{}/simbad", server.uri())),
            sdss: None,
            stellaris: None,
        },
        http_timeout: Duration::from_secs(5).into(),
        crossmatch: CrossMatchConfig {
            poll_interval: Duration::from_millis(10).into(),
            job_timeout: Duration::from_secs(5).into(),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_sync_query_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gaia/sync"))
        .and(body_string_contains("REQUEST=doQuery"))
        .and(body_string_contains("LANG=ADQL"))
        .and(body_string_contains("FORMAT=votable_plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string(GAIA_VOTABLE))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let outcome = tokio::task::spawn_blocking(move || {
        let service = CatalogService::from_config(&config)?;
        service.query_catalog("gaia", r#"{"min_parallax": 5}"#, Some(2), None)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(outcome.catalog, "gaia");
    assert!(outcome.query.starts_with("SELECT TOP 2 gs.source_id AS gaia_id"));
    assert_eq!(outcome.columns[0], "gaia_id");
    assert_eq!(outcome.rows.len(), 2);
    assert_eq!(outcome.rows[1].get("PMRA"), Some(&Value::Float(12.5)));
}

#[tokio::test]
async fn test_http_error_is_api_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gaia/sync"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal error: parser exploded"))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let err = tokio::task::spawn_blocking(move || {
        CatalogService::from_config(&config)?.query_catalog("gaia", "{}", Some(1), None)
    })
    .await
    .unwrap()
    .unwrap_err();

    let StellarisError::CatalogQuery(err) = err else {
        panic!("expected a catalog query error, got {err:?}");
    };
    assert_eq!(err.phase, "API request failed");
    assert_eq!(err.detail, "HTTP error 500: Internal error: parser exploded");
    assert!(err.query.starts_with("SELECT TOP 1"));
}

#[tokio::test]
async fn test_query_status_error_is_api_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gaia/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<VOTABLE><RESOURCE type="results"><INFO name="QUERY_STATUS" value="ERROR">Column gs.foo not found</INFO></RESOURCE></VOTABLE>"#,
        ))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let (status, response) = tokio::task::spawn_blocking(move || {
        let service = CatalogService::from_config(&config).unwrap();
        service.process_query(r#"{"db_name": "gaia", "query_params": "{\"limit\": 1}"}"#)
    })
    .await
    .unwrap();

    assert_eq!(status, 401);
    assert_eq!(response.status, "API request failed");
    assert!(response.error.unwrap().contains("Column gs.foo not found"));
}

#[tokio::test]
async fn test_connection_refused_is_processing_error() {
    let mut config = ServiceConfig::default();
    config.endpoints.gaia = Some("http://127.0.0.1:1/tap".to_string());
    config.http_timeout = Duration::from_secs(2).into();

    let err = tokio::task::spawn_blocking(move || {
        CatalogService::from_config(&config)?.query_catalog("gaia", "{}", Some(1), None)
    })
    .await
    .unwrap()
    .unwrap_err();

    assert_eq!(err.status_phase(), "Error processing request");
}

#[tokio::test]
async fn test_async_job_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/simbad/async"))
        .and(body_string_contains("tmp_table,param:tmp_table"))
        .and(body_string_contains("<TD>42</TD>"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", "/simbad/async/job42"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/simbad/async/job42/phase"))
        .and(body_string_contains("PHASE=RUN"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", "/simbad/async/job42"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/simbad/async/job42/phase"))
        .respond_with(ResponseTemplate::new(200).set_body_string("COMPLETED"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/simbad/async/job42/results/result"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SIMBAD_VOTABLE))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/simbad/async/job42"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", "/simbad/async"))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/simbad", server.uri());
    let expected_job = format!("{base}/async/job42");
    tokio::task::spawn_blocking(move || {
        let tap = UreqTapService::new(&base, Duration::from_secs(5)).unwrap();
        let mut upload = ResultTable::new(vec![
            Column::new("gaia_id", DataType::Long),
            Column::new("adjusted_ra", DataType::Double),
            Column::new("adjusted_dec", DataType::Double),
        ])
        .unwrap();
        upload
            .push_row(vec![42_i64.into(), 1.0.into(), 2.0.into()])
            .unwrap();

        let request = AdqlRequest::new("SELECT * FROM TAP_UPLOAD.tmp_table", "votable/td");
        let job = tap
            .submit_job(
                &request,
                TableUpload {
                    name: "tmp_table",
                    table: &upload,
                },
            )
            .unwrap();
        assert_eq!(job.url, expected_job);

        tap.run_job(&job).unwrap();
        assert_eq!(tap.job_phase(&job).unwrap(), JobPhase::Completed);
        let reply = tap.fetch_job_result(&job).unwrap();
        assert!(reply.is_success());
        tap.delete_job(&job).unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_job_id_from_uws_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/simbad/async"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<uws:job xmlns:uws="http://www.ivoa.net/xml/UWS/v1.0"><uws:jobId>abc123</uws:jobId><uws:phase>PENDING</uws:phase></uws:job>"#,
        ))
        .mount(&server)
        .await;

    let base = format!("{}/simbad", server.uri());
    let job = tokio::task::spawn_blocking(move || {
        let tap = UreqTapService::new(&base, Duration::from_secs(5)).unwrap();
        let table = ResultTable::new(vec![Column::new("gaia_id", DataType::Long)]).unwrap();
        tap.submit_job(
            &AdqlRequest::new("SELECT 1", "votable/td"),
            TableUpload {
                name: "tmp_table",
                table: &table,
            },
        )
    })
    .await
    .unwrap()
    .unwrap();

    assert!(job.url.ends_with("/simbad/async/abc123"));
}

#[tokio::test]
async fn test_cross_match_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gaia/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_string(GAIA_VOTABLE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/simbad/async"))
        .and(body_string_contains("INNER JOIN TAP_UPLOAD.tmp_table"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", "/simbad/async/7"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/simbad/async/7/phase"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", "/simbad/async/7"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/simbad/async/7/phase"))
        .respond_with(ResponseTemplate::new(200).set_body_string("COMPLETED"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/simbad/async/7/results/result"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SIMBAD_VOTABLE))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/simbad/async/7"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let (status, response) = tokio::task::spawn_blocking(move || {
        let service = CatalogService::from_config(&config).unwrap();
        service.process_cross_match(
            r#"{"db_name_src": "gaia", "query_params": "{\"object_types\": \"Star\", \"limit\": 2}"}"#,
        )
    })
    .await
    .unwrap();

    assert_eq!(status, 200, "{:?}", response.error);
    assert_eq!(response.catalog_source, "gaia");
    assert_eq!(response.catalog_to_match, "simbad");
    assert_eq!(&response.columns[..2], ["gaia_id", "simbad_id"]);
    assert_eq!(response.data.len(), 2);
    assert_eq!(response.data[0].get("simbad_name"), Some(&Value::from("HD 1")));
    assert_eq!(response.data[1].get("simbad_name"), Some(&Value::Null));
}
