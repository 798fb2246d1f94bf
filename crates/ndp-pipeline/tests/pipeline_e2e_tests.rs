//! End-to-end tests for the NDP pipeline
//!
//! These tests validate the full run workflow against mock collaborators:
//! - Byte-exact reassembly across concurrency degrees
//! - Fallback behavior when the server omits Content-Length
//! - Fail-fast propagation through the orchestrator
//! - The bounded whole-run retry policy

#![allow(clippy::unwrap_used, clippy::expect_used)]

use flate2::read::GzDecoder;
use ndp_pipeline::{
    fetch, Pipeline, PipelineError, ResourceDescriptor, RunConfig, Stage, WarehouseClient,
    ObjectStoreClient, FetchError,
};
use reqwest::Client;
use serde_json::{json, Value};
use std::io::Read;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NDJSON_BODY: &[u8] = b"{\"id\":1,\"name\":\"alpha\"}\n{\"id\":2,\"name\":\"beta\",\"extra\":true}\n";

/// Deterministic patterned payload for reassembly checks
fn patterned_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Pipeline with both outbound collaborators pointed at the mock server
fn mock_pipeline(server: &MockServer) -> Pipeline {
    let http = Client::new();
    let store = ObjectStoreClient::new(http.clone(), server.uri());
    let warehouse = WarehouseClient::new(http.clone(), server.uri(), "test-project", "US");
    Pipeline::new(http, store, warehouse)
}

fn run_config(server: &MockServer) -> RunConfig {
    let mut config = RunConfig::new(
        format!("{}/data.ndjson", server.uri()).parse().unwrap(),
        "my-bucket",
        "data.csv.gz",
        "analytics",
        "events",
    );
    config.retry_delay = Duration::ZERO;
    config
}

async fn mount_upload_mock(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/my-bucket/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", "data.csv.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "data.csv.gz"})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_load_mock(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/test-project/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"jobId": "job_42", "location": "US"}
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_round_trip_across_concurrency_degrees() {
    let payload = patterned_payload(64 * 1024);
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data.ndjson"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let client = Client::new();
    for degree in 1..=8usize {
        let descriptor = ResourceDescriptor::new(
            format!("{}/data.ndjson", server.uri()).parse().unwrap(),
            NonZeroUsize::new(degree).unwrap(),
        );
        let fetched = fetch(&client, &descriptor).await.unwrap();
        assert_eq!(fetched, payload, "degree {degree} corrupted the payload");
    }
}

#[tokio::test]
async fn test_fetch_rejects_bad_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data.ndjson"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = Client::new();
    let descriptor = ResourceDescriptor::new(
        format!("{}/data.ndjson", server.uri()).parse().unwrap(),
        NonZeroUsize::new(4).unwrap(),
    );

    match fetch(&client, &descriptor).await.unwrap_err() {
        FetchError::BadStatus { status } => assert_eq!(status.as_u16(), 404),
        other => panic!("unexpected error: {other}"),
    }
}

/// Minimal HTTP server answering one GET with a chunked body and no
/// Content-Length, which wiremock cannot produce.
async fn spawn_chunked_server(payload: Vec<u8>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        // Drain the request head before answering
        let mut buf = [0u8; 1024];
        let mut head = Vec::new();
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
            if head.windows(4).any(|window| window == b"\r\n\r\n") {
                break;
            }
        }

        let mut response = Vec::new();
        response.extend_from_slice(b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n");
        for part in payload.chunks(1000) {
            response.extend_from_slice(format!("{:x}\r\n", part.len()).as_bytes());
            response.extend_from_slice(part);
            response.extend_from_slice(b"\r\n");
        }
        response.extend_from_slice(b"0\r\n\r\n");

        let _ = socket.write_all(&response).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}/data.ndjson")
}

#[tokio::test]
async fn test_fetch_without_content_length_uses_fallback() {
    let payload = patterned_payload(10_000);
    let url = spawn_chunked_server(payload.clone()).await;

    let client = Client::new();
    let descriptor =
        ResourceDescriptor::new(url.parse().unwrap(), NonZeroUsize::new(4).unwrap());

    let fetched = fetch(&client, &descriptor).await.unwrap();
    assert_eq!(fetched, payload);
}

#[tokio::test]
async fn test_fetch_failure_skips_all_later_stages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data.ndjson"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_upload_mock(&server, 0).await;
    mount_load_mock(&server, 0).await;

    let pipeline = mock_pipeline(&server);
    let mut config = run_config(&server);
    config.retry_count = 0;

    let err = pipeline.run_once(&config).await.unwrap_err();
    assert_eq!(err.stage(), Stage::Fetch);
    match err {
        PipelineError::Fetch(FetchError::BadStatus { status }) => {
            assert_eq!(status.as_u16(), 500)
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_bounded_retry_restarts_the_whole_run() {
    let server = MockServer::start().await;

    // Two failing attempts, then the dataset appears
    Mock::given(method("GET"))
        .and(path("/data.ndjson"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data.ndjson"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(NDJSON_BODY))
        .expect(1)
        .mount(&server)
        .await;
    mount_upload_mock(&server, 1).await;
    mount_load_mock(&server, 1).await;

    let pipeline = mock_pipeline(&server);
    let mut config = run_config(&server);
    config.retry_count = 2;

    let report = pipeline.run_with_retry(&config).await.unwrap();
    assert_eq!(report.attempts, 3);
    assert_eq!(report.job.job_id, "job_42");
}

#[tokio::test]
async fn test_retry_exhaustion_is_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data.ndjson"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    mount_upload_mock(&server, 0).await;
    mount_load_mock(&server, 0).await;

    let pipeline = mock_pipeline(&server);
    let mut config = run_config(&server);
    config.retry_count = 2;

    let err = pipeline.run_with_retry(&config).await.unwrap_err();
    assert_eq!(err.stage(), Stage::Fetch);
}

#[tokio::test]
async fn test_successful_run_produces_expected_artifact_and_job() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data.ndjson"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(NDJSON_BODY))
        .expect(1)
        .mount(&server)
        .await;
    mount_upload_mock(&server, 1).await;
    mount_load_mock(&server, 1).await;

    let pipeline = mock_pipeline(&server);
    let config = run_config(&server);

    let report = pipeline.run_once(&config).await.unwrap();
    assert_eq!(report.bytes_fetched, NDJSON_BODY.len());
    assert_eq!(report.receipt.storage_uri(), "gs://my-bucket/data.csv.gz");
    assert_eq!(report.job.job_id, "job_42");
    assert_eq!(report.attempts, 1);

    let requests = server.received_requests().await.unwrap();

    // The uploaded artifact decompresses to the transcoded table, schema
    // grown in first-appearance order
    let upload = requests
        .iter()
        .find(|request| request.url.path().starts_with("/upload/"))
        .unwrap();
    let content_type = upload.headers.get("content-type").unwrap();
    assert_eq!(content_type.to_str().unwrap(), "application/gzip");

    let mut decoder = GzDecoder::new(&upload.body[..]);
    let mut csv = String::new();
    decoder.read_to_string(&mut csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "id,name,extra");
    assert_eq!(lines[1], "1,alpha,");
    assert_eq!(lines[2], "2,beta,true");

    // The load job points at the uploaded object with the fixed CSV config
    let load = requests
        .iter()
        .find(|request| request.url.path().starts_with("/bigquery/"))
        .unwrap();
    let body: Value = serde_json::from_slice(&load.body).unwrap();
    let load_config = &body["configuration"]["load"];
    assert_eq!(
        load_config["sourceUris"][0],
        json!("gs://my-bucket/data.csv.gz")
    );
    assert_eq!(load_config["sourceFormat"], json!("CSV"));
    assert_eq!(load_config["skipLeadingRows"], json!(1));
    assert_eq!(load_config["autodetect"], json!(true));
    assert_eq!(
        load_config["destinationTable"]["datasetId"],
        json!("analytics")
    );
    assert_eq!(load_config["destinationTable"]["tableId"], json!("events"));
}

#[tokio::test]
async fn test_upload_failure_reports_upload_stage() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data.ndjson"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(NDJSON_BODY))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/my-bucket/o"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_load_mock(&server, 0).await;

    let pipeline = mock_pipeline(&server);
    let config = run_config(&server);

    let err = pipeline.run_once(&config).await.unwrap_err();
    assert_eq!(err.stage(), Stage::Upload);
    assert!(err.to_string().contains("503"));
}
