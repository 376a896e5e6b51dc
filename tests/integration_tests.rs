//! Integration tests using mock HTTP server
//!
//! Tests the full end-to-end flow: YAML config → Jira requests → DuckDB tables

use jira_pipeline::cli::Runner;
use jira_pipeline::sink::{DuckDbSink, RecordSink};
use jira_pipeline::{DataSelection, Error, PipelineConfig};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUTH: &str = "Basic bWVAYWNtZS5pbzpzZWNyZXQ=";

fn config(server: &MockServer, dir: &TempDir, transform: &str) -> PipelineConfig {
    let yaml = format!(
        r#"
jira:
  base_url: "{uri}"
  email: me@acme.io
  api_token: secret
  page_size: 2
http:
  max_attempts: 2
  retry_delay_secs: 0.001
  page_delay_secs: 0
issues:
  jql_queries:
    - "project = PRJ"
warehouse:
  path: "{warehouse}"
transform:
  program: "{transform}"
  project_dir: "{project}"
"#,
        uri = server.uri(),
        warehouse = dir.path().join("jira.duckdb").display(),
        project = dir.path().display(),
    );

    let config = PipelineConfig::from_yaml(&yaml).unwrap();
    config.validate().unwrap();
    config
}

async fn mount_projects(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/api/3/project/search"))
        .and(header("Authorization", AUTH))
        .and(query_param("startAt", "0"))
        .and(query_param("maxResults", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{"id": "10000", "key": "PRJ"}, {"id": "10001", "key": "OPS"}],
            "isLast": false
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/project/search"))
        .and(query_param("startAt", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{"id": "10002", "key": "WEB"}],
            "isLast": true
        })))
        .mount(server)
        .await;
}

async fn mount_users(server: &MockServer, status: u16) {
    if status != 200 {
        Mock::given(path("/rest/api/3/users"))
            .respond_with(ResponseTemplate::new(status).set_body_string("unavailable"))
            .mount(server)
            .await;
        return;
    }

    Mock::given(method("GET"))
        .and(path("/rest/api/3/users"))
        .and(query_param("startAt", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"accountId": "a1", "active": true},
            {"accountId": "a2", "active": false}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/users"))
        .and(query_param("startAt", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

async fn mount_issues(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/api/3/search/jql"))
        .and(query_param("nextPageToken", "tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [{"id": "3", "key": "PRJ-3", "fields": {"summary": "Three"}}],
            "isLast": true
        })))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/search/jql"))
        .and(query_param("jql", "project = PRJ"))
        .and(query_param("maxResults", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [
                {"id": "1", "key": "PRJ-1", "fields": {"summary": "One"}},
                {"id": "2", "key": "PRJ-2", "fields": {"summary": "Two"}}
            ],
            "nextPageToken": "tok2"
        })))
        .mount(server)
        .await;
}

async fn mount_all(server: &MockServer) {
    mount_projects(server).await;
    mount_users(server, 200).await;
    mount_issues(server).await;
}

async fn warehouse_count(path: &Path, entity: &str) -> usize {
    let sink = DuckDbSink::open(path, "jira_data").unwrap();
    sink.count(entity).await.unwrap()
}

// ============================================================================
// Extraction
// ============================================================================

#[tokio::test]
async fn test_extract_all_into_duckdb() {
    let server = MockServer::start().await;
    mount_all(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server, &dir, "true");

    let report = {
        let pipeline = Runner::build_pipeline(&config, false).unwrap();
        pipeline.extract(DataSelection::All).await.unwrap()
    };

    assert!(report.succeeded());
    assert_eq!(
        report
            .entities
            .iter()
            .map(|e| (e.entity.as_str(), e.pages, e.records))
            .collect::<Vec<_>>(),
        vec![("projects", 2, 3), ("users", 1, 2), ("issues", 2, 3)]
    );

    let warehouse = dir.path().join("jira.duckdb");
    assert_eq!(warehouse_count(&warehouse, "projects").await, 3);
    assert_eq!(warehouse_count(&warehouse, "users").await, 2);
    assert_eq!(warehouse_count(&warehouse, "issues").await, 3);

    let issues = DuckDbSink::open(&warehouse, "jira_data")
        .unwrap()
        .fetch_records("issues")
        .unwrap();
    assert!(issues
        .iter()
        .any(|i| i["fields"]["summary"] == "Three" && i["key"] == "PRJ-3"));
}

#[tokio::test]
async fn test_rerun_upserts_instead_of_duplicating() {
    let server = MockServer::start().await;
    mount_all(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server, &dir, "true");

    for _ in 0..2 {
        let pipeline = Runner::build_pipeline(&config, false).unwrap();
        pipeline.extract(DataSelection::All).await.unwrap();
    }

    let warehouse = dir.path().join("jira.duckdb");
    assert_eq!(warehouse_count(&warehouse, "projects").await, 3);
    assert_eq!(warehouse_count(&warehouse, "issues").await, 3);
}

#[tokio::test]
async fn test_issue_limit_leaves_other_entities_whole() {
    let server = MockServer::start().await;
    mount_all(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&server, &dir, "true");
    config.issues.max_records = 1;

    let report = {
        let pipeline = Runner::build_pipeline(&config, false).unwrap();
        pipeline.extract(DataSelection::All).await.unwrap()
    };

    assert!(report.succeeded());
    assert_eq!(
        report
            .entities
            .iter()
            .map(|e| (e.entity.as_str(), e.records, e.limit_reached))
            .collect::<Vec<_>>(),
        vec![("projects", 3, false), ("users", 2, false), ("issues", 1, true)]
    );

    let warehouse = dir.path().join("jira.duckdb");
    assert_eq!(warehouse_count(&warehouse, "projects").await, 3);
    assert_eq!(warehouse_count(&warehouse, "issues").await, 1);
}

#[tokio::test]
async fn test_soft_failure_keeps_other_entities() {
    let server = MockServer::start().await;
    mount_projects(&server).await;
    mount_users(&server, 500).await;
    mount_issues(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server, &dir, "true");

    let report = {
        let pipeline = Runner::build_pipeline(&config, false).unwrap();
        pipeline.extract(DataSelection::All).await.unwrap()
    };

    assert_eq!(report.failed(), vec!["users"]);
    assert!(!report.loaded().users);
    assert_eq!(report.total_records(), 6);

    let warehouse = dir.path().join("jira.duckdb");
    assert_eq!(warehouse_count(&warehouse, "issues").await, 3);
    assert_eq!(warehouse_count(&warehouse, "users").await, 0);
}

#[tokio::test]
async fn test_rejected_credentials_abort_issues() {
    let server = MockServer::start().await;
    Mock::given(path("/rest/api/3/search/jql"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .expect(2)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server, &dir, "true");

    let pipeline = Runner::build_pipeline(&config, false).unwrap();
    let err = pipeline.extract(DataSelection::Issues).await.unwrap_err();

    assert!(matches!(err, Error::Extraction { .. }));
    assert_eq!(err.status(), Some(401));
}

// ============================================================================
// Transforms
// ============================================================================

#[tokio::test]
async fn test_run_full_with_transforms() {
    let server = MockServer::start().await;
    mount_all(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server, &dir, "true");

    let pipeline = Runner::build_pipeline(&config, true).unwrap();
    let report = pipeline.run_full(DataSelection::All, None).await.unwrap();

    let transform = report.transform.unwrap();
    assert_eq!(transform.completed, vec!["deps", "run", "test", "docs generate"]);
    assert!(transform.skipped.is_empty());
}

#[tokio::test]
async fn test_failing_transform_fails_run() {
    let server = MockServer::start().await;
    mount_users(&server, 200).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config(&server, &dir, "false");

    let err = {
        let pipeline = Runner::build_pipeline(&config, true).unwrap();
        pipeline
            .run_full(DataSelection::Users, Some("run"))
            .await
            .unwrap_err()
    };

    assert!(matches!(err, Error::TransformFailed { ref step, code: Some(1) } if step == "run"));
    assert_eq!(warehouse_count(&dir.path().join("jira.duckdb"), "users").await, 2);
}
