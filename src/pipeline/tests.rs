//! Tests for pipeline module

use super::*;
use crate::auth::Credentials;
use crate::http::{FetcherConfig, HttpFetcher, RecordingSleeper};
use crate::sink::MemorySink;
use crate::transform::TransformConfig;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline(server: &MockServer, settings: PipelineSettings) -> (Pipeline, Arc<MemorySink>) {
    let fetcher = HttpFetcher::new(
        FetcherConfig::default(),
        Credentials::new("me@acme.io", "token"),
    )
    .unwrap();
    let sink = Arc::new(MemorySink::new());

    let pipeline = Pipeline::new(
        Arc::new(fetcher),
        sink.clone(),
        PipelineSettings {
            base_url: server.uri(),
            ..settings
        },
    )
    .with_retry(
        RetryPolicy::new(2, Duration::from_millis(1))
            .with_sleeper(Arc::new(RecordingSleeper::new())),
    )
    .with_delay(PageDelay::none());

    (pipeline, sink)
}

fn small_pages() -> PipelineSettings {
    PipelineSettings::default().with_page_size(2)
}

async fn mount_users(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/api/3/users"))
        .and(query_param("startAt", "0"))
        .and(query_param("includeInactiveUsers", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"accountId": "a1", "displayName": "Ana"},
            {"accountId": "a2", "displayName": "Bo"}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/users"))
        .and(query_param("startAt", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"accountId": "a3", "displayName": "Cy"}])),
        )
        .mount(server)
        .await;
}

async fn mount_issue_query(server: &MockServer, jql: &str, ids: &[&str]) {
    let issues: Vec<_> = ids.iter().map(|id| json!({"id": id, "key": format!("PRJ-{id}")})).collect();
    Mock::given(method("GET"))
        .and(path("/rest/api/3/search/jql"))
        .and(query_param("jql", jql))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": issues,
            "isLast": true
        })))
        .mount(server)
        .await;
}

// ============================================================================
// Settings and Reports
// ============================================================================

#[test]
fn test_settings_defaults() {
    let settings = PipelineSettings::default();
    assert_eq!(settings.page_size, 50);
    assert_eq!(settings.max_issues, 10_000);
    assert_eq!(settings.issue_queries, vec![DEFAULT_ISSUE_QUERY.to_string()]);
    assert!(settings.use_search_endpoint);
    assert_eq!(settings.policy("issues"), FailurePolicy::Hard);
    assert_eq!(settings.policy("projects"), FailurePolicy::Soft);
    assert_eq!(settings.policy("anything"), FailurePolicy::Soft);
}

#[test]
fn test_report_loaded_entities() {
    let mut report = PipelineReport::new(DataSelection::All);
    report.entities.push(EntityReport::new("projects"));
    let mut users = EntityReport::new("users");
    users.error = Some("HTTP 500".to_string());
    report.entities.push(users);

    let loaded = report.loaded();
    assert!(loaded.projects);
    assert!(!loaded.users);
    assert_eq!(report.failed(), vec!["users"]);
    assert!(!report.succeeded());
}

// ============================================================================
// Endpoint Resolution
// ============================================================================

#[tokio::test]
async fn test_issue_endpoints_per_query() {
    let server = MockServer::start().await;
    let (pipeline, _) = pipeline(
        &server,
        small_pages().with_issue_queries(vec!["project = A".into(), "project = B".into()]),
    );

    let specs = pipeline.endpoints("issues").unwrap();
    assert_eq!(specs.len(), 2);
    assert!(specs.iter().all(|s| s.api_path == "rest/api/3/search/jql"));
    assert_eq!(
        specs[1].default_params.get("jql").map(String::as_str),
        Some("project = B")
    );

    assert_eq!(pipeline.endpoints("users").unwrap().len(), 1);
}

#[tokio::test]
async fn test_classic_search_forces_first_page() {
    let server = MockServer::start().await;
    let (pipeline, _) = pipeline(
        &server,
        small_pages()
            .with_search_endpoint(false)
            .with_issue_queries(vec!["project = A".into()]),
    );

    let spec = pipeline
        .endpoints("issues")
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    assert!(spec.is_search_sentinel());

    let mut spec = spec;
    spec.default_params
        .insert("startAt".to_string(), "40".to_string());
    let request = pipeline.controller(&spec).unwrap().next_request();

    assert_eq!(request.url, format!("{}/rest/api/3/search", server.uri()));
    assert_eq!(request.param("startAt"), Some("0"));
    assert_eq!(request.param("maxResults"), Some("2"));
    assert_eq!(request.param("jql"), Some("project = A"));
}

// ============================================================================
// Extraction
// ============================================================================

#[tokio::test]
async fn test_extract_entity_streams_pages_to_sink() {
    let server = MockServer::start().await;
    mount_users(&server).await;
    let (pipeline, sink) = pipeline(&server, small_pages());

    let report = pipeline.extract_entity("users").await.unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(report.records, 3);
    assert!(report.succeeded());
    assert!(!report.limit_reached);
    assert_eq!(sink.page_sizes("users"), vec![2, 1]);
    assert_eq!(sink.records("users")[2]["accountId"], "a3");
}

#[tokio::test]
async fn test_extract_unknown_entity() {
    let server = MockServer::start().await;
    let (pipeline, _) = pipeline(&server, small_pages());

    let err = pipeline.extract_entity("boards").await.unwrap_err();
    match err {
        Error::Extraction { entity, source } => {
            assert_eq!(entity, "boards");
            assert!(matches!(*source, Error::UnknownEntity { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_max_issues_stops_issue_extraction() {
    let server = MockServer::start().await;
    mount_issue_query(&server, DEFAULT_ISSUE_QUERY, &["1", "2"]).await;
    let (pipeline, sink) = pipeline(&server, small_pages().with_max_issues(1));

    let report = pipeline.extract_entity("issues").await.unwrap();

    assert!(report.limit_reached);
    assert_eq!(report.records, 1);
    assert_eq!(sink.count("issues").await.unwrap(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_max_issues_leaves_users_untruncated() {
    let server = MockServer::start().await;
    mount_users(&server).await;
    let (pipeline, sink) = pipeline(&server, small_pages().with_max_issues(1));

    let report = pipeline.extract_entity("users").await.unwrap();

    assert!(!report.limit_reached);
    assert_eq!(report.records, 3);
    assert_eq!(sink.count("users").await.unwrap(), 3);
}

#[tokio::test]
async fn test_issue_queries_merge_on_id() {
    let server = MockServer::start().await;
    mount_issue_query(&server, "project = A", &["1", "2"]).await;
    mount_issue_query(&server, "project = B", &["2", "3"]).await;
    let (pipeline, sink) = pipeline(
        &server,
        small_pages().with_issue_queries(vec!["project = A".into(), "project = B".into()]),
    );

    let report = pipeline.extract_entity("issues").await.unwrap();

    assert_eq!(report.records, 4);
    assert_eq!(sink.count("issues").await.unwrap(), 3);
}

#[tokio::test]
async fn test_soft_failure_continues() {
    let server = MockServer::start().await;
    Mock::given(path("/rest/api/3/project/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    mount_users(&server).await;
    mount_issue_query(&server, DEFAULT_ISSUE_QUERY, &["10"]).await;
    let (pipeline, sink) = pipeline(&server, small_pages());

    let report = pipeline.extract(DataSelection::All).await.unwrap();

    assert_eq!(
        report.entities.iter().map(|e| e.entity.as_str()).collect::<Vec<_>>(),
        vec!["projects", "users", "issues"]
    );
    assert_eq!(report.failed(), vec!["projects"]);
    assert!(report
        .entity("projects")
        .and_then(|e| e.error.as_deref())
        .is_some_and(|e| e.contains("500")));
    assert_eq!(report.total_records(), 4);
    assert_eq!(sink.count("issues").await.unwrap(), 1);
    assert!(!report.loaded().projects);
    assert!(report.loaded().users);
}

#[tokio::test]
async fn test_hard_failure_aborts() {
    let server = MockServer::start().await;
    Mock::given(path("/rest/api/3/search/jql"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    let (pipeline, _) = pipeline(&server, small_pages());

    let err = pipeline.extract(DataSelection::Issues).await.unwrap_err();

    assert!(matches!(err, Error::Extraction { ref entity, .. } if entity == "issues"));
    assert_eq!(err.status(), Some(503));
}

// ============================================================================
// Transforms
// ============================================================================

#[tokio::test]
async fn test_run_full_runs_transforms() {
    let server = MockServer::start().await;
    mount_users(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _) = pipeline(&server, small_pages());
    let pipeline = pipeline.with_transform(TransformRunner::new(TransformConfig {
        program: "true".to_string(),
        project_dir: dir.path().to_path_buf(),
        ..Default::default()
    }));

    let report = pipeline
        .run_full(DataSelection::Users, None)
        .await
        .unwrap();
    let transform = report.transform.unwrap();
    assert_eq!(transform.completed, vec!["deps", "run", "test", "docs generate"]);

    let report = pipeline
        .run_full(DataSelection::Users, Some("run"))
        .await
        .unwrap();
    assert_eq!(report.transform.unwrap().completed, vec!["run"]);
}

#[tokio::test]
async fn test_run_full_without_transform() {
    let server = MockServer::start().await;
    mount_users(&server).await;
    let (pipeline, _) = pipeline(&server, small_pages());

    let report = pipeline
        .run_full(DataSelection::Users, None)
        .await
        .unwrap();
    assert!(report.transform.is_none());
    assert_eq!(report.total_records(), 3);
}

#[tokio::test]
async fn test_transform_only_requires_runner() {
    let server = MockServer::start().await;
    let (pipeline, _) = pipeline(&server, small_pages());

    let err = pipeline.run_transform_only("run").await.unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}
