use serde_json::{Value, json};
use sprintguard::config::TrackerConfig;
use sprintguard::error::TrackerError;
use sprintguard::tracker::{HttpTracker, Tracker};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpTracker {
    let config = TrackerConfig {
        base_url: server.uri(),
        token: Some("test-token".into()),
        api_version: "2022-06-28".into(),
        timeout_secs: 5,
    };
    HttpTracker::from_config(&config).expect("client should build")
}

#[tokio::test]
async fn retrieve_sends_auth_and_version_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pages/task-1"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("Notion-Version", "2022-06-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "task-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client_for(&server).retrieve("task-1").await.unwrap();
    assert_eq!(page.get("id").and_then(Value::as_str), Some("task-1"));
}

#[tokio::test]
async fn update_wraps_properties_in_the_wire_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/pages/task-1"))
        .and(body_partial_json(json!({
            "properties": { "Prioridad": { "select": { "name": "Alta" } } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "task-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let properties = json!({ "Prioridad": { "select": { "name": "Alta" } } });
    client_for(&server)
        .update("task-1", properties)
        .await
        .unwrap();
}

#[tokio::test]
async fn create_targets_the_collection_parent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pages"))
        .and(body_partial_json(json!({
            "parent": { "database_id": "db-log" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "log-1" })))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .create("db-log", json!({ "ID Log": { "title": [] } }))
        .await
        .unwrap();
}

#[tokio::test]
async fn query_follows_the_cursor_until_exhausted() {
    let server = MockServer::start().await;

    // Cursor-bearing request must be matched before the generic one.
    Mock::given(method("POST"))
        .and(path("/databases/db-tasks/query"))
        .and(body_partial_json(json!({ "start_cursor": "cursor-2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": "task-3" }],
            "has_more": false,
            "next_cursor": null,
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/databases/db-tasks/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": "task-1" }, { "id": "task-2" }],
            "has_more": true,
            "next_cursor": "cursor-2",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rows = client_for(&server)
        .query("db-tasks", None, None)
        .await
        .unwrap();

    let ids: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_str))
        .collect();
    assert_eq!(ids, vec!["task-1", "task-2", "task-3"]);
}

#[tokio::test]
async fn query_passes_filter_and_sorts_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/databases/db-tasks/query"))
        .and(body_partial_json(json!({
            "filter": { "property": "Sprint", "relation": { "contains": "s-1" } },
            "sorts": [{ "property": "Fecha Fin", "direction": "descending" }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "has_more": false,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = json!({ "property": "Sprint", "relation": { "contains": "s-1" } });
    let sorts = json!([{ "property": "Fecha Fin", "direction": "descending" }]);
    let rows = client_for(&server)
        .query("db-tasks", Some(filter), Some(sorts))
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn non_success_status_maps_to_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pages/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("object_not_found"))
        .mount(&server)
        .await;

    let err = client_for(&server).retrieve("gone").await.unwrap_err();
    match err {
        TrackerError::Status { status, body, .. } => {
            assert_eq!(status, 404);
            assert!(body.contains("object_not_found"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn collection_probe_hits_the_database_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/databases/db-tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "db-tasks" })))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .retrieve_collection("db-tasks")
        .await
        .unwrap();
}
