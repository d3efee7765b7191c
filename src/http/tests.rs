//! HTTP API integration tests.
//!
//! Each test stands up a bootstrapped single-node cluster and drives the
//! public router in-process.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use super::create_router;
use crate::protocol::QueueConfig;
use crate::queue::QueueManager;
use crate::raft::{Node, RaftNode};

/// Bootstrap a single-node cluster and build the public router on it.
/// The TempDir must stay alive for the duration of the test.
async fn test_app() -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let manager = QueueManager::new();
    let node = Node::new("127.0.0.1", 23000, 23001);

    let raft = RaftNode::new(1, node, dir.path(), manager, true)
        .await
        .unwrap();
    raft.wait_until_leader(std::time::Duration::from_secs(10))
        .await
        .unwrap();

    (create_router(raft), dir)
}

async fn request_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn create_queue_request(name: &str) -> Request<Body> {
    post_json(
        "/createQueue",
        serde_json::to_value(QueueConfig::named(name)).unwrap(),
    )
}

fn send_request(queue_id: &str, message_id: &str, body: &str) -> Request<Body> {
    post_json(
        &format!("/sendMessage?queueID={queue_id}"),
        json!({"id": message_id, "body": body}),
    )
}

#[tokio::test]
async fn ping_answers_pong() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"Pong");
}

#[tokio::test]
async fn full_queue_lifecycle() {
    let (app, _dir) = test_app().await;
    let id = QueueManager::queue_id("A");

    let (status, body) = request_json(&app, create_queue_request("A")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["queue_config"]["name"], "A");

    let (status, body) = request_json(&app, send_request(&id, "m1", "hi")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["message"]["id"], "m1");
    // The front stamps the timestamp before the command is replicated.
    assert!(body["message"]["timestamp"].as_u64().unwrap() > 0);

    let (status, body) = request_json(
        &app,
        Request::get(format!("/peekMessage?queueID={id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["message"]["id"], "m1");

    let (status, body) = request_json(
        &app,
        Request::delete(format!("/popMessage?queueID={id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert!(body.get("message").is_none());

    // Queue drained: peek reports EMPTY_QUEUE and omits the message.
    let (_, body) = request_json(
        &app,
        Request::get(format!("/peekMessage?queueID={id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body["code"], 1);
    assert!(body.get("message").is_none());
}

#[tokio::test]
async fn duplicate_queue_create_reports_code() {
    let (app, _dir) = test_app().await;

    let (_, body) = request_json(&app, create_queue_request("A")).await;
    assert_eq!(body["code"], 0);

    let (status, body) = request_json(&app, create_queue_request("A")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 4);
}

#[tokio::test]
async fn unknown_queue_reports_not_found() {
    let (app, _dir) = test_app().await;

    let (status, body) = request_json(
        &app,
        Request::get("/peekMessage?queueID=queue-ghost")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 3);

    let (_, body) = request_json(
        &app,
        Request::delete("/popMessage?queueID=queue-ghost")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body["code"], 3);
}

#[tokio::test]
async fn view_all_messages_returns_the_list() {
    let (app, _dir) = test_app().await;
    let id = QueueManager::queue_id("A");

    request_json(&app, create_queue_request("A")).await;
    request_json(&app, send_request(&id, "m1", "a")).await;
    request_json(&app, send_request(&id, "m2", "b")).await;

    let (status, body) = request_json(
        &app,
        Request::get(format!("/viewAllMessages?queueID={id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    let ids: Vec<_> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["m1", "m2"]);
}

#[tokio::test]
async fn requeue_surfaces_dead_letter_messages() {
    let (app, _dir) = test_app().await;
    let id = QueueManager::queue_id("A");

    request_json(&app, create_queue_request("A")).await;
    request_json(&app, send_request(&id, "m1", "x")).await;

    // Default max_receive_count is 3: the third peek banishes m1.
    for _ in 0..3 {
        request_json(
            &app,
            Request::get(format!("/peekMessage?queueID={id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    }

    let (status, body) = request_json(
        &app,
        Request::post(format!("/requeueMessage?queueID={id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["message"]["id"], "m1");

    // Dead-letter list is empty again.
    let (_, body) = request_json(
        &app,
        Request::post(format!("/requeueMessage?queueID={id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn oversized_message_reports_too_large() {
    let (app, _dir) = test_app().await;
    let id = QueueManager::queue_id("tiny");

    let mut config = QueueConfig::named("tiny");
    config.max_message_size = 4;
    request_json(
        &app,
        post_json("/createQueue", serde_json::to_value(config).unwrap()),
    )
    .await;

    let (status, body) = request_json(&app, send_request(&id, "m1", "far too long")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 5);
}

#[tokio::test]
async fn missing_queue_id_is_a_client_error() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/peekMessage").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/createQueue").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn malformed_body_is_a_client_error() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::post("/createQueue")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn empty_queue_name_is_rejected() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/createQueue", json!({"name": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn raft_status_reports_leadership() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/raft/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("Is Leader: true"));
    assert!(text.contains("Current Leader: 127.0.0.1:23001"));
}

/// The leader never answers a queue-targeted request with a redirect.
#[tokio::test]
async fn leader_does_not_redirect() {
    let (app, _dir) = test_app().await;

    let (status, _) = request_json(&app, create_queue_request("A")).await;
    assert_ne!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn join_with_missing_fields_is_rejected() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/raft/join", json!({"id": 2, "address": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json("/raft/join", json!({"id": 2, "address": "no-port"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
