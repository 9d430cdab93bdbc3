#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use datepoll_server::db::MemoryStore;
use datepoll_server::AppState;

/// Build the full application router backed by an in-memory store.
///
/// The store is returned too so tests can inspect what was written.
pub fn build_test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let app = datepoll_server::app(AppState::new(store.clone()));
    (app, store)
}

/// Send a request with an optional JSON body and extra headers
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(header::HeaderName, &str)],
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(name, *value);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

/// Send an urlencoded form body, the way a browser submits one
pub async fn send_form(
    app: Router,
    method: Method,
    uri: &str,
    form: &str,
    headers: &[(header::HeaderName, &str)],
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    for (name, value) in headers {
        builder = builder.header(name, *value);
    }
    app.oneshot(builder.body(Body::from(form.to_string())).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, &[]).await
}

pub async fn get_html(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, &[(header::ACCEPT, "text/html")]).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body), &[]).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

/// Create an appointment with `slots` candidate times and return its JSON
pub async fn create_appointment(app: Router, slots: usize) -> Value {
    let times: Vec<String> = (0..slots)
        .map(|i| format!("2025-06-{:02}T18:00:00Z", i + 1))
        .collect();
    let response = post_json(
        app,
        "/appointments",
        json!({ "title": "Summer party", "times": times }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

/// Ids of the appointment's candidate times, in order
pub fn time_ids(appointment: &Value) -> Vec<String> {
    appointment["times"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap().to_string())
        .collect()
}

/// Submit a vote and return the created vote JSON
pub async fn create_vote(app: Router, appointment: &Value, username: &str, choices: &[&str]) -> Value {
    let response = post_json(
        app,
        "/appointment_votes",
        json!({
            "username": username,
            "appointment_id": appointment["id"],
            "choices": choices,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}
