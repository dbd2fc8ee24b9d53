//! Exercises the HTTP control surface (C7) end-to-end against a router
//! built the same way `main.rs` builds it, just with in-memory doubles
//! standing in for the network and the inverter.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use tower::ServiceExt;

use battery_optimization_controller::api;
use common::{test_config, test_context, TEST_TOKEN};

fn authed(method: Method, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn unauthenticated_request_is_rejected() {
    let cfg = test_config();
    let ctx = test_context();
    let app = api::router(ctx, &cfg);

    let req = Request::builder().uri("/api/v1/status").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn get_status_reports_inverter_and_rate_limit_state() {
    let cfg = test_config();
    let ctx = test_context();
    let app = api::router(ctx, &cfg);

    let req = authed(Method::GET, "/api/v1/status", Body::empty());
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["success"], true);
    assert!(body["data"]["inverter"]["facade_state"].is_string());
    assert!(body["data"]["rate_limited_providers"].is_array());
}

#[tokio::test]
async fn set_mode_override_is_visible_on_parameters() {
    let cfg = test_config();
    let ctx = test_context();
    let app = api::router(ctx, &cfg);

    let set_req = authed(
        Method::POST,
        "/api/v1/mode",
        Body::from(serde_json::json!({ "mode": "force_charge" }).to_string()),
    );
    let set_resp = app.clone().oneshot(set_req).await.unwrap();
    assert_eq!(set_resp.status(), StatusCode::OK);

    let get_req = authed(Method::GET, "/api/v1/parameters", Body::empty());
    let get_resp = app.oneshot(get_req).await.unwrap();
    let body = json_body(get_resp).await;
    assert_eq!(body["data"]["mode_override"], "force_charge");
}

#[tokio::test]
async fn set_mode_null_clears_override() {
    let cfg = test_config();
    let ctx = test_context();
    let app = api::router(ctx, &cfg);

    let set_req = authed(
        Method::POST,
        "/api/v1/mode",
        Body::from(serde_json::json!({ "mode": "avoid_discharge" }).to_string()),
    );
    app.clone().oneshot(set_req).await.unwrap();

    let clear_req = authed(Method::POST, "/api/v1/mode", Body::from(serde_json::json!({ "mode": null }).to_string()));
    app.clone().oneshot(clear_req).await.unwrap();

    let get_req = authed(Method::GET, "/api/v1/parameters", Body::empty());
    let get_resp = app.oneshot(get_req).await.unwrap();
    let body = json_body(get_resp).await;
    assert!(body["data"]["mode_override"].is_null());
}

#[tokio::test]
async fn fraction_setter_rejects_out_of_range_value() {
    let cfg = test_config();
    let ctx = test_context();
    let app = api::router(ctx, &cfg);

    let req = authed(
        Method::POST,
        "/api/v1/always-allow-discharge-limit",
        Body::from(serde_json::json!({ "value": 1.5 }).to_string()),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn charge_rate_setter_rejects_negative_value() {
    let cfg = test_config();
    let ctx = test_context();
    let app = api::router(ctx, &cfg);

    let req = authed(
        Method::POST,
        "/api/v1/charge-rate",
        Body::from(serde_json::json!({ "charge_rate_w": -10.0 }).to_string()),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn discharge_blocked_toggle_round_trips() {
    let cfg = test_config();
    let ctx = test_context();
    let app = api::router(ctx, &cfg);

    let set_req = authed(
        Method::POST,
        "/api/v1/discharge-blocked",
        Body::from(serde_json::json!({ "value": true }).to_string()),
    );
    let set_resp = app.clone().oneshot(set_req).await.unwrap();
    assert_eq!(set_resp.status(), StatusCode::OK);

    let get_req = authed(Method::GET, "/api/v1/parameters", Body::empty());
    let get_resp = app.oneshot(get_req).await.unwrap();
    let body = json_body(get_resp).await;
    assert_eq!(body["data"]["discharge_blocked"], true);
}

#[tokio::test]
async fn health_live_is_always_ok_without_auth() {
    let cfg = test_config();
    let ctx = test_context();
    let app = api::router(ctx, &cfg);

    let req = Request::builder().uri("/health/live").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_ready_is_ok_once_inverter_has_served_a_write() {
    let cfg = test_config();
    let ctx = test_context();
    // Readiness only flips once a write succeeds; reads alone never mark
    // `initialization_complete`.
    ctx.inverter.set_mode_allow_discharge().await.unwrap();
    let app = api::router(ctx, &cfg);

    let req = Request::builder().uri("/health/ready").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
