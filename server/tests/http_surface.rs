//! HTTP surface tests driven through the router with `oneshot`

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use vpanel_server::{build_router, AppState};

async fn test_state() -> AppState {
    let mut config = vpanel_core::PanelConfig::default();
    config.auth.jwt_secret = "0123456789abcdef0123456789abcdef".to_string();
    config.auth.admin_pass = "adminPass1".to_string();
    AppState::build(config).await.unwrap()
}

async fn router() -> (Router, AppState) {
    let state = test_state().await;
    (build_router(state.clone()), state)
}

async fn send_json(router: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    send(router, method, uri, Some(body), None).await
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register_and_login(router: &Router, name: &str) -> (u64, String) {
    let (status, body) = send_json(
        router,
        "POST",
        "/api/portal/auth/register",
        json!({
            "username": name,
            "email": format!("{name}@example.com"),
            "password": "passw0rd1",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let user_id = body["user_id"].as_u64().unwrap();

    let (status, body) = send_json(
        router,
        "POST",
        "/api/portal/auth/login",
        json!({ "login": name, "password": "passw0rd1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (user_id, body["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn register_login_and_fetch_subscription() {
    let (router, _state) = router().await;
    let (_, token) = register_and_login(&router, "alice").await;

    let (status, link) = send(&router, "GET", "/api/subscription/link", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let sub_token = link["token"].as_str().unwrap();
    assert!(sub_token.len() >= 32);
    assert_eq!(link["short_code"].as_str().unwrap().len(), 8);

    // Fetch the (empty) subscription as v2rayN
    let request = Request::builder()
        .uri(format!("/api/subscription/{sub_token}"))
        .header(header::USER_AGENT, "v2rayN/6.42")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let userinfo = response
        .headers()
        .get("subscription-userinfo")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(userinfo, "upload=0; download=0; total=0; expire=0");
    assert_eq!(
        response
            .headers()
            .get("profile-update-interval")
            .unwrap()
            .to_str()
            .unwrap(),
        "24"
    );
}

#[tokio::test]
async fn unknown_token_is_404_and_unknown_format_is_400() {
    let (router, _state) = router().await;

    let (status, _) = send(&router, "GET", "/api/subscription/deadbeef", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, token) = register_and_login(&router, "bob").await;
    let (_, link) = send(&router, "GET", "/api/subscription/link", None, Some(&token)).await;
    let sub_token = link["token"].as_str().unwrap();

    let (status, body) = send(
        &router,
        "GET",
        &format!("/api/subscription/{sub_token}?format=nope"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn regenerate_kills_old_link() {
    let (router, _state) = router().await;
    let (_, token) = register_and_login(&router, "carol").await;

    let (_, old) = send(&router, "GET", "/api/subscription/link", None, Some(&token)).await;
    let old_token = old["token"].as_str().unwrap().to_string();

    let (status, new) = send(
        &router,
        "POST",
        "/api/subscription/regenerate",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(new["token"].as_str().unwrap(), old_token);

    let (status, _) = send(
        &router,
        "GET",
        &format!("/api/subscription/{old_token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        "GET",
        &format!("/api/subscription/{}", new["token"].as_str().unwrap()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_endpoints_require_admin_role() {
    let (router, _state) = router().await;
    let (_, user_token) = register_and_login(&router, "dave").await;

    let (status, _) = send(
        &router,
        "GET",
        "/api/admin/subscriptions",
        None,
        Some(&user_token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The seeded admin gets through.
    let (status, body) = send_json(
        &router,
        "POST",
        "/api/portal/auth/login",
        json!({ "login": "admin", "password": "adminPass1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let admin_token = body["token"].as_str().unwrap();

    let (status, body) = send(
        &router,
        "GET",
        "/api/admin/subscriptions",
        None,
        Some(admin_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["items"].is_array());
}

#[tokio::test]
async fn order_flow_over_http() {
    let (router, _state) = router().await;
    let (_, admin_token) = {
        let (status, body) = send_json(
            &router,
            "POST",
            "/api/portal/auth/login",
            json!({ "login": "admin", "password": "adminPass1" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (0, body["token"].as_str().unwrap().to_string())
    };

    let (status, plan) = send(
        &router,
        "POST",
        "/api/admin/plans",
        Some(json!({ "name": "Monthly", "price": 1500, "duration_days": 30 })),
        Some(&admin_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{plan}");
    let plan_id = plan["id"].as_u64().unwrap();

    let (_, token) = register_and_login(&router, "erin").await;
    let (status, order) = send(
        &router,
        "POST",
        "/api/orders",
        Some(json!({ "plan_id": plan_id })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["pay_amount"], 1500);
    let order_no = order["order_no"].as_str().unwrap();

    let (status, paid) = send_json(
        &router,
        "POST",
        "/api/payment/callback",
        json!({
            "order_no": order_no,
            "payment_method": "alipay",
            "payment_no": "PAY-1",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{paid}");
    assert_eq!(paid["status"], "completed");

    // A second callback for the same order conflicts.
    let (status, _) = send_json(
        &router,
        "POST",
        "/api/payment/callback",
        json!({
            "order_no": order_no,
            "payment_method": "alipay",
            "payment_no": "PAY-1",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
