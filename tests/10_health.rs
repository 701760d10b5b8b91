mod common;

use anyhow::Result;
use axum::http::Method;
use reqwest::StatusCode;

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", server.base_url)).send().await?;

    // OK or SERVICE_UNAVAILABLE both prove liveness; the latter means no database
    assert!(
        res.status() == StatusCode::OK || res.status() == StatusCode::SERVICE_UNAVAILABLE,
        "unexpected status: {}",
        res.status()
    );

    let body = res.json::<serde_json::Value>().await?;
    assert!(body.get("data").and_then(|d| d.get("status")).is_some(), "missing status: {}", body);
    Ok(())
}

#[tokio::test]
async fn root_describes_service() -> Result<()> {
    let server = common::ensure_server().await?;
    let body = reqwest::get(format!("{}/", server.base_url))
        .await?
        .json::<serde_json::Value>()
        .await?;

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "CRM API");
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::get(format!("{}/api/leads", server.base_url)).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn memory_backed_health_is_ok() -> Result<()> {
    let app = common::TestApp::new();
    let (status, body) = app.send(Method::GET, "/health", None, None).await?;
    assert_eq!(status.as_u16(), 200);
    assert_eq!(body["data"]["database"], "ok");
    Ok(())
}
