use serde_json::{json, Value};

use crate::cli::{utils::output_success, OutputFormat};

/// GET `<url>/health` and report the store status
pub async fn ping(url: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let endpoint = format!("{}/health", url.trim_end_matches('/'));
    let started = std::time::Instant::now();

    let response = reqwest::get(&endpoint).await?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let database = body
        .pointer("/data/database")
        .and_then(Value::as_str)
        .unwrap_or("unavailable")
        .to_string();

    if !status.is_success() {
        anyhow::bail!("{} responded {} (database: {})", endpoint, status, database);
    }

    output_success(
        output_format,
        &format!("{} is up", url),
        Some(json!({
            "status": status.as_u16(),
            "database": database,
            "elapsed_ms": elapsed_ms,
        })),
    )
}
