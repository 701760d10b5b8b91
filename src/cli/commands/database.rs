use anyhow::Context;
use serde_json::json;

use crate::cli::{utils::output_success, OutputFormat};
use crate::config::config;
use crate::store::PgStore;

pub async fn migrate(output_format: OutputFormat) -> anyhow::Result<()> {
    let store = PgStore::connect(&config().database).context("configuring database pool")?;
    store.migrate().await.context("applying migrations")?;

    output_success(
        output_format,
        "Migrations applied",
        Some(json!({ "database": redact(&config().database.url) })),
    )
}

/// Drop the password from a connection URL before printing it
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at..])
        }
        _ => url.to_string(),
    }
}
