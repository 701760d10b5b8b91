#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use crm_api::auth::{generate_jwt, Claims};
use crm_api::config::{AppConfig, DatabaseConfig};
use crm_api::domain::{Lead, NewContact, NewLead, NewPreLead, Profile, User};
use crm_api::events::RecordingEventSink;
use crm_api::permissions::{PermissionMatrix, Role};
use crm_api::server::{app, AppState};
use crm_api::services::Services;
use crm_api::store::{CrmStore, MemoryStore, PgStore};

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_crm-api"));
        cmd.env("CRM_API_PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Inherit environment so the server can see DATABASE_URL from .env
        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                // Without a reachable database the server still answers, degraded
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Services over a fresh in-memory store, recording every published event
pub struct Pipeline {
    pub store: Arc<MemoryStore>,
    pub events: Arc<RecordingEventSink>,
    pub services: Services,
}

impl Pipeline {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let services = Services::new(store.clone(), events.clone());
        Self { store, events, services }
    }
}

/// Services over the database in `DATABASE_URL`, migrated to the latest schema.
/// `None` when no database is configured, so the suite is skipped.
pub struct PgPipeline {
    pub store: Arc<PgStore>,
    pub events: Arc<RecordingEventSink>,
    pub services: Services,
}

impl PgPipeline {
    pub async fn connect() -> Result<Option<Self>> {
        dotenvy::dotenv().ok();
        let url = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => {
                eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
                return Ok(None);
            }
        };
        let store = PgStore::connect(&DatabaseConfig {
            url,
            max_connections: 8,
            connection_timeout: 10,
        })?;
        store.migrate().await?;

        let store = Arc::new(store);
        let events = Arc::new(RecordingEventSink::new());
        let services = Services::new(store.clone(), events.clone());
        Ok(Some(Self { store, events, services }))
    }
}

pub fn profile(first_name: &str, company: &str) -> Profile {
    Profile {
        first_name: first_name.to_string(),
        email: Some(format!("{}@{}.example", first_name.to_lowercase(), company.to_lowercase())),
        company_name: Some(company.to_string()),
        ..Default::default()
    }
}

pub fn new_pre_lead(first_name: &str, company: &str) -> NewPreLead {
    NewPreLead {
        profile: profile(first_name, company),
        source: Some("trade_show".to_string()),
        ..Default::default()
    }
}

pub fn new_lead(first_name: &str, company: &str) -> NewLead {
    NewLead {
        profile: profile(first_name, company),
        ..Default::default()
    }
}

pub fn lead_contact(lead: &Lead, first_name: &str, is_primary: bool) -> NewContact {
    NewContact {
        lead_id: Some(lead.id),
        first_name: first_name.to_string(),
        is_primary,
        ..Default::default()
    }
}

/// Router over a memory store with the built-in permission matrix
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub events: Arc<RecordingEventSink>,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::development())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let state = AppState::new(store.clone(), events.clone(), PermissionMatrix::builtin(), config.clone());
        Self {
            router: app(state),
            store,
            events,
            config,
        }
    }

    /// Store an active user with `role` and mint a token for them
    pub async fn user(&self, role: Role) -> Result<(User, String)> {
        let user = User::new(format!("{}@crm.example", role.as_str()), role.as_str(), role);
        self.save_user(&user).await?;
        let token = self.token_for(&user)?;
        Ok((user, token))
    }

    pub async fn save_user(&self, user: &User) -> Result<()> {
        let mut tx = self.store.begin().await?;
        tx.save_user(user).await?;
        tx.commit().await?;
        Ok(())
    }

    pub fn token_for(&self, user: &User) -> Result<String> {
        let claims = Claims::new(user.id, user.email.clone(), user.role, 1);
        Ok(generate_jwt(&claims, &self.config.security.jwt_secret)?)
    }

    /// Send a request and return the status plus the parsed JSON body
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    pub async fn get(&self, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }
}
