//!
//! portico HTTP server
//! -------------------
//! Axum-based HTTP API for the platform security core.
//!
//! Responsibilities:
//! - Tenant-scoped public reads keyed by a `domain` query parameter, which is
//!   normalized before any lookup. Singleton reads surface an unknown domain
//!   as 404; collection reads as an empty collection; a missing or empty
//!   parameter is always a 400.
//! - Self-service password reset (single-use token consumption).
//! - Authenticated password update.
//! - Privileged forced reset behind the super-admin gate.
//! - A session map (cookie keyed) standing in for the external identity
//!   provider; `establish_session` is the seam that provider calls through.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, extract::{Query, State}};
use getrandom::getrandom;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::admin::{self, Environment};
use crate::domain;
use crate::error::AppError;
use crate::identity::Principal;
use crate::reset;
use crate::security;
use crate::storage::SharedStore;

const SESSION_COOKIE: &str = "portico_session";

/// Startup configuration, parsed once in `main` and threaded explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    pub environment: Environment,
    /// The one tenant domain whose owner may perform cross-account actions.
    pub privileged_domain: String,
}

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub environment: Environment,
    pub privileged_domain: String,
    /// Session token -> authenticated principal mapping.
    pub sessions: Arc<RwLock<HashMap<String, Principal>>>,
}

impl AppState {
    pub fn new(store: SharedStore, environment: Environment, privileged_domain: &str) -> Self {
        Self {
            store,
            environment,
            privileged_domain: privileged_domain.to_string(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seam for the external identity provider: record an authenticated
    /// account and return the session token to carry in the cookie. Role
    /// assembly (including the super-admin claim) happens here, once.
    pub async fn establish_session(&self, email: &str) -> Option<String> {
        let account = self.store.find_account_by_email(email)?;
        let roles = admin::assemble_roles(&self.store, account.id, &self.privileged_domain);
        let principal = Principal { account_id: account.id, email: account.email.clone(), roles };
        let sid = gen_session_id();
        self.sessions.write().await.insert(sid.clone(), principal);
        Some(sid)
    }
}

fn gen_session_id() -> String {
    let mut bytes = [0u8; 16];
    let _ = getrandom(&mut bytes);
    let mut sid = String::with_capacity(32);
    use std::fmt::Write as _;
    for b in &bytes { let _ = write!(&mut sid, "{:02x}", b); }
    sid
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name { return Some(v[1..].to_string()); }
        }
    }
    None
}

async fn principal_from_headers(state: &AppState, headers: &HeaderMap) -> Option<Principal> {
    let sid = parse_cookie(headers, SESSION_COOKIE)?;
    let map = state.sessions.read().await;
    map.get(&sid).cloned()
}

/// Error body shape surfaced to callers: `{"error": .., "status": ..}`.
fn err_response(e: &AppError) -> (StatusCode, Json<serde_json::Value>) {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": e.message(), "status": e.http_status()})))
}

/// Run the server with the given configuration.
pub async fn run_with_config(config: AppConfig) -> anyhow::Result<()> {
    let store = SharedStore::new();
    if !config.environment.is_production() {
        ensure_demo_site(&store)?;
    }
    let state = AppState::new(store, config.environment, &config.privileged_domain);

    let app = Router::new()
        .route("/", get(|| async { "portico ok" }))
        .route("/site", get(site))
        .route("/site/sections", get(site_sections))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/password", post(update_password))
        .route("/admin/reset-password", post(admin_reset_password))
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// First-run convenience outside production: a demo account and site so the
/// public read endpoints have something to serve.
fn ensure_demo_site(store: &SharedStore) -> anyhow::Result<()> {
    if store.find_tenant_by_domain("demo.localhost").is_some() {
        return Ok(());
    }
    let hash = security::hash_password("portico-demo")?;
    let acct = store.insert_account("demo@portico.localhost", hash)?;
    store.insert_tenant(
        acct.id,
        "demo.localhost",
        "Demo Portfolio",
        Some("a seeded demo site".to_string()),
        vec!["about".to_string(), "work".to_string(), "contact".to_string()],
    )?;
    info!("seeded demo site at demo.localhost");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DomainQuery {
    domain: Option<String>,
}

/// Extract and normalize the `domain` parameter. Missing or empty is a 400,
/// never "no tenant".
fn canonical_domain(q: &DomainQuery) -> Result<String, AppError> {
    match q.domain.as_deref().map(str::trim) {
        None | Some("") => Err(AppError::user("missing_domain", "domain parameter is required")),
        Some(raw) => {
            let canonical = domain::normalize(raw);
            if canonical.is_empty() {
                return Err(AppError::user("missing_domain", "domain parameter is required"));
            }
            Ok(canonical)
        }
    }
}

/// Singleton tenant read: unknown domain is a distinguishable not-found.
async fn site(State(state): State<AppState>, Query(q): Query<DomainQuery>) -> impl IntoResponse {
    let canonical = match canonical_domain(&q) {
        Ok(c) => c,
        Err(e) => return err_response(&e),
    };
    match domain::resolve(&state.store, &canonical) {
        Some(summary) => (StatusCode::OK, Json(json!({"site": summary}))),
        None => err_response(&AppError::not_found("site_not_found", "site not found")),
    }
}

/// Collection read: unknown domain is an empty collection, not an error.
async fn site_sections(State(state): State<AppState>, Query(q): Query<DomainQuery>) -> impl IntoResponse {
    let canonical = match canonical_domain(&q) {
        Ok(c) => c,
        Err(e) => return err_response(&e),
    };
    let sections = domain::sections_for(&state.store, &canonical);
    (StatusCode::OK, Json(json!({"sections": sections})))
}

#[derive(Debug, Deserialize)]
struct ResetPasswordPayload {
    email: String,
    token: String,
    #[serde(rename = "newPassword")]
    new_password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordPayload>,
) -> impl IntoResponse {
    if payload.email.trim().is_empty() || payload.token.trim().is_empty() {
        return err_response(&AppError::user("missing_field", "email and token are required"));
    }
    match reset::validate_and_consume(&state.store, &payload.token, &payload.email, &payload.new_password) {
        Ok(()) => (StatusCode::OK, Json(json!({"success": true}))),
        Err(e) => err_response(&AppError::from(e)),
    }
}

#[derive(Debug, Deserialize)]
struct UpdatePasswordPayload {
    #[serde(rename = "currentPassword")]
    current_password: Option<String>,
    #[serde(rename = "newPassword")]
    new_password: String,
}

async fn update_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePasswordPayload>,
) -> impl IntoResponse {
    let Some(principal) = principal_from_headers(&state, &headers).await else {
        return err_response(&AppError::auth("unauthenticated", "login required"));
    };
    let Some(account) = state.store.account(principal.account_id) else {
        error!("session principal without account: {}", principal.account_id);
        return err_response(&AppError::internal("internal", "internal error"));
    };
    if let Some(current) = payload.current_password.as_deref() {
        if !security::verify_password(&account.password_hash, current) {
            return err_response(&AppError::user("current_password_incorrect", "current password is incorrect"));
        }
    }
    if security::check_password_policy(&payload.new_password).is_err() {
        return err_response(&AppError::user(
            "password_too_short".to_string(),
            format!("password must be at least {} characters", security::MIN_PASSWORD_LEN),
        ));
    }
    let new_hash = match security::hash_password(&payload.new_password) {
        Ok(h) => h,
        Err(e) => return err_response(&AppError::from(e)),
    };
    if let Err(e) = state.store.set_password_hash(account.id, new_hash) {
        return err_response(&AppError::from(anyhow::Error::from(e)));
    }
    info!(account = %account.id, "password updated");
    (StatusCode::OK, Json(json!({"success": true})))
}

#[derive(Debug, Deserialize)]
struct AdminResetPayload {
    email: String,
}

async fn admin_reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AdminResetPayload>,
) -> impl IntoResponse {
    let Some(principal) = principal_from_headers(&state, &headers).await else {
        return err_response(&AppError::auth("unauthenticated", "login required"));
    };
    if !admin::is_super_admin(&principal) {
        return err_response(&AppError::forbidden("forbidden", "not permitted"));
    }
    if payload.email.trim().is_empty() {
        return err_response(&AppError::user("missing_field", "email is required"));
    }
    match admin::forced_reset(&state.store, &payload.email, state.environment) {
        Ok(outcome) => {
            let mut body = serde_json::Map::new();
            body.insert("success".into(), json!(true));
            body.insert("message".into(), json!(outcome.message));
            // Present only outside production; in production delivery happens
            // over the out-of-band channel and the response omits it entirely.
            if let Some(temp) = outcome.temp_password {
                body.insert("tempPassword".into(), json!(temp));
            }
            (StatusCode::OK, Json(serde_json::Value::Object(body)))
        }
        Err(e) => err_response(&e),
    }
}
