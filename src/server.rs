//!
//! versegate HTTP server
//! ---------------------
//! This module defines the Axum-based HTTP API of the gateway.
//!
//! Responsibilities:
//! - Bearer-token gate in front of the per-user poem routes, with the
//!   allowlist cache consulted on every protected request.
//! - The dual-auth capture route (token or allowlisted identifier param).
//! - Windowed navigation and paged listing over a user's poems.
//! - The open display route for unattended screens, including pinned-poem
//!   resolution.
//! - Startup wiring: allowlist subscription tasks, verifier and composer
//!   selection, listener bind.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::allowlist::{self, AllowlistCache, EmptyPolicy};
use crate::compose::{ComposeError, ComposeRequest, PoemComposer, TemplateComposer};
use crate::error::AppError;
use crate::guard;
use crate::identity::{Authenticator, AuthContext, HttpVerifier, IdentityVerifier, StaticVerifier};
use crate::navigator::{self, IndexedPoem, NeighborView};
use crate::store::{MemoryStore, OrderMode, Poem, PoemStore, StoreError};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PoemStore>,
    pub composer: Arc<dyn PoemComposer>,
    pub allowlist: AllowlistCache,
    pub auth: Authenticator,
}

/// Startup settings, read from the environment versegate-style.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    /// What an empty allowlist cache means: `open` (no restriction, the
    /// default) or `closed` (deny until the first snapshot lands).
    pub empty_policy: EmptyPolicy,
    /// JSON file polled as the local allowlist subscription. Without it the
    /// cache stays empty and the empty policy governs everything.
    pub allowlist_file: Option<PathBuf>,
    pub allowlist_poll: Duration,
    /// Identity-provider token introspection endpoint. Without it every
    /// bearer token is rejected, which only makes sense for display-only
    /// deployments.
    pub tokeninfo_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            http_port: 7878,
            empty_policy: EmptyPolicy::Open,
            allowlist_file: None,
            allowlist_poll: Duration::from_secs(5),
            tokeninfo_url: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = ServerConfig::default();
        let http_port = std::env::var("VERSEGATE_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.http_port);
        let empty_policy = std::env::var("VERSEGATE_ALLOWLIST_POLICY")
            .ok()
            .and_then(|s| EmptyPolicy::parse(&s))
            .unwrap_or(defaults.empty_policy);
        let allowlist_file = std::env::var("VERSEGATE_ALLOWLIST_FILE").ok().map(PathBuf::from);
        let allowlist_poll = std::env::var("VERSEGATE_ALLOWLIST_POLL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.allowlist_poll);
        let tokeninfo_url = std::env::var("VERSEGATE_TOKENINFO_URL").ok();
        ServerConfig { http_port, empty_policy, allowlist_file, allowlist_poll, tokeninfo_url }
    }
}

/// Start the gateway: wire the allowlist subscription, pick the verifier and
/// composer, mount all routes and serve.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    Lazy::force(&STARTED_AT);
    let allowlist = AllowlistCache::new(config.empty_policy);
    let (tx, rx) = allowlist::update_channel();
    allowlist::spawn_refresh(allowlist.clone(), rx);
    match &config.allowlist_file {
        Some(path) => {
            info!("allowlist feed: {} every {:?}", path.display(), config.allowlist_poll);
            allowlist::spawn_file_feed(path.clone(), config.allowlist_poll, tx);
        }
        None => {
            warn!("no allowlist feed configured; cache stays empty and the {:?} policy applies", config.empty_policy);
            drop(tx);
        }
    }

    let verifier: Arc<dyn IdentityVerifier> = match &config.tokeninfo_url {
        Some(url) => Arc::new(HttpVerifier::new(url.clone())?),
        None => {
            warn!("VERSEGATE_TOKENINFO_URL unset; every bearer token will be rejected");
            Arc::new(StaticVerifier::new())
        }
    };

    let state = AppState {
        store: Arc::new(MemoryStore::new()),
        composer: Arc::new(TemplateComposer),
        allowlist: allowlist.clone(),
        auth: Authenticator::new(verifier, allowlist),
    };

    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Mount all routes.
///
/// The poem routes sit behind the bearer gate, which attaches the resolved
/// `AuthContext` before any handler runs. Root, health and the display route
/// are public; the capture route authenticates inside its handler because of
/// its parameter fallback.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/poems", get(list_poems))
        .route("/poems/neighbors", get(poem_neighbors))
        .route("/poems/{id}/favorite", post(favorite_poem))
        .route("/poems/{id}", delete(delete_poem))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/", get(|| async { "versegate ok" }))
        .route("/healthz", get(healthz))
        .route("/display/{subjectId}", get(display_neighbors))
        .route("/capture", post(capture))
        .merge(protected)
        .with_state(state)
}

async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match state.auth.require_token(req.headers()).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok", "uptimeSecs": STARTED_AT.elapsed().as_secs()}))
}

fn datastore_failed(err: StoreError) -> AppError {
    AppError::upstream("datastore", err.to_string().as_str())
}

// Query parameters arrive as strings from embedded display clients with
// patchy input handling, so parsing is lenient: anything unusable falls back
// to the default rather than rejecting the request.

fn parse_index(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|i| *i >= 0)
        .unwrap_or(0) as usize
}

fn parse_page(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1) as usize
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("true") | Some("1"))
}

fn order_mode(sort_by_date: Option<&str>) -> OrderMode {
    if parse_flag(sort_by_date) {
        OrderMode::DateOnly
    } else {
        OrderMode::FavoriteFirst
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavQuery {
    index: Option<String>,
    favorites_only: Option<String>,
    sort_by_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<String>,
    sort_by_date: Option<String>,
}

async fn list_poems(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Poem>>, AppError> {
    let poems = navigator::page(
        state.store.as_ref(),
        ctx.subject_id(),
        parse_page(q.page.as_deref()),
        order_mode(q.sort_by_date.as_deref()),
    )
    .await
    .map_err(datastore_failed)?;
    Ok(Json(poems))
}

async fn poem_neighbors(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(q): Query<NavQuery>,
) -> Result<Json<NeighborView>, AppError> {
    let view = navigator::neighbors(
        state.store.as_ref(),
        ctx.subject_id(),
        parse_index(q.index.as_deref()),
        order_mode(q.sort_by_date.as_deref()),
        parse_flag(q.favorites_only.as_deref()),
    )
    .await
    .map_err(datastore_failed)?;
    Ok(Json(view))
}

/// Open navigation for unattended displays: the subject is caller-supplied
/// and never verified. Without an explicit index the owner's pinned poem
/// wins; a dangling or foreign-owned pin falls back to index navigation.
async fn display_neighbors(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Query(q): Query<NavQuery>,
) -> Result<Json<NeighborView>, AppError> {
    let subject_id = subject_id.trim().to_string();
    if subject_id.is_empty() {
        return Err(AppError::invalid("missing_subject", "subject identifier is required"));
    }
    if q.index.is_none() {
        if let Some(pin) = state.allowlist.entry(&subject_id).and_then(|e| e.display_poem_ref) {
            match state.store.get(&pin).await.map_err(datastore_failed)? {
                Some(poem) if poem.owner_id == subject_id => {
                    return Ok(Json(NeighborView {
                        current_poem: Some(IndexedPoem { poem, index: 0 }),
                        ..Default::default()
                    }));
                }
                _ => debug!("pinned poem {} unavailable for {}, using index navigation", pin, subject_id),
            }
        }
    }
    let view = navigator::neighbors(
        state.store.as_ref(),
        &subject_id,
        parse_index(q.index.as_deref()),
        order_mode(q.sort_by_date.as_deref()),
        parse_flag(q.favorites_only.as_deref()),
    )
    .await
    .map_err(datastore_failed)?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FavoriteBody {
    favorite: Option<bool>,
}

async fn favorite_poem(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    body: Option<Json<FavoriteBody>>,
) -> Result<Json<Poem>, AppError> {
    let explicit = body.and_then(|Json(b)| b.favorite);
    let updated = guard::set_or_toggle_favorite(state.store.as_ref(), ctx.subject_id(), &id, explicit).await?;
    Ok(Json(updated))
}

async fn delete_poem(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    guard::delete_owned(state.store.as_ref(), ctx.subject_id(), &id).await?;
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureBody {
    image_data: Option<String>,
    author_alias: Option<String>,
}

/// The dual-auth write route: a captured image comes in, a composed poem
/// goes out. The response is sent as soon as composition finishes; the save
/// is best-effort in the background and a failure there only reaches the
/// log, never the caller.
async fn capture(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<CaptureQuery>,
    Json(body): Json<CaptureBody>,
) -> Result<Json<Poem>, AppError> {
    let ctx = state.auth.token_or_param(&headers, q.user_id.as_deref()).await?;

    let image_data = body
        .image_data
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::invalid("missing_image", "imageData is required"))?;

    let request = ComposeRequest {
        image_data: image_data.to_string(),
        author_alias: body.author_alias.clone(),
    };
    let composed = state.composer.compose(&request).await.map_err(|e| match e {
        ComposeError::Rejected(reason) => AppError::invalid("capture_rejected", reason.as_str()),
        ComposeError::Unavailable(detail) => AppError::upstream("composer", detail.as_str()),
    })?;

    let mut poem = Poem::new(
        ctx.subject_id().to_string(),
        composed.title,
        composed.text,
        composed.palette,
    );
    poem.derived_asset_url = composed.derived_asset_url;
    poem.author_alias = body
        .author_alias
        .or_else(|| state.allowlist.entry(ctx.subject_id()).and_then(|e| e.pen_name));

    let store = state.store.clone();
    let saved = poem.clone();
    tokio::spawn(async move {
        if let Err(err) = store.create(saved).await {
            error!("background poem save failed: {}", err);
        }
    });

    Ok(Json(poem))
}
