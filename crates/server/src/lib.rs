use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use cultigrid_engine::{
    registry, spawn_session, ActorId, HistoryConfig, SessionError, SessionHandle, SqliteStore,
};
use cultigrid_protocol::{routes, CommandRequest, SessionView, Tag};
use serde::Deserialize;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};


#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub key: String,
    pub actor: Option<ActorId>,
    pub poll_every: Duration,
    pub history: HistoryConfig,
}

type ApiError = (StatusCode, Json<serde_json::Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(routes::HEALTH, get(health))
        .route(routes::TAGS, get(api_tags))
        .route(routes::SESSION, get(api_session))
        .route(routes::SESSION_ACTOR, post(api_session_actor))
        .route(routes::COMMANDS, post(api_commands))
        .route(routes::PUBLISH, post(api_publish))
        .route(routes::RESYNC, post(api_resync))
        .with_state(Arc::new(state))
        // Local security: allow only loopback + Tailscale by default.
        .layer(middleware::from_fn(ip_allowlist))
        // Never `Access-Control-Allow-Origin: *`: any page in the browser could
        // drive the layout.
        .layer(local_only_cors())
}

async fn health() -> &'static str {
    "ok"
}

async fn api_tags() -> Json<Vec<Tag>> {
    Json(registry::list().iter().map(|t| (**t).clone()).collect())
}

async fn api_session(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> ApiResult<SessionView> {
    state.session.view().await.map(Json).map_err(api_error)
}

#[derive(Debug, Deserialize)]
struct ActorInput {
    actor: String,
}

async fn api_session_actor(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    Json(input): Json<ActorInput>,
) -> ApiResult<SessionView> {
    let Some(actor) = ActorId::new(input.actor) else {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "error": "invalid_actor",
                "message": "actor must not be blank"
            })),
        ));
    };
    state.session.set_actor(actor).await.map(Json).map_err(api_error)
}

async fn api_commands(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    Json(command): Json<CommandRequest>,
) -> ApiResult<SessionView> {
    state.session.command(command).await.map(Json).map_err(api_error)
}

async fn api_publish(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> ApiResult<SessionView> {
    state.session.republish().await.map(Json).map_err(api_error)
}

async fn api_resync(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> ApiResult<SessionView> {
    state.session.resync().await.map(Json).map_err(api_error)
}

fn api_error(err: SessionError) -> ApiError {
    let (status, code) = match &err {
        SessionError::NoOp(_) => (StatusCode::CONFLICT, "no_op"),
        SessionError::AuthUnavailable => (StatusCode::UNAUTHORIZED, "auth_unavailable"),
        SessionError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
        SessionError::UnknownTag { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "unknown_tag"),
        SessionError::StoreUnavailable { .. } => (StatusCode::BAD_GATEWAY, "store_unavailable"),
        SessionError::Closed => (StatusCode::INTERNAL_SERVER_ERROR, "closed"),
    };
    (
        status,
        Json(serde_json::json!({ "error": code, "message": err.to_string() })),
    )
}

pub async fn serve(addr: SocketAddr, config: ServerConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(listener, config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    config: ServerConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let store = SqliteStore::new(config.db_path.clone(), config.key.clone());
    // Fail fast if the database cannot be opened.
    store.open()?;
    spawn_store_poller(store.clone(), config.poll_every);
    tracing::info!(
        db = %store.db_path().display(),
        key = store.key(),
        "layout store ready"
    );

    let state = AppState {
        session: spawn_session(store, config.actor.clone(), config.history.clone()),
    };
    let app = build_router(state);
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "serving layout session");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(addr)
}

/// Writes from other processes only reach this one through the database, so
/// poll it.
pub fn spawn_store_poller(store: SqliteStore, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            match store.refresh() {
                Ok(Some(rev)) => tracing::debug!(rev, "picked up external layout write"),
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %format!("{err:#}"), "store poll failed"),
            }
        }
    })
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    tracing::warn!(%ip, "rejected non-local peer");
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(_v6) => false,
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::header;
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}
