//! HTTP entry point: request routing, session creation, and server startup.

use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        body::Body,
        extract::{Request, State},
        response::{IntoResponse, Json, Response},
        routing::{any, get},
    },
    http::{HeaderValue, Method, StatusCode, header, request::Parts},
    tokio::time::MissedTickBehavior,
    tokio_util::sync::CancellationToken,
    tower_http::{
        catch_panic::CatchPanicLayer,
        cors::{Any, CorsLayer},
    },
    tracing::{debug, error, info},
};

use crate::{
    body::read_json_body,
    config::GatewayConfig,
    rpc::{SESSION_ID_HEADER, is_initialize_request},
    shutdown,
    state::GatewayState,
    transport::TransportFactory,
};

// ── Router construction ──────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/mcp", any(mcp_handler))
        .fallback(not_found_handler)
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Start the gateway server and run until a termination signal drains it.
pub async fn start_gateway(
    config: GatewayConfig,
    factory: Arc<dyn TransportFactory>,
) -> anyhow::Result<()> {
    let state = GatewayState::new(config.clone(), factory);
    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    // Startup banner.
    let lines = [
        format!("portico gateway v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on http://{addr}/mcp"),
        format!(
            "body limit {} bytes, session ttl {}s, sweep every {}s",
            config.max_body_bytes,
            config.session_ttl.as_secs(),
            config.sweep_interval.as_secs()
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    let sweeper_token = CancellationToken::new();
    let sweeper = spawn_sweeper(Arc::clone(&state), sweeper_token.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal(Arc::clone(&state), sweeper_token))
        .await?;

    let _ = sweeper.await;
    info!("server stopped");
    Ok(())
}

// ── Expiry sweeper ───────────────────────────────────────────────────────────

/// Spawn the recurring idle-session sweep. The task runs until its token is
/// cancelled by the shutdown coordinator and never keeps the process alive.
pub fn spawn_sweeper(
    state: Arc<GatewayState>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // A tokio interval fires immediately; burn the zeroth tick.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let evicted = state.sweep_expired().await;
                    if evicted > 0 {
                        debug!(evicted, "expiry sweep complete");
                    }
                },
            }
        }
        debug!("expiry sweeper stopped");
    })
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.session_count().await,
    }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn mcp_handler(State(state): State<Arc<GatewayState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    match parts.method.clone() {
        Method::POST => handle_post(state, parts, body).await,
        Method::GET => handle_stream(state, parts).await,
        Method::DELETE => handle_delete(state, parts).await,
        _ => error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
    }
}

/// POST: either an `initialize` that mints a session, or a message routed
/// to an existing one.
async fn handle_post(state: Arc<GatewayState>, parts: Parts, body: Body) -> Response {
    let parsed = match read_json_body(body, declared_length(&parts), state.config.max_body_bytes)
        .await
    {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "rejecting request body");
            let mut resp = error_response(StatusCode::BAD_REQUEST, "Invalid JSON body");
            if e.poisons_connection() {
                resp.headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            return resp;
        },
    };

    if is_initialize_request(&parsed) {
        return initialize_session(state, parts, parsed).await;
    }

    // Body reading suspended above, so session presence is (re)checked here,
    // immediately before delegation, not earlier.
    let Some(session_id) = session_header(&parts) else {
        return missing_session_for_post();
    };
    let Some(transport) = state.touch_and_get(&session_id).await else {
        return missing_session_for_post();
    };
    delegate(&session_id, transport.handle_request(parts, Some(parsed)).await)
}

/// GET: server-initiated / streamed responses for a known session.
async fn handle_stream(state: Arc<GatewayState>, parts: Parts) -> Response {
    let Some(session_id) = session_header(&parts) else {
        return invalid_session();
    };
    let Some(transport) = state.touch_and_get(&session_id).await else {
        return invalid_session();
    };
    delegate(&session_id, transport.handle_request(parts, None).await)
}

/// DELETE: let the transport run its termination handling, then reclaim the
/// slot unconditionally, even if that handling failed.
async fn handle_delete(state: Arc<GatewayState>, parts: Parts) -> Response {
    let Some(session_id) = session_header(&parts) else {
        return invalid_session();
    };
    let Some(transport) = state.transport(&session_id).await else {
        return invalid_session();
    };
    let result = transport.handle_request(parts, None).await;
    if state.remove(&session_id).await.is_some() {
        info!(session = %session_id, "session terminated");
    }
    delegate(&session_id, result)
}

async fn initialize_session(
    state: Arc<GatewayState>,
    parts: Parts,
    body: serde_json::Value,
) -> Response {
    let session_id = uuid::Uuid::new_v4().to_string();
    let transport = match state.factory.create(&session_id).await {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "failed to construct session transport");
            return internal_error();
        },
    };

    // Self-eviction hook, fired when the transport closes on its own. Holds
    // the state weakly so a hook outliving the gateway pins nothing, and a
    // late firing after eviction is a no-op.
    let weak = Arc::downgrade(&state);
    let hook_id = session_id.clone();
    transport.set_close_hook(Box::new(move || {
        tokio::spawn(async move {
            if let Some(state) = weak.upgrade()
                && state.remove(&hook_id).await.is_some()
            {
                info!(session = %hook_id, "session closed by transport");
            }
        });
    }));

    if let Err(e) = state
        .register(session_id.clone(), Arc::clone(&transport))
        .await
    {
        error!(error = %e, "refusing to overwrite a live session");
        return internal_error();
    }
    info!(session = %session_id, "session initialized");
    delegate(&session_id, transport.handle_request(parts, Some(body)).await)
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn session_header(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn declared_length(parts: &Parts) -> Option<u64> {
    parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn delegate(session_id: &str, result: anyhow::Result<Response>) -> Response {
    match result {
        Ok(resp) => resp,
        Err(e) => {
            error!(session = %session_id, error = %e, "transport failed to handle request");
            internal_error()
        },
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn invalid_session() -> Response {
    error_response(StatusCode::BAD_REQUEST, "Invalid or missing session.")
}

fn missing_session_for_post() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "Invalid or missing session. Send an initialize request first.",
    )
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = %detail, "request handler panicked");
    internal_error()
}
