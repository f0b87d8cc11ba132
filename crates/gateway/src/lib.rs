//! HTTP API gateway for hearth.
//!
//! | Route               | Purpose                                      |
//! |---------------------|----------------------------------------------|
//! | `GET /health`       | Liveness, exempt from rate limiting          |
//! | `POST /v1/messages` | Run one message through the orchestrator     |
//! | `GET /v1/agents`    | Registered agents, capabilities, route counts|
//! | `GET /v1/stats`     | Fast-path cache and rate-limiter statistics  |
//!
//! Every other route is limited per `route:identity` with the shared sliding
//! window limiter; a denial is a 429 carrying `Retry-After`.
//!
//! Built on Axum for high performance async HTTP.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use hearth_agent::{AgentSummary, FastPathStats, Orchestrator, RateLimitPolicy, Reply};
use hearth_config::AppConfig;
use hearth_core::channel::{Attachment, DEFAULT_ATTACHMENT_LIMIT_BYTES, InboundMessage};
use hearth_core::error::{ChannelError, Error};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

/// Channel name recorded for messages posted without one.
pub const DEFAULT_CHANNEL: &str = "web";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    /// Per `route:identity` limit
    pub route_limit: RateLimitPolicy,
    pub attachment_limit_bytes: u64,
}

impl GatewayState {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &AppConfig) -> Self {
        Self {
            orchestrator,
            route_limit: config.gateway.rate_limit.into(),
            attachment_limit_bytes: DEFAULT_ATTACHMENT_LIMIT_BYTES,
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers, outermost first: HTTP trace logging, CORS, the 1 MB body limit,
/// then per-route rate limiting.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_static("http://localhost:8080")))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/messages", post(message_handler))
        .route("/v1/agents", get(agents_handler))
        .route("/v1/stats", get(stats_handler))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn serve(config: &AppConfig, orchestrator: Arc<Orchestrator>) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let app = build_router(Arc::new(GatewayState::new(orchestrator, config)));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

// --- Errors ---

/// An error rendered as an HTTP response.
///
/// The body only ever carries the user-facing message; the detail is logged
/// by the orchestrator.
pub struct ApiError(pub Error);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.root() {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Channel(ChannelError::AttachmentTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let retry_after_ms = self.0.retry_after_ms();
        let body = Json(ErrorBody {
            error: self.0.user_message(),
            retry_after_ms,
        });

        let mut response = (status, body).into_response();
        if let Some(ms) = retry_after_ms {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(ms.div_ceil(1000).max(1)));
        }
        response
    }
}

// --- Rate limiting ---

/// Caller identity for rate limiting: `X-User-Id`, else the Authorization
/// header, else "anonymous".
fn client_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .or_else(|| headers.get(header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Sliding-window limit per `route:identity`. The /health endpoint is exempt
/// so monitoring can poll it freely.
async fn rate_limit_middleware(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let identity = client_identity(req.headers());
    let key = format!("{}:{}", req.uri().path(), identity);
    let decision = state.orchestrator.rate_limiter().check(&key, state.route_limit);

    if !decision.allowed {
        warn!(
            route = %req.uri().path(),
            client = %identity.chars().take(20).collect::<String>(),
            reset_ms = decision.reset_ms,
            "Rate limit exceeded"
        );
        return ApiError(Error::RateLimited {
            retry_after_ms: decision.reset_ms.max(1),
        })
        .into_response();
    }

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining as u64));
    response
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Body of `POST /v1/messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub text: String,
    pub sender_id: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub household_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl From<MessageRequest> for InboundMessage {
    fn from(req: MessageRequest) -> Self {
        let mut inbound = InboundMessage::new(
            req.channel.unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            req.sender_id,
            req.text,
        );
        inbound.chat_id = req.chat_id;
        inbound.household_id = req.household_id;
        inbound.message_id = req.message_id;
        inbound.attachments = req.attachments;
        inbound
    }
}

async fn message_handler(
    State(state): State<SharedState>,
    Json(payload): Json<MessageRequest>,
) -> Result<Json<Reply>, ApiError> {
    let inbound = InboundMessage::from(payload);
    hearth_channels::admit(&inbound, state.attachment_limit_bytes).map_err(|e| ApiError(e.into()))?;

    match state.orchestrator.handle(&inbound).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            state.orchestrator.report_failure(&inbound, &e);
            Err(ApiError(e))
        }
    }
}

async fn agents_handler(State(state): State<SharedState>) -> Json<Vec<AgentSummary>> {
    Json(state.orchestrator.agents())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    fast_path: FastPathStats,
    rate_limit_keys: usize,
}

async fn stats_handler(State(state): State<SharedState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        fast_path: state.orchestrator.fast_path_stats(),
        rate_limit_keys: state.orchestrator.rate_limiter().tracked_keys(),
    })
}
