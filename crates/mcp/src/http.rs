// Streamable HTTP adapter: JSON-RPC over POST, server events over SSE, sessions by header

use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use toolgate_core::{
    InvocationEngine, ServerInfo, Session, SessionId, SessionMultiplexer, SessionTransport,
};

/// Request/response header carrying the session id
pub const SESSION_HEADER: &str = "mcp-session-id";

// Notifications buffered per session for slow event-stream readers
const NOTIFICATION_CAPACITY: usize = 256;

/// Per-session transport state for the HTTP adapter
pub struct HttpTransport {
    notifications: broadcast::Sender<JsonRpcNotification>,
    closed: CancellationToken,
}

impl HttpTransport {
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            notifications,
            closed: CancellationToken::new(),
        }
    }

    /// Push a notification to every open event stream of this session.
    /// Returns how many streams received it.
    pub fn notify(&self, notification: JsonRpcNotification) -> usize {
        self.notifications.send(notification).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.notifications.subscribe()
    }

    /// Fires when the session is closed
    pub fn closed(&self) -> &CancellationToken {
        &self.closed
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTransport for HttpTransport {
    fn close(&self) {
        self.closed.cancel();
    }
}

/// State shared by the `/mcp` handlers
#[derive(Clone)]
pub struct McpHttpState {
    engine: Arc<InvocationEngine>,
    sessions: Arc<SessionMultiplexer<HttpTransport>>,
    server_info: ServerInfo,
}

impl McpHttpState {
    pub fn new(
        engine: Arc<InvocationEngine>,
        sessions: Arc<SessionMultiplexer<HttpTransport>>,
        server_info: ServerInfo,
    ) -> Self {
        Self {
            engine,
            sessions,
            server_info,
        }
    }

    async fn initialize(&self, request: JsonRpcRequest) -> Response {
        let id = request.id.unwrap_or(serde_json::Value::Null);

        if let Some(params) = request.params {
            match serde_json::from_value::<InitializeParams>(params) {
                Ok(params) => tracing::debug!(
                    client = ?params.client_info.map(|c| c.name),
                    protocol_version = ?params.protocol_version,
                    "Initialize requested"
                ),
                Err(e) => {
                    return rpc_error(StatusCode::BAD_REQUEST, id, JsonRpcError::invalid_params(e.to_string()));
                }
            }
        }

        // The transport is only registered once it exists with its id
        let handshake = || async { Ok((SessionId::new(), HttpTransport::new())) };
        match self.sessions.initialize(handshake).await {
            Ok(session) => {
                let body = JsonRpcResponse::success(id, InitializeResult::new(self.server_info.clone()));
                (
                    [(SESSION_HEADER, session.id().to_string())],
                    Json(body),
                )
                    .into_response()
            }
            Err(err) => rpc_error(StatusCode::INTERNAL_SERVER_ERROR, id, (&err).into()),
        }
    }

    async fn dispatch(&self, session: Arc<Session<HttpTransport>>, request: JsonRpcRequest) -> Response {
        if request.is_notification() {
            tracing::debug!(session_id = %session.id(), method = %request.method, "Notification received");
            return StatusCode::ACCEPTED.into_response();
        }
        let id = request.id.unwrap_or_default();

        let (status, response) = match request.method.as_str() {
            "initialize" => (
                StatusCode::BAD_REQUEST,
                JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request("Invalid Request: Server already initialized"),
                ),
            ),
            "ping" => (StatusCode::OK, JsonRpcResponse::success(id, serde_json::json!({}))),
            "tools/list" => (
                StatusCode::OK,
                JsonRpcResponse::success(
                    id,
                    ListToolsResult {
                        tools: self.engine.list_tools(),
                    },
                ),
            ),
            "tools/call" => (
                StatusCode::OK,
                self.call_tool(&session, id, request.params).await,
            ),
            other => (
                StatusCode::OK,
                JsonRpcResponse::error(id, JsonRpcError::method_not_found(other)),
            ),
        };

        (status, Json(response)).into_response()
    }

    /// Resolves on the first terminal event; earlier events go out as notifications
    async fn call_tool(
        &self,
        session: &Session<HttpTransport>,
        id: serde_json::Value,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(params)) => params,
            Ok(None) => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing params"))
            }
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::invalid_params(e.to_string())),
        };

        let transport = session.transport();
        let call = self
            .engine
            .call_tool(&params.name, params.arguments, |event| {
                if transport.notify(JsonRpcNotification::tool_event(&event)) == 0 {
                    tracing::trace!(session_id = %session.id(), "No event stream open for notification");
                }
            });

        tokio::select! {
            outcome = call => match outcome {
                Ok(result) => JsonRpcResponse::success(id, CallToolResult::from_value(&result)),
                Err(err) if err.is_tool_level() => {
                    JsonRpcResponse::success(id, CallToolResult::error(err.to_string()))
                }
                Err(err) => JsonRpcResponse::error(id, (&err).into()),
            },
            _ = transport.closed().cancelled() => {
                tracing::info!(session_id = %session.id(), tool = %params.name, "Session closed during tool call");
                JsonRpcResponse::error(id, JsonRpcError::invalid_session())
            }
        }
    }
}

/// Routes for the `/mcp` resource
pub fn router(state: McpHttpState) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .with_state(state)
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|value| value.to_str().ok())
}

fn rpc_error(status: StatusCode, id: serde_json::Value, error: JsonRpcError) -> Response {
    (status, Json(JsonRpcResponse::error(id, error))).into_response()
}

/// Initialize a session or handle a follow-up request
async fn handle_post(State(state): State<McpHttpState>, headers: HeaderMap, body: Bytes) -> Response {
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Rejected unparseable request body: {}", e);
            return rpc_error(StatusCode::BAD_REQUEST, serde_json::Value::Null, JsonRpcError::parse_error());
        }
    };

    if value.is_array() {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            serde_json::Value::Null,
            JsonRpcError::invalid_request("Batch requests are not supported"),
        );
    }

    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                serde_json::Value::Null,
                JsonRpcError::invalid_request(format!("Invalid Request: {}", e)),
            );
        }
    };

    match session_header(&headers) {
        None if request.method == "initialize" => state.initialize(request).await,
        None => {
            tracing::warn!(method = %request.method, "Request without session id");
            rpc_error(StatusCode::BAD_REQUEST, serde_json::Value::Null, JsonRpcError::invalid_session())
        }
        Some(raw_id) => match state.sessions.resolve(Some(raw_id)).await {
            Ok(session) => state.dispatch(session, request).await,
            Err(err) => rpc_error(StatusCode::BAD_REQUEST, serde_json::Value::Null, (&err).into()),
        },
    }
}

/// Open the server-to-client event stream of a session
async fn handle_get(State(state): State<McpHttpState>, headers: HeaderMap) -> Response {
    let session = match state.sessions.resolve(session_header(&headers)).await {
        Ok(session) => session,
        Err(err) => return rpc_error(StatusCode::BAD_REQUEST, serde_json::Value::Null, (&err).into()),
    };

    let session_id = session.id();
    let transport = session.transport();
    tracing::info!(session_id = %session_id, "Event stream opened");

    let stream = BroadcastStream::new(transport.subscribe())
        .filter_map(move |item| {
            let frame = match item {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(json) => Some(Ok::<_, Infallible>(Event::default().event("message").data(json))),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to serialize notification");
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Event stream lagged");
                    None
                }
            };
            futures::future::ready(frame)
        })
        .take_until(transport.closed().clone().cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// Terminate a session
async fn handle_delete(State(state): State<McpHttpState>, headers: HeaderMap) -> Response {
    match state.sessions.close(session_header(&headers)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => rpc_error(StatusCode::BAD_REQUEST, serde_json::Value::Null, (&err).into()),
    }
}
