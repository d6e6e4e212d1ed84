use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use toolgate_core::{EventStream, ToolDescriptor, ToolEvent};
use toolgate_mcp::protocol::PROTOCOL_VERSION;

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfoResponse {
    pub version: String,
    pub server: String,
    #[serde(rename = "serverVersion")]
    pub server_version: String,
    pub capabilities: serde_json::Value,
}

/// Describe this server
pub async fn server_info(State(state): State<Arc<AppState>>) -> Json<ServerInfoResponse> {
    let info = state.mcp.server_info();
    Json(ServerInfoResponse {
        version: PROTOCOL_VERSION.to_string(),
        server: info.name.clone(),
        server_version: info.version.clone(),
        capabilities: serde_json::json!({
            "tools": true,
            "resources-read": false,
        }),
    })
}

/// List registered tool descriptors
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Vec<ToolDescriptor>> {
    Json(state.mcp.engine().list_tools())
}

/// Invoke a tool and stream its raw events as SSE frames
///
/// Body: `{"tool": "...", "arguments": {...}}`. The invocation is dropped
/// along with the response when the client disconnects.
pub async fn tool_call(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events: EventStream = match serde_json::from_slice::<serde_json::Value>(&body) {
        Err(e) => {
            tracing::warn!("Rejected tool call body: {}", e);
            single(ToolEvent::error("Invalid JSON"))
        }
        Ok(body) => match body.get("tool").and_then(|tool| tool.as_str()) {
            Some(tool) if !tool.is_empty() => {
                let arguments = body
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));
                tracing::info!(tool = %tool, "Streaming tool call");
                state.mcp.engine().invoke(tool, arguments)
            }
            _ => single(ToolEvent::error("Missing \"tool\"")),
        },
    };

    let stream = async_stream::stream! {
        let mut events = events;
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(data) => yield Ok(Event::default().data(data)),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize tool event"),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn single(event: ToolEvent) -> EventStream {
    futures::stream::once(futures::future::ready(event)).boxed()
}
