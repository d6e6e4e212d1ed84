// MCP server: one invocation engine shared by every transport

use crate::http::{self, HttpTransport, McpHttpState};
use crate::stdio::StdioAdapter;
use axum::Router;
use std::sync::Arc;
use toolgate_core::{
    CapabilityRegistry, InvocationEngine, ServerInfo, SessionMultiplexer, ToolgateResult,
};

pub struct McpServer {
    engine: Arc<InvocationEngine>,
    sessions: Arc<SessionMultiplexer<HttpTransport>>,
    server_info: ServerInfo,
}

impl McpServer {
    pub fn new(registry: CapabilityRegistry, server_info: ServerInfo) -> Self {
        Self {
            engine: Arc::new(InvocationEngine::new(Arc::new(registry))),
            sessions: Arc::new(SessionMultiplexer::new()),
            server_info,
        }
    }

    pub fn engine(&self) -> &Arc<InvocationEngine> {
        &self.engine
    }

    pub fn sessions(&self) -> &Arc<SessionMultiplexer<HttpTransport>> {
        &self.sessions
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Router serving the streamable HTTP transport on `/mcp`
    pub fn router(&self) -> Router {
        http::router(McpHttpState::new(
            self.engine.clone(),
            self.sessions.clone(),
            self.server_info.clone(),
        ))
    }

    /// Serve the line protocol on stdin/stdout until stdin closes
    pub async fn serve_stdio(&self) -> ToolgateResult<()> {
        tracing::info!("MCP server started on stdio ({} tools)", self.engine.registry().len());
        StdioAdapter::new(self.engine.clone(), self.server_info.clone())
            .serve_stdio()
            .await
    }

    /// Cancel in-flight calls and close every session
    pub async fn shutdown(&self) {
        self.engine.shutdown();
        let closed = self.sessions.close_all().await;
        tracing::info!("MCP server stopped, closed {} sessions", closed);
    }
}
