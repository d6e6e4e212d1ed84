// Line-oriented adapter: one JSON message per input line, one JSON event per output line

use crate::protocol::{InitializeResult, ListToolsResult};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead, FramedWrite, LinesCodec};
use toolgate_core::{
    InvocationEngine, ServerInfo, SessionId, SessionMultiplexer, SessionTransport, ToolEvent,
    ToolgateError, ToolgateResult,
};

/// Messages accepted on the line channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LineMessage {
    Initialize,
    ListTools,
    CallTool {
        tool: String,
        #[serde(default = "empty_arguments")]
        arguments: serde_json::Value,
    },
}

fn empty_arguments() -> serde_json::Value {
    serde_json::json!({})
}

/// The process's standard streams, held by the implicit stdio session
pub struct StdioTransport;

impl SessionTransport for StdioTransport {
    fn close(&self) {
        tracing::debug!("stdio transport released");
    }
}

/// Serves the line protocol for the single implicit stdio session
pub struct StdioAdapter {
    engine: Arc<InvocationEngine>,
    sessions: SessionMultiplexer<StdioTransport>,
    server_info: ServerInfo,
}

impl StdioAdapter {
    pub fn new(engine: Arc<InvocationEngine>, server_info: ServerInfo) -> Self {
        Self {
            engine,
            sessions: SessionMultiplexer::new(),
            server_info,
        }
    }

    pub fn sessions(&self) -> &SessionMultiplexer<StdioTransport> {
        &self.sessions
    }

    /// Serve the process's stdin/stdout until stdin closes
    pub async fn serve_stdio(&self) -> ToolgateResult<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve messages from `reader`, writing events to `writer`
    ///
    /// Messages are handled one at a time, so events of one call are never
    /// interleaved with another's. The session lives until input ends or
    /// output fails.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> ToolgateResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let session = self
            .sessions
            .initialize(|| async { Ok((SessionId::new(), StdioTransport)) })
            .await?;

        let result = self.run(reader, writer).await;
        self.sessions.transport_closed(&session.id()).await;
        result
    }

    async fn run<R, W>(&self, reader: R, writer: W) -> ToolgateResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        // Raw frames so that invalid UTF-8 is reported per line instead of ending the stream
        let mut input = FramedRead::new(reader, AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec()));
        let mut output = FramedWrite::new(writer, LinesCodec::new());
        let mut initialized = false;

        tracing::info!("Serving line protocol");

        while let Some(frame) = input.next().await {
            let frame = frame
                .map_err(|e| ToolgateError::Internal(format!("Failed to read input: {}", e)))?;

            let line = match std::str::from_utf8(&frame) {
                Ok(line) => line.trim(),
                Err(e) => {
                    emit(&mut output, &malformed(e.to_string())).await?;
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let message = match serde_json::from_str::<LineMessage>(line) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Rejected malformed line: {}", e);
                    emit(&mut output, &malformed(e.to_string())).await?;
                    continue;
                }
            };

            match message {
                LineMessage::Initialize => {
                    if initialized {
                        tracing::debug!("Repeated initialize on stdio session");
                    }
                    initialized = true;
                    let result = serde_json::to_value(InitializeResult::new(self.server_info.clone()))?;
                    emit(&mut output, &ToolEvent::success(result)).await?;
                }
                LineMessage::ListTools => {
                    let result = serde_json::to_value(ListToolsResult {
                        tools: self.engine.list_tools(),
                    })?;
                    emit(&mut output, &ToolEvent::success(result)).await?;
                }
                LineMessage::CallTool { tool, arguments } => {
                    if !initialized {
                        tracing::debug!(tool = %tool, "callTool before initialize");
                    }
                    // A write failure returns early and drops `events`, which tears the call down
                    let mut events = self.engine.invoke(&tool, arguments);
                    while let Some(event) = events.next().await {
                        emit(&mut output, &event).await?;
                    }
                }
            }
        }

        tracing::info!("Input closed, stopping line protocol");
        Ok(())
    }
}

fn malformed(detail: String) -> ToolEvent {
    ToolEvent::error(ToolgateError::MalformedMessage(detail).to_string())
}

async fn emit<W>(output: &mut FramedWrite<W, LinesCodec>, event: &ToolEvent) -> ToolgateResult<()>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_string(event)
        .map_err(|e| ToolgateError::Internal(format!("Failed to encode event: {}", e)))?;
    output
        .send(line)
        .await
        .map_err(|e| ToolgateError::Internal(format!("Failed to write event: {}", e)))
}
