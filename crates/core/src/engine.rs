use crate::error::{ToolgateError, ToolgateResult};
use crate::events::{EventStream, ToolEvent};
use crate::registry::{Capability, CapabilityRegistry};
use crate::types::ToolDescriptor;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Invocation engine that turns unary and streaming tools into one event protocol
pub struct InvocationEngine {
    registry: Arc<CapabilityRegistry>,
    // Parent of every invocation token
    shutdown: CancellationToken,
}

impl InvocationEngine {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list()
    }

    /// Invoke a tool and return its event stream
    ///
    /// The stream always ends with exactly one `Success` or `Error` event.
    /// Dropping it early cancels the invocation token handed to the provider
    /// and drops the provider's own stream.
    pub fn invoke(&self, name: &str, arguments: serde_json::Value) -> EventStream {
        // A null payload means no arguments
        let arguments = match arguments {
            serde_json::Value::Null => serde_json::json!({}),
            arguments => arguments,
        };

        let capability = match self.registry.resolve(name) {
            Ok(capability) => capability,
            Err(err) => {
                tracing::warn!(tool = %name, "Invocation of unknown tool");
                return futures::stream::once(futures::future::ready(ToolEvent::error(
                    err.to_string(),
                )))
                .boxed();
            }
        };

        tracing::debug!(tool = %name, streaming = capability.is_streaming(), "Invocation started");

        let cancel = self.shutdown.child_token();
        let source = match capability {
            Capability::Unary(tool) => futures::stream::once(async move {
                match tool.call(arguments).await {
                    Ok(result) => ToolEvent::success(result),
                    Err(err) => ToolEvent::error(err.to_string()),
                }
            })
            .boxed(),
            Capability::Streaming(tool) => tool.call_stream(arguments, cancel.clone()),
        };

        supervise(name.to_string(), source, cancel)
    }

    /// Invoke a tool and wait for its outcome
    ///
    /// Progress and log events are handed to `on_event` as they arrive.
    pub async fn call_tool<F>(
        &self,
        name: &str,
        arguments: serde_json::Value,
        mut on_event: F,
    ) -> ToolgateResult<serde_json::Value>
    where
        F: FnMut(ToolEvent),
    {
        let mut events = self.invoke(name, arguments);
        while let Some(event) = events.next().await {
            match event {
                ToolEvent::Success { result } => return Ok(result),
                ToolEvent::Error { message } => return Err(ToolgateError::ToolFailed(message)),
                other => on_event(other),
            }
        }

        Err(ToolgateError::Internal(format!(
            "Tool '{}' produced no terminal event",
            name
        )))
    }

    /// Cancel every in-flight invocation
    pub fn shutdown(&self) {
        tracing::info!("Cancelling in-flight invocations");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Fires the invocation token exactly once, however the stream ends
struct InvocationGuard {
    tool: String,
    cancel: CancellationToken,
    finished: bool,
}

impl InvocationGuard {
    fn finish(&mut self, event: &ToolEvent) {
        self.finished = true;
        tracing::debug!(tool = %self.tool, outcome = event.kind(), "Invocation finished");
    }
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(tool = %self.tool, "Invocation dropped before completion");
        }
        self.cancel.cancel();
    }
}

fn supervise(tool: String, mut source: EventStream, cancel: CancellationToken) -> EventStream {
    let mut guard = InvocationGuard {
        tool,
        cancel: cancel.clone(),
        finished: false,
    };

    Box::pin(async_stream::stream! {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = AssertUnwindSafe(source.next()).catch_unwind() => Some(next),
            };

            let event = match next {
                Some(Ok(Some(event))) => event,
                Some(Ok(None)) => {
                    let event = ToolEvent::error(format!("Tool '{}' ended without a result", guard.tool));
                    tracing::warn!(tool = %guard.tool, "Stream ended without a terminal event");
                    guard.finish(&event);
                    yield event;
                    break;
                }
                Some(Err(panic)) => {
                    let event = ToolEvent::error(format!("Unexpected error: {}", panic_message(panic)));
                    tracing::error!(tool = %guard.tool, "Tool panicked");
                    guard.finish(&event);
                    yield event;
                    break;
                }
                None => {
                    let event = ToolEvent::error(format!("Tool '{}' was cancelled", guard.tool));
                    guard.finish(&event);
                    yield event;
                    break;
                }
            };

            if event.is_terminal() {
                guard.finish(&event);
                yield event;
                break;
            }
            yield event;
        }
    })
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogLevel;
    use crate::registry::{StreamingTool, UnaryTool};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct Ping;

    #[async_trait::async_trait]
    impl UnaryTool for Ping {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new("ping", "Responds with pong", serde_json::json!({}))
        }

        async fn call(&self, _arguments: serde_json::Value) -> ToolgateResult<serde_json::Value> {
            Ok(serde_json::json!("pong"))
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl UnaryTool for Failing {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new("failing", "Always fails", serde_json::json!({}))
        }

        async fn call(&self, arguments: serde_json::Value) -> ToolgateResult<serde_json::Value> {
            if arguments.get("panic").is_some() {
                panic!("provider exploded");
            }
            Err(ToolgateError::InvalidInput("path is required".to_string()))
        }
    }

    /// Streaming tool whose behaviour is picked per test
    struct Scripted {
        name: &'static str,
        events: Vec<ToolEvent>,
        hang: bool,
        seen_token: Arc<Mutex<Option<CancellationToken>>>,
        released: Arc<AtomicBool>,
    }

    impl Scripted {
        fn new(name: &'static str, events: Vec<ToolEvent>) -> Self {
            Self {
                name,
                events,
                hang: false,
                seen_token: Arc::new(Mutex::new(None)),
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    struct Resource(Arc<AtomicBool>);

    impl Drop for Resource {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl StreamingTool for Scripted {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new(self.name, "Scripted stream", serde_json::json!({}))
        }

        fn call_stream(&self, _arguments: serde_json::Value, cancel: CancellationToken) -> EventStream {
            *self.seen_token.lock().unwrap() = Some(cancel);
            let events = self.events.clone();
            let hang = self.hang;
            let resource = Resource(self.released.clone());
            Box::pin(async_stream::stream! {
                let _resource = resource;
                for event in events {
                    if matches!(&event, ToolEvent::Log { message, .. } if message == "explode") {
                        panic!("walker exploded");
                    }
                    yield event;
                }
                if hang {
                    futures::future::pending::<()>().await;
                }
            })
        }
    }

    fn engine_with(capabilities: Vec<Capability>) -> InvocationEngine {
        let mut registry = CapabilityRegistry::new();
        for capability in capabilities {
            registry.register(capability).unwrap();
        }
        InvocationEngine::new(Arc::new(registry))
    }

    async fn collect(engine: &InvocationEngine, name: &str) -> Vec<ToolEvent> {
        engine.invoke(name, serde_json::json!({})).collect().await
    }

    #[tokio::test]
    async fn test_ping_yields_single_success() {
        let engine = engine_with(vec![Capability::unary(Ping)]);
        let events = collect(&engine, "ping").await;
        assert_eq!(events, vec![ToolEvent::success("pong")]);
    }

    struct EchoArguments;

    #[async_trait::async_trait]
    impl UnaryTool for EchoArguments {
        fn describe(&self) -> ToolDescriptor {
            ToolDescriptor::new("echo_arguments", "Returns its arguments", serde_json::json!({}))
        }

        async fn call(&self, arguments: serde_json::Value) -> ToolgateResult<serde_json::Value> {
            Ok(arguments)
        }
    }

    #[tokio::test]
    async fn test_null_arguments_become_empty_object() {
        let engine = engine_with(vec![Capability::unary(EchoArguments)]);

        let events: Vec<_> = engine
            .invoke("echo_arguments", serde_json::Value::Null)
            .collect()
            .await;
        assert_eq!(events, vec![ToolEvent::success(serde_json::json!({}))]);

        let events: Vec<_> = engine
            .invoke("echo_arguments", serde_json::json!({"a": 1}))
            .collect()
            .await;
        assert_eq!(events, vec![ToolEvent::success(serde_json::json!({"a": 1}))]);
    }

    #[tokio::test]
    async fn test_unknown_tool_yields_single_error() {
        let engine = engine_with(vec![]);
        let events = collect(&engine, "does_not_exist").await;
        assert_eq!(
            events,
            vec![ToolEvent::error("Tool 'does_not_exist' not found")]
        );
    }

    #[tokio::test]
    async fn test_unary_error_outcome() {
        let engine = engine_with(vec![Capability::unary(Failing)]);
        let events = collect(&engine, "failing").await;
        assert_eq!(
            events,
            vec![ToolEvent::error("Invalid input: path is required")]
        );
    }

    #[tokio::test]
    async fn test_unary_panic_becomes_error_event() {
        let engine = engine_with(vec![Capability::unary(Failing)]);
        let events: Vec<_> = engine
            .invoke("failing", serde_json::json!({"panic": true}))
            .collect()
            .await;
        assert_eq!(
            events,
            vec![ToolEvent::error("Unexpected error: provider exploded")]
        );
    }

    #[tokio::test]
    async fn test_streaming_zero_matches() {
        let tool = Scripted::new(
            "search",
            vec![
                ToolEvent::progress("Searching", None),
                ToolEvent::success(serde_json::json!({"totalResults": 0})),
            ],
        );
        let engine = engine_with(vec![Capability::streaming(tool)]);
        let events = collect(&engine, "search").await;

        let logs = events
            .iter()
            .filter(|e| matches!(e, ToolEvent::Log { .. }))
            .count();
        assert_eq!(logs, 0);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(
            events.last(),
            Some(&ToolEvent::success(serde_json::json!({"totalResults": 0})))
        );
    }

    #[tokio::test]
    async fn test_events_after_terminal_are_discarded() {
        let tool = Scripted::new(
            "chatty",
            vec![
                ToolEvent::log(LogLevel::Info, "a"),
                ToolEvent::success(1),
                ToolEvent::log(LogLevel::Info, "late"),
                ToolEvent::error("late"),
            ],
        );
        let engine = engine_with(vec![Capability::streaming(tool)]);
        let events = collect(&engine, "chatty").await;
        assert_eq!(
            events,
            vec![ToolEvent::log(LogLevel::Info, "a"), ToolEvent::success(1)]
        );
    }

    #[tokio::test]
    async fn test_missing_terminal_is_synthesized_as_error() {
        let tool = Scripted::new("quiet", vec![ToolEvent::log(LogLevel::Warn, "stopping")]);
        let engine = engine_with(vec![Capability::streaming(tool)]);
        let events = collect(&engine, "quiet").await;
        assert_eq!(
            events,
            vec![
                ToolEvent::log(LogLevel::Warn, "stopping"),
                ToolEvent::error("Tool 'quiet' ended without a result"),
            ]
        );
    }

    #[tokio::test]
    async fn test_streaming_panic_becomes_trailing_error() {
        let tool = Scripted::new(
            "fragile",
            vec![
                ToolEvent::log(LogLevel::Info, "first"),
                ToolEvent::log(LogLevel::Info, "explode"),
            ],
        );
        let released = tool.released.clone();
        let engine = engine_with(vec![Capability::streaming(tool)]);
        let events = collect(&engine, "fragile").await;
        assert_eq!(
            events,
            vec![
                ToolEvent::log(LogLevel::Info, "first"),
                ToolEvent::error("Unexpected error: walker exploded"),
            ]
        );
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drop_releases_resources_and_cancels() {
        let mut tool = Scripted::new("walker", vec![ToolEvent::progress("started", None)]);
        tool.hang = true;
        let released = tool.released.clone();
        let seen_token = tool.seen_token.clone();
        let engine = engine_with(vec![Capability::streaming(tool)]);

        let mut events = engine.invoke("walker", serde_json::json!({}));
        assert_eq!(
            events.next().await,
            Some(ToolEvent::progress("started", None))
        );

        let token = seen_token.lock().unwrap().clone().unwrap();
        assert!(!token.is_cancelled());
        assert!(!released.load(Ordering::SeqCst));

        drop(events);

        assert!(token.is_cancelled());
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_terminates_in_flight_invocations() {
        let mut tool = Scripted::new("walker", vec![ToolEvent::progress("started", None)]);
        tool.hang = true;
        let engine = engine_with(vec![Capability::streaming(tool)]);

        let mut events = engine.invoke("walker", serde_json::json!({}));
        events.next().await;

        engine.shutdown();
        assert!(engine.is_shut_down());
        assert_eq!(
            events.next().await,
            Some(ToolEvent::error("Tool 'walker' was cancelled"))
        );
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_call_tool_collapses_stream() {
        let tool = Scripted::new(
            "search",
            vec![
                ToolEvent::progress("Searching", Some(10.0)),
                ToolEvent::log(LogLevel::Info, "src/main.rs"),
                ToolEvent::success(serde_json::json!({"totalResults": 1})),
            ],
        );
        let engine = engine_with(vec![Capability::streaming(tool), Capability::unary(Failing)]);

        let mut forwarded = Vec::new();
        let result = engine
            .call_tool("search", serde_json::json!({}), |event| forwarded.push(event))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"totalResults": 1}));
        assert_eq!(forwarded.len(), 2);

        let err = engine
            .call_tool("failing", serde_json::json!({}), |_| {})
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ToolgateError::ToolFailed("Invalid input: path is required".to_string())
        );
    }
}
