// Capability registry: maps tool names to the providers that implement them

use crate::error::{ToolgateError, ToolgateResult};
use crate::events::EventStream;
use crate::types::ToolDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A tool that produces a single outcome
#[async_trait::async_trait]
pub trait UnaryTool: Send + Sync {
    /// Get the tool descriptor
    fn describe(&self) -> ToolDescriptor;

    /// Execute the tool with given arguments
    async fn call(&self, arguments: serde_json::Value) -> ToolgateResult<serde_json::Value>;
}

/// A tool that reports progress while it runs
pub trait StreamingTool: Send + Sync {
    /// Get the tool descriptor
    fn describe(&self) -> ToolDescriptor;

    /// Start the tool. The returned stream should end with exactly one
    /// terminal event. `cancel` fires when the consumer loses interest; any
    /// work spawned outside the stream must stop when it does.
    fn call_stream(&self, arguments: serde_json::Value, cancel: CancellationToken) -> EventStream;
}

/// A registered provider, tagged by how it delivers results
#[derive(Clone)]
pub enum Capability {
    Unary(Arc<dyn UnaryTool>),
    Streaming(Arc<dyn StreamingTool>),
}

impl Capability {
    pub fn unary(tool: impl UnaryTool + 'static) -> Self {
        Self::Unary(Arc::new(tool))
    }

    pub fn streaming(tool: impl StreamingTool + 'static) -> Self {
        Self::Streaming(Arc::new(tool))
    }

    pub fn describe(&self) -> ToolDescriptor {
        match self {
            Self::Unary(tool) => tool.describe(),
            Self::Streaming(tool) => tool.describe(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_streaming() { "Streaming" } else { "Unary" };
        write!(f, "{}({})", kind, self.describe().name)
    }
}

/// What to do when a tool name is registered twice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Replace,
}

/// Tool registry for managing available tools
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    tools: BTreeMap<String, (ToolDescriptor, Capability)>,
    policy: DuplicatePolicy,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            tools: BTreeMap::new(),
            policy,
        }
    }

    /// Register a tool under its declared name
    pub fn register(&mut self, capability: Capability) -> ToolgateResult<()> {
        let descriptor = capability.describe();
        let name = descriptor.name.clone();

        if self.tools.contains_key(&name) {
            match self.policy {
                DuplicatePolicy::Reject => return Err(ToolgateError::DuplicateName(name)),
                DuplicatePolicy::Replace => {
                    tracing::warn!("Replacing previously registered tool '{}'", name);
                }
            }
        }

        tracing::debug!(tool = %name, streaming = capability.is_streaming(), "Registered tool");
        self.tools.insert(name, (descriptor, capability));
        Ok(())
    }

    /// Get a tool by name
    pub fn resolve(&self, name: &str) -> ToolgateResult<Capability> {
        self.tools
            .get(name)
            .map(|(_, capability)| capability.clone())
            .ok_or_else(|| ToolgateError::NotFound(name.to_string()))
    }

    /// List all tool descriptors, ordered by name
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|(descriptor, _)| descriptor.clone()).collect()
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
