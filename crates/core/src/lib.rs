// Core of toolgate: capability registry, invocation engine and session tracking

pub mod engine;
pub mod error;
pub mod events;
pub mod registry;
pub mod session;
pub mod types;

pub use engine::InvocationEngine;
pub use error::{ToolgateError, ToolgateResult};
pub use events::{EventStream, LogLevel, ToolEvent};
pub use registry::{Capability, CapabilityRegistry, DuplicatePolicy, StreamingTool, UnaryTool};
pub use session::{Session, SessionMultiplexer, SessionState, SessionTransport};
pub use types::*;
