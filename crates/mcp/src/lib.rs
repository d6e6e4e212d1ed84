// MCP (Model Context Protocol) server: JSON-RPC protocol types, transports and built-in tools

pub mod http;
pub mod protocol;
pub mod server;
pub mod stdio;
pub mod tools;

pub use server::McpServer;
