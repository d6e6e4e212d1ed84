use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolgate_core::{DuplicatePolicy, ServerInfo};
use toolgate_mcp::tools::{build_registry, BUILTIN_TOOLS};
use toolgate_mcp::McpServer;

/// Which transport the process serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unset means auto-detect from stdin
    #[serde(default)]
    pub transport: Option<TransportKind>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,

    /// Base directory for the file tools
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

fn default_enabled() -> Vec<String> {
    BUILTIN_TOOLS.iter().map(|name| name.to_string()).collect()
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            root: default_root(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Address the HTTP transport binds to
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }

    /// Explicit setting first, then stdio when input is piped
    pub fn resolve_transport(&self, stdin_is_terminal: bool) -> TransportKind {
        match self.transport {
            Some(kind) => kind,
            None if stdin_is_terminal => TransportKind::Http,
            None => TransportKind::Stdio,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub mcp: Arc<McpServer>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let registry = build_registry(
            &config.tools.enabled,
            &config.tools.root,
            config.tools.duplicate_policy,
        )
        .context("Failed to build tool registry")?;

        let server_info = ServerInfo::new("toolgate", env!("CARGO_PKG_VERSION"));

        Ok(Self {
            mcp: Arc::new(McpServer::new(registry, server_info)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ServerConfig::load(&temp_dir.path().join("toolgate.toml")).unwrap();

        assert_eq!(config.transport, None);
        assert_eq!(config.http_addr(), "127.0.0.1:3000");
        assert_eq!(config.tools.enabled, vec!["ping", "read_file", "file_search"]);
        assert_eq!(config.tools.duplicate_policy, DuplicatePolicy::Reject);
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("toolgate.toml");
        std::fs::write(
            &path,
            r#"
transport = "stdio"

[http]
port = 8080

[tools]
enabled = ["ping"]
duplicate_policy = "replace"
"#,
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.transport, Some(TransportKind::Stdio));
        assert_eq!(config.http_addr(), "127.0.0.1:8080");
        assert_eq!(config.tools.enabled, vec!["ping"]);
        assert_eq!(config.tools.root, PathBuf::from("."));
        assert_eq!(config.tools.duplicate_policy, DuplicatePolicy::Replace);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("toolgate.toml");
        std::fs::write(&path, "transport = \"carrier-pigeon\"").unwrap();

        let err = ServerConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse configuration file"));
    }

    #[test]
    fn test_resolve_transport() {
        let mut config = ServerConfig::default();
        assert_eq!(config.resolve_transport(true), TransportKind::Http);
        assert_eq!(config.resolve_transport(false), TransportKind::Stdio);

        config.transport = Some(TransportKind::Http);
        assert_eq!(config.resolve_transport(false), TransportKind::Http);
    }

    #[test]
    fn test_unknown_tool_fails_startup() {
        let mut config = ServerConfig::default();
        config.tools.enabled.push("teleport".to_string());

        let err = AppState::new(&config).err().unwrap();
        assert!(err.to_string().contains("Failed to build tool registry"));
    }
}
