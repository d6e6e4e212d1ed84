pub mod file_search;
pub mod ping;
pub mod read_file;

pub use file_search::FileSearchTool;
pub use ping::PingTool;
pub use read_file::ReadFileTool;

use std::path::Path;
use toolgate_core::{Capability, CapabilityRegistry, DuplicatePolicy, ToolgateError, ToolgateResult};

/// Names of the tools compiled into this build
pub const BUILTIN_TOOLS: &[&str] = &["ping", "read_file", "file_search"];

/// Construct a built-in tool by name
pub fn builtin(name: &str, root: &Path) -> Option<Capability> {
    match name {
        "ping" => Some(Capability::unary(PingTool)),
        "read_file" => Some(Capability::unary(ReadFileTool::new(root.to_path_buf()))),
        "file_search" => Some(Capability::streaming(FileSearchTool::new(root.to_path_buf()))),
        _ => None,
    }
}

/// Build a registry holding exactly the listed tools
pub fn build_registry(
    enabled: &[String],
    root: &Path,
    policy: DuplicatePolicy,
) -> ToolgateResult<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::with_policy(policy);
    for name in enabled {
        let capability =
            builtin(name, root).ok_or_else(|| ToolgateError::NotFound(name.clone()))?;
        registry.register(capability)?;
    }

    tracing::info!("Registered {} tools", registry.len());
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_all_builtins() {
        let registry =
            build_registry(&names(BUILTIN_TOOLS), Path::new("."), DuplicatePolicy::Reject).unwrap();
        let listed: Vec<_> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(listed, vec!["file_search", "ping", "read_file"]);
        assert!(registry.resolve("file_search").unwrap().is_streaming());
    }

    #[test]
    fn test_unknown_tool_name_is_rejected() {
        let err = build_registry(&names(&["ping", "teleport"]), Path::new("."), DuplicatePolicy::Reject)
            .unwrap_err();
        assert_eq!(err, ToolgateError::NotFound("teleport".to_string()));
    }

    #[test]
    fn test_duplicate_entries_follow_policy() {
        let enabled = names(&["ping", "ping"]);
        let err = build_registry(&enabled, Path::new("."), DuplicatePolicy::Reject).unwrap_err();
        assert_eq!(err, ToolgateError::DuplicateName("ping".to_string()));

        let registry = build_registry(&enabled, Path::new("."), DuplicatePolicy::Replace).unwrap();
        assert_eq!(registry.len(), 1);
    }
}
