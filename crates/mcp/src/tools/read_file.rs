// File reading tool

use serde::Deserialize;
use std::path::{Path, PathBuf};
use toolgate_core::{
    json_schema_object, json_schema_string, ToolDescriptor, ToolgateError, ToolgateResult,
    UnaryTool,
};

/// Tool to read a text file
pub struct ReadFileTool {
    base_path: PathBuf,
}

impl ReadFileTool {
    /// Relative paths are resolved against `base_path`
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    #[serde(default)]
    path: String,
}

#[async_trait::async_trait]
impl UnaryTool for ReadFileTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "read_file",
            "Reads content of a file",
            json_schema_object(
                serde_json::json!({
                    "path": json_schema_string("The path to the file to read")
                }),
                vec!["path"],
            ),
        )
    }

    async fn call(&self, arguments: serde_json::Value) -> ToolgateResult<serde_json::Value> {
        let args: ReadFileArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolgateError::InvalidInput(e.to_string()))?;

        if args.path.trim().is_empty() {
            return Err(ToolgateError::InvalidInput(
                "Path is required and cannot be empty".to_string(),
            ));
        }

        let path = self.resolve(&args.path);
        tracing::debug!(path = %path.display(), "Reading file");

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::Value::String(content)),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => Err(
                ToolgateError::ProviderFault(format!("{} is not a UTF-8 text file", args.path)),
            ),
            Err(e) => Err(ToolgateError::ProviderFault(format!(
                "Failed to read {}: {}",
                args.path, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("test-file.txt"), "This is a test file.").unwrap();

        let tool = ReadFileTool::new(temp_dir.path().to_path_buf());
        let result = tool
            .call(serde_json::json!({"path": "test-file.txt"}))
            .await
            .unwrap();

        assert_eq!(result, serde_json::json!("This is a test file."));
    }

    #[tokio::test]
    async fn test_read_absolute_path() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("abs.txt");
        std::fs::write(&file, "absolute").unwrap();

        let tool = ReadFileTool::new(PathBuf::from("/nonexistent-base"));
        let result = tool
            .call(serde_json::json!({"path": file.to_string_lossy()}))
            .await
            .unwrap();

        assert_eq!(result, serde_json::json!("absolute"));
    }

    #[tokio::test]
    async fn test_missing_file_is_provider_fault() {
        let temp_dir = TempDir::new().unwrap();
        let tool = ReadFileTool::new(temp_dir.path().to_path_buf());

        let err = tool
            .call(serde_json::json!({"path": "non-existent-file.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolgateError::ProviderFault(_)));
        assert!(err.to_string().starts_with("Failed to read non-existent-file.txt"));
    }

    #[tokio::test]
    async fn test_empty_path_is_invalid_input() {
        let tool = ReadFileTool::new(PathBuf::from("."));

        let err = tool.call(serde_json::json!({})).await.unwrap_err();
        assert_eq!(
            err,
            ToolgateError::InvalidInput("Path is required and cannot be empty".to_string())
        );

        let err = tool.call(serde_json::json!({"path": 42})).await.unwrap_err();
        assert!(matches!(err, ToolgateError::InvalidInput(_)));
    }
}
