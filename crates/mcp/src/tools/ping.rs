// Liveness check tool

use toolgate_core::{json_schema_object, ToolDescriptor, ToolgateResult, UnaryTool};

/// Tool that always answers "pong"
pub struct PingTool;

#[async_trait::async_trait]
impl UnaryTool for PingTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "ping",
            "Responds with pong",
            json_schema_object(serde_json::json!({}), vec![]),
        )
    }

    async fn call(&self, _arguments: serde_json::Value) -> ToolgateResult<serde_json::Value> {
        Ok(serde_json::Value::String("pong".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping() {
        let tool = PingTool;
        assert_eq!(tool.describe().name, "ping");
        assert_eq!(tool.describe().description, "Responds with pong");
        assert_eq!(
            tool.call(serde_json::json!({"ignored": true})).await.unwrap(),
            serde_json::json!("pong")
        );
    }
}
