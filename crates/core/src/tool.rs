//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool receives two inputs: the arguments the model produced, and the
//! server-owned [`SessionContext`]. Anything identifying the caller's project
//! comes from the context, never from the arguments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::session::SessionContext;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool achieved its goal
    pub success: bool,

    /// The output content returned to the model
    pub output: String,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool, exactly as advertised to the model.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing the model-visible parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool.
    ///
    /// `Err` is reserved for calls that never reach the tool body (arguments
    /// that violate the schema). Failures inside the body are reported in the
    /// returned [`ToolResult`].
    async fn execute(
        &self,
        call: &ToolCall,
        context: &SessionContext,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProjectId;

    /// Echoes the project id it was handed by the server.
    struct WhoAmI;

    #[async_trait]
    impl Tool for WhoAmI {
        fn name(&self) -> &str {
            "whoami"
        }
        fn description(&self) -> &str {
            "Reports the current project"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(
            &self,
            call: &ToolCall,
            context: &SessionContext,
        ) -> std::result::Result<ToolResult, ToolError> {
            Ok(ToolResult {
                call_id: call.id.clone(),
                success: true,
                output: context.project_id.to_string(),
            })
        }
    }

    #[test]
    fn definition_uses_name_and_schema() {
        let def = WhoAmI.to_definition();
        assert_eq!(def.name, "whoami");
        assert_eq!(def.parameters["type"], "object");
    }

    #[tokio::test]
    async fn context_not_arguments_decides_project() {
        let context = SessionContext {
            project_id: ProjectId::new(),
            selected_ids: vec![],
            requested_aspect: None,
        };
        let call = ToolCall {
            id: "call_1".into(),
            name: "whoami".into(),
            arguments: serde_json::json!({ "project_id": "attacker" }),
        };
        let result = WhoAmI.execute(&call, &context).await.unwrap();
        assert_eq!(result.output, context.project_id.to_string());
        assert_eq!(result.call_id, "call_1");
    }
}
