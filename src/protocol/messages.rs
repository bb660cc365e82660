// ! Request params and result payloads
// !
// ! Module defines the request parameters and result payloads the client
// ! exchanges with a server.

use crate::protocol::types::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Params
// ============================================================================

/// `initialize` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializeParams {
    /// Version the client asks for
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

impl InitializeParams {
    pub fn new(client_info: Implementation, capabilities: ClientCapabilities) -> Self {
        Self {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities,
            client_info,
        }
    }
}

/// Parameters shared by every `*/list` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PaginatedParams {
    /// Cursor returned by the previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// `tools/call` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolParams {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, Value>>,
}

/// `resources/read` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadResourceParams {
    pub uri: String,
}

/// `prompts/get` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetPromptParams {
    pub name: String,
    /// Template values keyed by argument name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

/// Parameters for `logging/setLevel`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetLoggingLevelParams {
    pub level: LoggingLevel,
}

// ============================================================================
// Result Types
// ============================================================================

/// Result of `initialize`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializeResult {
    /// Protocol version the server chose
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    /// Usage hints for the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// One page of `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// One page of `resources/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListResourcesResult {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// One page of `prompts/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListPromptsResult {
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Result of `resources/read`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadResourceResult {
    #[serde(default)]
    pub contents: Vec<ResourceContents>,
}

// ============================================================================
// Notification Payloads
// ============================================================================

/// Payload of `notifications/message`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingMessageParams {
    /// Severity of the message
    pub level: LoggingLevel,
    /// Name of the server-side logger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Arbitrary JSON payload
    #[serde(default)]
    pub data: Value,
}

/// Payload of `notifications/resources/updated`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceUpdatedParams {
    pub uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initialize_params_wire_shape() {
        let params = InitializeParams::new(
            Implementation::new("conduit", "0.1.0"),
            ClientCapabilities::default(),
        );
        let value = serde_json::to_value(&params).unwrap();

        assert_eq!(value["protocolVersion"], LATEST_PROTOCOL_VERSION);
        assert_eq!(value["clientInfo"]["name"], "conduit");
        assert_eq!(value["capabilities"], json!({}));
    }

    #[test]
    fn test_paginated_params_omit_absent_cursor() {
        let first = serde_json::to_value(PaginatedParams::default()).unwrap();
        assert_eq!(first, json!({}));

        let next = serde_json::to_value(PaginatedParams {
            cursor: Some("page2".to_string()),
        })
        .unwrap();
        assert_eq!(next, json!({"cursor": "page2"}));
    }

    #[test]
    fn test_initialize_result_without_capabilities() {
        let result: InitializeResult = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "srv", "version": "1"}
        }))
        .unwrap();

        assert_eq!(result.capabilities, ServerCapabilities::default());
        assert_eq!(result.server_info.name, "srv");
    }

    #[test]
    fn test_logging_message_without_logger() {
        let params: LoggingMessageParams = serde_json::from_value(json!({
            "level": "error",
            "data": {"detail": "disk full"}
        }))
        .unwrap();

        assert_eq!(params.level, LoggingLevel::Error);
        assert!(params.logger.is_none());
        assert_eq!(params.data["detail"], "disk full");
    }
}
