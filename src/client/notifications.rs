// ! Notification and server-request dispatch
// !
// ! Module decides what an unsolicited server message means for the client.
// ! It never performs I/O; the client acts on the returned decision.

use serde_json::{Value, json};

use crate::client::events::ClientEvent;
use crate::protocol::messages::{LoggingMessageParams, ResourceUpdatedParams};
use crate::protocol::methods;
use crate::protocol::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LoggingLevel, error_codes};

/// Which discovered list a notification invalidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Tools,
    Resources,
    Prompts,
}

impl ListKind {
    pub fn method(&self) -> &'static str {
        match self {
            ListKind::Tools => methods::TOOLS_LIST,
            ListKind::Resources => methods::RESOURCES_LIST,
            ListKind::Prompts => methods::PROMPTS_LIST,
        }
    }
}

/// What to do with a notification
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Re-fetch the list and publish it
    Refresh(ListKind),
    /// Publish this event as is
    Emit(ClientEvent),
    /// Nothing to do
    Ignore,
}

/// Route a server notification
pub fn dispatch_notification(notification: &JsonRpcNotification) -> Dispatch {
    let params = notification.params.clone().unwrap_or(Value::Null);

    match notification.method.as_str() {
        methods::TOOLS_LIST_CHANGED => Dispatch::Refresh(ListKind::Tools),
        methods::RESOURCES_LIST_CHANGED => Dispatch::Refresh(ListKind::Resources),
        methods::PROMPTS_LIST_CHANGED => Dispatch::Refresh(ListKind::Prompts),
        methods::LOGGING_MESSAGE => match serde_json::from_value::<LoggingMessageParams>(params) {
            Ok(message) => Dispatch::Emit(ClientEvent::Log {
                level: message.level,
                source: message.logger,
                data: message.data,
            }),
            Err(e) => {
                tracing::warn!("Dropping malformed log notification: {}", e);
                Dispatch::Ignore
            }
        },
        methods::RESOURCES_UPDATED => match serde_json::from_value::<ResourceUpdatedParams>(params) {
            Ok(updated) => Dispatch::Emit(ClientEvent::ResourceUpdated { uri: updated.uri }),
            Err(e) => {
                tracing::warn!("Dropping malformed resource update notification: {}", e);
                Dispatch::Ignore
            }
        },
        methods::PROGRESS | methods::CANCELLED => {
            tracing::debug!("{}: {}", notification.method, params);
            Dispatch::Ignore
        }
        other => {
            tracing::debug!("Ignoring unknown notification: {}", other);
            Dispatch::Ignore
        }
    }
}

/// Reply to a server-initiated request.
///
/// Only `ping` is supported; anything else gets `Method not found`.
pub fn answer_server_request(request: &JsonRpcRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        methods::PING => JsonRpcResponse::success(request.id.clone(), json!({})),
        other => {
            tracing::debug!("Rejecting unsupported server request: {}", other);
            JsonRpcResponse::failure(
                request.id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )
        }
    }
}

/// Event for a line a stdio server wrote to stderr
pub fn stderr_event(source: String, line: String) -> ClientEvent {
    ClientEvent::Log {
        level: LoggingLevel::Info,
        source: Some(source),
        data: Value::String(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(method: &str, params: Option<Value>) -> JsonRpcNotification {
        JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn test_list_changed_triggers_refresh() {
        assert!(matches!(
            dispatch_notification(&notification(methods::TOOLS_LIST_CHANGED, None)),
            Dispatch::Refresh(ListKind::Tools)
        ));
        assert!(matches!(
            dispatch_notification(&notification(methods::PROMPTS_LIST_CHANGED, None)),
            Dispatch::Refresh(ListKind::Prompts)
        ));
    }

    #[test]
    fn test_log_message_forwarded_verbatim() {
        let dispatch = dispatch_notification(&notification(
            methods::LOGGING_MESSAGE,
            Some(json!({"level": "warning", "logger": "db", "data": {"slow": true}})),
        ));

        match dispatch {
            Dispatch::Emit(ClientEvent::Log {
                level,
                source,
                data,
            }) => {
                assert_eq!(level, LoggingLevel::Warning);
                assert_eq!(source.as_deref(), Some("db"));
                assert_eq!(data, json!({"slow": true}));
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_and_malformed_are_ignored() {
        assert!(matches!(
            dispatch_notification(&notification("notifications/custom/thing", None)),
            Dispatch::Ignore
        ));
        assert!(matches!(
            dispatch_notification(&notification(methods::LOGGING_MESSAGE, Some(json!(42)))),
            Dispatch::Ignore
        ));
    }

    #[test]
    fn test_server_requests_answered() {
        let ping = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!("srv-1"),
            method: "ping".to_string(),
            params: None,
        };
        let reply = answer_server_request(&ping);
        assert_eq!(reply.id, json!("srv-1"));
        assert_eq!(reply.result, Some(json!({})));

        let sampling = JsonRpcRequest {
            method: "sampling/createMessage".to_string(),
            ..ping
        };
        let reply = answer_server_request(&sampling);
        assert_eq!(
            reply.error.map(|e| e.code),
            Some(error_codes::METHOD_NOT_FOUND)
        );
    }
}
