// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

// ! Scripted MCP server behaviour shared by every test fixture
// !
// ! Each inbound JSON-RPC message yields the messages the server writes back,
// ! in order. Transports decide how those messages travel.

#![allow(dead_code)]

use serde_json::{Value, json};

pub const SERVER_NAME: &str = "mock-server";
pub const STARTUP_STDERR: &str = "mock server ready";

/// Tools on the first `tools/list` page
pub const FIRST_PAGE: &[&str] = &["echo", "boom", "slow"];
/// Tools on the second page, before any `extra_tools`
pub const SECOND_PAGE: &[&str] = &["notify", "ping_me", "pong_status", "env", "crash"];

#[derive(Debug, Default)]
pub struct MockState {
    /// Appended to the second `tools/list` page
    pub extra_tools: Vec<String>,
    /// Whether the client answered our `ping`
    pub pong_received: bool,
    /// Every method received, in order
    pub seen: Vec<String>,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, message: &Value) -> Vec<Value> {
        let id = message.get("id").cloned();
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            // A reply to one of our requests
            if id == Some(json!("srv-ping")) && message.get("result").is_some() {
                self.pong_received = true;
            }
            return Vec::new();
        };
        self.seen.push(method.to_string());

        let Some(id) = id else {
            return Vec::new();
        };
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        match method {
            "initialize" => vec![result(id, initialize_result())],
            "ping" | "logging/setLevel" => vec![result(id, json!({}))],
            "tools/list" => vec![result(id, self.tools_page(&params))],
            "tools/call" => self.call_tool(id, &params),
            "resources/list" => vec![result(
                id,
                json!({"resources": [{"uri": "file:///readme.md", "name": "readme", "mimeType": "text/markdown"}]}),
            )],
            "resources/read" => {
                let uri = params.get("uri").and_then(Value::as_str).unwrap_or_default();
                vec![result(
                    id,
                    json!({"contents": [{"uri": uri, "mimeType": "text/markdown", "text": "# Mock"}]}),
                )]
            }
            "prompts/list" => vec![result(
                id,
                json!({"prompts": [{"name": "greet", "description": "Say hello", "arguments": [{"name": "name", "required": true}]}]}),
            )],
            "prompts/get" => {
                let name = params
                    .pointer("/arguments/name")
                    .and_then(Value::as_str)
                    .unwrap_or("stranger");
                vec![result(
                    id,
                    json!({
                        "description": "Greeting",
                        "messages": [{"role": "user", "content": {"type": "text", "text": format!("Hello, {name}!")}}]
                    }),
                )]
            }
            other => vec![error(id, -32601, &format!("Method not found: {other}"))],
        }
    }

    fn tools_page(&self, params: &Value) -> Value {
        match params.get("cursor").and_then(Value::as_str) {
            None => json!({"tools": tools(FIRST_PAGE.iter().copied()), "nextCursor": "page2"}),
            Some("page2") => {
                let names = SECOND_PAGE
                    .iter()
                    .copied()
                    .chain(self.extra_tools.iter().map(String::as_str));
                json!({"tools": tools(names)})
            }
            Some(other) => json!({"tools": [], "nextCursor": other}),
        }
    }

    fn call_tool(&mut self, id: Value, params: &Value) -> Vec<Value> {
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match name {
            "echo" => {
                let text = arguments
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                vec![result(id, text_result(text, false))]
            }
            "boom" => vec![result(id, text_result("boom", true))],
            "slow" | "crash" => Vec::new(),
            "notify" => {
                self.extra_tools.push("added".to_string());
                vec![
                    result(id, text_result("ok", false)),
                    notification("notifications/tools/list_changed", None),
                    notification(
                        "notifications/message",
                        Some(json!({"level": "info", "logger": "mock", "data": "tool list updated"})),
                    ),
                ]
            }
            "ping_me" => vec![
                json!({"jsonrpc": "2.0", "id": "srv-ping", "method": "ping"}),
                result(id, text_result("sent", false)),
            ],
            "pong_status" => vec![result(id, text_result(&self.pong_received.to_string(), false))],
            "env" => {
                let greeting = std::env::var("MOCK_GREETING").unwrap_or_default();
                vec![result(id, text_result(&greeting, false))]
            }
            other => vec![error(id, -32602, &format!("Unknown tool: {other}"))],
        }
    }
}

pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": "2025-06-18",
        "capabilities": {
            "tools": {"listChanged": true},
            "resources": {"subscribe": true},
            "prompts": {},
            "logging": {}
        },
        "serverInfo": {"name": SERVER_NAME, "version": "1.0.0"},
        "instructions": "Use echo to test"
    })
}

fn tools<'a>(names: impl Iterator<Item = &'a str>) -> Vec<Value> {
    names
        .map(|name| json!({"name": name, "inputSchema": {"type": "object"}}))
        .collect()
}

fn text_result(text: &str, is_error: bool) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": is_error})
}

fn result(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error(id: Value, code: i32, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

fn notification(method: &str, params: Option<Value>) -> Value {
    match params {
        Some(params) => json!({"jsonrpc": "2.0", "method": method, "params": params}),
        None => json!({"jsonrpc": "2.0", "method": method}),
    }
}

/// Every tool name the mock advertises initially, in discovery order
pub fn advertised_tools() -> Vec<String> {
    FIRST_PAGE
        .iter()
        .chain(SECOND_PAGE.iter())
        .map(|name| name.to_string())
        .collect()
}
