// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

// ! Line-delimited JSON-RPC MCP server for the stdio integration tests
// !
// ! Writes one malformed line to stdout and one line to stderr at startup,
// ! then answers requests from stdin until stdin closes. Calling the `crash`
// ! tool exits with status 7 without replying.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[path = "mock_logic.rs"]
mod mock_logic;

use mock_logic::{MockState, STARTUP_STDERR};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();

    stdout.write_all(b"this line is not json\n").await?;
    stdout.flush().await?;
    stderr
        .write_all(format!("{STARTUP_STDERR}\n").as_bytes())
        .await?;
    stderr.flush().await?;

    let mut state = MockState::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };

        if message.pointer("/params/name").and_then(Value::as_str) == Some("crash") {
            std::process::exit(7);
        }

        for reply in state.handle(&message) {
            stdout.write_all(format!("{reply}\n").as_bytes()).await?;
        }
        stdout.flush().await?;
    }

    Ok(())
}
