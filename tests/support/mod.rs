// ! Shared helpers for the client integration tests

#![allow(dead_code)]

pub mod mock_logic;

use mcp_conduit::ClientEvent;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// Wait for the first event matching `predicate`, skipping others
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<ClientEvent>,
    predicate: F,
) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

/// Every event up to and including the first one matching `predicate`
pub async fn collect_until<F>(
    events: &mut broadcast::Receiver<ClientEvent>,
    predicate: F,
) -> Vec<ClientEvent>
where
    F: Fn(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut seen = Vec::new();
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = predicate(&event);
                    seen.push(event);
                    if done {
                        return seen;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

pub fn tool_names(tools: &[mcp_conduit::protocol::Tool]) -> Vec<String> {
    tools.iter().map(|tool| tool.name.clone()).collect()
}
