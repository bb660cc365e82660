// ! Capability discovery
// !
// ! Module aggregates cursor-paginated `*/list` calls and keeps the snapshot
// ! of what a server offers, so a reconnect can tell what actually changed.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use crate::core::error::McpResult;
use crate::protocol::types::{Cursor, Prompt, Resource, Tool};

/// Fetch every page of a paginated list.
///
/// `fetch` receives the cursor of the page to load and returns that page's
/// items with the next cursor. Nothing is fetched when `enabled` is false.
pub async fn collect_pages<T, F, Fut>(enabled: bool, list: &str, mut fetch: F) -> McpResult<Vec<T>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = McpResult<(Vec<T>, Option<Cursor>)>>,
{
    let mut items = Vec::new();
    if !enabled {
        return Ok(items);
    }

    let mut seen = HashSet::new();
    let mut cursor: Option<Cursor> = None;
    loop {
        let (page, next) = fetch(cursor.take()).await?;
        items.extend(page);

        match next.filter(|c| !c.is_empty()) {
            Some(next) if !seen.insert(next.clone()) => {
                tracing::warn!("{} returned cursor '{}' twice, stopping pagination", list, next);
                break;
            }
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    tracing::debug!("{} aggregated {} item(s)", list, items.len());
    Ok(items)
}

/// Everything discovered from one server, replaced wholesale on refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitySnapshot {
    pub tools: Arc<Vec<Tool>>,
    pub resources: Arc<Vec<Resource>>,
    pub prompts: Arc<Vec<Prompt>>,
}

/// Which lists differ between two snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub tools: bool,
    pub resources: bool,
    pub prompts: bool,
}

impl SnapshotDiff {
    pub fn any(&self) -> bool {
        self.tools || self.resources || self.prompts
    }
}

impl CapabilitySnapshot {
    /// Compare by content, not by allocation
    pub fn diff(&self, newer: &CapabilitySnapshot) -> SnapshotDiff {
        SnapshotDiff {
            tools: self.tools.as_slice() != newer.tools.as_slice(),
            resources: self.resources.as_slice() != newer.resources.as_slice(),
            prompts: self.prompts.as_slice() != newer.prompts.as_slice(),
        }
    }
}
