//! Work item parsing from the input URL list.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One unit of fetch work: a book identified by its numeric id and the
/// URL slug used to build the request path.
///
/// Parsed from one line of the URL list, `.../<name>/<id>`. Immutable
/// once created; identity is the `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub name: String,
}

impl WorkItem {
    /// Extract id and slug from a book URL.
    ///
    /// The id is the last path segment and the slug the one before it.
    /// Returns `None` when either segment is missing or empty.
    pub fn from_url(url: &str) -> Option<Self> {
        let mut segments = url.trim().trim_end_matches('/').rsplit('/');
        let id = segments.next().filter(|s| !s.is_empty())?;
        let name = segments.next().filter(|s| !s.is_empty())?;
        // A bare "name/id" pair with no scheme or host is not a URL.
        if segments.next().is_none() {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            name: name.to_string(),
        })
    }
}

/// Read the URL list and parse one [`WorkItem`] per valid line.
///
/// Malformed lines are logged and dropped; an unreadable file is fatal.
pub fn read_work_items(path: impl AsRef<Path>) -> Result<Vec<WorkItem>> {
    let content = fs::read_to_string(&path)?;
    let mut items = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match WorkItem::from_url(line) {
            Some(item) => items.push(item),
            None => log::warn!("Skipping malformed URL line: {}", line),
        }
    }
    Ok(items)
}
