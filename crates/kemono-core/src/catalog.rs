//! Catalog items and the in-memory search provider.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, SearchError};
use crate::search::SearchProvider;

/// Identity every pageable item exposes.
pub trait CatalogItem {
    /// Stable identifier
    fn id(&self) -> &str;
    /// Display name
    fn name(&self) -> &str;
}

/// A Discord server listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscordServer {
    pub id: String,
    pub name: String,
}

impl DiscordServer {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl CatalogItem for DiscordServer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Parse a JSON array of servers, rejecting duplicate ids.
pub fn parse_servers(json: &str) -> Result<Vec<DiscordServer>, CatalogError> {
    let servers: Vec<DiscordServer> = serde_json::from_str(json)?;
    let mut seen = HashSet::with_capacity(servers.len());
    for server in &servers {
        if !seen.insert(server.id.as_str()) {
            return Err(CatalogError::DuplicateId(server.id.clone()));
        }
    }
    Ok(servers)
}

/// Load a server catalog from a JSON file.
pub fn load_servers(path: &Path) -> Result<Vec<DiscordServer>, CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let servers = parse_servers(&text)?;
    tracing::debug!(path = %path.display(), count = servers.len(), "Loaded server catalog");
    Ok(servers)
}

/// Search provider over an in-memory item list.
///
/// A query matches an item when it is a case-insensitive substring of the
/// item's name, or equal to its id. Result order follows catalog order.
#[derive(Debug, Clone)]
pub struct LocalSearch<T> {
    items: Vec<T>,
}

impl<T> LocalSearch<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: CatalogItem + Clone> LocalSearch<T> {
    /// Synchronous matching used by the async provider impl.
    #[must_use]
    pub fn matching(&self, query: &str) -> Vec<T> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.items
            .iter()
            .filter(|item| item.id() == query.trim() || item.name().to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl<T> SearchProvider<T> for LocalSearch<T>
where
    T: CatalogItem + Clone + Send + Sync,
{
    async fn search(&self, query: &str) -> Result<Vec<T>, SearchError> {
        Ok(self.matching(query))
    }
}
