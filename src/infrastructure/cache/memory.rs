use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use crate::domain::{models::CachedReport, ports::ReportCache};

/// Process-lifetime cache: unbounded, never evicts, last write wins.
#[derive(Default)]
pub struct InMemoryReportCache {
    entries: RwLock<HashMap<String, CachedReport>>,
}

impl InMemoryReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ReportCache for InMemoryReportCache {
    async fn get(&self, digest: &str) -> Option<CachedReport> {
        let hit = self.entries.read().await.get(digest).cloned();
        debug!("Cache {} for digest {}", if hit.is_some() { "hit" } else { "miss" }, digest);
        hit
    }

    async fn put(&self, digest: &str, entry: CachedReport) {
        let mut entries = self.entries.write().await;
        entries.insert(digest.to_string(), entry);
        debug!("Cached report for digest {} ({} entries)", digest, entries.len());
    }
}
