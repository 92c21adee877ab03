//! Directory of live tables.

use super::session::{TableConfig, TableSession};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Maps table identifiers to shared [`TableSession`] instances. Sessions
/// are created lazily on first lookup; concurrent callers receive the same
/// instance. Empty tables are only removed by [`TableManager::prune_empty`].
pub struct TableManager {
    config: TableConfig,
    tables: Mutex<HashMap<String, Arc<TableSession>>>,
}

impl Default for TableManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TableManager {
    pub fn new() -> Self {
        Self::with_config(TableConfig::default())
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self {
            config,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the table for `table_id`, constructing it on first use.
    pub async fn get_or_create(&self, table_id: &str) -> Arc<TableSession> {
        let mut tables = self.tables.lock().await;
        if let Some(table) = tables.get(table_id) {
            return Arc::clone(table);
        }
        info!("creating table {table_id}");
        let table = TableSession::with_config(table_id, self.config.clone());
        tables.insert(table_id.to_string(), Arc::clone(&table));
        table
    }

    pub async fn get(&self, table_id: &str) -> Option<Arc<TableSession>> {
        self.tables.lock().await.get(table_id).cloned()
    }

    pub async fn table_count(&self) -> usize {
        self.tables.lock().await.len()
    }

    /// Drop tables with no seats and no connections. Returns how many were
    /// removed.
    pub async fn prune_empty(&self) -> usize {
        let candidates: Vec<(String, Arc<TableSession>)> = {
            let tables = self.tables.lock().await;
            tables
                .iter()
                .map(|(id, t)| (id.clone(), Arc::clone(t)))
                .collect()
        };
        let mut removable = Vec::new();
        for (id, table) in candidates {
            if table.is_empty().await {
                removable.push(id);
            }
        }
        let mut tables = self.tables.lock().await;
        let mut removed = 0;
        for id in removable {
            if let Some(table) = tables.get(&id) {
                // Re-check under the directory lock in case someone joined.
                if Arc::strong_count(table) == 1 {
                    tables.remove(&id);
                    debug!("pruned empty table {id}");
                    removed += 1;
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_returns_shared_instance() {
        let manager = TableManager::new();
        let a = manager.get_or_create("t1").await;
        let b = manager.get_or_create("t1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.table_count().await, 1);
    }

    #[tokio::test]
    async fn distinct_ids_get_distinct_tables() {
        let manager = TableManager::new();
        let a = manager.get_or_create("t1").await;
        let b = manager.get_or_create("t2").await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(manager.table_count().await, 2);
    }

    #[tokio::test]
    async fn prune_removes_only_empty_tables() {
        let manager = TableManager::new();
        let _ = manager.get_or_create("empty").await;
        let occupied = manager.get_or_create("occupied").await;
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        occupied.connect("u1", "Ann", tx).await;

        let removed = manager.prune_empty().await;
        assert_eq!(removed, 1);
        assert!(manager.get("empty").await.is_none());
        assert!(manager.get("occupied").await.is_some());
    }
}
