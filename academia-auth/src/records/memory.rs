use academia_core::{async_trait, AuthError, AuthResult, RecordStore};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, HashMap<String, Value>>,
    failing: HashSet<String>,
    queries: HashMap<String, usize>,
}

/// In-memory record store with per-table query counters
#[derive(Clone, Debug, Default)]
pub struct MemoryRecordStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut guard = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn insert(&self, table: &str, id: &str, record: Value) {
        self.with_tables(|t| {
            t.rows
                .entry(table.to_string())
                .or_default()
                .insert(id.to_string(), record);
        });
    }

    /// Make every lookup against `table` fail as a transport error would
    pub fn fail_table(&self, table: &str) {
        self.with_tables(|t| {
            t.failing.insert(table.to_string());
        });
    }

    pub fn query_count(&self, table: &str) -> usize {
        self.with_tables(|t| t.queries.get(table).copied().unwrap_or(0))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select_by_id(&self, table: &str, id: &str) -> AuthResult<Option<Value>> {
        self.with_tables(|t| {
            *t.queries.entry(table.to_string()).or_default() += 1;

            if t.failing.contains(table) {
                return Err(AuthError::unavailable(format!(
                    "record store table {} is unreachable",
                    table
                )));
            }

            Ok(t.rows.get(table).and_then(|rows| rows.get(id)).cloned())
        })
    }
}
