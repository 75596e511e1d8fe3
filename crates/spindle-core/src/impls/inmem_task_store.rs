//! InMemoryTaskStore - TaskRecordStore for development and tests
//!
//! `TaskTable` is the table and `InMemoryDatabase<TaskTable>` its
//! transaction boundary. peek returns rows in id (= enqueue) order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{BoxError, TaskRecord};
use crate::impls::InMemoryDatabase;
use crate::ports::TaskRecordStore;

/// Row of a [`TaskTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: u64,
    pub payload: serde_json::Value,

    /// Failed attempts so far. Maintained by runners, not by the loader.
    #[serde(default)]
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_timestamp: Option<u64>,
}

impl TaskRecord for QueuedTask {
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }

    fn next_retry_timestamp(&self) -> Option<u64> {
        self.next_retry_timestamp
    }
}

/// Pending records keyed by id, plus the id sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskTable {
    rows: BTreeMap<u64, QueuedTask>,
    next_id: u64,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a runnable record and return its id.
    pub fn enqueue(&mut self, payload: serde_json::Value) -> u64 {
        self.enqueue_at(payload, None)
    }

    /// Append a record that may not run before `not_before` (ms since epoch).
    pub fn enqueue_at(&mut self, payload: serde_json::Value, not_before: Option<u64>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.rows.insert(
            id,
            QueuedTask {
                id,
                payload,
                attempts: 0,
                next_retry_timestamp: not_before,
            },
        );
        id
    }

    pub fn get(&self, id: u64) -> Option<&QueuedTask> {
        self.rows.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut QueuedTask> {
        self.rows.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<QueuedTask> {
        self.rows.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.rows.keys().copied().collect()
    }

    /// Up to `count` records in id order.
    pub fn first(&self, count: usize) -> Vec<QueuedTask> {
        self.rows.values().take(count).cloned().collect()
    }
}

/// Store over a [`TaskTable`] held in an [`InMemoryDatabase`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryTaskStore;

impl TaskRecordStore for InMemoryTaskStore {
    type Record = QueuedTask;
    type Db = InMemoryDatabase<TaskTable>;

    fn peek(&self, count: usize, table: &TaskTable) -> Result<Vec<QueuedTask>, BoxError> {
        Ok(table.first(count))
    }

    fn remove_record(&self, record: &QueuedTask, table: &mut TaskTable) -> Result<(), BoxError> {
        // already gone is fine
        table.remove(record.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enqueue_assigns_increasing_ids() {
        let mut table = TaskTable::new();
        let a = table.enqueue(json!("a"));
        let b = table.enqueue_at(json!("b"), Some(42));

        assert_eq!((a, b), (0, 1));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(b).unwrap().next_retry_timestamp(), Some(42));
        assert_eq!(table.get(a).unwrap().next_retry_timestamp(), None);
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut table = TaskTable::new();
        let a = table.enqueue(json!(1));
        table.remove(a);
        let b = table.enqueue(json!(2));

        assert_ne!(a, b);
        assert_eq!(table.ids(), vec![b]);
    }

    #[test]
    fn peek_returns_records_in_id_order() {
        let mut table = TaskTable::new();
        for i in 0..5 {
            table.enqueue(json!(i));
        }

        let peeked = InMemoryTaskStore.peek(3, &table).unwrap();
        let ids: Vec<u64> = peeked.iter().map(TaskRecord::id).collect();
        assert_eq!(ids, vec![0, 1, 2]);

        assert_eq!(InMemoryTaskStore.peek(10, &table).unwrap().len(), 5);
        assert!(InMemoryTaskStore.peek(0, &table).unwrap().is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut table = TaskTable::new();
        let id = table.enqueue(json!(null));
        let record = table.get(id).cloned().unwrap();

        InMemoryTaskStore.remove_record(&record, &mut table).unwrap();
        InMemoryTaskStore.remove_record(&record, &mut table).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn queued_task_json_shape() {
        let task = QueuedTask {
            id: 7,
            payload: json!({ "url": "https://example.com" }),
            attempts: 2,
            next_retry_timestamp: None,
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value, json!({ "id": 7, "payload": { "url": "https://example.com" }, "attempts": 2 }));

        let parsed: QueuedTask = serde_json::from_value(json!({ "id": 1, "payload": [] })).unwrap();
        assert_eq!(parsed.attempts, 0);
        assert_eq!(parsed.next_retry_timestamp, None);
    }
}
