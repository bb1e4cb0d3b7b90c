use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    DocumentStore, Filter, StoreError, StoreResult, WriteBatch, WriteOp, add_to_field, merge_patch,
    Document,
};

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// In-process store. A single lock serializes every call, which gives `commit`
/// the same all-or-nothing semantics as a database transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
    failing_commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commits fail with a backend error before touching any document.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn lookup<'a>(
    collections: &'a Collections,
    staged: &'a HashMap<(String, String), Value>,
    collection: &str,
    id: &str,
) -> Option<&'a Value> {
    staged
        .get(&(collection.to_string(), id.to_string()))
        .or_else(|| collections.get(collection).and_then(|c| c.get(id)))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> StoreResult<Vec<Document>> {
        let collections = self.collections.lock().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, data)| filters.iter().all(|f| f.matches(data)))
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect())
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        let mut collections = self.collections.lock().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<()> {
        let mut collections = self.collections.lock().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        merge_patch(doc, &patch);
        Ok(())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<i64> {
        let mut collections = self.collections.lock().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        add_to_field(doc, collection, id, field, delta)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut collections = self.collections.lock().await;

        if self.take_injected_failure() {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        for pre in &batch.preconditions {
            let current = collections
                .get(&pre.collection)
                .and_then(|c| c.get(&pre.id));
            if !pre.holds(current) {
                return Err(StoreError::precondition(&pre.collection, &pre.id));
            }
        }

        // Stage every write first so a failing op leaves the store untouched.
        let mut staged: HashMap<(String, String), Value> = HashMap::new();
        for op in batch.ops {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    data,
                } => {
                    staged.insert((collection, id), data);
                }
                WriteOp::Update {
                    collection,
                    id,
                    patch,
                } => {
                    let mut doc = lookup(&collections, &staged, &collection, &id)
                        .cloned()
                        .ok_or_else(|| StoreError::not_found(&collection, &id))?;
                    merge_patch(&mut doc, &patch);
                    staged.insert((collection, id), doc);
                }
                WriteOp::Increment {
                    collection,
                    id,
                    field,
                    delta,
                    seed,
                } => {
                    let mut doc = match lookup(&collections, &staged, &collection, &id) {
                        Some(doc) => doc.clone(),
                        None => seed.ok_or_else(|| StoreError::not_found(&collection, &id))?,
                    };
                    add_to_field(&mut doc, &collection, &id, &field, delta)?;
                    staged.insert((collection, id), doc);
                }
            }
        }

        for ((collection, id), data) in staged {
            collections.entry(collection).or_default().insert(id, data);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Condition;
    use serde_json::json;

    #[tokio::test]
    async fn commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.set("raffles", "r1", json!({"soldTickets": 2})).await.unwrap();

        let mut batch = WriteBatch::new();
        batch
            .increment("raffles", "r1", "soldTickets", 3, None)
            .update("orders", "missing", json!({"status": "VERIFIED"}));
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let raffle = store.get("raffles", "r1").await.unwrap().unwrap();
        assert_eq!(raffle.data["soldTickets"], json!(2));
    }

    #[tokio::test]
    async fn failed_precondition_blocks_every_write() {
        let store = MemoryStore::new();
        store.set("raffles", "r1", json!({"soldTickets": 2})).await.unwrap();

        let mut batch = WriteBatch::new();
        batch
            .require("raffles", "r1", Condition::FieldEquals("soldTickets".into(), json!(1)))
            .set("tickets", "t1", json!({"ticketNumber": "A-2"}));
        let err = store.commit(batch).await.unwrap_err();
        assert!(err.is_precondition_failed());
        assert!(store.get("tickets", "t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seeded_increment_creates_missing_document() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.increment("chances", "u_r", "chances", 4, Some(json!({"userId": "u"})));
        store.commit(batch).await.unwrap();

        let doc = store.get("chances", "u_r").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"userId": "u", "chances": 4}));
    }

    #[tokio::test]
    async fn injected_failure_is_consumed_once() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        let mut batch = WriteBatch::new();
        batch.set("a", "1", json!({}));
        assert!(store.commit(batch.clone()).await.is_err());
        assert!(store.commit(batch).await.is_ok());
    }

    #[tokio::test]
    async fn increment_requires_existing_document() {
        let store = MemoryStore::new();
        let err = store.increment("raffles", "nope", "soldTickets", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
