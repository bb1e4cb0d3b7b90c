use std::sync::Arc;

use crate::models::Record;
use crate::models::raffle::Raffle;
use crate::store::{DocumentStore, StoreResult};

use super::{encode, fetch};

#[derive(Clone)]
pub struct RaffleRepository {
    store: Arc<dyn DocumentStore>,
}

impl RaffleRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<Raffle>> {
        fetch(self.store.as_ref(), id).await
    }

    /// Claims `quantity` consecutive sequence numbers and returns the first one.
    /// Concurrent callers always receive disjoint ranges.
    pub async fn reserve_sequences(&self, id: &str, quantity: i64) -> StoreResult<i64> {
        let last = self
            .store
            .increment(Raffle::COLLECTION, id, "ticketSequence", quantity)
            .await?;
        Ok(last - quantity + 1)
    }

    /// Creates or replaces raffle configuration. Counters are only moved through increments.
    pub async fn save(&self, raffle: &Raffle) -> StoreResult<()> {
        self.store
            .set(Raffle::COLLECTION, &raffle.id, encode(raffle)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_get_disjoint_ranges() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        store
            .set(Raffle::COLLECTION, "r1", json!({"id": "r1", "soldTickets": 0}))
            .await
            .unwrap();
        let repo = RaffleRepository::new(store);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move { repo.reserve_sequences("r1", 3).await }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            let first = handle.await.unwrap().unwrap();
            for sequence in first..first + 3 {
                assert!(seen.insert(sequence));
            }
        }
        assert_eq!(seen.len(), 150);
        assert_eq!(seen.iter().min(), Some(&1));
        assert_eq!(seen.iter().max(), Some(&150));
    }

    #[tokio::test]
    async fn reserving_on_a_missing_raffle_is_not_found() {
        let repo = RaffleRepository::new(Arc::new(MemoryStore::new()));
        let err = repo.reserve_sequences("gone", 1).await.unwrap_err();
        assert!(matches!(err, crate::store::StoreError::NotFound { .. }));
    }
}
