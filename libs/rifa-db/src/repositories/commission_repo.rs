use std::sync::Arc;

use crate::models::commission::{Commission, CommissionBatch, CommissionStatus};
use crate::store::{DocumentStore, Filter, StoreResult};

use super::{encode, fetch, fetch_where};

#[derive(Clone)]
pub struct CommissionRepository {
    store: Arc<dyn DocumentStore>,
}

impl CommissionRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<Commission>> {
        fetch(self.store.as_ref(), id).await
    }

    pub async fn get_batch(&self, key: &str) -> StoreResult<Option<CommissionBatch>> {
        fetch(self.store.as_ref(), key).await
    }

    pub async fn get_by_batch_key(&self, key: &str) -> StoreResult<Vec<Commission>> {
        let mut commissions: Vec<Commission> =
            fetch_where(self.store.as_ref(), &[Filter::eq("batchKey", key)]).await?;
        commissions.sort_by_key(|c| c.level);
        Ok(commissions)
    }

    pub async fn get_by_beneficiary(&self, user_id: &str) -> StoreResult<Vec<Commission>> {
        fetch_where(self.store.as_ref(), &[Filter::eq("userId", user_id)]).await
    }

    pub async fn get_by_beneficiary_and_status(
        &self,
        user_id: &str,
        status: CommissionStatus,
    ) -> StoreResult<Vec<Commission>> {
        fetch_where(
            self.store.as_ref(),
            &[
                Filter::eq("userId", user_id),
                Filter::eq("status", encode(&status)?),
            ],
        )
        .await
    }

    pub async fn get_all(&self) -> StoreResult<Vec<Commission>> {
        fetch_where(self.store.as_ref(), &[]).await
    }
}
