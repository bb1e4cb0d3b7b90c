use std::sync::Arc;

use crate::models::prize::UserPrize;
use crate::store::{DocumentStore, Filter, StoreResult};

use super::{fetch, fetch_where};

#[derive(Clone)]
pub struct PrizeRepository {
    store: Arc<dyn DocumentStore>,
}

impl PrizeRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<UserPrize>> {
        fetch(self.store.as_ref(), id).await
    }

    pub async fn get_by_user(&self, user_id: &str) -> StoreResult<Vec<UserPrize>> {
        let mut prizes: Vec<UserPrize> =
            fetch_where(self.store.as_ref(), &[Filter::eq("userId", user_id)]).await?;
        prizes.sort_by(|a, b| b.date_won.cmp(&a.date_won));
        Ok(prizes)
    }

    pub async fn get_by_raffle(&self, raffle_id: &str) -> StoreResult<Vec<UserPrize>> {
        fetch_where(self.store.as_ref(), &[Filter::eq("raffleId", raffle_id)]).await
    }
}
