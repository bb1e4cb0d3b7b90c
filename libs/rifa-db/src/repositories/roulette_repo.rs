use std::sync::Arc;

use crate::models::roulette::RouletteChance;
use crate::store::{DocumentStore, Filter, StoreResult};

use super::{fetch, fetch_where};

#[derive(Clone)]
pub struct RouletteRepository {
    store: Arc<dyn DocumentStore>,
}

impl RouletteRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: &str, raffle_id: &str) -> StoreResult<Option<RouletteChance>> {
        fetch(self.store.as_ref(), &RouletteChance::key(user_id, raffle_id)).await
    }

    pub async fn balance(&self, user_id: &str, raffle_id: &str) -> StoreResult<i64> {
        Ok(self
            .get(user_id, raffle_id)
            .await?
            .map(|c| c.chances)
            .unwrap_or(0))
    }

    pub async fn get_by_user(&self, user_id: &str) -> StoreResult<Vec<RouletteChance>> {
        fetch_where(self.store.as_ref(), &[Filter::eq("userId", user_id)]).await
    }
}
