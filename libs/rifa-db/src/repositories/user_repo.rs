use std::sync::Arc;

use crate::models::user::{ReferralCodeClaim, User};
use crate::store::{DocumentStore, StoreResult};

use super::{fetch, fetch_where};

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        fetch(self.store.as_ref(), id).await
    }

    pub async fn get_by_referral_code(&self, code: &str) -> StoreResult<Option<User>> {
        let Some(claim) = fetch::<ReferralCodeClaim>(self.store.as_ref(), code).await? else {
            return Ok(None);
        };
        self.get_by_id(&claim.user_id).await
    }

    pub async fn get_all(&self) -> StoreResult<Vec<User>> {
        fetch_where(self.store.as_ref(), &[]).await
    }
}
