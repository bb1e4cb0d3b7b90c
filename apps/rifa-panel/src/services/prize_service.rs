use std::sync::Arc;

use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use rifa_db::DocumentStore;
use rifa_db::models::Record;
use rifa_db::models::prize::UserPrize;
use rifa_db::repositories::PrizeRepository;
use rifa_db::store::{Condition, WriteBatch};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};

pub fn generate_redemption_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Clone)]
pub struct PrizeService {
    store: Arc<dyn DocumentStore>,
    prize_repo: PrizeRepository,
}

impl PrizeService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let prize_repo = PrizeRepository::new(store.clone());
        Self { store, prize_repo }
    }

    /// Marks a won prize as handed over. Unknown prize, wrong code and already redeemed
    /// all fail the same way.
    pub async fn redeem(&self, prize_id: &str, code: &str, admin_id: &str) -> LedgerResult<UserPrize> {
        let supplied = normalize_code(code);
        if supplied.is_empty() {
            return Err(LedgerError::RedemptionMismatch);
        }

        let Some(prize) = self.prize_repo.get_by_id(prize_id).await? else {
            warn!("Prize redemption refused");
            return Err(LedgerError::RedemptionMismatch);
        };
        if prize.redeemed || normalize_code(&prize.code) != supplied {
            warn!("Prize redemption refused");
            return Err(LedgerError::RedemptionMismatch);
        }

        let now = Utc::now();
        let mut batch = WriteBatch::new();
        batch
            .require(
                UserPrize::COLLECTION,
                &prize.id,
                Condition::FieldEquals("redeemed".to_string(), json!(false)),
            )
            .update(
                UserPrize::COLLECTION,
                &prize.id,
                json!({
                    "redeemed": true,
                    "redeemedDate": now,
                    "redeemedByAdminId": admin_id,
                }),
            );

        match self.store.commit(batch).await {
            Ok(()) => {
                info!("Prize {} redeemed by admin {}", prize.id, admin_id);
                Ok(UserPrize {
                    redeemed: true,
                    redeemed_date: Some(now),
                    redeemed_by_admin_id: Some(admin_id.to_string()),
                    ..prize
                })
            }
            Err(e) if e.is_precondition_failed() => Err(LedgerError::RedemptionMismatch),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_prizes_for_user(&self, user_id: &str) -> LedgerResult<Vec<UserPrize>> {
        Ok(self.prize_repo.get_by_user(user_id).await?)
    }

    pub async fn get_prizes_for_raffle(&self, raffle_id: &str) -> LedgerResult<Vec<UserPrize>> {
        Ok(self.prize_repo.get_by_raffle(raffle_id).await?)
    }
}
