use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rifa_db::DocumentStore;
use rifa_db::models::Record;
use rifa_db::models::prize::UserPrize;
use rifa_db::models::raffle::{ExtraPrize, Raffle};
use rifa_db::models::roulette::RouletteChance;
use rifa_db::repositories::{RaffleRepository, RouletteRepository, encode, stage_insert};
use rifa_db::store::{Condition, WriteBatch};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::services::prize_service::generate_redemption_code;

/// Adds `amount` chances for the pair to `batch`, creating the record on first grant.
pub fn stage_grant(batch: &mut WriteBatch, user_id: &str, raffle_id: &str, amount: i64) {
    let id = RouletteChance::key(user_id, raffle_id);
    let seed = json!({
        "id": id,
        "userId": user_id,
        "raffleId": raffle_id,
        "chances": 0,
    });
    batch.increment(RouletteChance::COLLECTION, &id, "chances", amount, Some(seed));
}

/// Index of the prize that `roll` lands on, each prize weighted by its remaining quantity.
/// `roll` must be below the total remaining quantity.
pub fn pick_prize(prizes: &[ExtraPrize], roll: i64) -> Option<usize> {
    let mut acc = 0;
    for (index, prize) in prizes.iter().enumerate() {
        if prize.quantity <= 0 {
            continue;
        }
        acc += prize.quantity;
        if roll < acc {
            return Some(index);
        }
    }
    None
}

fn roll_below(total: i64) -> i64 {
    rand::rng().random_range(0..total)
}

#[derive(Clone)]
pub struct RouletteService {
    store: Arc<dyn DocumentStore>,
    roulette_repo: RouletteRepository,
    raffle_repo: RaffleRepository,
    max_commit_attempts: usize,
}

impl RouletteService {
    pub fn new(store: Arc<dyn DocumentStore>, max_commit_attempts: usize) -> Self {
        Self {
            roulette_repo: RouletteRepository::new(store.clone()),
            raffle_repo: RaffleRepository::new(store.clone()),
            store,
            max_commit_attempts,
        }
    }

    pub async fn increment(&self, user_id: &str, raffle_id: &str, amount: i64) -> LedgerResult<i64> {
        if amount <= 0 {
            return Err(LedgerError::InvalidQuantity);
        }
        let mut batch = WriteBatch::new();
        stage_grant(&mut batch, user_id, raffle_id, amount);
        self.store.commit(batch).await?;

        let balance = self.balance(user_id, raffle_id).await?;
        info!("Granted {} roulette chances to {} in raffle {}", amount, user_id, raffle_id);
        Ok(balance)
    }

    /// Consumes one chance. Never takes the balance below zero.
    pub async fn decrement(&self, user_id: &str, raffle_id: &str) -> LedgerResult<i64> {
        let id = RouletteChance::key(user_id, raffle_id);
        let mut batch = WriteBatch::new();
        batch
            .require(
                RouletteChance::COLLECTION,
                &id,
                Condition::FieldAtLeast("chances".to_string(), 1),
            )
            .increment(RouletteChance::COLLECTION, &id, "chances", -1, None);

        match self.store.commit(batch).await {
            Ok(()) => self.balance(user_id, raffle_id).await,
            Err(e) if e.is_precondition_failed() => Err(LedgerError::InsufficientChances),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn balance(&self, user_id: &str, raffle_id: &str) -> LedgerResult<i64> {
        Ok(self.roulette_repo.balance(user_id, raffle_id).await?)
    }

    pub async fn get_chances_for_user(&self, user_id: &str) -> LedgerResult<Vec<RouletteChance>> {
        Ok(self.roulette_repo.get_by_user(user_id).await?)
    }

    /// Spends one chance on a random extra prize of the raffle.
    ///
    /// The chance, the prize stock and the new `UserPrize` are written together, guarded on the
    /// balance and on the prize list that was read, so two spins cannot win the last unit.
    pub async fn spin(&self, user_id: &str, raffle_id: &str) -> LedgerResult<UserPrize> {
        let chance_id = RouletteChance::key(user_id, raffle_id);

        for attempt in 1..=self.max_commit_attempts {
            if self.balance(user_id, raffle_id).await? < 1 {
                return Err(LedgerError::InsufficientChances);
            }
            let raffle = self
                .raffle_repo
                .get_by_id(raffle_id)
                .await?
                .ok_or(LedgerError::RaffleNotFound)?;

            let total: i64 = raffle
                .extra_prizes
                .iter()
                .map(|p| p.quantity.max(0))
                .sum();
            if total == 0 {
                return Err(LedgerError::NoPrizesAvailable);
            }
            let index =
                pick_prize(&raffle.extra_prizes, roll_below(total)).ok_or(LedgerError::NoPrizesAvailable)?;

            let mut remaining = raffle.extra_prizes.clone();
            remaining[index].quantity -= 1;
            let won = &raffle.extra_prizes[index];
            let prize = UserPrize {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                prize_id: won.id.clone(),
                prize_name: won.name.clone(),
                raffle_id: raffle_id.to_string(),
                date_won: Utc::now(),
                code: generate_redemption_code(),
                redeemed: false,
                redeemed_date: None,
                redeemed_by_admin_id: None,
            };

            let mut batch = WriteBatch::new();
            batch
                .require(
                    RouletteChance::COLLECTION,
                    &chance_id,
                    Condition::FieldAtLeast("chances".to_string(), 1),
                )
                .require(
                    Raffle::COLLECTION,
                    raffle_id,
                    Condition::FieldEquals("extraPrizes".to_string(), encode(&raffle.extra_prizes)?),
                )
                .increment(RouletteChance::COLLECTION, &chance_id, "chances", -1, None)
                .update(
                    Raffle::COLLECTION,
                    raffle_id,
                    json!({ "extraPrizes": encode(&remaining)? }),
                );
            stage_insert(&mut batch, &prize)?;

            match self.store.commit(batch).await {
                Ok(()) => {
                    info!("User {} won '{}' in raffle {}", user_id, prize.prize_name, raffle_id);
                    return Ok(prize);
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!("Spin for {} in raffle {} raced (attempt {})", user_id, raffle_id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Contention)
    }
}
