use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use rifa_db::DocumentStore;
use rifa_db::models::user::{MAX_UPLINE_DEPTH, ReferralCodeClaim, User};
use rifa_db::repositories::{RaffleRepository, TicketRepository, UserRepository, stage_insert};
use rifa_db::store::WriteBatch;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Option<String>,
    /// Referral code of the inviting user, if any.
    pub referral_code: Option<String>,
}

pub fn generate_referral_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

pub fn normalize_referral_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Upline for a user invited by `referrer`: the referrer followed by the
/// referrer's own upline, capped at three entries.
pub fn build_upline(referrer: &User) -> Vec<String> {
    std::iter::once(referrer.id.clone())
        .chain(referrer.upline.iter().cloned())
        .take(MAX_UPLINE_DEPTH)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub name: String,
    pub tickets: i64,
    pub medal: Option<String>,
}

fn mask_name(name: &str) -> String {
    let len = name.chars().count();
    if len <= 3 {
        return "***".to_string();
    }
    let visible = if len > 6 { 3 } else { 1 };
    format!("{}***", name.chars().take(visible).collect::<String>())
}

fn medal_for(rank: usize) -> Option<String> {
    match rank {
        1 => Some("🥇".to_string()),
        2 => Some("🥈".to_string()),
        3 => Some("🥉".to_string()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct ReferralService {
    store: Arc<dyn DocumentStore>,
    user_repo: UserRepository,
    raffle_repo: RaffleRepository,
    ticket_repo: TicketRepository,
    max_commit_attempts: usize,
}

impl ReferralService {
    pub fn new(store: Arc<dyn DocumentStore>, max_commit_attempts: usize) -> Self {
        Self {
            user_repo: UserRepository::new(store.clone()),
            raffle_repo: RaffleRepository::new(store.clone()),
            ticket_repo: TicketRepository::new(store.clone()),
            store,
            max_commit_attempts,
        }
    }

    /// Looks up the inviting user. An unknown code is an error, an absent one is not.
    pub async fn resolve_referrer(&self, code: Option<&str>) -> LedgerResult<Option<User>> {
        let Some(code) = code.map(normalize_referral_code).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        match self.user_repo.get_by_referral_code(&code).await? {
            Some(referrer) => Ok(Some(referrer)),
            None => Err(LedgerError::InvalidReferralCode),
        }
    }

    pub async fn register_user(&self, new_user: NewUser) -> LedgerResult<User> {
        let referrer = self.resolve_referrer(new_user.referral_code.as_deref()).await?;
        let upline = referrer.as_ref().map(build_upline).unwrap_or_default();
        let referred_by = referrer.map(|r| r.id);

        let id = Uuid::new_v4().to_string();
        for _ in 0..self.max_commit_attempts {
            let user = User {
                id: id.clone(),
                name: new_user.name.trim().to_string(),
                email: new_user.email.clone(),
                referral_code: generate_referral_code(),
                referred_by: referred_by.clone(),
                upline: upline.clone(),
                created_at: Utc::now(),
            };
            let claim = ReferralCodeClaim {
                code: user.referral_code.clone(),
                user_id: user.id.clone(),
            };

            let mut batch = WriteBatch::new();
            stage_insert(&mut batch, &user)?;
            stage_insert(&mut batch, &claim)?;

            match self.store.commit(batch).await {
                Ok(()) => {
                    info!(
                        "Registered user {} (referred by {:?}, upline depth {})",
                        user.id,
                        user.referred_by,
                        user.upline.len()
                    );
                    return Ok(user);
                }
                Err(e) if e.is_precondition_failed() => {
                    warn!("Referral code collision during signup, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Contention)
    }

    pub async fn get_user(&self, user_id: &str) -> LedgerResult<User> {
        self.user_repo
            .get_by_id(user_id)
            .await?
            .ok_or(LedgerError::UserNotFound)
    }

    /// The upline captured at signup.
    pub async fn get_upline(&self, user_id: &str) -> LedgerResult<Vec<String>> {
        Ok(self.get_user(user_id).await?.upline)
    }

    /// Top buyers of a raffle. Tickets count for their purchaser, not their current holder.
    pub async fn get_leaderboard(
        &self,
        raffle_id: &str,
        limit: usize,
    ) -> LedgerResult<Vec<LeaderboardEntry>> {
        if self.raffle_repo.get_by_id(raffle_id).await?.is_none() {
            return Err(LedgerError::RaffleNotFound);
        }

        let mut counts: HashMap<String, i64> = HashMap::new();
        for ticket in self.ticket_repo.get_by_raffle(raffle_id).await? {
            *counts.entry(ticket.original_user_id).or_default() += 1;
        }
        let mut ranked: Vec<(String, i64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);

        let mut entries = Vec::with_capacity(ranked.len());
        for (index, (user_id, tickets)) in ranked.into_iter().enumerate() {
            let rank = index + 1;
            let name = self
                .user_repo
                .get_by_id(&user_id)
                .await?
                .map(|u| u.name)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Anonymous".to_string());
            entries.push(LeaderboardEntry {
                rank,
                name: mask_name(&name),
                tickets,
                medal: medal_for(rank),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{ATTEMPTS, memory_store, raffle, seed_raffle, seed_user};
    use crate::services::ticket_service::{PurchaseSelection, TicketService};

    fn new_user(name: &str, code: Option<&str>) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: None,
            referral_code: code.map(str::to_string),
        }
    }

    #[test]
    fn referral_codes_are_eight_upper_alphanumerics() {
        let code = generate_referral_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn upline_is_capped_at_three_ancestors() {
        let store = memory_store();
        let service = ReferralService::new(store.clone(), ATTEMPTS);

        let a = service.register_user(new_user("a", None)).await.unwrap();
        let b = service
            .register_user(new_user("b", Some(&a.referral_code)))
            .await
            .unwrap();
        let c = service
            .register_user(new_user("c", Some(&b.referral_code)))
            .await
            .unwrap();
        let d = service
            .register_user(new_user("d", Some(&c.referral_code)))
            .await
            .unwrap();
        let e = service
            .register_user(new_user("e", Some(&d.referral_code.to_lowercase())))
            .await
            .unwrap();

        assert!(a.upline.is_empty());
        assert_eq!(b.upline, vec![a.id.clone()]);
        assert_eq!(d.upline, vec![c.id.clone(), b.id.clone(), a.id.clone()]);
        assert_eq!(e.upline, vec![d.id.clone(), c.id.clone(), b.id.clone()]);
        assert_eq!(e.referred_by.as_deref(), Some(d.id.as_str()));
    }

    #[tokio::test]
    async fn unknown_referral_code_fails_signup() {
        let store = memory_store();
        let service = ReferralService::new(store.clone(), ATTEMPTS);

        let err = service
            .register_user(new_user("x", Some("NOPE1234")))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidReferralCode));
        assert!(UserRepository::new(store).get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upline_is_a_snapshot_of_the_referrer() {
        let store = memory_store();
        seed_user(&store, "u1", None, &[]).await;
        let u2 = seed_user(&store, "u2", Some("u1"), &["u1"]).await;
        let service = ReferralService::new(store.clone(), ATTEMPTS);

        let child = service
            .register_user(new_user("child", Some(&u2.referral_code)))
            .await
            .unwrap();
        assert_eq!(child.upline, vec!["u2".to_string(), "u1".to_string()]);
        assert_eq!(service.get_upline(&child.id).await.unwrap(), child.upline);
    }

    #[test]
    fn names_are_masked() {
        assert_eq!(mask_name("Ana"), "***");
        assert_eq!(mask_name("Maria"), "M***");
        assert_eq!(mask_name("Francisco"), "Fra***");
        assert_eq!(mask_name("Joãozinho"), "Joã***");
    }

    #[tokio::test]
    async fn leaderboard_ranks_purchasers_with_medals() {
        let store = memory_store();
        seed_user(&store, "alpha", None, &[]).await;
        seed_user(&store, "beta", None, &[]).await;
        seed_user(&store, "gamma", None, &[]).await;
        seed_raffle(&store, raffle("r1", 100)).await;
        let tickets = TicketService::new(store.clone(), ATTEMPTS);
        for (batch, user, qty) in [("1", "beta", 3), ("2", "alpha", 1), ("3", "gamma", 2)] {
            tickets
                .purchase(batch, user, "r1", PurchaseSelection::Quantity(qty))
                .await
                .unwrap();
        }
        let first = tickets.get_tickets_for_user("beta").await.unwrap().remove(0);
        tickets.transfer(&first.id, "beta", "alpha").await.unwrap();

        let service = ReferralService::new(store, ATTEMPTS);
        let board = service.get_leaderboard("r1", 2).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!((board[0].rank, board[0].tickets), (1, 3));
        assert_eq!(board[0].name, "Use***");
        assert_eq!(board[0].medal.as_deref(), Some("🥇"));
        assert_eq!(board[1].tickets, 2);
        assert_eq!(board[1].medal.as_deref(), Some("🥈"));
    }
}
