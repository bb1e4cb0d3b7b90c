use std::sync::Arc;

use chrono::{DateTime, Utc};
use rifa_db::{DocumentStore, StoreError};
use rifa_db::models::Record;
use rifa_db::models::commission::Commission;
use rifa_db::models::raffle::Raffle;
use rifa_db::models::ticket::{PackInfo, Ticket, format_ticket_number};
use rifa_db::models::user::User;
use rifa_db::repositories::{
    CommissionRepository, RaffleRepository, TicketRepository, UserRepository, stage_insert,
};
use rifa_db::store::{Condition, WriteBatch};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{LedgerError, LedgerResult};
use crate::services::commission_service::{calculate_commissions, stage_commissions};

/// What the buyer asked for: loose tickets or one of the raffle's packs (by index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PurchaseSelection {
    Quantity(i64),
    Pack(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPurchase {
    pub quantity: i64,
    /// Cents.
    pub total_price: i64,
    pub pack: Option<PackInfo>,
}

/// Upper bound on the tickets one sale or order may issue.
pub const MAX_TICKETS_PER_PURCHASE: i64 = 10_000;

pub fn check_quantity(quantity: i64) -> LedgerResult<()> {
    if (1..=MAX_TICKETS_PER_PURCHASE).contains(&quantity) {
        Ok(())
    } else {
        Err(LedgerError::InvalidQuantity)
    }
}

pub fn resolve_selection(
    raffle: &Raffle,
    selection: PurchaseSelection,
) -> LedgerResult<ResolvedPurchase> {
    match selection {
        PurchaseSelection::Quantity(quantity) => {
            check_quantity(quantity)?;
            let total_price = quantity
                .checked_mul(raffle.ticket_price)
                .filter(|total| *total >= 0)
                .ok_or(LedgerError::InvalidQuantity)?;
            Ok(ResolvedPurchase {
                quantity,
                total_price,
                pack: None,
            })
        }
        PurchaseSelection::Pack(index) => {
            let pack = raffle
                .ticket_packs
                .get(index)
                .filter(|p| p.quantity > 0 && p.quantity <= MAX_TICKETS_PER_PURCHASE && p.price >= 0)
                .ok_or(LedgerError::InvalidPack)?;
            Ok(ResolvedPurchase {
                quantity: pack.quantity,
                total_price: pack.price,
                pack: Some(PackInfo::from(pack)),
            })
        }
    }
}

/// Splits `total` over `quantity` tickets; the remainder goes to the first ticket.
pub fn split_price(total: i64, quantity: i64) -> Vec<i64> {
    if quantity <= 0 {
        return Vec::new();
    }
    let base = total / quantity;
    let remainder = total - base * quantity;
    (0..quantity)
        .map(|i| if i == 0 { base + remainder } else { base })
        .collect()
}

pub struct IssuancePlan {
    pub batch: WriteBatch,
    pub tickets: Vec<Ticket>,
}

/// Builds the writes that issue `purchase.quantity` tickets numbered from `first_sequence`.
///
/// The range comes from `RaffleRepository::reserve_sequences`, so the batch carries no guard on
/// other sales. Counters move by increment; on capped raffles the batch only requires that
/// `soldTickets` still leaves room for this purchase.
pub fn plan_issuance(
    raffle: &Raffle,
    buyer: &User,
    purchase: &ResolvedPurchase,
    first_sequence: i64,
    sale_key: &str,
    order_id: Option<&str>,
    now: DateTime<Utc>,
) -> LedgerResult<IssuancePlan> {
    check_quantity(purchase.quantity)?;
    check_capacity(raffle, purchase.quantity)?;

    let fidelity = purchase
        .pack
        .as_ref()
        .map(|p| p.is_fidelity_pack)
        .unwrap_or(false);
    let tickets: Vec<Ticket> = split_price(purchase.total_price, purchase.quantity)
        .into_iter()
        .zip(first_sequence..)
        .map(|(price, sequence)| Ticket {
            id: Ticket::key(&raffle.id, sequence),
            raffle_id: raffle.id.clone(),
            user_id: buyer.id.clone(),
            original_user_id: buyer.id.clone(),
            ticket_number: format_ticket_number(&buyer.referral_code, sequence, fidelity),
            sequence,
            price,
            transfer_count: 0,
            purchased_pack_info: purchase.pack.clone(),
            sale_key: sale_key.to_string(),
            order_id: order_id.map(str::to_string),
            created_at: now,
        })
        .collect();

    let mut batch = WriteBatch::new();
    if let Some(max) = raffle.max_tickets {
        batch.require(
            Raffle::COLLECTION,
            &raffle.id,
            Condition::FieldAtMost("soldTickets".to_string(), max - purchase.quantity),
        );
    }
    for ticket in &tickets {
        stage_insert(&mut batch, ticket)?;
    }
    batch
        .increment(Raffle::COLLECTION, &raffle.id, "soldTickets", purchase.quantity, None)
        .increment(Raffle::COLLECTION, &raffle.id, "currentSales", purchase.total_price, None);

    Ok(IssuancePlan { batch, tickets })
}

/// Fails with `RaffleSoldOut` when the snapshot has no room for `quantity` more tickets.
pub fn check_capacity(raffle: &Raffle, quantity: i64) -> LedgerResult<()> {
    match raffle.remaining_tickets() {
        Some(remaining) if quantity > remaining => Err(LedgerError::RaffleSoldOut),
        _ => Ok(()),
    }
}

/// Claims `quantity` sequence numbers on the raffle and returns the first.
pub async fn reserve_range(
    raffle_repo: &RaffleRepository,
    raffle_id: &str,
    quantity: i64,
) -> LedgerResult<i64> {
    match raffle_repo.reserve_sequences(raffle_id, quantity).await {
        Ok(first) => Ok(first),
        Err(StoreError::NotFound { .. }) => Err(LedgerError::RaffleNotFound),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub tickets: Vec<Ticket>,
    pub commissions: Vec<Commission>,
}

#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn DocumentStore>,
    raffle_repo: RaffleRepository,
    user_repo: UserRepository,
    ticket_repo: TicketRepository,
    commission_repo: CommissionRepository,
    max_commit_attempts: usize,
}

impl TicketService {
    pub fn new(store: Arc<dyn DocumentStore>, max_commit_attempts: usize) -> Self {
        Self {
            raffle_repo: RaffleRepository::new(store.clone()),
            user_repo: UserRepository::new(store.clone()),
            ticket_repo: TicketRepository::new(store.clone()),
            commission_repo: CommissionRepository::new(store.clone()),
            store,
            max_commit_attempts,
        }
    }

    pub fn sale_key(batch_id: &str) -> String {
        format!("sale:{}", batch_id)
    }

    /// Direct sale: issues the tickets and the buyer's upline commissions in one commit.
    /// `batch_id` identifies the sale; retrying with the same id returns the first result.
    ///
    /// Ticket numbers are claimed up front with an atomic reservation, so concurrent sales never
    /// compete for the same range. A commit that fails leaves its range unused.
    pub async fn purchase(
        &self,
        batch_id: &str,
        buyer_id: &str,
        raffle_id: &str,
        selection: PurchaseSelection,
    ) -> LedgerResult<Purchase> {
        if let PurchaseSelection::Quantity(q) = selection {
            check_quantity(q)?;
        }
        let key = Self::sale_key(batch_id);

        for attempt in 1..=self.max_commit_attempts {
            if self.commission_repo.get_batch(&key).await?.is_some() {
                return self.replay(&key).await;
            }

            let raffle = self
                .raffle_repo
                .get_by_id(raffle_id)
                .await?
                .ok_or(LedgerError::RaffleNotFound)?;
            let buyer = self
                .user_repo
                .get_by_id(buyer_id)
                .await?
                .ok_or(LedgerError::UserNotFound)?;
            let resolved = resolve_selection(&raffle, selection)?;
            check_capacity(&raffle, resolved.quantity)?;

            let first = reserve_range(&self.raffle_repo, &raffle.id, resolved.quantity).await?;
            let now = Utc::now();
            let IssuancePlan { mut batch, tickets } =
                plan_issuance(&raffle, &buyer, &resolved, first, &key, None, now)?;
            let commissions = calculate_commissions(
                &key,
                resolved.total_price,
                &buyer.id,
                &buyer.upline,
                &raffle.id,
                now,
            );
            stage_commissions(&mut batch, &key, &commissions, now)?;

            match self.store.commit(batch).await {
                Ok(()) => {
                    info!(
                        "Sold {} tickets of raffle {} to {} ({} cents, {} commissions)",
                        tickets.len(),
                        raffle.id,
                        buyer.id,
                        resolved.total_price,
                        commissions.len()
                    );
                    return Ok(Purchase {
                        tickets,
                        commissions,
                    });
                }
                // Either the same sale committed first or the raffle filled up; the next
                // pass replays or reports sold out.
                Err(e) if e.is_precondition_failed() => {
                    debug!("Sale {} on raffle {} not committed (attempt {})", key, raffle.id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Contention)
    }

    async fn replay(&self, key: &str) -> LedgerResult<Purchase> {
        Ok(Purchase {
            tickets: self.ticket_repo.get_by_sale_key(key).await?,
            commissions: self.commission_repo.get_by_batch_key(key).await?,
        })
    }

    /// Hands a ticket to another user. The purchaser attribution never changes.
    pub async fn transfer(
        &self,
        ticket_id: &str,
        from_user_id: &str,
        to_user_id: &str,
    ) -> LedgerResult<Ticket> {
        if self.user_repo.get_by_id(to_user_id).await?.is_none() {
            return Err(LedgerError::UserNotFound);
        }

        for _ in 0..self.max_commit_attempts {
            let ticket = self.get_ticket(ticket_id).await?;
            if ticket.user_id != from_user_id {
                return Err(LedgerError::NotTicketOwner);
            }
            if from_user_id == to_user_id {
                return Ok(ticket);
            }
            if !ticket.can_transfer() {
                return Err(LedgerError::TransferLimitReached);
            }

            let mut batch = WriteBatch::new();
            batch
                .require(
                    Ticket::COLLECTION,
                    &ticket.id,
                    Condition::FieldEquals("userId".to_string(), json!(from_user_id)),
                )
                .require(
                    Ticket::COLLECTION,
                    &ticket.id,
                    Condition::FieldEquals("transferCount".to_string(), json!(ticket.transfer_count)),
                )
                .update(
                    Ticket::COLLECTION,
                    &ticket.id,
                    json!({
                        "userId": to_user_id,
                        "transferCount": ticket.transfer_count + 1,
                    }),
                );

            match self.store.commit(batch).await {
                Ok(()) => {
                    info!(
                        "Ticket {} transferred {} -> {} ({} of 3)",
                        ticket.ticket_number,
                        from_user_id,
                        to_user_id,
                        ticket.transfer_count + 1
                    );
                    return self.get_ticket(ticket_id).await;
                }
                Err(e) if e.is_precondition_failed() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Contention)
    }

    pub async fn get_ticket(&self, ticket_id: &str) -> LedgerResult<Ticket> {
        self.ticket_repo
            .get_by_id(ticket_id)
            .await?
            .ok_or(LedgerError::TicketNotFound)
    }

    pub async fn get_tickets_for_user(&self, user_id: &str) -> LedgerResult<Vec<Ticket>> {
        Ok(self.ticket_repo.get_by_holder(user_id).await?)
    }

    pub async fn get_raffle_tickets(&self, raffle_id: &str) -> LedgerResult<Vec<Ticket>> {
        Ok(self.ticket_repo.get_by_raffle(raffle_id).await?)
    }
}
