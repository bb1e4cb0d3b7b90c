use std::sync::Arc;

use chrono::{DateTime, Utc};
use rifa_db::DocumentStore;
use rifa_db::models::Record;
use rifa_db::models::commission::Commission;
use rifa_db::models::order::{OrderCodeClaim, OrderStatus, PurchaseOrder};
use rifa_db::models::ticket::Ticket;
use rifa_db::repositories::{OrderRepository, RaffleRepository, UserRepository, stage_insert};
use rifa_db::store::{Condition, WriteBatch};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::services::commission_service::{calculate_commissions, stage_commissions};
use crate::services::roulette_service::stage_grant;
use crate::services::ticket_service::{
    IssuancePlan, PurchaseSelection, ResolvedPurchase, check_capacity, check_quantity,
    plan_issuance, reserve_range, resolve_selection,
};

/// `ORD-YYYYMMDD-XXXXXXXX`, the suffix being eight uppercase hex digits.
pub fn generate_order_code(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

pub fn ensure_transition(from: OrderStatus, to: OrderStatus) -> LedgerResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(LedgerError::InvalidStateTransition { from, to })
    }
}

/// Who asks for a cancellation. Buyers may only cancel their own orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canceller<'a> {
    Owner(&'a str),
    Admin(&'a str),
}

impl Canceller<'_> {
    pub fn id(&self) -> &str {
        match self {
            Canceller::Owner(id) | Canceller::Admin(id) => id,
        }
    }

    pub fn may_cancel(&self, order: &PurchaseOrder) -> bool {
        match self {
            Canceller::Owner(id) => *id == order.user_id,
            Canceller::Admin(_) => true,
        }
    }
}

/// Idempotency key shared by the tickets and commissions an order produces.
pub fn order_sale_key(order_id: &str) -> String {
    format!("order:{}", order_id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub order: PurchaseOrder,
    pub tickets: Vec<Ticket>,
    pub commissions: Vec<Commission>,
    pub chances_granted: i64,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn DocumentStore>,
    order_repo: OrderRepository,
    raffle_repo: RaffleRepository,
    user_repo: UserRepository,
    max_commit_attempts: usize,
}

impl OrderService {
    pub fn new(store: Arc<dyn DocumentStore>, max_commit_attempts: usize) -> Self {
        Self {
            order_repo: OrderRepository::new(store.clone()),
            raffle_repo: RaffleRepository::new(store.clone()),
            user_repo: UserRepository::new(store.clone()),
            store,
            max_commit_attempts,
        }
    }

    pub async fn create_order(
        &self,
        user_id: &str,
        raffle_id: &str,
        selection: PurchaseSelection,
    ) -> LedgerResult<PurchaseOrder> {
        if let PurchaseSelection::Quantity(q) = selection {
            check_quantity(q)?;
        }
        let raffle = self
            .raffle_repo
            .get_by_id(raffle_id)
            .await?
            .ok_or(LedgerError::RaffleNotFound)?;
        if self.user_repo.get_by_id(user_id).await?.is_none() {
            return Err(LedgerError::UserNotFound);
        }
        let resolved = resolve_selection(&raffle, selection)?;
        check_capacity(&raffle, resolved.quantity)?;

        let id = Uuid::new_v4().to_string();
        for _ in 0..self.max_commit_attempts {
            let now = Utc::now();
            let order = PurchaseOrder {
                id: id.clone(),
                user_id: user_id.to_string(),
                raffle_id: raffle.id.clone(),
                quantity: resolved.quantity,
                total_price: resolved.total_price,
                order_code: generate_order_code(now),
                status: OrderStatus::Pending,
                purchased_pack_info: resolved.pack.clone(),
                ticket_ids: Vec::new(),
                payment_method: None,
                payment_notes: None,
                paid_at: None,
                paid_by_admin_id: None,
                verified_at: None,
                verified_by_admin_id: None,
                verification_notes: None,
                rejection_reason: None,
                rejected_at: None,
                rejected_by_admin_id: None,
                cancellation_reason: None,
                cancelled_at: None,
                cancelled_by: None,
                cancelled_by_admin: false,
                created_at: now,
            };
            let claim = OrderCodeClaim {
                code: order.order_code.clone(),
                order_id: order.id.clone(),
            };

            let mut batch = WriteBatch::new();
            stage_insert(&mut batch, &claim)?;
            stage_insert(&mut batch, &order)?;

            match self.store.commit(batch).await {
                Ok(()) => {
                    info!(
                        "Order {} created for {} ({} tickets, {} cents)",
                        order.order_code, user_id, order.quantity, order.total_price
                    );
                    return Ok(order);
                }
                Err(e) if e.is_precondition_failed() => {
                    warn!("Order code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Contention)
    }

    /// Admin confirms the funds arrived.
    pub async fn mark_paid(
        &self,
        order_id: &str,
        method: &str,
        notes: Option<&str>,
        admin_id: &str,
    ) -> LedgerResult<PurchaseOrder> {
        let now = Utc::now();
        self.transition(
            order_id,
            OrderStatus::Paid,
            json!({
                "paymentMethod": method,
                "paymentNotes": notes,
                "paidAt": now,
                "paidByAdminId": admin_id,
            }),
        )
        .await
    }

    pub async fn reject(
        &self,
        order_id: &str,
        reason: &str,
        admin_id: &str,
    ) -> LedgerResult<PurchaseOrder> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::MissingRejectionReason);
        }
        let now = Utc::now();
        self.transition(
            order_id,
            OrderStatus::Rejected,
            json!({
                "rejectionReason": reason,
                "rejectedAt": now,
                "rejectedByAdminId": admin_id,
            }),
        )
        .await
    }

    pub async fn cancel(
        &self,
        order_id: &str,
        reason: Option<&str>,
        by: Canceller<'_>,
    ) -> LedgerResult<PurchaseOrder> {
        let order = self.get_by_id(order_id).await?;
        if !by.may_cancel(&order) {
            warn!("Cancellation of {} refused for {}", order.order_code, by.id());
            return Err(LedgerError::NotOrderOwner);
        }
        let now = Utc::now();
        self.transition(
            order_id,
            OrderStatus::Cancelled,
            json!({
                "cancellationReason": reason.map(str::trim).filter(|r| !r.is_empty()),
                "cancelledAt": now,
                "cancelledBy": by.id(),
                "cancelledByAdmin": matches!(by, Canceller::Admin(_)),
            }),
        )
        .await
    }

    /// Moves the order to `to` with a write conditioned on the status that was read.
    async fn transition(
        &self,
        order_id: &str,
        to: OrderStatus,
        mut patch: Value,
    ) -> LedgerResult<PurchaseOrder> {
        let order = self.get_by_id(order_id).await?;
        ensure_transition(order.status, to)?;

        if let Some(fields) = patch.as_object_mut() {
            fields.insert("status".to_string(), json!(to));
        }
        let mut batch = WriteBatch::new();
        batch
            .require(
                PurchaseOrder::COLLECTION,
                &order.id,
                Condition::FieldEquals("status".to_string(), json!(order.status)),
            )
            .update(PurchaseOrder::COLLECTION, &order.id, patch);

        match self.store.commit(batch).await {
            Ok(()) => {
                info!("Order {}: {} -> {}", order.order_code, order.status, to);
                self.get_by_id(order_id).await
            }
            Err(e) if e.is_precondition_failed() => {
                let current = self.get_by_id(order_id).await?;
                Err(LedgerError::InvalidStateTransition {
                    from: current.status,
                    to,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// PAID -> VERIFIED. Tickets, raffle counters, upline commissions, the roulette grant
    /// and the order itself are committed as one batch; on any failure nothing is written.
    ///
    /// Ticket numbers are reserved before the commit, so direct sales on the same raffle never
    /// make a verification retry. Only the order status and the raffle cap guard the batch.
    pub async fn verify(
        &self,
        order_id: &str,
        admin_id: &str,
        notes: Option<&str>,
    ) -> LedgerResult<Verification> {
        for attempt in 1..=self.max_commit_attempts {
            let order = self.get_by_id(order_id).await?;
            ensure_transition(order.status, OrderStatus::Verified)?;

            let raffle = self
                .raffle_repo
                .get_by_id(&order.raffle_id)
                .await?
                .ok_or(LedgerError::RaffleNotFound)?;
            let buyer = self
                .user_repo
                .get_by_id(&order.user_id)
                .await?
                .ok_or(LedgerError::UserNotFound)?;
            check_quantity(order.quantity)?;
            check_capacity(&raffle, order.quantity)?;

            let first = reserve_range(&self.raffle_repo, &raffle.id, order.quantity).await?;
            let now = Utc::now();
            let key = order_sale_key(&order.id);
            let purchase = ResolvedPurchase {
                quantity: order.quantity,
                total_price: order.total_price,
                pack: order.purchased_pack_info.clone(),
            };
            let IssuancePlan { mut batch, tickets } =
                plan_issuance(&raffle, &buyer, &purchase, first, &key, Some(&order.id), now)?;

            let commissions = calculate_commissions(
                &key,
                order.total_price,
                &buyer.id,
                &buyer.upline,
                &raffle.id,
                now,
            );
            stage_commissions(&mut batch, &key, &commissions, now)?;

            let chances_granted = if raffle.has_available_extra_prizes() {
                stage_grant(&mut batch, &order.user_id, &raffle.id, order.quantity);
                order.quantity
            } else {
                0
            };

            let ticket_ids: Vec<String> = tickets.iter().map(|t| t.id.clone()).collect();
            batch
                .require(
                    PurchaseOrder::COLLECTION,
                    &order.id,
                    Condition::FieldEquals("status".to_string(), json!(OrderStatus::Paid)),
                )
                .update(
                    PurchaseOrder::COLLECTION,
                    &order.id,
                    json!({
                        "status": OrderStatus::Verified,
                        "ticketIds": ticket_ids,
                        "verifiedAt": now,
                        "verifiedByAdminId": admin_id,
                        "verificationNotes": notes,
                    }),
                );

            match self.store.commit(batch).await {
                Ok(()) => {
                    info!(
                        "Order {} verified: {} tickets, {} commissions, {} roulette chances",
                        order.order_code,
                        tickets.len(),
                        commissions.len(),
                        chances_granted
                    );
                    return Ok(Verification {
                        order: self.get_by_id(order_id).await?,
                        tickets,
                        commissions,
                        chances_granted,
                    });
                }
                // Another admin verified first or the raffle filled up; the next pass reports which.
                Err(e) if e.is_precondition_failed() => {
                    debug!("Verification of {} not committed (attempt {})", order.order_code, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Contention)
    }

    pub async fn get_by_id(&self, order_id: &str) -> LedgerResult<PurchaseOrder> {
        self.order_repo
            .get_by_id(order_id)
            .await?
            .ok_or(LedgerError::OrderNotFound)
    }

    pub async fn find_by_code(&self, code: &str) -> LedgerResult<PurchaseOrder> {
        self.order_repo
            .get_by_code(&code.trim().to_uppercase())
            .await?
            .ok_or(LedgerError::OrderNotFound)
    }

    pub async fn search_by_code(&self, fragment: &str) -> LedgerResult<Vec<PurchaseOrder>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.order_repo.search_by_code(fragment).await?)
    }

    pub async fn list_for_user(&self, user_id: &str) -> LedgerResult<Vec<PurchaseOrder>> {
        Ok(self.order_repo.get_by_user(user_id).await?)
    }

    pub async fn list_by_status(&self, status: OrderStatus) -> LedgerResult<Vec<PurchaseOrder>> {
        Ok(self.order_repo.get_by_status(status).await?)
    }
}
