use std::sync::Arc;

use chrono::{DateTime, Utc};
use rifa_db::DocumentStore;
use rifa_db::models::Record;
use rifa_db::models::commission::{Commission, CommissionBatch, CommissionLevel, CommissionStatus};
use rifa_db::repositories::{CommissionRepository, encode, stage_insert};
use rifa_db::store::{Condition, WriteBatch};
use serde_json::json;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};

/// Commission rate per upline level in basis points: 20%, 10%, 5%.
/// This is the only schedule; every sale path uses it.
pub const COMMISSION_RATES_BPS: [i64; 3] = [2_000, 1_000, 500];

pub fn commission_rate_bps(level: CommissionLevel) -> i64 {
    COMMISSION_RATES_BPS[level.upline_index()]
}

/// Amount in cents a level earns on a sale, rounded down.
/// Computed in 128 bits; the result never exceeds the sale amount.
pub fn commission_amount(sale_amount: i64, level: CommissionLevel) -> i64 {
    let amount = i128::from(sale_amount) * i128::from(commission_rate_bps(level)) / 10_000;
    amount as i64
}

pub fn commission_id(batch_key: &str, level: CommissionLevel) -> String {
    format!("{}:L{}", batch_key, level.get())
}

/// One PENDING commission per present upline level, at most three.
pub fn calculate_commissions(
    batch_key: &str,
    sale_amount: i64,
    source_user_id: &str,
    upline: &[String],
    raffle_id: &str,
    now: DateTime<Utc>,
) -> Vec<Commission> {
    upline
        .iter()
        .zip(1..=CommissionLevel::MAX)
        .filter_map(|(beneficiary, level)| {
            let level = CommissionLevel::try_from(level).ok()?;
            Some(Commission {
                id: commission_id(batch_key, level),
                user_id: beneficiary.clone(),
                source_user_id: source_user_id.to_string(),
                raffle_id: raffle_id.to_string(),
                level,
                amount: commission_amount(sale_amount, level),
                status: CommissionStatus::Pending,
                batch_key: batch_key.to_string(),
                payment_method: None,
                notes: None,
                paid_at: None,
                paid_by_admin_id: None,
                reverted_at: None,
                reverted_by_admin_id: None,
                revert_reason: None,
                created_at: now,
            })
        })
        .collect()
}

/// Adds the commissions and their idempotency marker to `batch`. The batch fails
/// its preconditions if `batch_key` was already used.
pub fn stage_commissions(
    batch: &mut WriteBatch,
    batch_key: &str,
    commissions: &[Commission],
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    let marker = CommissionBatch {
        key: batch_key.to_string(),
        commission_ids: commissions.iter().map(|c| c.id.clone()).collect(),
        created_at: now,
    };
    stage_insert(batch, &marker)?;
    for commission in commissions {
        stage_insert(batch, commission)?;
    }
    Ok(())
}

fn append_note(existing: Option<&str>, now: DateTime<Utc>, line: &str) -> String {
    let entry = format!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S UTC"), line);
    match existing {
        Some(prev) if !prev.is_empty() => format!("{}\n{}", prev, entry),
        _ => entry,
    }
}

#[derive(Clone)]
pub struct CommissionService {
    store: Arc<dyn DocumentStore>,
    commission_repo: CommissionRepository,
}

impl CommissionService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let commission_repo = CommissionRepository::new(store.clone());
        Self {
            store,
            commission_repo,
        }
    }

    /// Persists the commissions for one sale. Replaying the same `batch_key`
    /// returns what was recorded the first time and writes nothing.
    pub async fn record_commissions(
        &self,
        batch_key: &str,
        sale_amount: i64,
        source_user_id: &str,
        upline: &[String],
        raffle_id: &str,
    ) -> LedgerResult<Vec<Commission>> {
        if self.commission_repo.get_batch(batch_key).await?.is_some() {
            return Ok(self.commission_repo.get_by_batch_key(batch_key).await?);
        }

        let now = Utc::now();
        let commissions =
            calculate_commissions(batch_key, sale_amount, source_user_id, upline, raffle_id, now);
        let mut batch = WriteBatch::new();
        stage_commissions(&mut batch, batch_key, &commissions, now)?;

        match self.store.commit(batch).await {
            Ok(()) => {
                info!(
                    "Recorded {} commissions for sale {} ({} cents)",
                    commissions.len(),
                    batch_key,
                    sale_amount
                );
                Ok(commissions)
            }
            Err(e) if e.is_precondition_failed() => {
                Ok(self.commission_repo.get_by_batch_key(batch_key).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_by_id(&self, id: &str) -> LedgerResult<Commission> {
        self.commission_repo
            .get_by_id(id)
            .await?
            .ok_or(LedgerError::CommissionNotFound)
    }

    pub async fn get_for_user(&self, user_id: &str) -> LedgerResult<Vec<Commission>> {
        let mut commissions = self.commission_repo.get_by_beneficiary(user_id).await?;
        commissions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(commissions)
    }

    pub async fn get_pending_for_user(&self, user_id: &str) -> LedgerResult<Vec<Commission>> {
        Ok(self
            .commission_repo
            .get_by_beneficiary_and_status(user_id, CommissionStatus::Pending)
            .await?)
    }

    /// Commissions a user earned at one upline level (1 to 3).
    pub async fn get_for_user_at_level(&self, user_id: &str, level: u8) -> LedgerResult<Vec<Commission>> {
        let level = CommissionLevel::try_from(level)?;
        Ok(self
            .commission_repo
            .get_by_beneficiary(user_id)
            .await?
            .into_iter()
            .filter(|c| c.level == level)
            .collect())
    }

    pub async fn mark_paid(
        &self,
        id: &str,
        method: &str,
        notes: Option<&str>,
        admin_id: &str,
    ) -> LedgerResult<Commission> {
        let commission = self.get_by_id(id).await?;
        let now = Utc::now();
        let mut line = format!("Paid via {} by admin {}", method, admin_id);
        if let Some(extra) = notes.map(str::trim).filter(|n| !n.is_empty()) {
            line.push_str(&format!(": {}", extra));
        }
        let patch = json!({
            "status": CommissionStatus::Paid,
            "paymentMethod": method,
            "paidAt": now,
            "paidByAdminId": admin_id,
            "notes": append_note(commission.notes.as_deref(), now, &line),
        });
        self.move_status(commission, CommissionStatus::Paid, patch)
            .await
    }

    /// Returns a paid commission to PENDING, keeping the payment history in the notes.
    pub async fn revert_payment(
        &self,
        id: &str,
        reason: &str,
        admin_id: &str,
    ) -> LedgerResult<Commission> {
        let commission = self.get_by_id(id).await?;
        let now = Utc::now();
        let line = format!("Payment reverted by admin {}: {}", admin_id, reason.trim());
        let patch = json!({
            "status": CommissionStatus::Pending,
            "revertedAt": now,
            "revertedByAdminId": admin_id,
            "revertReason": reason.trim(),
            "notes": append_note(commission.notes.as_deref(), now, &line),
        });
        self.move_status(commission, CommissionStatus::Pending, patch)
            .await
    }

    async fn move_status(
        &self,
        commission: Commission,
        to: CommissionStatus,
        patch: serde_json::Value,
    ) -> LedgerResult<Commission> {
        let from = commission.status;
        let allowed = matches!(
            (from, to),
            (CommissionStatus::Pending, CommissionStatus::Paid)
                | (CommissionStatus::Paid, CommissionStatus::Pending)
        );
        if !allowed {
            return Err(LedgerError::InvalidCommissionTransition { from, to });
        }

        let mut batch = WriteBatch::new();
        batch
            .require(
                Commission::COLLECTION,
                &commission.id,
                Condition::FieldEquals("status".to_string(), encode(&from)?),
            )
            .update(Commission::COLLECTION, &commission.id, patch);

        match self.store.commit(batch).await {
            Ok(()) => {}
            // Someone else moved it first.
            Err(e) if e.is_precondition_failed() => {
                let current = self.get_by_id(&commission.id).await?;
                return Err(LedgerError::InvalidCommissionTransition {
                    from: current.status,
                    to,
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!("Commission {} moved {} -> {}", commission.id, from, to);
        self.get_by_id(&commission.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::memory_store;

    fn upline(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("U{}", i)).collect()
    }

    #[test]
    fn schedule_is_twenty_ten_five_percent() {
        assert_eq!(COMMISSION_RATES_BPS, [2_000, 1_000, 500]);
        let level = |n| CommissionLevel::try_from(n).unwrap();
        assert_eq!(commission_amount(10_000, level(1)), 2_000);
        assert_eq!(commission_amount(10_000, level(2)), 1_000);
        assert_eq!(commission_amount(10_000, level(3)), 500);
    }

    #[test]
    fn large_sales_do_not_overflow_the_rate_multiplication() {
        let level = |n| CommissionLevel::try_from(n).unwrap();
        assert_eq!(commission_amount(i64::MAX, level(1)), i64::MAX / 5);
        assert_eq!(commission_amount(i64::MAX, level(3)), i64::MAX / 20);
        assert_eq!(commission_amount(4_611_686_018_427_387_904, level(2)), 461_168_601_842_738_790);
    }

    #[test]
    fn one_pending_commission_per_present_level() {
        for len in 0..=5 {
            let commissions =
                calculate_commissions("sale:x", 10_000, "buyer", &upline(len), "r1", Utc::now());
            assert_eq!(commissions.len(), len.min(3));
            for (i, c) in commissions.iter().enumerate() {
                assert_eq!(c.status, CommissionStatus::Pending);
                assert_eq!(c.level.get() as usize, i + 1);
                assert_eq!(c.amount, 10_000 * COMMISSION_RATES_BPS[i] / 10_000);
                assert_eq!(c.user_id, format!("U{}", i + 1));
            }
        }
    }

    #[test]
    fn amounts_round_down_to_the_cent() {
        let commissions = calculate_commissions("k", 999, "b", &upline(3), "r", Utc::now());
        let amounts: Vec<i64> = commissions.iter().map(|c| c.amount).collect();
        assert_eq!(amounts, vec![199, 99, 49]);
    }

    #[tokio::test]
    async fn replaying_a_sale_does_not_pay_twice() {
        let store = memory_store();
        let service = CommissionService::new(store.clone());

        let first = service
            .record_commissions("sale:1", 10_000, "buyer", &upline(3), "r1")
            .await
            .unwrap();
        let second = service
            .record_commissions("sale:1", 10_000, "buyer", &upline(3), "r1")
            .await
            .unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(
            first.iter().map(|c| &c.id).collect::<Vec<_>>(),
            second.iter().map(|c| &c.id).collect::<Vec<_>>()
        );
        let all = CommissionRepository::new(store).get_all().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn level_lookup_rejects_levels_outside_one_to_three() {
        let service = CommissionService::new(memory_store());
        service
            .record_commissions("sale:9", 1_000, "buyer", &upline(2), "r1")
            .await
            .unwrap();

        let level_two = service.get_for_user_at_level("U2", 2).await.unwrap();
        assert_eq!(level_two.len(), 1);
        assert_eq!(level_two[0].amount, 100);
        assert!(service.get_for_user_at_level("U2", 1).await.unwrap().is_empty());
        for bad in [0, 4] {
            assert!(matches!(
                service.get_for_user_at_level("U2", bad).await,
                Err(LedgerError::InvalidCommissionLevel)
            ));
        }
    }

    #[tokio::test]
    async fn pay_and_revert_keep_an_audit_trail() {
        let store = memory_store();
        let service = CommissionService::new(store.clone());
        let recorded = service
            .record_commissions("sale:2", 5_000, "buyer", &upline(1), "r1")
            .await
            .unwrap();
        let id = recorded[0].id.clone();

        let paid = service
            .mark_paid(&id, "bank transfer", Some("batch 7"), "admin1")
            .await
            .unwrap();
        assert_eq!(paid.status, CommissionStatus::Paid);
        assert_eq!(paid.paid_by_admin_id.as_deref(), Some("admin1"));

        let err = service
            .mark_paid(&id, "cash", None, "admin2")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidCommissionTransition { .. }));

        let reverted = service
            .revert_payment(&id, "chargeback", "admin1")
            .await
            .unwrap();
        assert_eq!(reverted.status, CommissionStatus::Pending);
        assert_eq!(reverted.revert_reason.as_deref(), Some("chargeback"));
        let notes = reverted.notes.unwrap();
        assert!(notes.contains("Paid via bank transfer by admin admin1: batch 7"));
        assert!(notes.contains("Payment reverted by admin admin1: chargeback"));
        assert_eq!(notes.lines().count(), 2);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_partial_commission_set() {
        let store = Arc::new(rifa_db::MemoryStore::new());
        let service = CommissionService::new(store.clone());
        store.fail_next_commits(1);

        assert!(
            service
                .record_commissions("sale:3", 10_000, "buyer", &upline(3), "r1")
                .await
                .is_err()
        );
        let repo = CommissionRepository::new(store);
        assert!(repo.get_all().await.unwrap().is_empty());
        assert!(repo.get_batch("sale:3").await.unwrap().is_none());
    }
}
