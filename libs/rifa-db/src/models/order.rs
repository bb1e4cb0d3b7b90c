use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Record;
use super::ticket::PackInfo;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Verified,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Verified => "VERIFIED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Verified | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// The complete order state machine.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Paid, Verified)
                | (Paid, Rejected)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub id: String,
    pub user_id: String,
    pub raffle_id: String,
    pub quantity: i64,
    /// Cents.
    pub total_price: i64,
    pub order_code: String,
    pub status: OrderStatus,
    pub purchased_pack_info: Option<PackInfo>,
    /// Filled only when the order is verified.
    #[serde(default)]
    pub ticket_ids: Vec<String>,
    pub payment_method: Option<String>,
    pub payment_notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by_admin_id: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by_admin_id: Option<String>,
    pub verification_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by_admin_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    /// Set when `cancelled_by` is an admin rather than the buyer.
    #[serde(default)]
    pub cancelled_by_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl Record for PurchaseOrder {
    const COLLECTION: &'static str = "purchase_orders";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Reservation of an order code, keyed by the code itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCodeClaim {
    pub code: String,
    pub order_id: String,
}

impl Record for OrderCodeClaim {
    const COLLECTION: &'static str = "order_codes";

    fn id(&self) -> &str {
        &self.code
    }
}
