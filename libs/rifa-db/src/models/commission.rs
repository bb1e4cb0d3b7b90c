use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Record;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Pending,
    Paid,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "PENDING",
            CommissionStatus::Paid => "PAID",
        }
    }
}

impl fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upline depth a commission pays, 1 (direct referrer) to 3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct CommissionLevel(u8);

impl CommissionLevel {
    pub const MAX: u8 = 3;

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based position in the upline this level pays.
    pub fn upline_index(self) -> usize {
        (self.0 - 1) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidLevel(pub u8);

impl fmt::Display for InvalidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commission level must be between 1 and {}, got {}", CommissionLevel::MAX, self.0)
    }
}

impl std::error::Error for InvalidLevel {}

impl TryFrom<u8> for CommissionLevel {
    type Error = InvalidLevel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidLevel(value))
        }
    }
}

impl From<CommissionLevel> for u8 {
    fn from(level: CommissionLevel) -> Self {
        level.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: String,
    /// Beneficiary.
    pub user_id: String,
    /// Buyer whose purchase produced the commission.
    pub source_user_id: String,
    pub raffle_id: String,
    pub level: CommissionLevel,
    /// Cents.
    pub amount: i64,
    pub status: CommissionStatus,
    /// Idempotency key of the sale that produced this commission.
    pub batch_key: String,
    pub payment_method: Option<String>,
    /// Append-only audit trail.
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by_admin_id: Option<String>,
    pub reverted_at: Option<DateTime<Utc>>,
    pub reverted_by_admin_id: Option<String>,
    pub revert_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for Commission {
    const COLLECTION: &'static str = "commissions";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Marks an idempotency key as used; written in the same batch as its commissions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommissionBatch {
    pub key: String,
    pub commission_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for CommissionBatch {
    const COLLECTION: &'static str = "commission_batches";

    fn id(&self) -> &str {
        &self.key
    }
}
