use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Record;

/// Longest upline snapshot kept on a user.
pub const MAX_UPLINE_DEPTH: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub referral_code: String,
    pub referred_by: Option<String>,
    /// Ancestor ids captured at signup, most direct first. Never recomputed.
    #[serde(default)]
    pub upline: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Reservation of a referral code, keyed by the code itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCodeClaim {
    pub code: String,
    pub user_id: String,
}

impl Record for ReferralCodeClaim {
    const COLLECTION: &'static str = "referral_codes";

    fn id(&self) -> &str {
        &self.code
    }
}
