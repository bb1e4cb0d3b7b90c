use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Record;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPrize {
    pub id: String,
    pub user_id: String,
    /// Id of the raffle's extra prize that was won.
    pub prize_id: String,
    pub prize_name: String,
    pub raffle_id: String,
    pub date_won: DateTime<Utc>,
    pub code: String,
    #[serde(default)]
    pub redeemed: bool,
    pub redeemed_date: Option<DateTime<Utc>>,
    pub redeemed_by_admin_id: Option<String>,
}

impl Record for UserPrize {
    const COLLECTION: &'static str = "user_prizes";

    fn id(&self) -> &str {
        &self.id
    }
}
