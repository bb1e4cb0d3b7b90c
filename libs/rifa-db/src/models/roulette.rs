use serde::{Deserialize, Serialize};

use super::Record;

/// Spin balance of one user in one raffle. Changed only through increments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouletteChance {
    pub id: String,
    pub user_id: String,
    pub raffle_id: String,
    #[serde(default)]
    pub chances: i64,
}

impl RouletteChance {
    pub fn key(user_id: &str, raffle_id: &str) -> String {
        format!("{}_{}", user_id, raffle_id)
    }
}

impl Record for RouletteChance {
    const COLLECTION: &'static str = "roulette_chances";

    fn id(&self) -> &str {
        &self.id
    }
}
