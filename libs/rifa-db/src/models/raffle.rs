use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Record;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Raffle {
    pub id: String,
    pub name: String,
    /// Cents.
    pub ticket_price: i64,
    #[serde(default)]
    pub sold_tickets: i64,
    /// Cents.
    #[serde(default)]
    pub current_sales: i64,
    /// Highest sequence number handed out so far. Moves only by atomic increment and may run
    /// ahead of `sold_tickets` when a reserved range is never committed.
    #[serde(default)]
    pub ticket_sequence: i64,
    pub max_tickets: Option<i64>,
    #[serde(default)]
    pub is_fidelity: bool,
    #[serde(default)]
    pub ticket_packs: Vec<TicketPack>,
    #[serde(default)]
    pub extra_prizes: Vec<ExtraPrize>,
    pub created_at: DateTime<Utc>,
}

impl Raffle {
    pub fn has_available_extra_prizes(&self) -> bool {
        self.extra_prizes.iter().any(|p| p.quantity > 0)
    }

    pub fn remaining_tickets(&self) -> Option<i64> {
        self.max_tickets.map(|max| (max - self.sold_tickets).max(0))
    }
}

impl Record for Raffle {
    const COLLECTION: &'static str = "raffles";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketPack {
    pub quantity: i64,
    /// Bundle price in cents.
    pub price: i64,
    pub participation_bonus_percent: Option<u32>,
    #[serde(default)]
    pub is_fidelity_pack: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtraPrize {
    pub id: String,
    pub name: String,
    /// Units still available to win.
    pub quantity: i64,
}
