use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Record;
use super::raffle::TicketPack;

pub const MAX_TRANSFERS: i64 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub raffle_id: String,
    /// Current holder.
    pub user_id: String,
    /// Purchaser; commissions and leaderboards are attributed to this user.
    pub original_user_id: String,
    pub ticket_number: String,
    pub sequence: i64,
    /// Share of the sale in cents.
    pub price: i64,
    #[serde(default)]
    pub transfer_count: i64,
    pub purchased_pack_info: Option<PackInfo>,
    /// Idempotency key of the sale that issued the ticket.
    pub sale_key: String,
    pub order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Ticket ids are derived from the raffle sequence, so a sequence can only be issued once.
    pub fn key(raffle_id: &str, sequence: i64) -> String {
        format!("{}:{}", raffle_id, sequence)
    }

    pub fn can_transfer(&self) -> bool {
        self.transfer_count < MAX_TRANSFERS
    }
}

impl Record for Ticket {
    const COLLECTION: &'static str = "tickets";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Snapshot of the pack a ticket was bought through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackInfo {
    pub quantity: i64,
    pub price: i64,
    pub bonus_percent: Option<u32>,
    #[serde(default)]
    pub is_fidelity_pack: bool,
}

impl From<&TicketPack> for PackInfo {
    fn from(pack: &TicketPack) -> Self {
        Self {
            quantity: pack.quantity,
            price: pack.price,
            bonus_percent: pack.participation_bonus_percent,
            is_fidelity_pack: pack.is_fidelity_pack,
        }
    }
}

pub fn format_ticket_number(referral_code: &str, sequence: i64, fidelity: bool) -> String {
    if fidelity {
        format!("{}-{}F", referral_code, sequence)
    } else {
        format!("{}-{}", referral_code, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fidelity_tickets_carry_trailing_f() {
        assert_eq!(format_ticket_number("ABC123", 7, false), "ABC123-7");
        assert_eq!(format_ticket_number("ABC123", 7, true), "ABC123-7F");
    }
}
