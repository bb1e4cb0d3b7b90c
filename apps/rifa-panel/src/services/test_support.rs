use std::sync::Arc;

use chrono::Utc;
use rifa_db::models::Record;
use rifa_db::models::raffle::{ExtraPrize, Raffle, TicketPack};
use rifa_db::models::user::{ReferralCodeClaim, User};
use rifa_db::repositories::encode;
use rifa_db::{DocumentStore, MemoryStore};

pub(crate) const ATTEMPTS: usize = 16;

pub(crate) fn memory_store() -> Arc<dyn DocumentStore> {
    Arc::new(MemoryStore::new())
}

pub(crate) async fn seed_user(
    store: &Arc<dyn DocumentStore>,
    id: &str,
    referred_by: Option<&str>,
    upline: &[&str],
) -> User {
    let user = User {
        id: id.to_string(),
        name: format!("User {}", id),
        email: None,
        referral_code: format!("{}CODE", id.to_uppercase()),
        referred_by: referred_by.map(str::to_string),
        upline: upline.iter().map(|s| s.to_string()).collect(),
        created_at: Utc::now(),
    };
    store
        .set(User::COLLECTION, &user.id, encode(&user).unwrap())
        .await
        .unwrap();
    let claim = ReferralCodeClaim {
        code: user.referral_code.clone(),
        user_id: user.id.clone(),
    };
    store
        .set(ReferralCodeClaim::COLLECTION, &claim.code, encode(&claim).unwrap())
        .await
        .unwrap();
    user
}

pub(crate) fn raffle(id: &str, ticket_price: i64) -> Raffle {
    Raffle {
        id: id.to_string(),
        name: format!("Raffle {}", id),
        ticket_price,
        sold_tickets: 0,
        current_sales: 0,
        ticket_sequence: 0,
        max_tickets: None,
        is_fidelity: false,
        ticket_packs: vec![
            TicketPack {
                quantity: 5,
                price: ticket_price * 4,
                participation_bonus_percent: Some(10),
                is_fidelity_pack: false,
            },
            TicketPack {
                quantity: 3,
                price: ticket_price * 3,
                participation_bonus_percent: None,
                is_fidelity_pack: true,
            },
        ],
        extra_prizes: vec![],
        created_at: Utc::now(),
    }
}

pub(crate) fn prize(id: &str, quantity: i64) -> ExtraPrize {
    ExtraPrize {
        id: id.to_string(),
        name: format!("Prize {}", id),
        quantity,
    }
}

pub(crate) async fn seed_raffle(store: &Arc<dyn DocumentStore>, raffle: Raffle) -> Raffle {
    store
        .set(Raffle::COLLECTION, &raffle.id, encode(&raffle).unwrap())
        .await
        .unwrap();
    raffle
}
