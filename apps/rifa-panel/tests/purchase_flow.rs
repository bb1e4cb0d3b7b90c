use std::sync::Arc;

use chrono::Utc;
use rifa_db::models::commission::CommissionStatus;
use rifa_db::models::order::OrderStatus;
use rifa_db::models::raffle::{ExtraPrize, Raffle, TicketPack};
use rifa_db::models::user::User;
use rifa_db::repositories::RaffleRepository;
use rifa_db::{DocumentStore, MemoryStore};
use rifa_panel::config::PanelConfig;
use rifa_panel::error::LedgerError;
use rifa_panel::services::order_service::Canceller;
use rifa_panel::services::referral_service::NewUser;
use rifa_panel::services::ticket_service::PurchaseSelection;
use rifa_panel::state::AppState;

fn state() -> AppState {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    AppState::new(PanelConfig::default(), store, None)
}

async fn signup(state: &AppState, name: &str, invited_by: Option<&User>) -> User {
    state
        .referral_service
        .register_user(NewUser {
            name: name.to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            referral_code: invited_by.map(|u| u.referral_code.clone()),
        })
        .await
        .unwrap()
}

async fn create_raffle(state: &AppState, id: &str, prizes: Vec<ExtraPrize>) -> Raffle {
    let raffle = Raffle {
        id: id.to_string(),
        name: "Summer raffle".to_string(),
        ticket_price: 2_000,
        sold_tickets: 0,
        current_sales: 0,
        ticket_sequence: 0,
        max_tickets: Some(1_000),
        is_fidelity: false,
        ticket_packs: vec![TicketPack {
            quantity: 10,
            price: 15_000,
            participation_bonus_percent: Some(5),
            is_fidelity_pack: true,
        }],
        extra_prizes: prizes,
        created_at: Utc::now(),
    };
    RaffleRepository::new(state.store.clone())
        .save(&raffle)
        .await
        .unwrap();
    raffle
}

#[tokio::test]
async fn hundred_dollar_order_pays_three_upline_levels() {
    let state = state();
    let u3 = signup(&state, "Umberto", None).await;
    let u2 = signup(&state, "Valentina", Some(&u3)).await;
    let u1 = signup(&state, "Wagner", Some(&u2)).await;
    let buyer = signup(&state, "Ximena", Some(&u1)).await;
    assert_eq!(buyer.upline, vec![u1.id.clone(), u2.id.clone(), u3.id.clone()]);

    let raffle = create_raffle(
        &state,
        "summer",
        vec![ExtraPrize {
            id: "bike".to_string(),
            name: "Bike".to_string(),
            quantity: 2,
        }],
    )
    .await;

    let order = state
        .order_service
        .create_order(&buyer.id, &raffle.id, PurchaseSelection::Quantity(5))
        .await
        .unwrap();
    assert_eq!(order.total_price, 10_000);
    assert_eq!(order.status, OrderStatus::Pending);

    state
        .order_service
        .mark_paid(&order.id, "pix", None, "admin")
        .await
        .unwrap();
    let verification = state
        .order_service
        .verify(&order.id, "admin", Some("receipt checked"))
        .await
        .unwrap();

    assert_eq!(verification.tickets.len(), 5);
    assert_eq!(verification.order.ticket_ids.len(), 5);
    let expected_first = format!("{}-1", buyer.referral_code);
    assert_eq!(verification.tickets[0].ticket_number, expected_first);

    let paid: Vec<(String, u8, i64, CommissionStatus)> = verification
        .commissions
        .iter()
        .map(|c| (c.user_id.clone(), c.level.get(), c.amount, c.status))
        .collect();
    assert_eq!(
        paid,
        vec![
            (u1.id.clone(), 1, 2_000, CommissionStatus::Pending),
            (u2.id.clone(), 2, 1_000, CommissionStatus::Pending),
            (u3.id.clone(), 3, 500, CommissionStatus::Pending),
        ]
    );
    assert_eq!(verification.chances_granted, 5);

    // Network view from the top of the chain.
    let stats = state.network_service.get_network_stats(&u3.id).await.unwrap();
    assert_eq!(stats.direct_referrals, 1);
    assert_eq!(stats.total_downline, 3);
    assert_eq!(stats.tickets_sold, 5);
    assert_eq!(stats.sales_volume, 10_000);
    assert_eq!(stats.commissions.by_level[2].pending, 500);

    // Payout and reversal keep the audit trail.
    let level_one = &verification.commissions[0];
    let paid = state
        .commission_service
        .mark_paid(&level_one.id, "bank transfer", Some("batch 7"), "finance")
        .await
        .unwrap();
    assert_eq!(paid.status, CommissionStatus::Paid);
    let reverted = state
        .commission_service
        .revert_payment(&level_one.id, "bounced", "finance")
        .await
        .unwrap();
    assert_eq!(reverted.status, CommissionStatus::Pending);
    assert_eq!(reverted.notes.unwrap_or_default().lines().count(), 2);
}

#[tokio::test]
async fn chances_become_prizes_that_redeem_once() {
    let state = state();
    let buyer = signup(&state, "Yara", None).await;
    let raffle = create_raffle(
        &state,
        "winter",
        vec![ExtraPrize {
            id: "tv".to_string(),
            name: "TV".to_string(),
            quantity: 1,
        }],
    )
    .await;

    let order = state
        .order_service
        .create_order(&buyer.id, &raffle.id, PurchaseSelection::Pack(0))
        .await
        .unwrap();
    state
        .order_service
        .mark_paid(&order.id, "cash", None, "admin")
        .await
        .unwrap();
    let verification = state.order_service.verify(&order.id, "admin", None).await.unwrap();
    assert_eq!(verification.tickets.len(), 10);
    assert!(verification.tickets.iter().all(|t| t.ticket_number.ends_with('F')));
    assert_eq!(verification.chances_granted, 10);

    let prize = state.roulette_service.spin(&buyer.id, &raffle.id).await.unwrap();
    assert_eq!(state.roulette_service.balance(&buyer.id, &raffle.id).await.unwrap(), 9);
    assert!(matches!(
        state.roulette_service.spin(&buyer.id, &raffle.id).await,
        Err(LedgerError::NoPrizesAvailable)
    ));

    let wrong = state.prize_service.redeem(&prize.id, "WRONG123", "admin").await;
    assert!(matches!(wrong, Err(LedgerError::RedemptionMismatch)));

    let redeemed = state
        .prize_service
        .redeem(&prize.id, &prize.code.to_lowercase(), "admin")
        .await
        .unwrap();
    assert!(redeemed.redeemed);
    let again = state.prize_service.redeem(&prize.id, &prize.code, "admin").await;
    assert!(matches!(again, Err(LedgerError::RedemptionMismatch)));

    // Raffle without prizes left: later orders earn no chances.
    let second = state
        .order_service
        .create_order(&buyer.id, &raffle.id, PurchaseSelection::Quantity(2))
        .await
        .unwrap();
    state
        .order_service
        .mark_paid(&second.id, "cash", None, "admin")
        .await
        .unwrap();
    let verification = state.order_service.verify(&second.id, "admin", None).await.unwrap();
    assert_eq!(verification.chances_granted, 0);
    assert_eq!(state.roulette_service.balance(&buyer.id, &raffle.id).await.unwrap(), 9);

    let board = state.referral_service.get_leaderboard(&raffle.id, 10).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].tickets, 12);
}

#[tokio::test]
async fn rejected_and_cancelled_orders_issue_nothing() {
    let state = state();
    let buyer = signup(&state, "Zoe", None).await;
    let raffle = create_raffle(&state, "autumn", Vec::new()).await;

    let rejected = state
        .order_service
        .create_order(&buyer.id, &raffle.id, PurchaseSelection::Quantity(3))
        .await
        .unwrap();
    state
        .order_service
        .mark_paid(&rejected.id, "pix", None, "admin")
        .await
        .unwrap();
    state
        .order_service
        .reject(&rejected.id, "chargeback", "admin")
        .await
        .unwrap();

    let cancelled = state
        .order_service
        .create_order(&buyer.id, &raffle.id, PurchaseSelection::Quantity(1))
        .await
        .unwrap();
    state
        .order_service
        .cancel(&cancelled.id, None, Canceller::Owner(&buyer.id))
        .await
        .unwrap();

    for id in [&rejected.id, &cancelled.id] {
        let err = state.order_service.verify(id, "admin", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));
        assert!(!err.to_string().contains(id.as_str()));
    }
    assert!(state
        .ticket_service
        .get_raffle_tickets(&raffle.id)
        .await
        .unwrap()
        .is_empty());
    let raffle = RaffleRepository::new(state.store.clone())
        .get_by_id(&raffle.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raffle.sold_tickets, 0);
}
