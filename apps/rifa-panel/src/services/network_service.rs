use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use rifa_db::DocumentStore;
use rifa_db::models::commission::{Commission, CommissionLevel, CommissionStatus};
use rifa_db::models::ticket::Ticket;
use rifa_db::models::user::User;
use rifa_db::repositories::{CommissionRepository, TicketRepository, UserRepository};
use serde::Serialize;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};

/// Parent id -> ids of the users it referred directly.
#[derive(Debug, Default)]
pub struct ReferralIndex {
    children: HashMap<String, Vec<String>>,
}

impl ReferralIndex {
    pub fn build(users: &[User]) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for user in users {
            if let Some(parent) = &user.referred_by {
                children.entry(parent.clone()).or_default().push(user.id.clone());
            }
        }
        for ids in children.values_mut() {
            ids.sort();
            ids.dedup();
        }
        Self { children }
    }

    pub fn direct(&self, user_id: &str) -> &[String] {
        self.children.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every user reachable below `user_id`, breadth first, each listed once.
    /// Depth is unbounded; a cycle in the data cannot loop.
    pub fn downline(&self, user_id: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::from([user_id]);
        let mut queue: VecDeque<&str> = VecDeque::from([user_id]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            for child in self.direct(current) {
                if seen.insert(child.as_str()) {
                    out.push(child.clone());
                    queue.push_back(child.as_str());
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelTotals {
    pub level: u8,
    pub count: usize,
    pub pending: i64,
    pub paid: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionTotals {
    pub pending: i64,
    pub paid: i64,
    pub by_level: Vec<LevelTotals>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub user_id: String,
    pub direct_referrals: usize,
    pub total_downline: usize,
    pub downline_ids: Vec<String>,
    /// Tickets purchased by the downline.
    pub tickets_sold: usize,
    /// Cents.
    pub sales_volume: i64,
    pub commissions: CommissionTotals,
}

pub fn compute_network_stats(
    user_id: &str,
    index: &ReferralIndex,
    tickets: &[Ticket],
    commissions: &[Commission],
) -> NetworkStats {
    let downline_ids = index.downline(user_id);
    let downline: HashSet<&str> = downline_ids.iter().map(String::as_str).collect();

    let (tickets_sold, sales_volume) = tickets
        .iter()
        .filter(|t| downline.contains(t.original_user_id.as_str()))
        .fold((0, 0), |(n, total), t| (n + 1, total + t.price));

    let mut totals = CommissionTotals {
        by_level: (1..=CommissionLevel::MAX)
            .map(|level| LevelTotals {
                level,
                ..LevelTotals::default()
            })
            .collect(),
        ..CommissionTotals::default()
    };
    for commission in commissions
        .iter()
        .filter(|c| c.user_id == user_id && downline.contains(c.source_user_id.as_str()))
    {
        let level = &mut totals.by_level[commission.level.upline_index()];
        level.count += 1;
        match commission.status {
            CommissionStatus::Pending => {
                level.pending += commission.amount;
                totals.pending += commission.amount;
            }
            CommissionStatus::Paid => {
                level.paid += commission.amount;
                totals.paid += commission.amount;
            }
        }
    }

    NetworkStats {
        user_id: user_id.to_string(),
        direct_referrals: index.direct(user_id).len(),
        total_downline: downline_ids.len(),
        downline_ids,
        tickets_sold,
        sales_volume,
        commissions: totals,
    }
}

#[derive(Clone)]
pub struct NetworkService {
    user_repo: UserRepository,
    ticket_repo: TicketRepository,
    commission_repo: CommissionRepository,
}

impl NetworkService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            user_repo: UserRepository::new(store.clone()),
            ticket_repo: TicketRepository::new(store.clone()),
            commission_repo: CommissionRepository::new(store),
        }
    }

    pub async fn get_network_stats(&self, user_id: &str) -> LedgerResult<NetworkStats> {
        let users = self.user_repo.get_all().await?;
        if !users.iter().any(|u| u.id == user_id) {
            return Err(LedgerError::UserNotFound);
        }
        let index = ReferralIndex::build(&users);
        let tickets = self.ticket_repo.get_all().await?;
        let commissions = self.commission_repo.get_by_beneficiary(user_id).await?;
        Ok(compute_network_stats(user_id, &index, &tickets, &commissions))
    }

    /// Stats for every user with at least one direct referral, largest networks first.
    pub async fn get_admin_overview(&self) -> LedgerResult<Vec<NetworkStats>> {
        let users = self.user_repo.get_all().await?;
        let index = ReferralIndex::build(&users);
        let tickets = self.ticket_repo.get_all().await?;
        let commissions = self.commission_repo.get_all().await?;

        let mut overview: Vec<NetworkStats> = users
            .iter()
            .filter(|u| !index.direct(&u.id).is_empty())
            .map(|u| compute_network_stats(&u.id, &index, &tickets, &commissions))
            .collect();
        overview.sort_by(|a, b| {
            b.total_downline
                .cmp(&a.total_downline)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        debug!("Computed network overview for {} referrers", overview.len());
        Ok(overview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{ATTEMPTS, memory_store, raffle, seed_raffle, seed_user};
    use crate::services::ticket_service::{PurchaseSelection, TicketService};
    use chrono::Utc;

    fn user(id: &str, parent: Option<&str>) -> User {
        User {
            id: id.to_string(),
            name: id.to_string(),
            email: None,
            referral_code: id.to_uppercase(),
            referred_by: parent.map(str::to_string),
            upline: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn chain_counts_direct_and_total_downline() {
        let users = vec![
            user("A", None),
            user("B", Some("A")),
            user("C", Some("B")),
            user("D", Some("C")),
        ];
        let stats = compute_network_stats("A", &ReferralIndex::build(&users), &[], &[]);
        assert_eq!(stats.direct_referrals, 1);
        assert_eq!(stats.total_downline, 3);
        assert_eq!(stats.downline_ids, vec!["B", "C", "D"]);
    }

    #[test]
    fn downline_walk_is_not_capped_by_upline_depth() {
        let mut users = vec![user("u0", None)];
        for i in 1..50 {
            users.push(user(&format!("u{}", i), Some(&format!("u{}", i - 1))));
        }
        let index = ReferralIndex::build(&users);
        assert_eq!(index.downline("u0").len(), 49);
        assert_eq!(index.downline("u48").len(), 1);
    }

    #[test]
    fn duplicates_and_cycles_are_counted_once() {
        let users = vec![
            user("A", Some("C")),
            user("B", Some("A")),
            user("B", Some("A")),
            user("C", Some("B")),
        ];
        let index = ReferralIndex::build(&users);
        assert_eq!(index.direct("A"), ["B".to_string()]);
        assert_eq!(index.downline("A"), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn stats_aggregate_downline_sales_and_commissions() {
        let store = memory_store();
        seed_user(&store, "a", None, &[]).await;
        seed_user(&store, "b", Some("a"), &["a"]).await;
        seed_user(&store, "c", Some("b"), &["b", "a"]).await;
        seed_user(&store, "loner", None, &[]).await;
        seed_raffle(&store, raffle("r1", 1_000)).await;
        let tickets = TicketService::new(store.clone(), ATTEMPTS);
        tickets.purchase("1", "b", "r1", PurchaseSelection::Quantity(2)).await.unwrap();
        tickets.purchase("2", "c", "r1", PurchaseSelection::Quantity(1)).await.unwrap();
        tickets.purchase("3", "loner", "r1", PurchaseSelection::Quantity(4)).await.unwrap();

        let service = NetworkService::new(store);
        let stats = service.get_network_stats("a").await.unwrap();
        assert_eq!(stats.total_downline, 2);
        assert_eq!(stats.tickets_sold, 3);
        assert_eq!(stats.sales_volume, 3_000);
        // 20% of b's 2000 at level 1, 10% of c's 1000 at level 2.
        assert_eq!(stats.commissions.pending, 500);
        assert_eq!(stats.commissions.by_level[0].pending, 400);
        assert_eq!(stats.commissions.by_level[1].pending, 100);
        assert_eq!(stats.commissions.by_level[2].count, 0);

        let overview = service.get_admin_overview().await.unwrap();
        let ids: Vec<&str> = overview.iter().map(|s| s.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(matches!(
            service.get_network_stats("ghost").await,
            Err(LedgerError::UserNotFound)
        ));
    }
}
