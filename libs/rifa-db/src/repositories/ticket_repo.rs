use std::sync::Arc;

use crate::models::ticket::Ticket;
use crate::store::{DocumentStore, Filter, StoreResult};

use super::{fetch, fetch_where};

#[derive(Clone)]
pub struct TicketRepository {
    store: Arc<dyn DocumentStore>,
}

impl TicketRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<Ticket>> {
        fetch(self.store.as_ref(), id).await
    }

    pub async fn get_by_raffle(&self, raffle_id: &str) -> StoreResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> =
            fetch_where(self.store.as_ref(), &[Filter::eq("raffleId", raffle_id)]).await?;
        tickets.sort_by_key(|t| t.sequence);
        Ok(tickets)
    }

    pub async fn get_by_sale_key(&self, sale_key: &str) -> StoreResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> =
            fetch_where(self.store.as_ref(), &[Filter::eq("saleKey", sale_key)]).await?;
        tickets.sort_by_key(|t| t.sequence);
        Ok(tickets)
    }

    pub async fn get_by_holder(&self, user_id: &str) -> StoreResult<Vec<Ticket>> {
        fetch_where(self.store.as_ref(), &[Filter::eq("userId", user_id)]).await
    }

    pub async fn get_all(&self) -> StoreResult<Vec<Ticket>> {
        fetch_where(self.store.as_ref(), &[]).await
    }
}
