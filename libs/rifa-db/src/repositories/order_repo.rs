use std::sync::Arc;

use crate::models::order::{OrderStatus, PurchaseOrder};
use crate::store::{DocumentStore, Filter, StoreResult};

use super::{encode, fetch, fetch_where};

#[derive(Clone)]
pub struct OrderRepository {
    store: Arc<dyn DocumentStore>,
}

impl OrderRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: &str) -> StoreResult<Option<PurchaseOrder>> {
        fetch(self.store.as_ref(), id).await
    }

    pub async fn get_by_code(&self, code: &str) -> StoreResult<Option<PurchaseOrder>> {
        let orders: Vec<PurchaseOrder> =
            fetch_where(self.store.as_ref(), &[Filter::eq("orderCode", code)]).await?;
        Ok(orders.into_iter().next())
    }

    pub async fn search_by_code(&self, fragment: &str) -> StoreResult<Vec<PurchaseOrder>> {
        let mut orders: Vec<PurchaseOrder> =
            fetch_where(self.store.as_ref(), &[Filter::contains("orderCode", fragment)]).await?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    pub async fn get_by_user(&self, user_id: &str) -> StoreResult<Vec<PurchaseOrder>> {
        let mut orders: Vec<PurchaseOrder> =
            fetch_where(self.store.as_ref(), &[Filter::eq("userId", user_id)]).await?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    pub async fn get_by_status(&self, status: OrderStatus) -> StoreResult<Vec<PurchaseOrder>> {
        fetch_where(self.store.as_ref(), &[Filter::eq("status", encode(&status)?)]).await
    }
}
