use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::Record;
use crate::store::{Condition, Document, DocumentStore, Filter, StoreResult, WriteBatch};

pub mod commission_repo;
pub mod order_repo;
pub mod prize_repo;
pub mod raffle_repo;
pub mod roulette_repo;
pub mod ticket_repo;
pub mod user_repo;

pub use commission_repo::CommissionRepository;
pub use order_repo::OrderRepository;
pub use prize_repo::PrizeRepository;
pub use raffle_repo::RaffleRepository;
pub use roulette_repo::RouletteRepository;
pub use ticket_repo::TicketRepository;
pub use user_repo::UserRepository;

pub fn decode<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    Ok(serde_json::from_value(doc.data)?)
}

pub fn encode<T: Serialize>(value: &T) -> StoreResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Adds a create-only write of `record` to `batch`.
pub fn stage_insert<T: Record>(batch: &mut WriteBatch, record: &T) -> StoreResult<()> {
    batch
        .require(T::COLLECTION, record.id(), Condition::NotExists)
        .set(T::COLLECTION, record.id(), encode(record)?);
    Ok(())
}

pub(crate) async fn fetch<T: Record>(store: &dyn DocumentStore, id: &str) -> StoreResult<Option<T>> {
    store
        .get(T::COLLECTION, id)
        .await?
        .map(decode)
        .transpose()
}

pub(crate) async fn fetch_where<T: Record>(
    store: &dyn DocumentStore,
    filters: &[Filter],
) -> StoreResult<Vec<T>> {
    store
        .query(T::COLLECTION, filters)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}
