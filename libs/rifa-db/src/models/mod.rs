use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod commission;
pub mod order;
pub mod prize;
pub mod raffle;
pub mod roulette;
pub mod ticket;
pub mod user;

/// A typed document stored under `COLLECTION/{id}`.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}
