use std::sync::Arc;

use anyhow::Result;
use rifa_db::db::init_db;
use rifa_db::sqlx::PgPool;
use rifa_db::{DocumentStore, MemoryStore, PgStore};

use crate::config::{PanelConfig, StorageBackend};
use crate::services::commission_service::CommissionService;
use crate::services::network_service::NetworkService;
use crate::services::order_service::OrderService;
use crate::services::prize_service::PrizeService;
use crate::services::referral_service::ReferralService;
use crate::services::roulette_service::RouletteService;
use crate::services::ticket_service::TicketService;

#[derive(Clone)]
pub struct AppState {
    pub config: PanelConfig,
    pub store: Arc<dyn DocumentStore>,
    /// Set only for the postgres backend.
    pub pool: Option<PgPool>,

    pub referral_service: ReferralService,
    pub commission_service: CommissionService,
    pub ticket_service: TicketService,
    pub order_service: OrderService,
    pub roulette_service: RouletteService,
    pub prize_service: PrizeService,
    pub network_service: NetworkService,
}

impl AppState {
    pub fn new(config: PanelConfig, store: Arc<dyn DocumentStore>, pool: Option<PgPool>) -> Self {
        let attempts = config.max_commit_attempts;
        Self {
            referral_service: ReferralService::new(store.clone(), attempts),
            commission_service: CommissionService::new(store.clone()),
            ticket_service: TicketService::new(store.clone(), attempts),
            order_service: OrderService::new(store.clone(), attempts),
            roulette_service: RouletteService::new(store.clone(), attempts),
            prize_service: PrizeService::new(store.clone()),
            network_service: NetworkService::new(store.clone()),
            config,
            store,
            pool,
        }
    }

    pub async fn connect(config: PanelConfig) -> Result<Self> {
        match config.storage {
            StorageBackend::Memory => {
                tracing::warn!("Using the in-memory store; nothing will be persisted");
                Ok(Self::new(config, Arc::new(MemoryStore::new()), None))
            }
            StorageBackend::Postgres => {
                let url = config
                    .database_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;
                let pool = init_db(&url, config.db_max_connections).await?;
                tracing::info!("Connected to PostgreSQL document store");
                let store: Arc<dyn DocumentStore> = Arc::new(PgStore::new(pool.clone()));
                Ok(Self::new(config, store, Some(pool)))
            }
        }
    }
}
