//! Engine wiring shared by the per-activity test suites.

use events_bus::EventBus;
use offline_store::MemorySyncTimeStore;
use std::sync::Arc;
use sync_engine::{
    NetworkStatus, NoopPrefetcher, Prefetcher, SingleSite, SyncBlocks, SyncConfig, SyncServices,
};

pub const SITE: &str = "site1";
pub const USER: i64 = 7;

pub fn services() -> SyncServices {
    services_with(Arc::new(NoopPrefetcher))
}

pub fn services_with(prefetcher: Arc<dyn Prefetcher>) -> SyncServices {
    SyncServices {
        blocks: Arc::new(SyncBlocks::new()),
        times: Arc::new(MemorySyncTimeStore::new()),
        connectivity: Arc::new(NetworkStatus::new(true)),
        sites: Arc::new(SingleSite::new(SITE, USER)),
        prefetcher,
        bus: EventBus::new(),
        config: SyncConfig::default(),
    }
}
