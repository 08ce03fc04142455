//! Shared application state injected into every handler.
//!
//! The ledger, processor client and notification dispatcher are constructed
//! once at process start and carried here as explicit dependencies, so no
//! component reaches for ambient singletons and tests can substitute mocks
//! at the trait seams.

use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::ledger::LedgerStore;
use crate::notify::NotificationDispatcher;
use crate::processor::ProcessorClient;

#[derive(Clone)]
pub struct AppState {
    /// Kept alongside the ledger for the health probe
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub ledger: Arc<dyn LedgerStore>,
    pub processor: Arc<dyn ProcessorClient>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
}
