//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use crate::config::Config;
use tutorbook_core::ports::{Clock, MarketplaceStore, Notifier};

/// The shared application state, created once at startup and passed to all
/// handlers. The store, notifier and clock are held behind their ports so
/// tests can swap implementations.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MarketplaceStore>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}
