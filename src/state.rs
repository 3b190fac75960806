use sea_orm::DatabaseConnection;

use crate::{payment::PaymentClient, realtime::BroadcastHub};

/// Shared application state.
///
/// The hub is constructed once at startup and handed to everything that
/// publishes or subscribes; it is never re-created while the process runs.
#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub hub: BroadcastHub,
    pub payments: PaymentClient,
}
