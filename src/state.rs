use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{notify::Notifier, shipping::ShippingTable};

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub shipping: Arc<ShippingTable>,
    pub notifier: Arc<dyn Notifier>,
}
