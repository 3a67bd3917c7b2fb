use crate::{db::SqlGateway, generator::SqlGenerator};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn SqlGenerator>,
    pub gateway: Arc<dyn SqlGateway>,
}

impl AppState {
    pub fn new(generator: Arc<dyn SqlGenerator>, gateway: Arc<dyn SqlGateway>) -> Self {
        Self { generator, gateway }
    }
}
