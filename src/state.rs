use crate::config::RelayConfig;
use crate::hub::Hub;

/// Shared application state, one per server process
pub struct AppState {
    pub hub: Hub,
    pub config: RelayConfig,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            hub: Hub::new(),
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
