//! Shared application state

use std::sync::Arc;

use lattice_serve_config::Settings;
use lattice_serve_decoder::Dispatcher;

/// State shared by all handlers.
///
/// The dispatcher is immutable after startup; cloning the state is two
/// refcount bumps.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, settings: Settings) -> Self {
        Self {
            dispatcher,
            settings: Arc::new(settings),
        }
    }
}
