/**
 * Application State Management
 *
 * `AppState` is the router state. Handlers extract only the part they need
 * through the `FromRef` implementations below:
 *
 * - `State<DiagramService>` for the diagram operations
 * - `State<Fanout>` for the WebSocket handler and the stats endpoint
 * - `SessionKeys` for the `MaybeIdentity` extractor
 *
 * Every field is cheap to clone (`Arc` inside).
 */

use crate::backend::auth::SessionKeys;
use crate::backend::diagrams::DiagramService;
use crate::backend::realtime::Fanout;
use crate::shared::AppConfig;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: DiagramService,
    pub keys: SessionKeys,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(service: DiagramService, keys: SessionKeys, config: AppConfig) -> Self {
        Self {
            service,
            keys,
            config: Arc::new(config),
        }
    }

    pub fn fanout(&self) -> &Fanout {
        self.service.fanout()
    }
}

impl FromRef<AppState> for DiagramService {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

impl FromRef<AppState> for Fanout {
    fn from_ref(state: &AppState) -> Self {
        state.service.fanout().clone()
    }
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}
