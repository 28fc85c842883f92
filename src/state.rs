use std::sync::Arc;

use crate::auth::AuthSettings;
use crate::services::CirculationPolicy;
use crate::store::{LibraryStore, TaskStore, UserStore};

/// Shared application state handed to every handler through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<dyn LibraryStore>,
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub auth: AuthSettings,
    pub policy: CirculationPolicy,
}

impl AppState {
    /// Wires every store seam to the same backend.
    pub fn new<S>(store: Arc<S>, auth: AuthSettings, policy: CirculationPolicy) -> Self
    where
        S: LibraryStore + UserStore + TaskStore + 'static,
    {
        Self {
            library: store.clone(),
            users: store.clone(),
            tasks: store,
            auth,
            policy,
        }
    }
}
