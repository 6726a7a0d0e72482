//! Process-wide generation state.
//!
//! Every in-flight generation registers its own cancellation token. A stop
//! request cancels all of them, so the relay behaves like a single global stop
//! flag while concurrent generations never reset each other's state.

use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct GenerationState {
    active: DashMap<Uuid, CancellationToken>,
    model_id: String,
    search_enabled: bool,
}

impl GenerationState {
    pub fn new(model_id: impl Into<String>, search_enabled: bool) -> Self {
        Self {
            active: DashMap::new(),
            model_id: model_id.into(),
            search_enabled,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn search_enabled(&self) -> bool {
        self.search_enabled
    }

    /// Register a new generation with a fresh, un-cancelled token.
    ///
    /// The generation stays registered until the returned handle is dropped.
    pub fn begin(self: &Arc<Self>) -> GenerationHandle {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        self.active.insert(id, token.clone());

        GenerationHandle {
            id,
            token,
            state: Arc::clone(self),
        }
    }

    /// Cancel every registered generation. Returns how many were newly cancelled.
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for entry in self.active.iter() {
            if !entry.value().is_cancelled() {
                entry.value().cancel();
                stopped += 1;
            }
        }
        stopped
    }

    /// Number of generations currently registered.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Registration of one in-flight generation.
pub struct GenerationHandle {
    id: Uuid,
    token: CancellationToken,
    state: Arc<GenerationState>,
}

impl GenerationHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for GenerationHandle {
    fn drop(&mut self) {
        self.state.active.remove(&self.id);
    }
}
