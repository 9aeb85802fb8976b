//! Advisory per-session stop signals.
//!
//! A stop suppresses further chunk delivery on the streaming endpoint; it
//! never cancels the upstream request. The turn drains to completion and
//! persists normally, so stopped turns still keep their assistant slot.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Signal {
    token: CancellationToken,
    watchers: usize,
}

#[derive(Clone, Default)]
pub struct StopSignals {
    signals: Arc<DashMap<Uuid, Signal>>,
}

impl StopSignals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the delivery loop for this session consults. Concurrent turns
    /// on one session share the token; the entry is reference-counted so
    /// it outlives any single turn. Each `watch` must be paired with one
    /// `clear` when the turn finishes.
    pub fn watch(&self, session_id: Uuid) -> CancellationToken {
        let mut entry = self.signals.entry(session_id).or_insert_with(|| Signal {
            token: CancellationToken::new(),
            watchers: 0,
        });
        entry.watchers += 1;
        entry.token.clone()
    }

    /// Request that delivery for this session stop. No-op when nothing
    /// is streaming; the endpoint reports success either way.
    pub fn stop(&self, session_id: Uuid) {
        if let Some(signal) = self.signals.get(&session_id) {
            signal.token.cancel();
        }
    }

    /// Drop one watcher. The token is removed only when the last watcher
    /// clears, so the next turn starts fresh.
    pub fn clear(&self, session_id: Uuid) {
        let Some(mut entry) = self.signals.get_mut(&session_id) else {
            return;
        };
        entry.watchers = entry.watchers.saturating_sub(1);
        let last = entry.watchers == 0;
        drop(entry);
        if last {
            self.signals.remove_if(&session_id, |_, s| s.watchers == 0);
        }
    }
}
