//! In-memory reference store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ChatStore, Message, NewMessage, NewProviderConfig, NewSession, ProviderConfig,
    ProviderConfigUpdate, Session, StoreError, StoreResult,
};

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, Session>,
    /// Messages per session in insertion order. The vector position is the
    /// tie-breaker when creation timestamps collide.
    messages: HashMap<Uuid, Vec<Message>>,
    configs: HashMap<Uuid, ProviderConfig>,
}

impl Inner {
    fn owner_configs_mut(&mut self, owner: &str) -> impl Iterator<Item = &mut ProviderConfig> {
        self.configs.values_mut().filter(move |c| c.owner == owner)
    }

    /// Unset any existing default for the owner, except `keep`.
    fn clear_default(&mut self, owner: &str, keep: Uuid) {
        for config in self.owner_configs_mut(owner) {
            if config.id != keep {
                config.is_default = false;
            }
        }
    }

    /// Unique-per-owner name: append `-1`, `-2`, ... on collision.
    fn dedup_name(&self, owner: &str, base: &str, exclude: Option<Uuid>) -> String {
        let taken = |candidate: &str| {
            self.configs.values().any(|c| {
                c.owner == owner && c.name == candidate && Some(c.id) != exclude
            })
        };

        if !taken(base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}-{n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// `ChatStore` backed by process memory. The reference implementation;
/// everything is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_session(&self, new: NewSession) -> StoreResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            owner: new.owner,
            title: new.title,
            config_id: new.config_id,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write().await;
        inner.sessions.insert(session.id, session.clone());
        inner.messages.insert(session.id, Vec::new());
        Ok(session)
    }

    async fn session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn sessions_by_owner(
        &self,
        owner: &str,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Session>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.owner == owner)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions.into_iter().skip(skip).take(limit).collect())
    }

    async fn rename_session(&self, id: Uuid, title: &str) -> StoreResult<Session> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::NotFound("session"))?;
        session.title = title.to_string();
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn touch_session(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::NotFound("session"))?;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .sessions
            .remove(&id)
            .ok_or(StoreError::NotFound("session"))?;
        inner.messages.remove(&id);
        Ok(())
    }

    async fn append_message(&self, new: NewMessage) -> StoreResult<Message> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(&new.session_id) {
            return Err(StoreError::NotFound("session"));
        }

        let message = Message {
            id: Uuid::new_v4(),
            session_id: new.session_id,
            role: new.role,
            content: new.content,
            created_at: Utc::now(),
        };
        inner
            .messages
            .entry(new.session_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn messages(
        &self,
        session_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read().await;
        let messages = inner
            .messages
            .get(&session_id)
            .ok_or(StoreError::NotFound("session"))?;
        Ok(messages.iter().skip(skip).take(limit).cloned().collect())
    }

    async fn create_config(&self, new: NewProviderConfig) -> StoreResult<ProviderConfig> {
        let mut inner = self.inner.write().await;
        let name = inner.dedup_name(&new.owner, &new.name, None);
        let config = ProviderConfig {
            id: Uuid::new_v4(),
            owner: new.owner,
            name,
            provider: new.provider,
            model: new.model,
            api_key: new.api_key,
            base_url: new.base_url,
            is_default: new.is_default,
            created_at: Utc::now(),
        };

        if config.is_default {
            inner.clear_default(&config.owner, config.id);
        }
        inner.configs.insert(config.id, config.clone());
        Ok(config)
    }

    async fn config(&self, id: Uuid) -> StoreResult<Option<ProviderConfig>> {
        Ok(self.inner.read().await.configs.get(&id).cloned())
    }

    async fn configs_by_owner(
        &self,
        owner: &str,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<ProviderConfig>> {
        let inner = self.inner.read().await;
        let mut configs: Vec<ProviderConfig> = inner
            .configs
            .values()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect();
        configs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(configs.into_iter().skip(skip).take(limit).collect())
    }

    async fn default_config(&self, owner: &str) -> StoreResult<Option<ProviderConfig>> {
        {
            let inner = self.inner.read().await;
            if let Some(config) = inner
                .configs
                .values()
                .find(|c| c.owner == owner && c.is_default)
            {
                return Ok(Some(config.clone()));
            }
        }

        // Nothing flagged: promote the owner's oldest config, if any.
        let mut inner = self.inner.write().await;
        let mut candidates: Vec<&ProviderConfig> =
            inner.configs.values().filter(|c| c.owner == owner).collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let Some(id) = candidates.first().map(|c| c.id) else {
            return Ok(None);
        };
        let config = inner
            .configs
            .get_mut(&id)
            .ok_or(StoreError::NotFound("config"))?;
        config.is_default = true;
        Ok(Some(config.clone()))
    }

    async fn update_config(
        &self,
        id: Uuid,
        update: ProviderConfigUpdate,
    ) -> StoreResult<ProviderConfig> {
        let mut inner = self.inner.write().await;

        let owner = inner
            .configs
            .get(&id)
            .ok_or(StoreError::NotFound("config"))?
            .owner
            .clone();

        let name = update
            .name
            .map(|n| inner.dedup_name(&owner, &n, Some(id)));

        let config = inner
            .configs
            .get_mut(&id)
            .ok_or(StoreError::NotFound("config"))?;
        if let Some(name) = name {
            config.name = name;
        }
        if let Some(model) = update.model {
            config.model = model;
        }
        if let Some(api_key) = update.api_key {
            config.api_key = Some(api_key);
        }
        if let Some(base_url) = update.base_url {
            config.base_url = Some(base_url);
        }
        if let Some(is_default) = update.is_default {
            config.is_default = is_default;
        }
        let config = config.clone();

        if config.is_default {
            inner.clear_default(&owner, id);
        }
        Ok(config)
    }

    async fn delete_config(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .configs
            .remove(&id)
            .ok_or(StoreError::NotFound("config"))?;

        // Deleting the default promotes the owner's oldest remaining config.
        if removed.is_default {
            let mut candidates: Vec<&ProviderConfig> = inner
                .configs
                .values()
                .filter(|c| c.owner == removed.owner)
                .collect();
            candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            if let Some(next_id) = candidates.first().map(|c| c.id)
                && let Some(config) = inner.configs.get_mut(&next_id)
            {
                config.is_default = true;
            }
        }
        Ok(())
    }
}
