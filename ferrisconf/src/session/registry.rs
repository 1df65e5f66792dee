//! Process-wide cache of sessions, one per device and user.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, warn};
use once_cell::sync::Lazy;

use super::{Session, SessionBuilder};
use crate::error::{Result, SessionError};
use crate::transport::{Connector, SshConnector};

static REGISTRY: Lazy<SessionRegistry> = Lazy::new(SessionRegistry::new);

/// Identity of a cached session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl SessionKey {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
        }
    }
}

/// Shares sessions between callers that target the same device.
pub struct SessionRegistry<C: Connector = SshConnector> {
    sessions: RwLock<HashMap<SessionKey, Arc<Session<C>>>>,
}

impl<C: Connector> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl<C: Connector> SessionRegistry<C> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SessionKey) -> Result<Option<Arc<Session<C>>>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| SessionError::RegistryPoisoned)?;
        Ok(sessions.get(key).cloned())
    }

    /// The cached session for `key`, created with `create` when missing.
    pub fn get_or_insert_with<F>(&self, key: SessionKey, create: F) -> Result<Arc<Session<C>>>
    where
        F: FnOnce() -> Result<Session<C>>,
    {
        if let Some(session) = self.get(&key)? {
            return Ok(session);
        }

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| SessionError::RegistryPoisoned)?;
        if let Some(session) = sessions.get(&key) {
            return Ok(Arc::clone(session));
        }
        debug!("registering session for {}@{}:{}", key.username, key.host, key.port);
        let session = Arc::new(create()?);
        sessions.insert(key, Arc::clone(&session));
        Ok(session)
    }

    /// Forget a session. Callers still holding it keep a working handle.
    pub fn remove(&self, key: &SessionKey) -> Result<Option<Arc<Session<C>>>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| SessionError::RegistryPoisoned)?;
        Ok(sessions.remove(key))
    }

    pub fn len(&self) -> Result<usize> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| SessionError::RegistryPoisoned)?;
        Ok(sessions.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Close every cached session and empty the registry.
    pub async fn close_all(&self) -> Result<()> {
        let drained: Vec<_> = {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| SessionError::RegistryPoisoned)?;
            sessions.drain().collect()
        };
        for (key, session) in drained {
            if let Err(e) = session.close().await {
                warn!("closing session for {}: {}", key.host, e);
            }
        }
        Ok(())
    }
}

impl SessionRegistry<SshConnector> {
    /// Get the global registry.
    pub fn global() -> &'static SessionRegistry {
        &REGISTRY
    }

    /// The cached session for the builder's device, built if missing.
    pub fn session(&self, builder: SessionBuilder) -> Result<Arc<Session>> {
        let (connector, options) = builder.build_parts()?;
        let config = connector.config();
        let key = SessionKey::new(config.host.clone(), config.port, config.username.clone());
        self.get_or_insert_with(key, || Ok(Session::new(connector, options)))
    }
}
