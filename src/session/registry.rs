//! Sessions keyed by client endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{Result, SessionError};
use crate::session::worker::{Session, SessionSettings};

pub const DEFAULT_MAX_SESSIONS: usize = 20;

type SessionMap = HashMap<SocketAddr, Arc<Session>>;

/// Lookup-or-create for sessions. A session removes itself from the map when
/// its liveness timer runs out.
pub struct SessionRegistry {
    sessions: Arc<Mutex<SessionMap>>,
    settings: SessionSettings,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings, max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            settings,
            max_sessions,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Existing session for `client`, or a fresh one with its timer started.
    pub fn get_or_create(&self, client: SocketAddr) -> Result<Arc<Session>> {
        let mut sessions = self.lock();
        if let Some(session) = sessions.get(&client) {
            if !session.is_ended() {
                return Ok(Arc::clone(session));
            }
            sessions.remove(&client);
        }
        if sessions.len() >= self.max_sessions {
            log::warn!("Rejecting {}: {} sessions already open", client, sessions.len());
            return Err(SessionError::RegistryFull(self.max_sessions));
        }

        let map: Weak<Mutex<SessionMap>> = Arc::downgrade(&self.sessions);
        let session = Session::start(
            client,
            self.settings,
            Box::new(move |addr| {
                let Some(map) = map.upgrade() else { return };
                let mut sessions = map.lock().unwrap_or_else(|e| e.into_inner());
                // A replacement session may already sit under the same key
                if sessions.get(&addr).is_some_and(|s| s.is_ended()) {
                    sessions.remove(&addr);
                }
            }),
        )?;
        sessions.insert(client, Arc::clone(&session));
        log::info!("New session for {} ({} open)", client, sessions.len());
        Ok(session)
    }

    pub fn get(&self, client: &SocketAddr) -> Option<Arc<Session>> {
        self.lock().get(client).filter(|s| !s.is_ended()).cloned()
    }

    /// End and drop one session
    pub fn remove(&self, client: &SocketAddr) -> bool {
        let removed = self.lock().remove(client);
        match removed {
            Some(session) => {
                session.end();
                true
            }
            None => false,
        }
    }

    /// Live sessions at this instant
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.lock().values().filter(|s| !s.is_ended()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().values().filter(|s| !s.is_ended()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn end_all(&self) {
        let drained: Vec<Arc<Session>> = self.lock().drain().map(|(_, s)| s).collect();
        for session in drained {
            session.end();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionSettings::default(), DEFAULT_MAX_SESSIONS)
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.end_all();
    }
}
