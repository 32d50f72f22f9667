//! Shared gateway state: the session registry.
//!
//! The registry is the single source of truth for "does this session
//! exist". It is owned by [`GatewayState`] and threaded explicitly through
//! the router, sweeper, and shutdown coordinator; nothing else can reach a
//! transport except through it.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
    time::Instant,
};

use {
    thiserror::Error,
    tokio::sync::RwLock,
    tracing::{info, warn},
};

use crate::{
    config::GatewayConfig,
    transport::{SessionTransport, TransportFactory},
};

// ── Session record ───────────────────────────────────────────────────────────

/// One logical client conversation bound to one transport.
pub struct Session {
    /// The only strong reference to the transport outside an in-flight call.
    pub transport: Arc<dyn SessionTransport>,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl Session {
    fn new(transport: Arc<dyn SessionTransport>) -> Self {
        let now = Instant::now();
        Self {
            transport,
            created_at: now,
            last_activity: now,
        }
    }

    /// Touch the activity timestamp.
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Session ids are never reused, so a duplicate insert is a bug somewhere;
/// the registry refuses to overwrite rather than papering over it.
#[derive(Debug, Error)]
#[error("session id already registered: {0}")]
pub struct DuplicateSessionId(pub String);

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    sessions: RwLock<HashMap<String, Session>>,
    pub config: GatewayConfig,
    /// Builds one fresh transport per new session.
    pub factory: Arc<dyn TransportFactory>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, factory: Arc<dyn TransportFactory>) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            factory,
        })
    }

    /// Register a freshly initialized session.
    pub async fn register(
        &self,
        id: String,
        transport: Arc<dyn SessionTransport>,
    ) -> Result<(), DuplicateSessionId> {
        match self.sessions.write().await.entry(id) {
            Entry::Occupied(entry) => Err(DuplicateSessionId(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(Session::new(transport));
                Ok(())
            },
        }
    }

    /// Remove a session by id. Absent ids are simply absent; every
    /// destruction path (DELETE, sweep, close hook, drain) may race here.
    pub async fn remove(&self, id: &str) -> Option<Session> {
        self.sessions.write().await.remove(id)
    }

    /// Update a session's activity timestamp and hand out its transport in
    /// one lock acquisition. This is the router's re-validation point after
    /// body-read awaits: absence here means "unknown session", full stop.
    pub async fn touch_and_get(&self, id: &str) -> Option<Arc<dyn SessionTransport>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        session.touch();
        Some(Arc::clone(&session.transport))
    }

    /// Look up a transport without touching activity (DELETE handling).
    pub async fn transport(&self, id: &str) -> Option<Arc<dyn SessionTransport>> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|s| Arc::clone(&s.transport))
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Empty the registry, returning every session for shutdown draining.
    pub async fn take_all(&self) -> Vec<(String, Arc<dyn SessionTransport>)> {
        self.sessions
            .write()
            .await
            .drain()
            .map(|(id, session)| (id, session.transport))
            .collect()
    }

    /// Evict every session idle past the TTL. Returns how many went.
    ///
    /// Expiry is snapshotted under the read lock, then re-checked under the
    /// write lock per id so a concurrent touch wins the race. Transport
    /// close failures are logged and swallowed; a stuck engine must never
    /// block reclamation of its slot.
    pub async fn sweep_expired(&self) -> usize {
        let ttl = self.config.session_ttl;
        let expired: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.last_activity.elapsed() > ttl)
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut evicted = 0;
        for id in expired {
            let removed = {
                let mut sessions = self.sessions.write().await;
                let still_idle = sessions
                    .get(&id)
                    .is_some_and(|s| s.last_activity.elapsed() > ttl);
                if still_idle { sessions.remove(&id) } else { None }
            };
            let Some(session) = removed else { continue };
            info!(
                session = %id,
                age_secs = session.created_at.elapsed().as_secs(),
                "session expired, evicting"
            );
            if let Err(e) = session.transport.close().await {
                warn!(session = %id, error = %e, "error closing expired session transport");
            }
            evicted += 1;
        }
        evicted
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use {
        anyhow::Result,
        async_trait::async_trait,
        axum::response::{IntoResponse, Response},
        http::{StatusCode, request::Parts},
        serde_json::Value,
    };

    use {super::*, crate::transport::CloseHook};

    #[derive(Default)]
    struct FakeTransport {
        closed: AtomicUsize,
    }

    #[async_trait]
    impl SessionTransport for FakeTransport {
        async fn handle_request(&self, _: Parts, _: Option<Value>) -> Result<Response> {
            Ok(StatusCode::OK.into_response())
        }

        async fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn set_close_hook(&self, _hook: CloseHook) {}
    }

    struct FakeFactory;

    #[async_trait]
    impl TransportFactory for FakeFactory {
        async fn create(&self, _session_id: &str) -> Result<Arc<dyn SessionTransport>> {
            Ok(Arc::new(FakeTransport::default()))
        }
    }

    fn state_with_ttl(ttl: Duration) -> Arc<GatewayState> {
        let config = GatewayConfig {
            session_ttl: ttl,
            ..GatewayConfig::default()
        };
        GatewayState::new(config, Arc::new(FakeFactory))
    }

    #[tokio::test]
    async fn register_rejects_duplicate_ids() {
        let state = state_with_ttl(Duration::from_secs(60));
        let transport = Arc::new(FakeTransport::default());
        state
            .register("s1".into(), Arc::clone(&transport) as _)
            .await
            .unwrap();
        let err = state.register("s1".into(), transport as _).await.unwrap_err();
        assert_eq!(err.0, "s1");
        assert_eq!(state.session_count().await, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let state = state_with_ttl(Duration::from_secs(60));
        state
            .register("s1".into(), Arc::new(FakeTransport::default()) as _)
            .await
            .unwrap();
        assert!(state.remove("s1").await.is_some());
        assert!(state.remove("s1").await.is_none());
        assert!(state.touch_and_get("s1").await.is_none());
    }

    #[tokio::test]
    async fn sweep_evicts_idle_sessions_and_closes_them() {
        let state = state_with_ttl(Duration::from_millis(40));
        let transport = Arc::new(FakeTransport::default());
        state
            .register("idle".into(), Arc::clone(&transport) as _)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(state.sweep_expired().await, 1);
        assert_eq!(state.session_count().await, 0);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn touch_keeps_a_session_alive_through_a_sweep() {
        let state = state_with_ttl(Duration::from_millis(120));
        state
            .register("busy".into(), Arc::new(FakeTransport::default()) as _)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(state.touch_and_get("busy").await.is_some());
        tokio::time::sleep(Duration::from_millis(80)).await;

        // 160ms since creation but only 80ms since the touch.
        assert_eq!(state.sweep_expired().await, 0);
        assert_eq!(state.session_count().await, 1);

        tokio::time::sleep(Duration::from_millis(130)).await;
        assert_eq!(state.sweep_expired().await, 1);
    }

    #[tokio::test]
    async fn take_all_empties_the_registry() {
        let state = state_with_ttl(Duration::from_secs(60));
        for id in ["a", "b", "c"] {
            state
                .register(id.into(), Arc::new(FakeTransport::default()) as _)
                .await
                .unwrap();
        }
        let drained = state.take_all().await;
        assert_eq!(drained.len(), 3);
        assert_eq!(state.session_count().await, 0);
    }
}
