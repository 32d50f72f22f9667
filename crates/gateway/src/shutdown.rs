//! Shutdown coordinator.
//!
//! Termination signals stop the sweeper, drain every live session
//! concurrently, and bound the whole affair with a fallback that forces the
//! process out rather than letting a misbehaving transport hang exit.

use std::{sync::Arc, time::Duration};

use {
    futures::future::join_all,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::state::GatewayState;

/// Close every registered session, waiting at most `bound` for the closes
/// to settle. Each close is independent; failures are logged and swallowed.
pub async fn drain_sessions(state: &GatewayState, bound: Duration) {
    let sessions = state.take_all().await;
    if sessions.is_empty() {
        return;
    }
    info!(sessions = sessions.len(), "draining sessions");

    let closes = sessions.into_iter().map(|(id, transport)| async move {
        if let Err(e) = transport.close().await {
            warn!(session = %id, error = %e, "error closing session during shutdown");
        }
    });
    if tokio::time::timeout(bound, join_all(closes)).await.is_err() {
        warn!(bound_secs = bound.as_secs(), "session drain did not settle within bound");
    }
}

/// Future handed to `axum::serve(...).with_graceful_shutdown`.
///
/// Resolving it makes the server stop accepting new connections, so the
/// sequence is: wait for a signal, stop the sweeper, arm the force-exit
/// fallback, drain, then return.
pub async fn shutdown_signal(state: Arc<GatewayState>, sweeper: CancellationToken) {
    wait_for_termination().await;
    info!("shutdown signal received");
    sweeper.cancel();

    let bound = state.config.drain_timeout;
    tokio::spawn(async move {
        tokio::time::sleep(bound).await;
        warn!("shutdown exceeded drain timeout, forcing exit");
        std::process::exit(0);
    });

    drain_sessions(&state, bound).await;
    info!("sessions drained, stopping server");
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            },
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use {
        anyhow::Result,
        async_trait::async_trait,
        axum::response::{IntoResponse, Response},
        http::{StatusCode, request::Parts},
        serde_json::Value,
        tokio::time::Instant,
    };

    use {
        super::*,
        crate::{
            config::GatewayConfig,
            transport::{CloseHook, SessionTransport, TransportFactory},
        },
    };

    struct DrainTransport {
        close_started: Arc<AtomicUsize>,
        hang: bool,
    }

    #[async_trait]
    impl SessionTransport for DrainTransport {
        async fn handle_request(&self, _: Parts, _: Option<Value>) -> Result<Response> {
            Ok(StatusCode::OK.into_response())
        }

        async fn close(&self) -> Result<()> {
            self.close_started.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                futures::future::pending::<()>().await;
            }
            Ok(())
        }

        fn set_close_hook(&self, _hook: CloseHook) {}
    }

    struct NullFactory;

    #[async_trait]
    impl TransportFactory for NullFactory {
        async fn create(&self, _session_id: &str) -> Result<Arc<dyn SessionTransport>> {
            anyhow::bail!("not used")
        }
    }

    #[tokio::test]
    async fn drain_closes_everything_within_the_bound_despite_a_hung_close() {
        let state = GatewayState::new(GatewayConfig::default(), Arc::new(NullFactory));
        let close_started = Arc::new(AtomicUsize::new(0));

        for (id, hang) in [("a", false), ("b", true), ("c", false)] {
            let transport = Arc::new(DrainTransport {
                close_started: Arc::clone(&close_started),
                hang,
            });
            state.register(id.into(), transport as _).await.unwrap();
        }

        let started = Instant::now();
        drain_sessions(&state, Duration::from_millis(200)).await;

        assert_eq!(close_started.load(Ordering::SeqCst), 3, "every close initiated");
        assert_eq!(state.session_count().await, 0);
        assert!(started.elapsed() < Duration::from_secs(2), "drain must stay bounded");
    }

    #[tokio::test]
    async fn drain_with_no_sessions_returns_immediately() {
        let state = GatewayState::new(GatewayConfig::default(), Arc::new(NullFactory));
        let started = Instant::now();
        drain_sessions(&state, Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
