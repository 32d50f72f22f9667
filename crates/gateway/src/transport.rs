//! Boundary traits for the per-session protocol engine.
//!
//! The gateway owns session lifecycle; everything protocol-shaped happens
//! behind [`SessionTransport`]. One transport is built per session and is
//! reachable only through the session registry.

use std::sync::Arc;

use {
    anyhow::Result, async_trait::async_trait, axum::response::Response,
    http::request::Parts, serde_json::Value,
};

/// Callback fired exactly once when a transport closes itself (for example
/// after a protocol-level shutdown message), letting the session self-evict
/// without waiting for the sweeper. Invoked from runtime context.
pub type CloseHook = Box<dyn FnOnce() + Send + 'static>;

/// One live protocol engine bound to one session.
///
/// The gateway does not serialize concurrent requests bearing the same
/// session id; if the engine needs strict per-session ordering it must
/// enforce that itself.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Handle one routed HTTP request. For POSTs the body has already been
    /// read and parsed by the gateway and arrives as `parsed_body`; for GET
    /// and DELETE it is `None`. The transport produces the full response,
    /// including any session-id header and streaming framing.
    async fn handle_request(&self, parts: Parts, parsed_body: Option<Value>) -> Result<Response>;

    /// Tear the transport down. Called on eviction, explicit DELETE
    /// handling inside the engine, and shutdown draining. Must be safe to
    /// call more than once.
    async fn close(&self) -> Result<()>;

    /// Install the close-notification hook. The gateway sets this once,
    /// right after construction.
    fn set_close_hook(&self, hook: CloseHook);
}

/// Builds a fresh transport for a newly minted session id.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, session_id: &str) -> Result<Arc<dyn SessionTransport>>;
}
