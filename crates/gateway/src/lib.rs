//! Gateway: HTTP front door that binds JSON-RPC conversations to long-lived
//! sessions and routes follow-up requests to the right protocol engine.
//!
//! Lifecycle:
//! 1. Resolve config (bind address, body limit, TTL, sweep/drain timings)
//! 2. Start the HTTP server (health + session endpoint)
//! 3. `initialize` requests mint a session and a fresh transport
//! 4. Subsequent requests are routed by the `mcp-session-id` header
//! 5. A background sweeper evicts idle sessions; termination signals drain
//!    every live transport within a bounded window
//!
//! The protocol engine itself lives behind the [`transport::SessionTransport`]
//! trait; this crate never interprets message content beyond spotting the
//! `initialize` method that starts a session.

pub mod body;
pub mod config;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod transport;
