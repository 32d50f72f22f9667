//! Minimal built-in engine.
//!
//! Acknowledges `initialize`, answers `ping`, accepts notifications with a
//! 202, and returns method-not-found for everything else. It exists so the
//! gateway can run and be smoke-tested without a real protocol engine
//! attached; production deployments swap in their own `TransportFactory`.

use std::sync::{Arc, Mutex};

use {
    anyhow::Result,
    async_trait::async_trait,
    axum::response::{IntoResponse, Json, Response},
    http::{HeaderValue, Method, StatusCode, request::Parts},
    serde_json::{Value, json},
};

use portico_gateway::{
    rpc::SESSION_ID_HEADER,
    transport::{CloseHook, SessionTransport, TransportFactory},
};

pub struct LoopbackEngine;

#[async_trait]
impl TransportFactory for LoopbackEngine {
    async fn create(&self, session_id: &str) -> Result<Arc<dyn SessionTransport>> {
        Ok(Arc::new(LoopbackTransport {
            session_id: session_id.to_string(),
            hook: Mutex::new(None),
        }))
    }
}

pub struct LoopbackTransport {
    session_id: String,
    hook: Mutex<Option<CloseHook>>,
}

impl LoopbackTransport {
    /// Response for a single message, or `None` for a notification.
    fn reply(&self, msg: &Value) -> Option<Value> {
        let id = msg.get("id")?.clone();
        let result = match msg.get("method").and_then(Value::as_str) {
            Some("initialize") => json!({
                "protocolVersion": "2025-03-26",
                "serverInfo": {
                    "name": "portico-loopback",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {},
            }),
            Some("ping") => json!({}),
            other => {
                return Some(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32601,
                        "message": format!("method not found: {}", other.unwrap_or("<none>")),
                    },
                }));
            },
        };
        Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }

    fn tagged(&self, mut resp: Response) -> Response {
        if let Ok(value) = HeaderValue::from_str(&self.session_id) {
            resp.headers_mut().insert(SESSION_ID_HEADER, value);
        }
        resp
    }

    fn take_hook(&self) -> Option<CloseHook> {
        self.hook.lock().ok().and_then(|mut guard| guard.take())
    }
}

#[async_trait]
impl SessionTransport for LoopbackTransport {
    async fn handle_request(&self, parts: Parts, body: Option<Value>) -> Result<Response> {
        let resp = match (parts.method.clone(), body) {
            (Method::POST, Some(Value::Array(batch))) => {
                let replies: Vec<Value> = batch.iter().filter_map(|m| self.reply(m)).collect();
                if replies.is_empty() {
                    StatusCode::ACCEPTED.into_response()
                } else {
                    Json(Value::Array(replies)).into_response()
                }
            },
            (Method::POST, Some(msg)) => match self.reply(&msg) {
                Some(reply) => Json(reply).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            },
            (Method::DELETE, _) => {
                self.close().await?;
                Json(json!({"ok": true})).into_response()
            },
            _ => (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(json!({"error": "Streaming is not supported by the loopback engine"})),
            )
                .into_response(),
        };
        Ok(self.tagged(resp))
    }

    async fn close(&self) -> Result<()> {
        if let Some(hook) = self.take_hook() {
            hook();
        }
        Ok(())
    }

    fn set_close_hook(&self, hook: CloseHook) {
        if let Ok(mut guard) = self.hook.lock() {
            *guard = Some(hook);
        }
    }
}
