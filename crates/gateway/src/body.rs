//! Size-capped request body reading.
//!
//! Bodies are accumulated in memory up to a hard byte limit and then parsed
//! as a single JSON value. Callers never see a partial or garbled structure:
//! every failure mode collapses to a [`BodyError`].

use {axum::body::Body, bytes::BytesMut, futures::StreamExt, serde_json::Value, thiserror::Error};

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body exceeds the {0}-byte limit")]
    TooLarge(usize),
    #[error("request body is not valid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("error reading request body: {0}")]
    Read(axum::Error),
}

impl BodyError {
    /// Oversized bodies leave unread bytes on the wire, so the connection
    /// should not be reused after the error response.
    pub fn poisons_connection(&self) -> bool {
        matches!(self, Self::TooLarge(_))
    }
}

/// Read an HTTP request body into memory and parse it as JSON.
///
/// A declared `Content-Length` above `limit` fails immediately, before the
/// stream is polled at all. Accumulation crossing `limit` mid-stream stops
/// reading and fails. A clean end-of-stream is decoded as UTF-8 JSON; both
/// decode and parse failures yield [`BodyError::Invalid`].
pub async fn read_json_body(
    body: Body,
    content_length: Option<u64>,
    limit: usize,
) -> Result<Value, BodyError> {
    if content_length.is_some_and(|len| len > limit as u64) {
        return Err(BodyError::TooLarge(limit));
    }

    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(serde_json::from_slice(&buf)?)
}
