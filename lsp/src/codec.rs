//! Incremental JSON-RPC framing codec.
//!
//! The language server emits `Content-Length: N\r\n\r\n{json}` frames, but
//! delivery is byte-at-a-time with no message boundaries of its own, so the
//! decoder must be resumable across arbitrarily small writes. [`StreamFramer`]
//! is a push-based state machine: feed it whatever bytes arrived and collect
//! the complete payloads it emits.

use std::collections::HashMap;

use anyhow::{Context, Result};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n";

const CONTENT_LENGTH: &str = "Content-Length";

/// Wrap a JSON-RPC message in the base-protocol header block.
///
/// `Content-Length` counts UTF-8 bytes of the serialized payload.
pub fn encode_frame(msg: &serde_json::Value) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg).context("serializing JSON-RPC frame")?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

enum DecoderState {
    ReadingHeaders,
    ReadingPayload { remaining: usize },
}

/// Stateful decoder reassembling a byte stream into discrete JSON payloads.
///
/// One instance per managed output stream, living as long as the owning
/// process. Framing errors (missing or malformed `Content-Length`,
/// oversized declarations, payloads that are not JSON) are logged and the
/// decoder keeps going; a partial payload is never surfaced.
pub struct StreamFramer {
    state: DecoderState,
    headers: HashMap<String, String>,
    line: Vec<u8>,
    payload: Vec<u8>,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DecoderState::ReadingHeaders,
            headers: HashMap::new(),
            line: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Feed a chunk of bytes, returning every payload completed by it.
    ///
    /// However finely the stream is chunked - including one byte at a time -
    /// the same payloads come out in the same order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        for &byte in bytes {
            if let Some(msg) = self.push_byte(byte) {
                out.push(msg);
            }
        }
        out
    }

    fn push_byte(&mut self, byte: u8) -> Option<serde_json::Value> {
        match &mut self.state {
            DecoderState::ReadingPayload { remaining } => {
                self.payload.push(byte);
                *remaining -= 1;
                if *remaining > 0 {
                    return None;
                }
                self.state = DecoderState::ReadingHeaders;
                self.headers.clear();
                let raw = std::mem::take(&mut self.payload);
                match serde_json::from_slice(&raw) {
                    Ok(msg) => Some(msg),
                    Err(e) => {
                        tracing::warn!("discarding unparseable frame payload: {e}");
                        None
                    }
                }
            }
            DecoderState::ReadingHeaders => {
                self.line.push(byte);
                if self.line.ends_with(HEADER_TERMINATOR) {
                    self.line.truncate(self.line.len() - HEADER_TERMINATOR.len());
                    if self.line.is_empty() {
                        self.finish_headers();
                    } else {
                        self.accept_header_line();
                    }
                    self.line.clear();
                }
                None
            }
        }
    }

    fn accept_header_line(&mut self) {
        let text = String::from_utf8_lossy(&self.line).into_owned();
        // A payload from an earlier malformed frame can end up glued to the
        // front of a header line (we had no length to skip it by). Matching
        // the length header from the tail of the line lets the decoder
        // resynchronize at the next real frame boundary.
        if let Some(idx) = text.rfind("Content-Length:") {
            let value = text[idx + "Content-Length:".len()..].trim();
            self.headers
                .insert(CONTENT_LENGTH.to_string(), value.to_string());
            return;
        }
        if let Some((name, value)) = text.split_once(": ") {
            self.headers.insert(name.to_string(), value.to_string());
        } else {
            tracing::trace!("discarding stray bytes before next header: {text:?}");
        }
    }

    fn finish_headers(&mut self) {
        let length = match self.headers.get(CONTENT_LENGTH) {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("malformed Content-Length {value:?}: {e}");
                    self.headers.clear();
                    return;
                }
            },
            None => {
                tracing::warn!("header block without Content-Length; cannot read frame payload");
                self.headers.clear();
                return;
            }
        };
        if length > MAX_FRAME_BYTES {
            tracing::warn!("rejecting frame with Content-Length {length}");
            self.headers.clear();
            return;
        }
        if length == 0 {
            // A zero-length frame is well-formed; it just carries nothing.
            tracing::trace!("zero-length frame; nothing to emit");
            self.headers.clear();
            return;
        }
        self.payload.clear();
        self.payload.reserve(length);
        self.state = DecoderState::ReadingPayload { remaining: length };
    }
}
