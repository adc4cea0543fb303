//! The structured message wrapper used at the host boundary.
//!
//! Every message crossing the worker/host channel is an [`Envelope`]:
//! a target channel, a type tag, an opaque JSON body, and an optional
//! progress fraction. The wire shape is
//! `{"target": "worker"|"compile"|"languageServer", "type": ..., "body": ..., "progress": ...}`.

use serde::{Deserialize, Serialize};

/// The logical channel an envelope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "worker")]
    Worker,
    #[serde(rename = "compile")]
    Compile,
    #[serde(rename = "languageServer")]
    LanguageServer,
}

/// Unit of communication across the host boundary.
///
/// Fields are private; construction goes through the named constructors
/// below, and an envelope is immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    target: Target,
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<f64>,
}

impl Envelope {
    /// Generic constructor for inbound envelopes built by hosts and tests.
    #[must_use]
    pub fn new(target: Target, kind: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            target,
            kind: kind.into(),
            body,
            progress: None,
        }
    }

    /// A staged-startup progress report: body is the stage label.
    #[must_use]
    pub fn progress_report(label: &str, fraction: f64) -> Self {
        Self {
            target: Target::Worker,
            kind: "progress".to_string(),
            body: Some(serde_json::Value::String(label.to_string())),
            progress: Some(fraction),
        }
    }

    /// A worker lifecycle error (initialization failure and the like).
    #[must_use]
    pub fn worker_error(message: &str) -> Self {
        Self {
            target: Target::Worker,
            kind: "error".to_string(),
            body: Some(serde_json::Value::String(message.to_string())),
            progress: None,
        }
    }

    /// The successful build artifact, as a byte array body.
    #[must_use]
    pub fn hex(artifact: &[u8]) -> Self {
        Self {
            target: Target::Compile,
            kind: "hex".to_string(),
            body: Some(serde_json::Value::from(artifact.to_vec())),
            progress: None,
        }
    }

    /// A failed build, carrying the captured diagnostic text.
    #[must_use]
    pub fn build_error(diagnostic: &str) -> Self {
        Self {
            target: Target::Compile,
            kind: "error".to_string(),
            body: Some(serde_json::Value::String(diagnostic.to_string())),
            progress: None,
        }
    }

    /// The unconditional end-of-build marker, sent after `hex` or `error`.
    #[must_use]
    pub fn compile_complete() -> Self {
        Self {
            target: Target::Compile,
            kind: "compile-complete".to_string(),
            body: None,
            progress: None,
        }
    }

    /// A decoded language-server message forwarded to the host verbatim.
    #[must_use]
    pub fn language_server_response(body: serde_json::Value) -> Self {
        Self {
            target: Target::LanguageServer,
            kind: "response".to_string(),
            body: Some(body),
            progress: None,
        }
    }

    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }

    /// The type tag used for dispatch.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Consume the envelope, yielding its body.
    #[must_use]
    pub fn into_body(self) -> Option<serde_json::Value> {
        self.body
    }

    #[must_use]
    pub fn progress(&self) -> Option<f64> {
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_wire_names() {
        assert_eq!(
            serde_json::to_value(Target::LanguageServer).unwrap(),
            "languageServer"
        );
        assert_eq!(serde_json::to_value(Target::Worker).unwrap(), "worker");
        assert_eq!(serde_json::to_value(Target::Compile).unwrap(), "compile");
    }

    #[test]
    fn test_progress_envelope_shape() {
        let env = Envelope::progress_report("headers", 0.75);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["target"], "worker");
        assert_eq!(json["type"], "progress");
        assert_eq!(json["body"], "headers");
        assert_eq!(json["progress"], 0.75);
    }

    #[test]
    fn test_compile_complete_omits_body_and_progress() {
        let json = serde_json::to_value(Envelope::compile_complete()).unwrap();
        assert_eq!(json["target"], "compile");
        assert_eq!(json["type"], "compile-complete");
        assert!(json.get("body").is_none(), "body must be omitted, not null");
        assert!(json.get("progress").is_none());
    }

    #[test]
    fn test_hex_envelope_carries_bytes() {
        let env = Envelope::hex(&[0x3a, 0x10, 0x00]);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "hex");
        assert_eq!(json["body"], serde_json::json!([58, 16, 0]));
    }

    #[test]
    fn test_inbound_roundtrip() {
        let wire = serde_json::json!({
            "target": "languageServer",
            "type": "languageServer",
            "body": { "jsonrpc": "2.0", "id": 1, "method": "initialize" }
        });
        let env: Envelope = serde_json::from_value(wire).unwrap();
        assert_eq!(env.target(), Target::LanguageServer);
        assert_eq!(env.kind(), "languageServer");
        assert_eq!(env.body().unwrap()["method"], "initialize");
        assert!(env.progress().is_none());
    }
}
