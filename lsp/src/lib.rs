//! Language-server byte channel for the Crucible worker.
//!
//! The embedded language server speaks `Content-Length: N\r\n\r\n{json}`
//! framing over what is, from this crate's point of view, an unbuffered
//! byte-at-a-time stream. [`StreamFramer`] reassembles that stream into
//! discrete JSON-RPC messages; [`LanguageServerChannel`] wraps outbound
//! messages and buffers them until the worker has finished its staged
//! startup.

pub mod channel;
pub mod codec;

pub use channel::{LanguageServerChannel, pump_output};
pub use codec::{StreamFramer, encode_frame};
