//! The Crucible worker session.
//!
//! Ties the build coordinator and the language-server channel together behind
//! a single pair of envelope streams: the host sends `compile` and
//! `languageServer` requests in, and receives build artifacts, diagnostics,
//! startup progress, and language-server responses out. Startup runs as a
//! weighted pipeline concurrent with inbound traffic, so requests arriving
//! early are answered or queued rather than lost.

pub mod fetch;
pub mod router;
pub mod session;
pub mod startup;

pub use fetch::{Fetcher, HttpFetcher};
pub use router::MessageRouter;
pub use session::run_worker;
pub use startup::Startup;
