//! Build orchestration for the Crucible worker.
//!
//! Drives external command-line tools (compiler, linker, object-copy) through
//! a compile → link → convert sequence over a virtual filesystem, classifying
//! failure from captured diagnostics and reporting weighted progress across
//! an async channel. Tools and the filesystem are trait seams so the whole
//! sequence is testable with scripted fakes.

pub mod coordinator;
pub mod diagnostics;
pub mod invoker;
pub mod pipeline;
pub mod toolchain;
pub mod vfs;

pub use coordinator::{BuildCoordinator, BuildError};
pub use invoker::{ProcessInvoker, ToolInvoker};
pub use pipeline::{ProgressHandle, ProgressUpdate, WeightedPipeline};
pub use toolchain::Toolchain;
pub use vfs::{DiskVfs, MemoryVfs, Vfs, unpack_bundle};
