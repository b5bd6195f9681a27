//! Built-in pipeline stages.
//!
//! `source` turns glob patterns into a record stream, `init` ingests records
//! into the current task's collection and flushes it at end-of-stream, and
//! `dest` computes final output paths.

mod dest;
mod init;
mod source;

pub use dest::{DestHook, DestRouter, DestStage, DestTarget};
pub use init::InitStage;
pub use source::{SourceOptions, SourceStage};
