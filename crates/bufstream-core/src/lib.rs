//! # bufstream-core
//!
//! Buffered, stdio-style streams layered over unbuffered file-descriptor I/O.
//!
//! [`stdio::Stream`] owns a fixed-capacity buffer and a descriptor and keeps
//! `tell` exact while bytes sit in the buffer. [`process::ProcessStream`]
//! connects the same engine to the stdin or stdout of a spawned `sh -c`
//! child and reaps it on close.
//!
//! All OS access goes through the small [`sys`] module; everything else is
//! safe Rust.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod log;
pub mod metrics;
pub mod process;
pub mod stdio;
#[allow(unsafe_code)]
pub mod sys;

pub use config::StreamConfig;
pub use error::StreamError;
pub use process::{PipeKind, ProcessStream, WaitStatus};
pub use stdio::{BufferState, Descriptor, OpenMode, RawIo, Stream, Whence};
