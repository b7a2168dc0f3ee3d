//! Buffered stream engine.
//!
//! Implements the `fopen`/`fread`/`fwrite`/`fseek`/`ftell` family over a raw
//! descriptor with one fixed-size buffer per stream.

pub mod buffer;
pub mod io;
pub mod mode;
pub mod stream;

pub use buffer::{BufferState, StreamBuffer};
pub use io::{Descriptor, RawIo, Whence};
pub use mode::{CREATE_PERMISSIONS, OpenMode};
pub use stream::Stream;
