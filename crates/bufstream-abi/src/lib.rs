// All extern "C" exports take raw pointers from C callers and check them for
// null themselves, so per-function safety sections would only repeat that.
#![allow(clippy::missing_safety_doc)]
//! # bufstream-abi
//!
//! C boundary for `bufstream-core`.
//!
//! Produces a `cdylib` exporting the `my_fopen`/`my_fclose`/... and
//! `my_popen`/`my_pclose` family. Streams cross the boundary as opaque
//! `MY_FILE *` handles; failures return the documented sentinel and set
//! `errno`.
//!
//! ```text
//! C caller -> my_* entry (this crate) -> bufstream_core::Stream -> sys
//! ```

pub mod process_abi;
pub mod stdio_abi;

pub use stdio_abi::{MY_EOF, MY_SEEK_CUR, MY_SEEK_END, MY_SEEK_SET, MyFile};
