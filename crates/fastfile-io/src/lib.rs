//! # fastfile-io: raw device layer for fastfile
//!
//! This crate owns everything that talks to the kernel:
//!
//! - [`RawFile`]: an open descriptor with positioned read/write. `open`
//!   probes for `O_DIRECT` support and transparently falls back to ordinary
//!   buffered I/O when the filesystem refuses it.
//! - [`AlignedBuf`]: a heap allocation whose address is guaranteed to be
//!   aligned, as `O_DIRECT` transfers require the source memory, the file
//!   offset, and the length to all be multiples of the page size.
//!
//! Whether the fast mode was actually negotiated is observational
//! ([`RawFile::is_direct`]); callers in `fastfile` run the identical
//! alignment logic either way.
//!
//! # Features
//!
//! - `direct_io` (default): probe `O_DIRECT` on Linux (requires `libc`)

mod aligned;
mod error;
mod raw;

pub use aligned::AlignedBuf;
pub use error::IoError;
pub use raw::{OpenFlags, RawFile};
