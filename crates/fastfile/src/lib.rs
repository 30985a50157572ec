//! # fastfile: high-throughput writes through Direct I/O
//!
//! A [`DirectFile`] accepts writes at arbitrary byte offsets and lengths and
//! turns them into the page-aligned transfers the kernel's unbuffered mode
//! (`O_DIRECT`) demands, falling back to ordinary buffered I/O when the
//! filesystem refuses the fast mode.
//!
//! The hard part is the alignment gap: a request's unaligned head and tail
//! cannot go to the device directly, so they land in a small write-back page
//! cache, while the aligned middle is staged through a per-caller scratch
//! buffer and written in bulk, bypassing the cache. The cache therefore stays
//! bounded by the number of outstanding unaligned write boundaries, not by
//! file size.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use fastfile::{DirectFile, FileOptions, WriteBuffer};
//!
//! # fn main() -> Result<(), fastfile::FileError> {
//! let file = DirectFile::open(Path::new("data.bin"), FileOptions::create())?;
//! let mut scratch = WriteBuffer::default();
//!
//! file.write(b"hello", 4100, &mut scratch)?;
//! file.flush()?;
//! file.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! [`DirectFile::write`] and [`DirectFile::flush`] are safe to call from many
//! threads on one handle, provided every thread brings its own
//! [`WriteBuffer`]. No ordering is defined between concurrent writes to
//! overlapping ranges; callers partition the offset space.
//! [`DirectFile::close`] consumes the handle and must happen after all
//! writers have finished.

mod cache;
mod error;
mod file;

pub use error::FileError;
pub use file::{
    DEFAULT_BUFFER_SIZE, DEFAULT_PAGE_SIZE_LOG2, DirectFile, FileOptions, WriteBuffer,
};

pub use fastfile_io::IoError;
