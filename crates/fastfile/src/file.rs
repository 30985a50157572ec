//! File handle and the request-splitting write path.
//!
//! [`DirectFile`] owns the descriptor, the probed capability flag, and the
//! page cache behind one lock. Its [`write`](DirectFile::write) decomposes an
//! arbitrary `(offset, length)` request into:
//!
//! 1. an optional unaligned head, merged into a cached page,
//! 2. zero or more page-aligned bulk chunks, staged through the caller's
//!    [`WriteBuffer`] and written directly to the device (evicting any cached
//!    pages they cover),
//! 3. an optional unaligned tail, merged into a cached page.
//!
//! The bulk syscall and the staging copy run outside the lock; only the
//! cache bookkeeping is serialized.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use fastfile_io::{AlignedBuf, IoError, OpenFlags, RawFile};

use crate::FileError;
use crate::cache::PageCache;

/// Default page-size exponent (4096-byte pages).
pub const DEFAULT_PAGE_SIZE_LOG2: u32 = 12;

/// Default scratch-buffer size for staging bulk transfers (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Open-time options for a [`DirectFile`].
#[derive(Debug, Clone, Copy)]
pub struct FileOptions {
    /// Open for reading.
    pub read: bool,
    /// Open for writing.
    pub write: bool,
    /// Create the file if it doesn't exist.
    pub create: bool,
    /// The file has existing content that must be preserved: cache misses
    /// read the device instead of assuming the region is unwritten. Implies
    /// read access on the descriptor.
    pub preserve_existing: bool,
    /// Page-size exponent; pages are `1 << page_size_log2` bytes.
    pub page_size_log2: u32,
    /// Scratch-buffer size hint for bulk transfers. Rounded up to a whole
    /// number of pages (at least one) at open.
    pub buffer_size: usize,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            read: false,
            write: false,
            create: false,
            preserve_existing: false,
            page_size_log2: DEFAULT_PAGE_SIZE_LOG2,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl FileOptions {
    /// Options for writing a fresh file, creating it if needed.
    pub fn create() -> Self {
        Self {
            write: true,
            create: true,
            ..Self::default()
        }
    }

    /// Options for updating a file in place, preserving existing content.
    pub fn modify() -> Self {
        Self {
            read: true,
            write: true,
            preserve_existing: true,
            ..Self::default()
        }
    }
}

/// Per-caller scratch memory for staging bulk transfers.
///
/// Default-initialized and lazily allocated (page-aligned, sized to the
/// handle's buffer size) on first use; re-use it across calls from the same
/// thread to avoid repeated allocation. Never share one between concurrent
/// callers.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    buf: Option<AlignedBuf>,
}

impl WriteBuffer {
    /// Returns the backing allocation, (re)allocating when absent or too
    /// small for this handle's geometry.
    fn ensure(&mut self, len: usize, align: usize) -> &mut AlignedBuf {
        let fits = matches!(&self.buf, Some(buf) if buf.len() >= len && buf.align() >= align);
        if fits {
            self.buf.as_mut().expect("checked above")
        } else {
            self.buf.insert(AlignedBuf::zeroed(len, align))
        }
    }
}

/// A file handle for high-throughput writes at arbitrary offsets.
///
/// # Invariants
///
/// - Bulk aligned transfers bypass the cache; only unaligned heads and tails
///   ever populate it.
/// - Every bulk transfer's offset and length are multiples of the page size,
///   and its memory is page-aligned, so it is valid under `O_DIRECT`.
/// - The same splitting logic runs whether or not the fast mode was
///   negotiated; [`is_direct`](Self::is_direct) is purely observational.
#[derive(Debug)]
pub struct DirectFile {
    /// `None` only after `close` has taken the descriptor.
    raw: Option<RawFile>,
    page_size_log2: u32,
    page_size: usize,
    align_mask: u64,
    buffer_size: usize,
    cache: Mutex<PageCache>,
}

impl DirectFile {
    /// Opens `path` for writing, probing for Direct I/O first and falling
    /// back to buffered I/O when the filesystem refuses it.
    pub fn open(path: &Path, options: FileOptions) -> Result<Self, FileError> {
        if !options.write {
            return Err(FileError::InvalidOptions {
                reason: "write access is required",
            });
        }
        if !(9..=30).contains(&options.page_size_log2) {
            return Err(FileError::InvalidOptions {
                reason: "page size exponent out of range (expected 9..=30)",
            });
        }

        let page_size = 1usize << options.page_size_log2;
        let buffer_size = options.buffer_size.max(page_size).div_ceil(page_size) * page_size;

        // A writable descriptor is always opened readable too: once a flush
        // commits bytes, later cache misses must re-read them from the
        // device, whatever `read` and `preserve_existing` said at open.
        let raw = RawFile::open(
            path,
            OpenFlags {
                read: options.read || options.write || options.preserve_existing,
                write: options.write,
                create: options.create,
                direct: true,
            },
        )?;

        tracing::debug!(
            path = %path.display(),
            direct = raw.is_direct(),
            page_size,
            buffer_size,
            "opened direct file"
        );

        Ok(Self {
            raw: Some(raw),
            page_size_log2: options.page_size_log2,
            page_size,
            align_mask: (page_size - 1) as u64,
            buffer_size,
            cache: Mutex::new(PageCache::new(
                options.page_size_log2,
                options.preserve_existing,
            )),
        })
    }

    /// Returns true when the handle actually uses Direct I/O.
    pub fn is_direct(&self) -> bool {
        self.raw.as_ref().is_some_and(RawFile::is_direct)
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of dirty pages currently cached.
    pub fn cached_pages(&self) -> usize {
        self.lock_cache().len()
    }

    /// Writes `data` at the given byte offset.
    ///
    /// Safe to call from many threads on one handle, provided each thread
    /// supplies its own [`WriteBuffer`]. No ordering is defined between
    /// concurrent writes to overlapping byte ranges.
    pub fn write(
        &self,
        data: &[u8],
        offset: u64,
        scratch: &mut WriteBuffer,
    ) -> Result<(), FileError> {
        let raw = self.raw.as_ref().ok_or(FileError::Closed)?;
        let length = data.len();
        let mut total = 0usize;

        // Unaligned head: merge into the covering cached page.
        let offset_mod = (offset & self.align_mask) as usize;
        if offset_mod != 0 && length > 0 {
            let count = usize::min(self.page_size - offset_mod, length);
            {
                let mut cache = self.lock_cache();
                let page = cache.page_for_write(raw, offset)?;
                page[offset_mod..offset_mod + count].copy_from_slice(&data[..count]);
            }
            total += count;
        }

        while total < length {
            let mut count = usize::min(length - total, self.buffer_size);
            let address = offset + total as u64;
            if count >= self.page_size {
                // Aligned bulk chunk: stage outside the lock, write direct,
                // then discard any cached pages we just over-wrote.
                count &= !(self.page_size - 1);

                let buf = scratch.ensure(self.buffer_size, self.page_size);
                buf[..count].copy_from_slice(&data[total..total + count]);

                let written = raw.write_at(&buf[..count], address)?;
                if written != count {
                    return Err(IoError::ShortWrite {
                        offset: address,
                        expected: count,
                        actual: written,
                    }
                    .into());
                }

                let begin = address >> self.page_size_log2;
                let end = (address + count as u64) >> self.page_size_log2;
                self.lock_cache().evict_range(begin, end);
            } else {
                // Final sub-page tail: merge into the covering cached page.
                let mut cache = self.lock_cache();
                let page = cache.page_for_write(raw, address)?;
                let page_offset = (address & self.align_mask) as usize;
                page[page_offset..page_offset + count]
                    .copy_from_slice(&data[total..total + count]);
            }
            total += count;
        }
        Ok(())
    }

    /// Flushes all cached pages to the device.
    ///
    /// Each page is written in full at its aligned offset. On failure the
    /// flush stops: pages written so far stay written, the rest stay cached
    /// for a retry. No-op on a closed handle.
    pub fn flush(&self) -> Result<(), FileError> {
        let Some(raw) = self.raw.as_ref() else {
            return Ok(());
        };
        let flushed = self.lock_cache().flush(raw)?;
        if flushed > 0 {
            tracing::debug!(pages = flushed, "flushed page cache");
        }
        Ok(())
    }

    /// Flushes the cache and releases the descriptor.
    ///
    /// Not safe to call concurrently with writes; consume the handle only
    /// after all writer threads have finished. The descriptor is released
    /// even when the final flush fails.
    pub fn close(mut self) -> Result<(), FileError> {
        let Some(raw) = self.raw.take() else {
            return Ok(());
        };
        let flush_result = self.lock_cache().flush(&raw);
        let close_result = raw.close();
        flush_result?;
        close_result?;
        Ok(())
    }

    fn lock_cache(&self) -> MutexGuard<'_, PageCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DirectFile {
    fn drop(&mut self) {
        let Some(raw) = self.raw.take() else {
            return;
        };
        if let Err(error) = self.lock_cache().flush(&raw) {
            tracing::error!(error = %error, "failed to flush page cache during DirectFile drop");
        }
        if let Err(error) = raw.close() {
            tracing::error!(error = %error, "failed to close file during DirectFile drop");
        }
    }
}
