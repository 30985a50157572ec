//! Write-back page cache for the unaligned edges of write requests.
//!
//! The cache maps page indexes to fully-populated page buffers. A page is
//! present only when some byte of it was written through the sub-page path
//! and has not since been superseded by a bulk aligned write covering it —
//! bulk writes never populate the cache, they only evict from it.
//!
//! # Invariants
//!
//! - A cached page is never partially initialized: on a miss it is either
//!   read in full from the device (preserve mode, with any missing tail
//!   zero-extended) or fully zero-filled, before the sub-page write lands.
//! - All methods require the caller to hold the handle's lock; the cache
//!   itself is plain data inside a `Mutex`.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use fastfile_io::{AlignedBuf, IoError, RawFile};

/// Page-index keyed store of dirty sub-page writes.
///
/// Keyed by `offset >> page_size_log2`. A `BTreeMap` rather than a hash map
/// because bulk writes evict by page-index range.
#[derive(Debug)]
pub(crate) struct PageCache {
    pages: BTreeMap<u64, AlignedBuf>,
    /// Whether a cache miss must read existing device content before the
    /// sub-page write is applied. Starts as the caller's preserve flag and
    /// latches to true after the first fully successful flush: once any
    /// bytes are committed, blind zero-fill could erase flushed neighbors
    /// sharing the page.
    preserve_on_miss: bool,
    page_size_log2: u32,
    page_size: usize,
}

impl PageCache {
    pub(crate) fn new(page_size_log2: u32, preserve_on_miss: bool) -> Self {
        Self {
            pages: BTreeMap::new(),
            preserve_on_miss,
            page_size_log2,
            page_size: 1 << page_size_log2,
        }
    }

    /// Returns the page covering `address`, creating and populating it on a
    /// miss, ready for a sub-page write.
    ///
    /// Population reads up to one page from the device; a short or empty
    /// read is not an error — it is the implicit zero-extension of the
    /// file's logical tail, and the allocation is already zeroed.
    pub(crate) fn page_for_write(
        &mut self,
        raw: &RawFile,
        address: u64,
    ) -> Result<&mut [u8], IoError> {
        let index = address >> self.page_size_log2;
        let page = match self.pages.entry(index) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(slot) => {
                let mut page = AlignedBuf::zeroed(self.page_size, self.page_size);
                if self.preserve_on_miss {
                    let _ = raw.read_at(&mut page, index << self.page_size_log2)?;
                }
                slot.insert(page)
            }
        };
        Ok(page.as_mut_slice())
    }

    /// Drops every cached page whose index lies in `[begin, end)`.
    ///
    /// Called after a bulk write supersedes those pages with fresher
    /// on-device content, so a later flush cannot overwrite it with stale
    /// cached bytes.
    pub(crate) fn evict_range(&mut self, begin: u64, end: u64) {
        let stale: Vec<u64> = self.pages.range(begin..end).map(|(&index, _)| index).collect();
        for index in stale {
            self.pages.remove(&index);
        }
    }

    /// Writes every cached page in full to its aligned offset and empties
    /// the cache, latching `preserve_on_miss`.
    ///
    /// Fatal on any short write: the flush stops where it is, pages written
    /// so far stay written (and leave the cache), the rest stay cached so
    /// the caller can retry without duplicating work.
    pub(crate) fn flush(&mut self, raw: &RawFile) -> Result<usize, IoError> {
        let mut flushed = 0;
        while let Some((index, page)) = self.pages.pop_first() {
            let offset = index << self.page_size_log2;
            match raw.write_at(&page, offset) {
                Ok(n) if n == page.len() => flushed += 1,
                Ok(n) => {
                    self.pages.insert(index, page);
                    return Err(IoError::ShortWrite {
                        offset,
                        expected: self.page_size,
                        actual: n,
                    });
                }
                Err(error) => {
                    self.pages.insert(index, page);
                    return Err(error);
                }
            }
        }
        self.preserve_on_miss = true;
        Ok(flushed)
    }

    pub(crate) fn len(&self) -> usize {
        self.pages.len()
    }
}
