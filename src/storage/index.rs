use crate::error::{StorageError, StorageResult};
use crate::storage::mmap::MmapRegion;
use std::path::Path;
use tracing::warn;

/// Width of the relative offset field of an index entry.
pub const OFFSET_WIDTH: u64 = 4;

/// Width of the store position field of an index entry.
pub const POSITION_WIDTH: u64 = 8;

/// Width of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Passed to [`Index::read`] to fetch the most recent entry.
pub const LAST_ENTRY: i64 = -1;

/// An Index maps segment-relative offsets to byte positions in the store.
///
/// Purpose:
/// - O(1) offset → position lookups: entry `n` lives at byte `n * 12`
/// - Dense: every record in the segment has exactly one entry
///
/// Responsibilities:
/// - Own a `.index` file through a memory-mapped region
/// - Append entries and read them back by entry number
/// - Report its logical size, which is what drives segment rotation
///
/// NOT responsible for:
/// - Reading store data
/// - Segment rolling
/// - Deciding the relative offset (the segment passes it in)
///
/// ## On-disk format:
/// File name: `<base_offset>.index`
///
/// Each entry is exactly 12 bytes, big-endian:
/// ```text
/// | relative offset: u32 | position: u64 |
/// | 4 bytes              | 8 bytes       |
/// ```
///
/// While open, the file is `max_bytes` long (pre-allocated, zero-filled
/// past the logical end). On close it is truncated back to the logical size,
/// so reopening a cleanly closed index recovers its entry count from the
/// file size alone.
///
/// ## Unclean shutdown:
/// An index that was never closed is still exactly `max_bytes` long. On open
/// such a file is cut down to whole entries and its zero-filled tail is
/// dropped: entry `n > 0` always carries relative offset `n`, so an all-zero
/// entry past the first was never written. Whether entry 0 is real is up to
/// the segment, which checks it against the store.
///
/// ## Ownership:
/// - Index owns its mapped file exclusively
/// - Reads take &self, writes take &mut self
pub struct Index {
    /// Mapped `.index` file; its logical length is the index size.
    region: MmapRegion,
}

impl Index {
    /// Open or create an index file at the given path.
    ///
    /// If the file exists, its size is taken as the logical size. The file
    /// is then resized to `max_bytes` and the whole capacity is mapped. A
    /// file left at its pre-allocated size is recovered as described on
    /// [`Index`].
    ///
    /// # Errors
    /// - I/O errors opening, resizing or mapping the file
    /// - File size not divisible by 12 and not the pre-allocated size
    ///   (corrupted index)
    pub fn open(path: impl AsRef<Path>, max_bytes: u64) -> StorageResult<Self> {
        let path = path.as_ref();

        let existing = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let preallocated = existing != 0 && existing == max_bytes;

        // Check before mapping: the resize in MmapRegion::open would hide it.
        if existing % ENTRY_WIDTH != 0 && !preallocated {
            return Err(StorageError::Corrupt(format!(
                "index file {}: size {} is not divisible by {}",
                path.display(),
                existing,
                ENTRY_WIDTH
            )));
        }

        let region = MmapRegion::open(path, max_bytes)?;
        let mut index = Index { region };

        if preallocated {
            index.drop_unwritten_tail();
            if index.size() != existing {
                warn!(
                    path = %path.display(),
                    file_size = existing,
                    entries = index.entries(),
                    "recovered index that was not closed cleanly"
                );
            }
        }

        Ok(index)
    }

    /// Shrink the logical size to whole entries, then past every trailing
    /// all-zero entry except entry 0.
    fn drop_unwritten_tail(&mut self) {
        let mut entries = self.entries();
        while entries > 1 {
            let unwritten = self
                .region
                .get((entries - 1) * ENTRY_WIDTH, ENTRY_WIDTH)
                .is_some_and(|entry| entry.iter().all(|&b| b == 0));
            if !unwritten {
                break;
            }
            entries -= 1;
        }
        self.truncate(entries);
    }

    /// Append an entry mapping `offset` (relative) to a store `position`.
    ///
    /// ## Entry format:
    /// ```text
    /// [offset: u32][position: u64]
    /// ```
    ///
    /// # Errors
    /// - `IndexFull` if another 12 bytes do not fit in the mapped capacity.
    ///   The segment treats this as "segment full".
    pub fn write(&mut self, offset: u32, position: u64) -> StorageResult<()> {
        let mut entry = [0u8; ENTRY_WIDTH as usize];
        entry[..OFFSET_WIDTH as usize].copy_from_slice(&offset.to_be_bytes());
        entry[OFFSET_WIDTH as usize..].copy_from_slice(&position.to_be_bytes());

        self.region.append(&entry)?;
        Ok(())
    }

    /// Read entry `n`, returning `(relative offset, store position)`.
    ///
    /// `n == LAST_ENTRY` (-1) reads the most recent entry; any other value
    /// is an absolute entry number.
    ///
    /// ## Example:
    /// ```text
    /// entries: [(0, 0), (1, 19), (2, 38)]
    ///
    /// read(-1) → (2, 38)
    /// read(1)  → (1, 19)
    /// read(3)  → EntryNotFound
    /// ```
    ///
    /// # Errors
    /// - `EntryNotFound` if the index is empty or `n` is past the last entry
    pub fn read(&self, n: i64) -> StorageResult<(u32, u64)> {
        let entries = self.entries();
        let not_found = StorageError::EntryNotFound { entry: n, entries };

        if entries == 0 {
            return Err(not_found);
        }

        let entry = match n {
            LAST_ENTRY => entries - 1,
            n if n < 0 => return Err(not_found),
            n => n as u64,
        };

        let start = match entry.checked_mul(ENTRY_WIDTH) {
            Some(start) => start,
            None => return Err(not_found),
        };
        let bytes = match self.region.get(start, ENTRY_WIDTH) {
            Some(bytes) => bytes,
            None => return Err(not_found),
        };

        decode_entry(bytes).ok_or(not_found)
    }

    /// Forget every entry from `entries` on. Never grows the index.
    pub(crate) fn truncate(&mut self, entries: u64) {
        self.region.truncate(entries.saturating_mul(ENTRY_WIDTH));
    }

    /// Logical size in bytes. Always a multiple of 12.
    pub fn size(&self) -> u64 {
        self.region.len()
    }

    /// Number of entries in the index.
    pub fn entries(&self) -> u64 {
        self.region.len() / ENTRY_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Size of the mapped region in bytes.
    pub fn capacity(&self) -> u64 {
        self.region.capacity()
    }

    /// True if there is room for at least one more entry.
    pub fn has_room(&self) -> bool {
        self.size() + ENTRY_WIDTH <= self.capacity()
    }

    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// Unmap, sync, truncate the file to the logical size and close it.
    ///
    /// # Errors
    /// - The first failing step; later steps are not attempted
    pub fn close(self) -> StorageResult<()> {
        self.region.close()
    }
}

/// Split a 12-byte entry into `(relative offset, position)`.
fn decode_entry(bytes: &[u8]) -> Option<(u32, u64)> {
    let (offset_bytes, position_bytes) = bytes.split_at(OFFSET_WIDTH as usize);
    let offset = u32::from_be_bytes(offset_bytes.try_into().ok()?);
    let position = u64::from_be_bytes(position_bytes.try_into().ok()?);
    Some((offset, position))
}
