use crate::config::SegmentConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::index::{Index, LAST_ENTRY};
use crate::storage::layout;
use crate::storage::store::Store;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A Segment is one store + index pair covering a contiguous offset range.
///
/// Responsibilities:
/// - Own the `.store` and `.index` files of one base offset
/// - Assign monotonically increasing global offsets on append
/// - Translate global offsets to relative ones for the index
/// - Report when it has reached its configured size limits
///
/// NOT responsible for:
/// - Rotation (the log creates the next segment)
/// - Locating which segment owns an offset
/// - Interpreting payload bytes
///
/// ## Offsets:
/// ```text
/// relative = global - base_offset
/// next_offset = base_offset + index entries
/// ```
///
/// `next_offset` is derived from the index size on open; the store is
/// never replayed. The one check against the store is for the last indexed
/// record: after an unclean shutdown the index may point at records that
/// never left the write buffer, and those entries are dropped.
///
/// ## Ownership model:
/// - Segment exclusively owns its Store and Index
/// - Both files are created, closed and removed together
/// - Mutations require &mut self; reads take &self
///
/// ## Failure model:
/// A store write followed by a failed index write leaves bytes in the store
/// that no index entry points at. They are never read back and still count
/// towards `store_size()`.
pub struct Segment {
    /// Global offset of the first record in this segment.
    /// Encoded in both file names, never changes.
    base_offset: u64,

    /// Global offset the next append will receive.
    next_offset: u64,

    store: Store,
    index: Index,

    /// Limits checked by `is_maxed`.
    config: SegmentConfig,
}

impl Segment {
    /// Open or create the segment with `base_offset` in `dir`.
    ///
    /// If the index cannot be opened, the already opened store is closed
    /// before the error is returned.
    ///
    /// # Errors
    /// - I/O errors opening either file
    /// - `Corrupt` if the index size is neither a whole number of entries
    ///   nor the pre-allocated size left by an unclean shutdown
    pub fn open(dir: impl AsRef<Path>, base_offset: u64, config: &SegmentConfig) -> StorageResult<Self> {
        let dir = dir.as_ref();

        let store = Store::open(layout::store_path(dir, base_offset))?;
        // On error `store` is dropped here, which flushes and closes it.
        let mut index = Index::open(layout::index_path(dir, base_offset), config.max_index_bytes)?;

        let indexed = index.entries();
        while !index.is_empty() {
            let (_, position) = index.read(LAST_ENTRY)?;
            match store.read(position) {
                Ok(_) => break,
                Err(e) if e.is_end_of_data() || matches!(e, StorageError::Corrupt(_)) => {
                    index.truncate(index.entries() - 1);
                }
                Err(e) => return Err(e),
            }
        }
        if index.entries() < indexed {
            warn!(
                base_offset,
                indexed,
                kept = index.entries(),
                store_size = store.size(),
                "dropped index entries past the end of the store"
            );
        }

        let next_offset = base_offset.checked_add(index.entries()).ok_or_else(|| {
            StorageError::Corrupt(format!(
                "segment {} holds {} entries, past the end of the offset space",
                base_offset,
                index.entries()
            ))
        })?;

        debug!(
            base_offset,
            next_offset,
            store_size = store.size(),
            index_size = index.size(),
            "opened segment"
        );

        Ok(Segment {
            base_offset,
            next_offset,
            store,
            index,
            config: config.clone(),
        })
    }

    /// Append a record and return its global offset.
    ///
    /// This is the core write path:
    /// 1. Write the payload to the store, getting its position
    /// 2. Write `(next_offset - base_offset, position)` to the index
    /// 3. Advance next_offset
    ///
    /// # Errors
    /// - `IndexFull` when the index has no room left: the segment is full and
    ///   the caller must rotate. The store write has already happened.
    /// - I/O errors from either file
    pub fn append(&mut self, payload: &[u8]) -> StorageResult<u64> {
        let offset = self.next_offset;

        let relative = u32::try_from(offset - self.base_offset).map_err(|_| StorageError::IndexFull {
            len: self.index.size(),
            capacity: self.index.capacity(),
        })?;

        let (_, position) = self.store.append(payload)?;
        self.index.write(relative, position)?;

        self.next_offset += 1;

        Ok(offset)
    }

    /// Read the payload stored at global `offset`.
    ///
    /// # Errors
    /// - `OffsetOutOfRange` if `offset` is not in `[base_offset, next_offset)`
    /// - Store errors (`Corrupt`, I/O) reading the payload
    pub fn read(&self, offset: u64) -> StorageResult<Vec<u8>> {
        let position = self.position(offset)?;
        self.store.read(position)
    }

    /// Store position of the record at global `offset`.
    ///
    /// # Errors
    /// - `OffsetOutOfRange` if `offset` is not in `[base_offset, next_offset)`
    pub fn position(&self, offset: u64) -> StorageResult<u64> {
        if offset < self.base_offset || offset >= self.next_offset {
            return Err(StorageError::OffsetOutOfRange {
                requested: offset,
                lowest: self.base_offset,
                next: self.next_offset,
            });
        }

        let relative = offset - self.base_offset;
        let (_, position) = self.index.read(relative as i64)?;
        Ok(position)
    }

    /// Copy raw store bytes starting at byte `offset` of the store.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> StorageResult<usize> {
        self.store.read_at(buf, offset)
    }

    /// True once either file has reached its configured limit.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
    }

    /// True while the index can take one more entry.
    ///
    /// Can be false before `is_maxed` is, when the index limit is not a
    /// multiple of the entry width.
    pub fn index_has_room(&self) -> bool {
        self.index.has_room()
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Get the next offset that will be assigned.
    ///
    /// If no records have been appended, this equals base_offset.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Number of records in this segment.
    pub fn entry_count(&self) -> u64 {
        self.next_offset - self.base_offset
    }

    pub fn is_empty(&self) -> bool {
        self.next_offset == self.base_offset
    }

    pub fn store_size(&self) -> u64 {
        self.store.size()
    }

    pub fn index_size(&self) -> u64 {
        self.index.size()
    }

    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    pub fn index_path(&self) -> &Path {
        self.index.path()
    }

    /// Close the index, then the store.
    ///
    /// # Errors
    /// - The first failure; the store is still released (dropped) if the
    ///   index close fails
    pub fn close(self) -> StorageResult<()> {
        self.index.close()?;
        self.store.close()
    }

    /// Close the segment and delete both of its files.
    ///
    /// # Errors
    /// - Errors closing, or I/O errors deleting either file
    pub fn remove(self) -> StorageResult<()> {
        let index_path: PathBuf = self.index.path().to_path_buf();
        let store_path: PathBuf = self.store.path().to_path_buf();

        self.close()?;

        fs::remove_file(&index_path)?;
        fs::remove_file(&store_path)?;

        debug!(index = %index_path.display(), store = %store_path.display(), "removed segment");
        Ok(())
    }
}
