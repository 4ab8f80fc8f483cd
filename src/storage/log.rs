use crate::config::Config;
use crate::error::{StorageError, StorageResult};
use crate::storage::layout;
use crate::storage::reader::LogReader;
use crate::storage::segment::Segment;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// A segment plus its base offset, readable without taking the segment lock.
pub(crate) struct SegmentHandle {
    pub(crate) base_offset: u64,
    segment: RwLock<Segment>,
}

impl SegmentHandle {
    fn new(segment: Segment) -> Self {
        SegmentHandle {
            base_offset: segment.base_offset(),
            segment: RwLock::new(segment),
        }
    }

    pub(crate) fn read(&self) -> StorageResult<RwLockReadGuard<'_, Segment>> {
        self.segment.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Segment>> {
        self.segment.write().map_err(|_| StorageError::LockPoisoned)
    }

    fn into_segment(self) -> StorageResult<Segment> {
        self.segment.into_inner().map_err(|_| StorageError::LockPoisoned)
    }
}

/// A Log is the ordered sequence of segments in one directory.
///
/// Responsibilities:
/// - Rebuild the segment list from disk on open
/// - Route appends to the active (last) segment and rotate when it is maxed
/// - Route reads to the segment owning an offset (binary search)
/// - Drop whole segments below a retention floor
///
/// NOT responsible for:
/// - Replication, RPC, or payload encoding (callers above this layer)
/// - Repairing a store tail that has no index entry after a crash
///
/// ## Segment organization:
/// ```text
/// segments: [seg(base=0), seg(base=120), seg(base=240)]
///                                         ^ active, receives appends
/// ```
///
/// Every segment starts where the previous one ended:
/// `segments[i + 1].base_offset == segments[i].next_offset`.
///
/// ## Thread safety:
/// Log is Sync; share it behind an `Arc`.
/// - `append_lock` serializes appends, rotation and truncation, so two
///   appends can never both see a maxed segment and rotate twice
/// - `segments` is write-locked only to push or drop segments
/// - Each segment has its own RwLock: reads of sealed segments never wait
///   on an append to the active one
///
/// Lock order: `append_lock` → `segments` → segment.
pub struct Log {
    dir: PathBuf,
    config: Config,

    /// Ordered by base_offset ascending. Never empty.
    segments: RwLock<Vec<SegmentHandle>>,

    append_lock: Mutex<()>,
}

impl Log {
    /// Open the log stored in `dir`, creating the directory if needed.
    ///
    /// Every `<base>.store`/`<base>.index` pair found becomes a segment,
    /// oldest first. An empty directory gets one segment at
    /// `config.segment.initial_offset`. Zero size limits are replaced by
    /// their defaults.
    ///
    /// # Errors
    /// - I/O errors creating or listing the directory
    /// - Errors opening any segment (segments already opened are closed)
    pub fn open(dir: impl AsRef<Path>, config: Config) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let config = config.normalized();

        fs::create_dir_all(&dir)?;

        let base_offsets = layout::scan_base_offsets(&dir)?;

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            let segment = Segment::open(&dir, base_offset, &config.segment)?;
            segments.push(SegmentHandle::new(segment));
        }

        if segments.is_empty() {
            let segment = Segment::open(&dir, config.segment.initial_offset, &config.segment)?;
            segments.push(SegmentHandle::new(segment));
        }

        let log = Log {
            dir,
            config,
            segments: RwLock::new(segments),
            append_lock: Mutex::new(()),
        };

        let segments = log.segment_count()?;
        let lowest_offset = log.lowest_offset()?;
        let highest_offset = log.highest_offset()?;
        info!(dir = %log.dir.display(), segments, lowest_offset, highest_offset, "opened log");

        Ok(log)
    }

    /// Append a record and return its global offset.
    ///
    /// ## Rotation:
    /// If the active segment is maxed after the append, or its index has no
    /// room for another entry, a new segment is created at its `next_offset`
    /// and becomes active. A log reopened with such an active segment rotates
    /// before the first append, so a segment never sees an append its index
    /// cannot take. If the active segment still reports `IndexFull` (relative
    /// offset past `u32::MAX`), the log rotates and retries once.
    ///
    /// # Errors
    /// - I/O errors from the store or index
    /// - Errors creating the next segment
    pub fn append(&self, payload: &[u8]) -> StorageResult<u64> {
        let _guard = self.append_lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        if self.active_needs_rotation()? {
            self.rotate()?;
        }

        let (offset, maxed) = match self.append_to_active(payload) {
            Err(StorageError::IndexFull { .. }) => {
                self.rotate()?;
                self.append_to_active(payload)?
            }
            result => result?,
        };

        if maxed {
            self.rotate()?;
        }

        Ok(offset)
    }

    /// Read the record at global `offset`.
    ///
    /// # Errors
    /// - `OffsetOutOfRange` if `offset` is below the lowest retained offset
    ///   or at/after the active segment's next offset
    /// - Store errors reading the payload
    pub fn read(&self, offset: u64) -> StorageResult<Vec<u8>> {
        let segments = self.segments()?;

        let idx = segments.partition_point(|handle| handle.base_offset <= offset);
        if idx > 0 {
            let segment = segments[idx - 1].read()?;
            if offset < segment.next_offset() {
                return segment.read(offset);
            }
        }

        Err(range_error(&segments, offset))
    }

    /// Base offset of the oldest retained segment.
    pub fn lowest_offset(&self) -> StorageResult<u64> {
        let segments = self.segments()?;
        Ok(first(&segments)?.base_offset)
    }

    /// Offset of the most recently appended record.
    ///
    /// Returns `next_offset - 1` of the active segment, or 0 when that would
    /// underflow (empty log starting at offset 0).
    pub fn highest_offset(&self) -> StorageResult<u64> {
        let segments = self.segments()?;
        let next_offset = last(&segments)?.read()?.next_offset();
        Ok(next_offset.saturating_sub(1))
    }

    /// Remove every segment whose highest offset is below `lowest`.
    ///
    /// Segments are removed oldest first and their files deleted. If that
    /// removes the active segment too, a fresh empty segment is created at
    /// the old active segment's next offset, so offsets keep increasing.
    ///
    /// # Errors
    /// - Errors closing or deleting a segment; segments removed before the
    ///   failure stay removed
    pub fn truncate(&self, lowest: u64) -> StorageResult<()> {
        let _guard = self.append_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        let mut segments = self.segments.write().map_err(|_| StorageError::LockPoisoned)?;

        let next_offset = last(&segments)?.read()?.next_offset();

        let mut expired = 0;
        for handle in segments.iter() {
            // highest = next_offset - 1 < lowest
            if handle.read()?.next_offset() > lowest {
                break;
            }
            expired += 1;
        }

        if expired == 0 {
            return Ok(());
        }

        let mut removed = 0;
        let mut result = Ok(());
        for _ in 0..expired {
            let handle = segments.remove(0);
            let base_offset = handle.base_offset;
            result = handle.into_segment().and_then(Segment::remove);
            if result.is_err() {
                break;
            }
            debug!(base_offset, "removed expired segment");
            removed += 1;
        }

        if segments.is_empty() {
            let segment = Segment::open(&self.dir, next_offset, &self.config.segment)?;
            segments.push(SegmentHandle::new(segment));
        }

        info!(lowest, removed, remaining = segments.len(), "truncated log");
        result
    }

    /// Stream the raw bytes of every store, oldest segment first.
    ///
    /// The stream ends at the current end of the active store; reading again
    /// after more appends picks up the new bytes.
    pub fn reader(&self) -> StorageResult<LogReader<'_>> {
        let base_offset = self.lowest_offset()?;
        Ok(LogReader::new(self, base_offset, 0))
    }

    /// Stream raw store bytes starting at the record with global `offset`.
    ///
    /// # Errors
    /// - `OffsetOutOfRange` if `offset` is not retained
    pub fn reader_from(&self, offset: u64) -> StorageResult<LogReader<'_>> {
        let segments = self.segments()?;

        let idx = segments.partition_point(|handle| handle.base_offset <= offset);
        if idx > 0 {
            let handle = &segments[idx - 1];
            let segment = handle.read()?;
            if offset < segment.next_offset() {
                let position = segment.position(offset)?;
                return Ok(LogReader::new(self, handle.base_offset, position));
            }
        }

        Err(range_error(&segments, offset))
    }

    /// Number of segments currently retained.
    pub fn segment_count(&self) -> StorageResult<usize> {
        Ok(self.segments()?.len())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The effective configuration (zero limits already replaced).
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Close every segment, oldest first.
    ///
    /// # Errors
    /// - The first failure; segments not yet closed are released on drop
    pub fn close(self) -> StorageResult<()> {
        let segments = self.segments.into_inner().map_err(|_| StorageError::LockPoisoned)?;
        let count = segments.len();

        for handle in segments {
            handle.into_segment()?.close()?;
        }

        info!(dir = %self.dir.display(), segments = count, "closed log");
        Ok(())
    }

    /// Close the log and delete its directory.
    pub fn remove(self) -> StorageResult<()> {
        let dir = self.dir.clone();
        self.close()?;
        fs::remove_dir_all(&dir)?;
        info!(dir = %dir.display(), "removed log");
        Ok(())
    }

    /// Remove the log and open an empty one in the same directory.
    pub fn reset(self) -> StorageResult<Log> {
        let dir = self.dir.clone();
        let config = self.config.clone();
        self.remove()?;
        Log::open(dir, config)
    }

    pub(crate) fn segments(&self) -> StorageResult<RwLockReadGuard<'_, Vec<SegmentHandle>>> {
        self.segments.read().map_err(|_| StorageError::LockPoisoned)
    }

    /// Caller holds `append_lock`.
    fn append_to_active(&self, payload: &[u8]) -> StorageResult<(u64, bool)> {
        let segments = self.segments()?;
        let mut segment = last(&segments)?.write()?;

        let offset = segment.append(payload)?;
        Ok((offset, is_full(&segment)))
    }

    /// Caller holds `append_lock`.
    fn active_needs_rotation(&self) -> StorageResult<bool> {
        let segments = self.segments()?;
        let segment = last(&segments)?.read()?;
        Ok(is_full(&segment) && !segment.is_empty())
    }

    /// Open a segment at the active segment's next offset and make it active.
    ///
    /// Caller holds `append_lock`. An empty active segment is kept: a new one
    /// would have the same base offset.
    fn rotate(&self) -> StorageResult<()> {
        let mut segments = self.segments.write().map_err(|_| StorageError::LockPoisoned)?;

        let next_offset = {
            let active = last(&segments)?.read()?;
            if active.is_empty() {
                return Ok(());
            }
            active.next_offset()
        };

        let segment = Segment::open(&self.dir, next_offset, &self.config.segment)?;
        segments.push(SegmentHandle::new(segment));

        debug!(base_offset = next_offset, segments = segments.len(), "rotated to new segment");
        Ok(())
    }
}

/// Maxed, or unable to index another record.
fn is_full(segment: &Segment) -> bool {
    segment.is_maxed() || !segment.index_has_room()
}

fn first(segments: &[SegmentHandle]) -> StorageResult<&SegmentHandle> {
    segments
        .first()
        .ok_or_else(|| StorageError::Corrupt("log has no segments".into()))
}

fn last(segments: &[SegmentHandle]) -> StorageResult<&SegmentHandle> {
    segments
        .last()
        .ok_or_else(|| StorageError::Corrupt("log has no segments".into()))
}

/// `OffsetOutOfRange` carrying the log-wide retained range.
fn range_error(segments: &[SegmentHandle], requested: u64) -> StorageError {
    let lowest = match first(segments) {
        Ok(handle) => handle.base_offset,
        Err(e) => return e,
    };
    let next = match last(segments).and_then(|handle| Ok(handle.read()?.next_offset())) {
        Ok(next) => next,
        Err(e) => return e,
    };
    StorageError::OffsetOutOfRange { requested, lowest, next }
}
