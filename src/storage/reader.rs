use crate::error::{StorageError, StorageResult};
use crate::storage::log::Log;
use std::io::{self, Read};

/// Streams the raw store bytes of a log, segment by segment.
///
/// The bytes are exactly what is on disk: `[u64 length][payload]` records,
/// concatenated across stores in offset order. Meant for bulk transfer
/// (snapshots, catching up a follower), not for record-level reads.
///
/// ## Behavior:
/// - Reaching the end of the active store returns `Ok(0)`; reading again
///   after more appends continues where the reader stopped
/// - If the segment being streamed is truncated away, the reader continues
///   at the start of the oldest retained segment
/// - The reader borrows the log, so the log cannot be closed under it
///
/// Created by [`Log::reader`] or [`Log::reader_from`].
pub struct LogReader<'a> {
    log: &'a Log,

    /// Base offset of the segment being streamed.
    base_offset: u64,

    /// Byte position inside that segment's store.
    position: u64,
}

impl<'a> LogReader<'a> {
    pub(crate) fn new(log: &'a Log, base_offset: u64, position: u64) -> Self {
        LogReader {
            log,
            base_offset,
            position,
        }
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let log = self.log;
        let segments = log.segments()?;

        let mut idx = segments.partition_point(|handle| handle.base_offset < self.base_offset);
        while let Some(handle) = segments.get(idx) {
            if handle.base_offset != self.base_offset {
                self.base_offset = handle.base_offset;
                self.position = 0;
            }

            let n = handle.read()?.read_at(buf, self.position)?;
            if n > 0 {
                self.position += n as u64;
                return Ok(n);
            }

            idx += 1;
        }

        Ok(0)
    }
}

impl Read for LogReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf).map_err(into_io_error)
    }
}

/// I/O errors pass through unchanged; anything else is wrapped.
fn into_io_error(e: StorageError) -> io::Error {
    match e {
        StorageError::Io(e) => e,
        other => io::Error::other(other),
    }
}
