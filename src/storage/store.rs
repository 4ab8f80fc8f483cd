use crate::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Width of the length prefix in front of every record.
pub const LEN_WIDTH: u64 = 8;

/// A Store is the append-only file holding a segment's record payloads.
///
/// Responsibilities:
/// - Own a `.store` file on disk
/// - Append length-prefixed payloads sequentially
/// - Read a payload back given the position `append` returned
/// - Track the store size, which drives segment rotation
///
/// NOT responsible for:
/// - Offsets (the index maps offsets to positions)
/// - Interpreting payload bytes
///
/// ## On-disk format:
/// File name: `<base_offset>.store`
///
/// Each record:
/// ```text
/// | length: u64 (big-endian) | payload: [u8; length] |
/// ```
///
/// No header, no padding; records are concatenated.
///
/// ## Write path:
/// Appends go through a `BufWriter`; nothing is fsynced per record.
/// `close()` flushes the buffer. The file is opened in append mode, so
/// seeking for a read never moves where the next write lands.
///
/// ## Thread safety:
/// - `append` takes &mut self (single writer)
/// - `read`/`read_at` take &self and serialize on an internal mutex, because
///   they must flush the shared buffer and move the shared file cursor
pub struct Store {
    path: PathBuf,

    /// Buffered writer over the `.store` file.
    /// Reads flush it first so they see every appended byte.
    writer: Mutex<BufWriter<File>>,

    /// Size in bytes including buffered, not yet flushed records.
    size: u64,
}

impl Store {
    /// Open or create a store file at the given path.
    ///
    /// If it exists, appends continue at the end of the existing data.
    ///
    /// # Errors
    /// - I/O errors opening or creating the file
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Store {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
            size,
        })
    }

    /// Append a record.
    ///
    /// ## Record format on disk:
    /// ```text
    /// +----------+----------------+
    /// | length   | payload        |
    /// | (u64)    | ([u8; length]) |
    /// | 8 bytes  | variable       |
    /// +----------+----------------+
    /// ```
    ///
    /// # Returns
    /// - `(bytes_written, position)` where `position` is where the record
    ///   starts; this is the value the index stores
    ///
    /// # Errors
    /// - I/O errors writing to the buffer or the file
    pub fn append(&mut self, payload: &[u8]) -> StorageResult<(u64, u64)> {
        let writer = self.writer.get_mut().map_err(|_| StorageError::LockPoisoned)?;

        let position = self.size;
        writer.write_all(&(payload.len() as u64).to_be_bytes())?;
        writer.write_all(payload)?;

        let written = LEN_WIDTH + payload.len() as u64;
        self.size += written;

        Ok((written, position))
    }

    /// Read the record that starts at `position`.
    ///
    /// # Errors
    /// - `StoreEndOfData` if no length prefix fits at `position`
    /// - `Corrupt` if the length prefix points past the end of the store
    /// - I/O errors flushing, seeking or reading
    pub fn read(&self, position: u64) -> StorageResult<Vec<u8>> {
        let mut writer = self.writer.lock().map_err(|_| StorageError::LockPoisoned)?;
        writer.flush()?;

        let size = self.size;
        let end_of_data = StorageError::StoreEndOfData { position, size };
        match position.checked_add(LEN_WIDTH) {
            Some(end) if end <= size => {}
            _ => return Err(end_of_data),
        }

        let mut file: &File = writer.get_ref();
        file.seek(SeekFrom::Start(position))?;

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        file.read_exact(&mut len_buf)?;
        let len = u64::from_be_bytes(len_buf);

        let available = size - position - LEN_WIDTH;
        if len > available {
            return Err(StorageError::Corrupt(format!(
                "record at position {} in {} claims {} bytes, only {} present",
                position,
                self.path.display(),
                len,
                available
            )));
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;

        Ok(payload)
    }

    /// Copy raw store bytes starting at `offset` into `buf`.
    ///
    /// Returns how many bytes were copied; 0 means `offset` is at or past
    /// the end of the store. Used to stream whole stores without decoding.
    ///
    /// # Errors
    /// - I/O errors flushing, seeking or reading
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> StorageResult<usize> {
        let mut writer = self.writer.lock().map_err(|_| StorageError::LockPoisoned)?;
        writer.flush()?;

        if offset >= self.size || buf.is_empty() {
            return Ok(0);
        }

        let remaining = self.size - offset;
        let n = if (buf.len() as u64) < remaining {
            buf.len()
        } else {
            remaining as usize
        };

        let mut file: &File = writer.get_ref();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf[..n])?;

        Ok(n)
    }

    /// Size in bytes, including records still sitting in the write buffer.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered records and close the file.
    ///
    /// # Errors
    /// - I/O errors flushing the buffer
    pub fn close(self) -> StorageResult<()> {
        let writer = self.writer.into_inner().map_err(|_| StorageError::LockPoisoned)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        drop(file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use std::thread;

    /// Helper: create a temp directory for tests
    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("failed to create temp dir")
    }

    #[test]
    fn test_store_open_new() {
        let dir = temp_dir();
        let path = dir.path().join("00000000000000000000.store");

        let store = Store::open(&path).expect("failed to open store");

        assert_eq!(store.size(), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_append_returns_positions() {
        let dir = temp_dir();
        let mut store = Store::open(dir.path().join("0.store")).expect("failed to open store");

        let payload = b"hello world";
        let width = LEN_WIDTH + payload.len() as u64;

        for i in 0..4u64 {
            let (written, position) = store.append(payload).expect("failed to append");
            assert_eq!(written, width);
            assert_eq!(position, i * width);
        }

        assert_eq!(store.size(), 4 * width);
    }

    #[test]
    fn test_read_after_write_without_close() {
        let dir = temp_dir();
        let mut store = Store::open(dir.path().join("0.store")).expect("failed to open store");

        let (_, first) = store.append(b"first").expect("failed to append");
        let (_, second) = store.append(b"").expect("failed to append");
        let (_, third) = store.append(b"third record").expect("failed to append");

        // Records are still in the BufWriter; read must flush
        assert_eq!(store.read(first).expect("read failed"), b"first");
        assert_eq!(store.read(second).expect("read failed"), b"");
        assert_eq!(store.read(third).expect("read failed"), b"third record");
    }

    #[test]
    fn test_on_disk_format() {
        let dir = temp_dir();
        let path = dir.path().join("0.store");

        let mut store = Store::open(&path).expect("failed to open store");
        store.append(b"abc").expect("failed to append");
        store.close().expect("failed to close");

        let bytes = fs::read(&path).expect("failed to read file");
        assert_eq!(bytes.len(), 11);
        assert_eq!(&bytes[..8], &3u64.to_be_bytes());
        assert_eq!(&bytes[8..], b"abc");
    }

    #[test]
    fn test_read_past_end() {
        let dir = temp_dir();
        let mut store = Store::open(dir.path().join("0.store")).expect("failed to open store");
        store.append(b"abc").expect("failed to append");

        let err = store.read(11).unwrap_err();
        assert!(matches!(err, StorageError::StoreEndOfData { position: 11, size: 11 }));
        assert!(err.is_end_of_data());

        // Not even a full length prefix left
        assert!(store.read(5).unwrap_err().is_end_of_data());
        assert!(store.read(u64::MAX).unwrap_err().is_end_of_data());
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let dir = temp_dir();
        let path = dir.path().join("0.store");

        // Length prefix claims 100 bytes, only 4 follow
        let mut bytes = 100u64.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"oops");
        fs::write(&path, &bytes).expect("failed to write file");

        let store = Store::open(&path).expect("failed to open store");
        let err = store.read(0).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
        assert!(!err.is_end_of_data());
    }

    #[test]
    fn test_reopen_continues_at_end() {
        let dir = temp_dir();
        let path = dir.path().join("0.store");

        let first_position;
        {
            let mut store = Store::open(&path).expect("failed to open store");
            first_position = store.append(b"before").expect("failed to append").1;
            store.close().expect("failed to close");
        }

        let mut store = Store::open(&path).expect("failed to reopen store");
        assert_eq!(store.size(), LEN_WIDTH + 6);

        let (_, position) = store.append(b"after").expect("failed to append");
        assert_eq!(position, LEN_WIDTH + 6);

        assert_eq!(store.read(first_position).expect("read failed"), b"before");
        assert_eq!(store.read(position).expect("read failed"), b"after");
    }

    #[test]
    fn test_read_at_streams_whole_file() {
        let dir = temp_dir();
        let path = dir.path().join("0.store");

        let mut store = Store::open(&path).expect("failed to open store");
        for i in 0..10 {
            store.append(format!("record-{}", i).as_bytes()).expect("failed to append");
        }

        // Stream in small chunks, as a replication reader would
        let mut streamed = Vec::new();
        let mut buf = [0u8; 7];
        let mut offset = 0u64;
        loop {
            let n = store.read_at(&mut buf, offset).expect("read_at failed");
            if n == 0 {
                break;
            }
            streamed.extend_from_slice(&buf[..n]);
            offset += n as u64;
        }

        assert_eq!(streamed.len() as u64, store.size());
        store.close().expect("failed to close");
        assert_eq!(streamed, fs::read(&path).expect("failed to read file"));
    }

    #[test]
    fn test_read_at_end_returns_zero() {
        let dir = temp_dir();
        let mut store = Store::open(dir.path().join("0.store")).expect("failed to open store");
        let mut buf = [0u8; 16];

        assert_eq!(store.read_at(&mut buf, 0).expect("read_at failed"), 0);

        store.append(b"x").expect("failed to append");
        assert_eq!(store.read_at(&mut buf, 0).expect("read_at failed"), 9);
        assert_eq!(store.read_at(&mut buf, 9).expect("read_at failed"), 0);
        assert_eq!(store.read_at(&mut buf, 100).expect("read_at failed"), 0);
    }

    #[test]
    fn test_concurrent_reads() {
        let dir = temp_dir();
        let mut store = Store::open(dir.path().join("0.store")).expect("failed to open store");

        let mut positions = Vec::new();
        for i in 0..50 {
            let (_, position) = store.append(format!("payload-{}", i).as_bytes()).expect("failed to append");
            positions.push(position);
        }

        let store = Arc::new(store);
        let positions = Arc::new(positions);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                let positions = Arc::clone(&positions);
                thread::spawn(move || {
                    for (i, position) in positions.iter().enumerate().skip(t) {
                        let payload = store.read(*position).expect("read failed");
                        assert_eq!(payload, format!("payload-{}", i).as_bytes());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("reader thread panicked");
        }
    }
}
