use crate::error::{StorageError, StorageResult};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// A writable, fixed-capacity memory-mapped file with a logical length.
///
/// # Purpose
/// Backs the segment index. The file is resized to `capacity` up front and
/// mapped once, so appending an entry is a memcpy with no syscall and no
/// remap. `len` tracks how many bytes hold real data; everything past it is
/// pre-allocated zeroes.
///
/// # Ownership & Lifetime Rules
/// - The region owns both the file handle and the mapping (one file, two views)
/// - The mapping is never handed out; callers only append and read
///   bounds-checked slices below `len`
/// - The mapping is dropped before the file is synced, truncated and closed
///
/// # Finalize sequence
/// `close()` (or `Drop`, if `close()` was never called) runs:
///
/// ```text
/// unmap -> fsync -> truncate to len -> close
/// ```
///
/// The sequence stops at the first failing step and returns that error.
/// After a clean finalize the file on disk is exactly `len` bytes long, which
/// is what `open` reads back as the logical length next time.
#[derive(Debug)]
pub struct MmapRegion {
    path: PathBuf,

    /// None once finalized.
    file: Option<File>,

    /// None for a zero-capacity region or once finalized.
    mmap: Option<MmapMut>,

    /// Bytes in use. Always <= capacity.
    len: u64,

    /// Size of the mapped region in bytes.
    capacity: u64,
}

impl MmapRegion {
    /// Open or create `path` and map `capacity` bytes of it.
    ///
    /// The current file size becomes the logical length. If the file is
    /// already larger than `capacity`, the capacity grows to the file size so
    /// no existing bytes are cut off.
    ///
    /// # Errors
    /// - I/O errors opening, resizing or mapping the file
    pub fn open(path: impl AsRef<Path>, capacity: u64) -> StorageResult<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        let capacity = capacity.max(len);

        file.set_len(capacity)?;

        let mmap = if capacity == 0 {
            None
        } else {
            // SAFETY:
            // - The mapping lives inside this struct next to the File it maps
            //   and is dropped before the File is truncated or closed
            // - The file is never resized while mapped (set_len happens before
            //   mapping and after unmapping only)
            // - Accesses are bounds-checked against `capacity`/`len`
            // Other processes modifying the file concurrently is outside what
            // this engine supports (one process owns a log directory).
            match unsafe { MmapMut::map_mut(&file) } {
                Ok(mmap) => Some(mmap),
                Err(e) => {
                    // Undo the resize so a reopen still sees the real length.
                    let _ = file.set_len(len);
                    return Err(e.into());
                }
            }
        };

        Ok(MmapRegion {
            path: path.to_path_buf(),
            file: Some(file),
            mmap,
            len,
            capacity,
        })
    }

    /// Copy `bytes` to the end of the logical region and advance `len`.
    ///
    /// Returns the position the bytes were written at.
    ///
    /// # Errors
    /// - `IndexFull` if the bytes do not fit in the remaining capacity
    pub(crate) fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let width = bytes.len() as u64;
        if self.len + width > self.capacity {
            return Err(StorageError::IndexFull {
                len: self.len,
                capacity: self.capacity,
            });
        }

        let mmap = match self.mmap.as_mut() {
            Some(mmap) => mmap,
            // capacity == 0 (caught above unless bytes is empty) or finalized
            None => return Ok(self.len),
        };

        let start = self.len as usize;
        mmap[start..start + bytes.len()].copy_from_slice(bytes);

        let position = self.len;
        self.len += width;
        Ok(position)
    }

    /// Bounds-checked view of `width` bytes at `position`.
    ///
    /// Returns None if any part of the range lies past the logical length.
    pub(crate) fn get(&self, position: u64, width: u64) -> Option<&[u8]> {
        let end = position.checked_add(width)?;
        if end > self.len {
            return None;
        }
        let mmap = self.mmap.as_ref()?;
        Some(&mmap[position as usize..end as usize])
    }

    /// Move the logical end back to `len`. Never moves it forward.
    pub(crate) fn truncate(&mut self, len: u64) {
        self.len = self.len.min(len);
    }

    /// Logical length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the mapped region in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the finalize sequence and release the file.
    ///
    /// # Errors
    /// - The first failing step of unmap / sync / truncate
    pub fn close(mut self) -> StorageResult<()> {
        self.finalize()
    }

    fn finalize(&mut self) -> StorageResult<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => return Ok(()),
        };

        // Unmap first: dirty pages stay in the page cache and are covered
        // by the fsync below.
        drop(self.mmap.take());

        file.sync_all()?;
        file.set_len(self.len)?;

        // File handle closes here.
        Ok(())
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        if self.file.is_none() {
            return;
        }
        if let Err(e) = self.finalize() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to finalize mapped file");
        }
    }
}
