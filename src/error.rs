/// Storage-level errors
/// These represent failures in the store, index, segment and log layers.
///
/// The first four variants are "end of data" conditions: the caller asked for
/// something past the logical end of a file, or past what the log retains.
/// `IndexFull` doubles as the "segment full" signal that drives rotation.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("index full: {len} of {capacity} bytes used")]
    IndexFull { len: u64, capacity: u64 },

    #[error("index entry not found: {entry} (entries: {entries})")]
    EntryNotFound { entry: i64, entries: u64 },

    #[error("store end of data: position {position}, store size {size}")]
    StoreEndOfData { position: u64, size: u64 },

    #[error("offset out of range: requested {requested}, retained [{lowest}, {next})")]
    OffsetOutOfRange { requested: u64, lowest: u64, next: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// True for every error that means "nothing there": reading past the
    /// logical end of a store or index, an offset outside the retained range,
    /// or an index with no room left for another entry.
    pub fn is_end_of_data(&self) -> bool {
        matches!(
            self,
            StorageError::IndexFull { .. }
                | StorageError::EntryNotFound { .. }
                | StorageError::StoreEndOfData { .. }
                | StorageError::OffsetOutOfRange { .. }
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
