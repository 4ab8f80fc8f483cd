//! On-disk naming of segment files and the startup directory scan.
//!
//! Each segment is a pair of files in the log directory:
//!
//! ```text
//! 00000000000000000016.store
//! 00000000000000000016.index
//! ```
//!
//! The stem is the base offset, zero-padded to 20 digits (the width of
//! `u64::MAX`) so that lexical order of file names equals numeric order.

use crate::error::StorageResult;
use std::fs;
use std::path::{Path, PathBuf};

pub const STORE_EXTENSION: &str = "store";
pub const INDEX_EXTENSION: &str = "index";

/// Digits in a segment file stem.
pub const BASE_OFFSET_DIGITS: usize = 20;

pub fn store_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{:020}.{}", base_offset, STORE_EXTENSION))
}

pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{:020}.{}", base_offset, INDEX_EXTENSION))
}

/// Parse the base offset out of a segment file name.
///
/// Returns None for anything that is not `<20 digits>.store` or
/// `<20 digits>.index`.
pub fn parse_base_offset(file_name: &str) -> Option<u64> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if extension != STORE_EXTENSION && extension != INDEX_EXTENSION {
        return None;
    }
    if stem.len() != BASE_OFFSET_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse::<u64>().ok()
}

/// Turn a directory listing into the sorted, de-duplicated base offsets of
/// the segments it contains.
///
/// A store and an index with the same stem count once. A segment with only
/// one of its two files still counts; opening it recreates the missing one.
pub fn base_offsets<I, S>(file_names: I) -> Vec<u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut offsets: Vec<u64> = file_names
        .into_iter()
        .filter_map(|name| parse_base_offset(name.as_ref()))
        .collect();
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

/// List `dir` and return the base offsets of the segments found, oldest first.
///
/// # Errors
/// - I/O errors listing the directory
pub fn scan_base_offsets(dir: &Path) -> StorageResult<Vec<u64>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_owned());
        }
    }
    Ok(base_offsets(names))
}
