/// Storage layer: the segmented commit log.
///
/// Leaf-first:
/// - Store: append-only file of length-prefixed payloads
/// - Index: memory-mapped, fixed-width offset → position entries
/// - Segment: one store + one index over a contiguous offset range
/// - Log: ordered segments, rotation, lookup, retention, bulk reader
///
/// Supporting modules:
/// - mmap: the fixed-capacity mapped file backing the index
/// - layout: segment file naming and the startup directory scan
pub mod index;
pub mod layout;
pub mod log;
pub mod mmap;
pub mod reader;
pub mod segment;
pub mod store;
