//! Property tests: whatever goes in comes back out, at the offset it was given.

use commitlog::config::Config;
use commitlog::storage::index::ENTRY_WIDTH;
use commitlog::storage::log::Log;
use proptest::prelude::*;
use tempfile::TempDir;

fn payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..60)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn appended_payloads_read_back_by_offset(
        records in payloads(),
        entries_per_segment in 1u64..8,
        max_store_bytes in 16u64..512,
        initial_offset in 0u64..1_000_000,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new()
            .max_store_bytes(max_store_bytes)
            .max_index_bytes(ENTRY_WIDTH * entries_per_segment)
            .initial_offset(initial_offset);
        let log = Log::open(temp_dir.path(), config).unwrap();

        for (i, record) in records.iter().enumerate() {
            prop_assert_eq!(log.append(record).unwrap(), initial_offset + i as u64);
        }

        for (i, record) in records.iter().enumerate() {
            prop_assert_eq!(&log.read(initial_offset + i as u64).unwrap(), record);
        }

        prop_assert_eq!(log.lowest_offset().unwrap(), initial_offset);
        prop_assert_eq!(log.highest_offset().unwrap(), initial_offset + records.len() as u64 - 1);
    }

    #[test]
    fn reopen_preserves_every_record(
        records in payloads(),
        entries_per_segment in 1u64..8,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new().max_index_bytes(ENTRY_WIDTH * entries_per_segment);

        let log = Log::open(temp_dir.path(), config.clone()).unwrap();
        for record in &records {
            log.append(record).unwrap();
        }
        log.close().unwrap();

        let log = Log::open(temp_dir.path(), config).unwrap();
        for (i, record) in records.iter().enumerate() {
            prop_assert_eq!(&log.read(i as u64).unwrap(), record);
        }
        prop_assert_eq!(log.append(b"next").unwrap(), records.len() as u64);
    }
}
