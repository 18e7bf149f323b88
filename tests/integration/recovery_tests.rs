//! Reopening stores: index rebuild, torn tails, bad headers, locking

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};

use lobstore::log::{STORAGE_HEADER_SIZE, VERSION_HEADER_BYTES};
use lobstore::{Error, LobStore, Result, StoreConfig};

#[path = "../helpers/test_helpers.rs"]
mod test_helpers;

use test_helpers::{open_file_store, temp_store_path};

const VALID_DATA_END_OFFSET: u64 = 17;

fn encode_record(row_id: u64, payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(VERSION_HEADER_BYTES + payload.len());
    record.extend_from_slice(&row_id.to_be_bytes());
    record.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    record.extend_from_slice(&crc32fast::hash(payload).to_be_bytes());
    record.extend_from_slice(payload);
    record
}

fn append_raw(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

#[test]
fn test_reopen_rebuilds_superseded_versions() -> Result<()> {
    let (_dir, path) = temp_store_path("reopen");
    let (size, stats) = {
        let mut store = open_file_store(&path)?;
        for i in 0..4u8 {
            store.put(1, &[i; 128])?;
        }
        store.put(2, b"two")?;
        (store.current_size_bytes(), store.stats())
    };

    let mut store = open_file_store(&path)?;
    assert_eq!(store.current_size_bytes(), size);
    assert_eq!(store.stats(), stats);
    assert_eq!(store.stats().superseded_versions, 3);
    assert_eq!(store.get(1)?, vec![3u8; 128]);
    assert_eq!(store.get(2)?, b"two");

    // The superseded versions found on reopen are still reclaimable
    assert_eq!(
        store.compact()?,
        3 * (VERSION_HEADER_BYTES + 128) as u64
    );
    Ok(())
}

#[test]
fn test_torn_tail_is_truncated() -> Result<()> {
    let (_dir, path) = temp_store_path("torn");
    let size = {
        let mut store = open_file_store(&path)?;
        store.put(1, b"intact")?;
        store.current_size_bytes()
    };

    // Half of a record header
    append_raw(&path, &[0xAB; 10])?;
    assert_eq!(fs::metadata(&path)?.len(), size + 10);

    let store = open_file_store(&path)?;
    assert_eq!(store.current_size_bytes(), size);
    assert_eq!(fs::metadata(&path)?.len(), size);
    assert_eq!(store.get(1)?, b"intact");
    Ok(())
}

#[test]
fn test_record_with_bad_checksum_past_header_end_is_dropped() -> Result<()> {
    let (_dir, path) = temp_store_path("badcrc");
    let size = {
        let mut store = open_file_store(&path)?;
        store.put(1, b"kept")?;
        store.current_size_bytes()
    };

    let mut record = encode_record(1, b"lost update");
    let last = record.len() - 1;
    record[last] ^= 0x01;
    append_raw(&path, &record)?;

    let store = open_file_store(&path)?;
    assert_eq!(store.current_size_bytes(), size);
    assert_eq!(store.get(1)?, b"kept");
    Ok(())
}

#[test]
fn test_intact_record_past_header_end_is_recovered() -> Result<()> {
    let (_dir, path) = temp_store_path("uncommitted");
    let size = {
        let mut store = open_file_store(&path)?;
        store.put(1, b"old")?;
        store.current_size_bytes()
    };

    // A record whose header update never reached the file
    let record = encode_record(1, b"new");
    append_raw(&path, &record)?;

    let store = open_file_store(&path)?;
    assert_eq!(store.current_size_bytes(), size + record.len() as u64);
    assert_eq!(store.get(1)?, b"new");
    assert_eq!(store.stats().superseded_versions, 1);
    Ok(())
}

#[test]
fn test_header_claiming_missing_data_is_corrupt() -> Result<()> {
    let (_dir, path) = temp_store_path("overstated");
    let size = {
        let mut store = open_file_store(&path)?;
        store.put(1, &[7u8; 32])?;
        store.current_size_bytes()
    };

    let mut file = OpenOptions::new().write(true).open(&path)?;
    file.seek(SeekFrom::Start(VALID_DATA_END_OFFSET))?;
    file.write_all(&(size + 1000).to_be_bytes())?;
    drop(file);

    match open_file_store(&path) {
        Err(Error::CorruptState(_)) => {}
        Err(other) => panic!("expected CorruptState, got {other}"),
        Ok(_) => panic!("expected CorruptState, store opened"),
    }
    Ok(())
}

#[test]
fn test_foreign_file_is_rejected() -> Result<()> {
    let (_dir, path) = temp_store_path("foreign");
    fs::write(&path, vec![0x42u8; STORAGE_HEADER_SIZE])?;
    assert!(matches!(open_file_store(&path), Err(Error::InvalidMagic)));
    Ok(())
}

#[test]
fn test_open_store_locks_the_file() -> Result<()> {
    let (_dir, path) = temp_store_path("locked");
    let _store = open_file_store(&path)?;
    match open_file_store(&path) {
        Err(Error::FileLocked(_)) => {}
        Err(other) => panic!("expected FileLocked, got {other}"),
        Ok(_) => panic!("expected FileLocked, second open succeeded"),
    }
    Ok(())
}

#[test]
fn test_compact_on_open() -> Result<()> {
    let (_dir, path) = temp_store_path("compact_on_open");
    {
        let mut store = open_file_store(&path)?;
        for i in 0..3u8 {
            store.put(9, &[i; 200])?;
        }
    }

    let config = StoreConfig {
        compact_on_open: true,
        ..Default::default()
    };
    let store = LobStore::open_path(&path, config)?;
    assert_eq!(
        store.current_size_bytes(),
        (STORAGE_HEADER_SIZE + VERSION_HEADER_BYTES + 200) as u64
    );
    assert_eq!(fs::metadata(&path)?.len(), store.current_size_bytes());
    assert_eq!(store.get(9)?, vec![2u8; 200]);
    Ok(())
}

#[test]
fn test_reopen_with_smaller_lob_limit() -> Result<()> {
    let (_dir, path) = temp_store_path("smaller_limit");
    {
        let mut store = open_file_store(&path)?;
        store.put(1, &[1u8; 100])?;
        store.put(1, &[2u8; 100])?;
    }

    let config = StoreConfig {
        max_lob_size: 50,
        ..Default::default()
    };
    let mut store = LobStore::open_path(&path, config)?;
    assert_eq!(store.config().max_lob_size, 50);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(1)?, vec![2u8; 100]);

    // New payloads obey the new limit, stored ones survive compaction
    assert!(matches!(
        store.put(1, &[3u8; 51]),
        Err(Error::PayloadTooLarge(51))
    ));
    assert_eq!(store.compact()?, (VERSION_HEADER_BYTES + 100) as u64);
    assert_eq!(store.get(1)?, vec![2u8; 100]);
    Ok(())
}

#[test]
fn test_oversized_record_past_header_end_is_recovered() -> Result<()> {
    let (_dir, path) = temp_store_path("oversized_tail");
    let size = {
        let mut store = open_file_store(&path)?;
        store.put(1, b"old")?;
        store.current_size_bytes()
    };
    let record = encode_record(1, &[4u8; 80]);
    append_raw(&path, &record)?;

    let config = StoreConfig {
        max_lob_size: 16,
        ..Default::default()
    };
    let store = LobStore::open_path(&path, config)?;
    assert_eq!(store.current_size_bytes(), size + record.len() as u64);
    assert_eq!(store.get(1)?, vec![4u8; 80]);
    Ok(())
}
