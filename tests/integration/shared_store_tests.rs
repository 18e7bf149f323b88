use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use lobstore::{Result, SharedLobStore};

#[path = "../helpers/test_helpers.rs"]
mod test_helpers;

use test_helpers::{open_file_store, temp_store_path};

#[test]
fn test_size_reads_during_writes_never_decrease() -> Result<()> {
    let (_dir, path) = temp_store_path("shared");
    let shared = SharedLobStore::new(open_file_store(&path)?);
    let done = Arc::new(AtomicBool::new(false));

    let sampler = {
        let shared = shared.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut sizes = Vec::new();
            while !done.load(Ordering::Acquire) {
                sizes.push(shared.current_size_bytes());
                thread::yield_now();
            }
            sizes.push(shared.current_size_bytes());
            sizes
        })
    };

    let writer = {
        let shared = shared.clone();
        thread::spawn(move || -> Result<()> {
            for i in 0..200u32 {
                shared.put(1, &i.to_be_bytes().repeat(64))?;
            }
            Ok(())
        })
    };

    writer.join().expect("writer thread panicked")?;
    done.store(true, Ordering::Release);
    let sizes = sampler.join().expect("sampler thread panicked");

    assert!(!sizes.is_empty());
    for pair in sizes.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
    assert_eq!(*sizes.last().unwrap(), shared.current_size_bytes());
    assert_eq!(shared.get(1)?, 199u32.to_be_bytes().repeat(64));
    assert_eq!(shared.stats()?.superseded_versions, 199);
    Ok(())
}

#[test]
fn test_reads_from_many_threads() -> Result<()> {
    let (_dir, path) = temp_store_path("readers");
    let shared = SharedLobStore::new(open_file_store(&path)?);
    for row_id in 1..=4u64 {
        shared.put(row_id, &row_id.to_be_bytes())?;
    }

    let readers: Vec<_> = (1..=4u64)
        .map(|row_id| {
            let shared = shared.clone();
            thread::spawn(move || shared.get(row_id))
        })
        .collect();
    for (row_id, reader) in (1..=4u64).zip(readers) {
        let payload = reader.join().expect("reader thread panicked")?;
        assert_eq!(payload, row_id.to_be_bytes());
    }

    shared.put(1, b"replaced")?;
    assert!(shared.close()? > 0);
    Ok(())
}
