use lobstore::log::STORAGE_HEADER_SIZE;
use lobstore::{Error, GrowthHarness, RealtimeData, Result, StoreConfig};

#[path = "../helpers/test_helpers.rs"]
mod test_helpers;

use test_helpers::{open_file_store, open_mem_store, small_shape, temp_store_path};

#[test]
fn test_same_shape_gives_same_samples() -> Result<()> {
    let mut first =
        GrowthHarness::initialize(open_mem_store("a", StoreConfig::default())?, 2, small_shape(300))?;
    let mut second =
        GrowthHarness::initialize(open_mem_store("b", StoreConfig::default())?, 2, small_shape(300))?;

    let a = first.run(40, 5)?;
    let b = second.run(40, 5)?;

    assert_eq!(a.samples, b.samples);
    assert_eq!(a.samples.len(), 8);
    assert_eq!(first.store().get(1)?, second.store().get(1)?);
    assert_eq!(first.data(), second.data());
    Ok(())
}

#[test]
fn test_samples_never_decrease() -> Result<()> {
    let mut harness =
        GrowthHarness::initialize(open_mem_store("mono", StoreConfig::default())?, 1, small_shape(500))?;
    let report = harness.run(100, 1)?;

    assert_eq!(report.samples.len(), 100);
    for pair in report.samples.windows(2) {
        assert!(pair[1].file_size_bytes > pair[0].file_size_bytes);
    }
    assert_eq!(report.size_after, harness.store().current_size_bytes());
    Ok(())
}

#[test]
fn test_stored_payload_decodes_to_latest_iteration() -> Result<()> {
    let mut harness =
        GrowthHarness::initialize(open_mem_store("decode", StoreConfig::default())?, 1, small_shape(64))?;
    harness.run(12, 4)?;

    let data = RealtimeData::decode(&harness.store().get(1)?)?;
    assert_eq!(data.len(), 64);
    assert!(data.values().all(|(_, value)| value == 12));
    assert_eq!(&data, harness.data());
    Ok(())
}

#[test]
fn test_quota_aborts_run_with_iteration() -> Result<()> {
    let shape = small_shape(200);
    let payload_len = RealtimeData::new(&shape).encode().len() as u64;
    let config = StoreConfig {
        // Room for the initial version and four updates
        max_file_len: Some(STORAGE_HEADER_SIZE as u64 + 5 * (payload_len + 16) + 8),
        ..Default::default()
    };
    let mut harness = GrowthHarness::initialize(open_mem_store("quota", config)?, 1, shape)?;

    match harness.run(100, 10) {
        Err(Error::Aborted { iteration, source }) => {
            assert_eq!(iteration, 4);
            assert!(source.is_io_failure());
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
    assert_eq!(harness.iterations_done(), 4);

    // The last successful update is still readable, and the harness agrees
    let data = RealtimeData::decode(&harness.store().get(1)?)?;
    assert!(data.values().all(|(_, value)| value == 4));
    assert_eq!(&data, harness.data());

    // After freeing space the run resumes one step past the stored value
    harness.store_mut().compact()?;
    let report = harness.run(1, 1)?;
    assert_eq!(report.samples[0].iteration, 4);
    let data = RealtimeData::decode(&harness.store().get(1)?)?;
    assert_eq!(data.get(0), Some(5));
    assert_eq!(&data, harness.data());
    Ok(())
}

#[test]
fn test_verify_compaction_after_run() -> Result<()> {
    let (_dir, path) = temp_store_path("verify");
    let mut harness = GrowthHarness::initialize(open_file_store(&path)?, 1, small_shape(1000))?
        .with_min_reclaim_ratio(0.9);
    harness.run(50, 10)?;

    let report = harness.verify_compaction()?;
    assert!(report.reclaimed_ratio() >= 0.9);
    assert_eq!(report.size_before - report.size_after, report.reclaimed);

    let closed = harness.shutdown()?;
    assert_eq!(closed.reclaimed, 0);
    assert_eq!(std::fs::metadata(&path)?.len(), closed.size_after);
    Ok(())
}
