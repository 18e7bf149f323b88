#![allow(clippy::duplicate_mod)]

//! Test helpers for running lobstore tests on the file and memory backends

use std::path::{Path, PathBuf};

use lobstore::{LobStore, MemoryLobBackend, PayloadShape, Result, StoreConfig};
use tempfile::TempDir;

/// Create a temp directory and the path of a store file inside it.
///
/// The directory must outlive the store, so it is returned alongside.
#[allow(dead_code)]
pub fn temp_store_path(name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join(format!("{name}.lob"));
    (dir, path)
}

/// Open a file-backed store with the default config.
#[allow(dead_code)]
pub fn open_file_store(path: &Path) -> Result<LobStore> {
    LobStore::open_path(path, StoreConfig::default())
}

/// Open a fresh in-memory store.
#[allow(dead_code)]
pub fn open_mem_store(name: &str, config: StoreConfig) -> Result<LobStore<MemoryLobBackend>> {
    LobStore::open(&format!("mem://{name}"), config)
}

/// A payload shape small enough for fast tests.
#[allow(dead_code)]
pub fn small_shape(entries: u32) -> PayloadShape {
    PayloadShape {
        entries,
        ..Default::default()
    }
}

/// Path of the temporary log a compaction of `path` writes into.
#[allow(dead_code)]
pub fn compaction_temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".compact");
    PathBuf::from(name)
}
