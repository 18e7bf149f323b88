use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::allocation::AllocationTable;
use crate::backends::{DefaultLobBackend, FileLobBackend};
use crate::error::{Error, Result};
use crate::log::{
    LobBackend, LobVersion, Log, LogConfig, RowId, DEFAULT_MAX_LOB_SIZE, STORAGE_HEADER_SIZE,
};
use crate::protocol_utils::{file_identifier, sibling_identifier};
use crate::row_table::RowTable;

/// Extension given to store files opened by path
pub const STORE_FILE_EXTENSION: &str = "lob";
/// Suffix of the temporary log a compaction writes into
pub const COMPACTION_SUFFIX: &str = "compact";

/// Config options for the LOB store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum payload size in bytes (default: 16MB)
    pub max_lob_size: usize,
    /// Hard cap on the file length; a put that would cross it fails
    /// as an I/O failure, like a full disk. Defaults to no cap.
    pub max_file_len: Option<u64>,
    /// Sync the file after every put (default: false)
    pub sync_on_put: bool,
    /// Compact right after opening an existing store (default: false)
    pub compact_on_open: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_lob_size: DEFAULT_MAX_LOB_SIZE,
            max_file_len: None,
            sync_on_put: false,
            compact_on_open: false,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_lob_size > u32::MAX as usize {
            return Err(Error::Config(format!(
                "max_lob_size ({}) must fit in 32 bits",
                self.max_lob_size
            )));
        }
        if let Some(limit) = self.max_file_len {
            if limit < STORAGE_HEADER_SIZE as u64 {
                return Err(Error::Config(format!(
                    "max_file_len ({limit}) must be at least {STORAGE_HEADER_SIZE} bytes"
                )));
            }
        }
        Ok(())
    }

    fn log_config(&self) -> LogConfig {
        LogConfig {
            max_lob_size: self.max_lob_size,
            max_file_len: self.max_file_len,
            sync_on_append: self.sync_on_put,
        }
    }
}

/// Shared view of a store's size that other threads can read lock-free
#[derive(Debug, Clone, Default)]
pub struct SizeProbe {
    bytes: Arc<AtomicU64>,
}

impl SizeProbe {
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    fn publish(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::Release);
    }
}

/// Point-in-time accounting of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub rows: usize,
    pub versions: usize,
    pub superseded_versions: usize,
    pub live_bytes: u64,
    pub superseded_bytes: u64,
    pub size_bytes: u64,
}

/// LOB storage with deferred reclaim.
///
/// Every `put` appends a new version; the version it replaces is only
/// marked superseded. Space comes back exclusively through `compact`
/// (or `close`, which compacts).
pub struct LobStore<B: LobBackend = DefaultLobBackend> {
    log: Log<B>,
    rows: RowTable,
    table: AllocationTable,
    config: StoreConfig,
    identifier: String,
    size: SizeProbe,
}

impl LobStore<FileLobBackend> {
    /// Opens a store file by path, adding the `.lob` extension when missing
    pub fn open_path(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = resolve_store_path(path.as_ref())?;
        Self::open(&file_identifier(&path), config)
    }
}

impl<B: LobBackend> LobStore<B> {
    /// Opens the store behind `identifier`, rebuilding the allocation
    /// table (superseded versions included) from the log
    pub fn open(identifier: &str, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let mut log = Log::<B>::open(identifier, &config.log_config())?;
        let (table, rows) = index_versions(log.scan()?);

        let size = SizeProbe::default();
        size.publish(log.current_size());

        let mut store = Self {
            log,
            rows,
            table,
            config,
            identifier: identifier.to_string(),
            size,
        };
        info!(
            identifier,
            rows = store.rows.len(),
            versions = store.table.len(),
            size = store.current_size_bytes(),
            "opened LOB store"
        );

        if store.config.compact_on_open {
            store.compact()?;
        }
        Ok(store)
    }

    /// Appends a new version of the row's LOB and makes it current.
    ///
    /// The previous version stays on the medium, marked superseded. Writing
    /// the same bytes again still appends.
    pub fn put(&mut self, row_id: RowId, payload: &[u8]) -> Result<LobVersion> {
        let version = self
            .log
            .append(row_id, payload)
            .map_err(|err| match err {
                Error::Io(source) => Error::Write { row_id, source },
                other => other,
            })?;

        // The row pointer moves only once the record is committed
        let slot = self.table.push(version);
        if let Some(previous) = self.rows.set(row_id, slot) {
            self.table.supersede(previous);
        }
        self.size.publish(self.log.current_size());
        Ok(version)
    }

    /// Returns the payload of the row's current version
    pub fn get(&self, row_id: RowId) -> Result<Vec<u8>> {
        let version = self.version(row_id).ok_or(Error::NotFound(row_id))?;
        self.log.read_payload(&version)
    }

    /// Current version of a row
    pub fn version(&self, row_id: RowId) -> Option<LobVersion> {
        self.rows
            .current(row_id)
            .and_then(|slot| self.table.get(slot))
            .copied()
    }

    /// Rewrites the file to hold only current versions.
    ///
    /// The current versions are copied in file order into a sibling log,
    /// which then replaces the original. Returns the bytes reclaimed. If
    /// the allocation table does not match the file, nothing is touched
    /// and `CorruptState` is returned.
    pub fn compact(&mut self) -> Result<u64> {
        let size_before = self.log.current_size();
        self.check_consistency()?;

        if self.table.superseded_count() == 0 {
            debug!(size = size_before, "no superseded versions, skipping compaction");
            return Ok(0);
        }

        let tmp_identifier = sibling_identifier(&self.identifier, COMPACTION_SUFFIX);
        let mut new_log = Log::<B>::create(&tmp_identifier, &self.config.log_config())?;

        let copied = self
            .copy_current_versions(&mut new_log)
            .and_then(|tables| {
                new_log.sync_all()?;
                new_log.rename_to(&self.identifier)?;
                Ok(tables)
            });
        let (table, rows) = match copied {
            Ok(tables) => tables,
            Err(err) => {
                let _ = new_log.discard();
                return Err(err);
            }
        };

        let superseded = self.table.superseded_count();
        self.log = new_log;
        self.table = table;
        self.rows = rows;

        let size_after = self.log.current_size();
        self.size.publish(size_after);
        let reclaimed = size_before.saturating_sub(size_after);
        info!(
            before = size_before,
            after = size_after,
            reclaimed,
            superseded,
            "compaction finished"
        );
        Ok(reclaimed)
    }

    /// Current store size in bytes
    pub fn current_size_bytes(&self) -> u64 {
        self.size.bytes()
    }

    /// Handle for reading the size from other threads
    pub fn size_probe(&self) -> SizeProbe {
        self.size.clone()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            rows: self.rows.len(),
            versions: self.table.len(),
            superseded_versions: self.table.superseded_count(),
            live_bytes: self.table.live_bytes(),
            superseded_bytes: self.table.superseded_bytes(),
            size_bytes: self.current_size_bytes(),
        }
    }

    pub fn row_ids(&self) -> Vec<RowId> {
        self.rows.ids().collect()
    }

    /// Returns the number of rows in the store
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no row has been written
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Explicitly flushes data to the medium
    pub fn flush(&mut self) -> Result<()> {
        self.log.sync_all()
    }

    /// Shuts the store down: compacts, syncs, releases the medium.
    /// Returns the bytes the final compaction reclaimed.
    pub fn close(mut self) -> Result<u64> {
        let reclaimed = self.compact()?;
        self.log.sync_all()?;
        info!(
            identifier = %self.identifier,
            size = self.current_size_bytes(),
            reclaimed,
            "closed LOB store"
        );
        Ok(reclaimed)
    }

    fn copy_current_versions(&self, target: &mut Log<B>) -> Result<(AllocationTable, RowTable)> {
        let mut table = AllocationTable::with_capacity(self.rows.len());
        let mut rows = RowTable::new();
        for version in self.table.current_versions() {
            let payload = self.log.read_payload(version)?;
            let relocated = target.relocate(version.row_id, &payload)?;
            debug!(
                row_id = version.row_id,
                from = version.offset,
                to = relocated.offset,
                "relocated current version"
            );
            rows.set(version.row_id, table.push(relocated));
        }
        Ok((table, rows))
    }

    fn check_consistency(&self) -> Result<()> {
        let size = self.log.current_size();
        let physical = self.log.physical_len()?;
        if size > physical {
            return Err(Error::CorruptState(format!(
                "valid data ends at {size} but the file holds {physical} bytes"
            )));
        }

        let accounted = STORAGE_HEADER_SIZE as u64 + self.table.total_bytes();
        if accounted != size {
            return Err(Error::CorruptState(format!(
                "allocation table accounts for {accounted} bytes, log holds {size}"
            )));
        }

        for row_id in self.rows.ids() {
            let current = self
                .version(row_id)
                .filter(|version| version.row_id == row_id && !version.superseded);
            if current.is_none() {
                return Err(Error::CorruptState(format!(
                    "row {row_id} has no current version"
                )));
            }
        }
        Ok(())
    }
}

impl<B: LobBackend> Drop for LobStore<B> {
    fn drop(&mut self) {
        // Ignore errors during drop, but try to flush
        let _ = self.flush();
    }
}

/// Rebuilds the allocation and row tables from versions in file order;
/// for each row the last version wins.
fn index_versions(versions: Vec<LobVersion>) -> (AllocationTable, RowTable) {
    let mut table = AllocationTable::with_capacity(versions.len());
    let mut rows = RowTable::new();
    for version in versions {
        let row_id = version.row_id;
        let slot = table.push(version);
        if let Some(previous) = rows.set(row_id, slot) {
            table.supersede(previous);
        }
    }
    (table, rows)
}

/// Ensure the store file has a `.lob` suffix when opening by path.
/// - If the path has no extension, append `.lob`.
/// - If the path points to an existing directory, return an error.
pub fn resolve_store_path(path: &Path) -> Result<PathBuf> {
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.is_dir() {
            return Err(Error::Other(format!(
                "Path points to a directory, expected file: {}",
                path.display()
            )));
        }
    }

    match path.extension().and_then(|s| s.to_str()) {
        None => Ok(path.with_extension(STORE_FILE_EXTENSION)),
        Some(STORE_FILE_EXTENSION) => Ok(path.to_path_buf()),
        Some(_) => Err(Error::Other(format!(
            "Unsupported store file extension. Expected '.{STORE_FILE_EXTENSION}': {}",
            path.display()
        ))),
    }
}
