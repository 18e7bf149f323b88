use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backends::DefaultLobBackend;
use crate::error::{Error, Result};
use crate::lob_store::{LobStore, SizeProbe, StoreStats};
use crate::log::{LobBackend, LobVersion, RowId};

/// Cloneable, thread-safe handle to a [`LobStore`].
///
/// `put` and `compact` take the write lock, so they never overlap each
/// other or a read. `get` shares the read lock. `current_size_bytes` goes
/// through the size probe and never waits on the lock.
pub struct SharedLobStore<B: LobBackend = DefaultLobBackend> {
    inner: Arc<RwLock<LobStore<B>>>,
    size: SizeProbe,
}

impl<B: LobBackend> Clone for SharedLobStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            size: self.size.clone(),
        }
    }
}

impl<B: LobBackend> SharedLobStore<B> {
    pub fn new(store: LobStore<B>) -> Self {
        let size = store.size_probe();
        Self {
            inner: Arc::new(RwLock::new(store)),
            size,
        }
    }

    pub fn put(&self, row_id: RowId, payload: &[u8]) -> Result<LobVersion> {
        self.write()?.put(row_id, payload)
    }

    pub fn get(&self, row_id: RowId) -> Result<Vec<u8>> {
        self.read()?.get(row_id)
    }

    pub fn compact(&self) -> Result<u64> {
        self.write()?.compact()
    }

    pub fn current_size_bytes(&self) -> u64 {
        self.size.bytes()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.read()?.stats())
    }

    /// Closes (and so compacts) the store. Fails without closing if
    /// other handles are still alive.
    pub fn close(self) -> Result<u64> {
        let lock = Arc::try_unwrap(self.inner)
            .map_err(|_| Error::Other("store still has other handles".to_string()))?;
        let store = lock.into_inner().unwrap_or_else(PoisonError::into_inner);
        store.close()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LobStore<B>>> {
        self.inner
            .read()
            .map_err(|_| Error::Other("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LobStore<B>>> {
        self.inner
            .write()
            .map_err(|_| Error::Other("store lock poisoned".to_string()))
    }
}
