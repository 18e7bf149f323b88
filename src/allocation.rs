use crate::log::LobVersion;

/// Every version written since the last compaction, in file order.
///
/// Superseded versions stay in the table (and on the medium) until a
/// compaction builds a fresh table holding only current versions.
#[derive(Debug, Default, Clone)]
pub struct AllocationTable {
    versions: Vec<LobVersion>,
    superseded_count: usize,
    superseded_bytes: u64,
}

impl AllocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            versions: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Appends a version and returns its slot
    pub fn push(&mut self, version: LobVersion) -> usize {
        self.versions.push(version);
        self.versions.len() - 1
    }

    /// Marks the version in `slot` superseded; repeated calls are no-ops
    pub fn supersede(&mut self, slot: usize) {
        if let Some(version) = self.versions.get_mut(slot) {
            if !version.superseded {
                version.superseded = true;
                self.superseded_count += 1;
                self.superseded_bytes += version.stored_len();
            }
        }
    }

    pub fn get(&self, slot: usize) -> Option<&LobVersion> {
        self.versions.get(slot)
    }

    /// Non-superseded versions in file order
    pub fn current_versions(&self) -> impl Iterator<Item = &LobVersion> {
        self.versions.iter().filter(|version| !version.superseded)
    }

    pub fn superseded_count(&self) -> usize {
        self.superseded_count
    }

    pub fn superseded_bytes(&self) -> u64 {
        self.superseded_bytes
    }

    /// Bytes held by all versions, record headers included
    pub fn total_bytes(&self) -> u64 {
        self.versions.iter().map(LobVersion::stored_len).sum()
    }

    pub fn live_bytes(&self) -> u64 {
        self.total_bytes() - self.superseded_bytes
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
