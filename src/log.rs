use std::io;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Stable identifier of a row in the row table
pub type RowId = u64;

/// Default size limit for a single LOB payload
pub const DEFAULT_MAX_LOB_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Storage file magic header and format
pub const STORAGE_MAGIC: &[u8; 6] = b"LOBST\0"; // 6 bytes
pub const STORAGE_FORMAT_VERSION: u16 = 1; // big-endian on disk
/// Total header size in bytes (fixed)
pub const STORAGE_HEADER_SIZE: usize = 64;
/// Fixed per-version overhead: row id (8) + payload length (4) + crc32 (4)
pub const VERSION_HEADER_BYTES: usize = 16;

const VALID_DATA_END_OFFSET: u64 = 17;

/// In-file header layout (explicit read/write, not repr(C)):
/// [0..6)   magic:    b"LOBST\0"
/// [6..8)   version:  u16 BE
/// [8..12)  flags:    u32 BE (unused = 0)
/// [12..16) max_lob:  u32 BE
/// [16..17) endian:   u8 (1=BE, 2=LE; we write 1)
/// [17..25) valid_data_end: u64 BE (end of the last committed version)
/// [25..64) reserved: zero padding
///
/// Version records follow the header back to back:
/// [row_id u64 BE][payload_len u32 BE][crc32 u32 BE][payload]
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Maximum payload size in bytes
    pub max_lob_size: usize,
    /// Hard cap on the medium's length; writes past it fail like a full disk
    pub max_file_len: Option<u64>,
    /// Sync the medium after every appended version
    pub sync_on_append: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_lob_size: DEFAULT_MAX_LOB_SIZE,
            max_file_len: None,
            sync_on_append: false,
        }
    }
}

/// One stored version of a row's LOB.
///
/// `offset` points at the version record, not at the payload; use
/// [`LobVersion::payload_offset`] for the payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobVersion {
    pub row_id: RowId,
    pub offset: u64,
    pub length: u32,
    pub checksum: u32,
    pub superseded: bool,
}

impl LobVersion {
    pub fn payload_offset(&self) -> u64 {
        self.offset + VERSION_HEADER_BYTES as u64
    }

    /// Bytes this version occupies on the medium, record header included
    pub fn stored_len(&self) -> u64 {
        VERSION_HEADER_BYTES as u64 + self.length as u64
    }

    pub fn end(&self) -> u64 {
        self.offset + self.stored_len()
    }
}

/// Trait for the byte medium a log lives on (file, memory).
pub trait LobBackend: Send + Sync {
    /// Open or create the medium behind the identifier
    fn open(identifier: &str, config: &LogConfig) -> Result<Self>
    where
        Self: Sized;

    fn identifier(&self) -> &str;

    /// Current length of the medium in bytes
    fn physical_len(&self) -> Result<u64>;

    /// Fill `buf` from the given offset; short reads are errors
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at the given offset, growing the medium as needed
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Truncate/extend storage to specified size
    fn set_len(&mut self, size: u64) -> Result<()>;

    /// Sync/flush data to persistent storage
    fn sync_all(&mut self) -> Result<()>;

    /// Rename/move storage to new identifier, replacing whatever was there
    fn rename_to(&mut self, new_identifier: &str) -> Result<()>;

    /// Close and delete the medium
    fn discard(self) -> Result<()>
    where
        Self: Sized;
}

/// Error a backend reports when a write would push it past its quota
pub(crate) fn quota_exceeded(limit: u64) -> Error {
    Error::Io(io::Error::other(format!(
        "storage quota of {limit} bytes exceeded"
    )))
}

pub(crate) fn check_quota(limit: Option<u64>, new_len: u64) -> Result<()> {
    match limit {
        Some(limit) if new_len > limit => Err(quota_exceeded(limit)),
        _ => Ok(()),
    }
}

/// Append-only version log on top of a backend
pub struct Log<B: LobBackend> {
    backend: B,
    valid_data_end: u64,
    config: LogConfig,
}

impl<B: LobBackend> Log<B> {
    /// Opens the log behind `identifier`, writing a fresh header if the medium is empty
    pub fn open(identifier: &str, config: &LogConfig) -> Result<Self> {
        let backend = B::open(identifier, config)?;
        let mut log = Self {
            backend,
            valid_data_end: STORAGE_HEADER_SIZE as u64,
            config: config.clone(),
        };

        if log.backend.physical_len()? == 0 {
            log.write_header()?;
        } else {
            log.read_header()?;
        }
        Ok(log)
    }

    /// Creates an empty log, dropping anything the identifier held before
    pub fn create(identifier: &str, config: &LogConfig) -> Result<Self> {
        let mut backend = B::open(identifier, config)?;
        backend.set_len(0)?;
        let mut log = Self {
            backend,
            valid_data_end: STORAGE_HEADER_SIZE as u64,
            config: config.clone(),
        };
        log.write_header()?;
        Ok(log)
    }

    /// Reads every version record in file order.
    ///
    /// Records past the header's `valid_data_end` were written by a process
    /// that died before updating the header; they are kept only when their
    /// checksum holds. Anything after the last good record is truncated.
    pub fn scan(&mut self) -> Result<Vec<LobVersion>> {
        let committed_end = self.valid_data_end;
        let physical_end = self.backend.physical_len()?;
        let mut versions = Vec::new();
        let mut pos = STORAGE_HEADER_SIZE as u64;
        let mut header = [0u8; VERSION_HEADER_BYTES];

        while pos + VERSION_HEADER_BYTES as u64 <= physical_end {
            self.backend.read_at(pos, &mut header)?;
            let (row_id, length, checksum) = decode_record_header(&header);
            let end = pos + VERSION_HEADER_BYTES as u64 + length as u64;
            if end > physical_end {
                break;
            }

            let version = LobVersion {
                row_id,
                offset: pos,
                length,
                checksum,
                superseded: false,
            };
            if end > committed_end {
                let mut payload = vec![0u8; length as usize];
                self.backend.read_at(version.payload_offset(), &mut payload)?;
                if crc32fast::hash(&payload) != checksum {
                    break;
                }
            }

            versions.push(version);
            pos = end;
        }

        if pos < committed_end {
            return Err(Error::CorruptState(format!(
                "unreadable version record at offset {pos}, header records data up to {committed_end}"
            )));
        }
        if pos < physical_end {
            warn!(
                offset = pos,
                bytes = physical_end - pos,
                "truncating torn tail after last intact version"
            );
            self.backend.set_len(pos)?;
        }
        if pos != committed_end {
            self.valid_data_end = pos;
            self.write_valid_data_end()?;
        }

        debug!(versions = versions.len(), end = pos, "scanned version log");
        Ok(versions)
    }

    /// Appends a version record at the end of valid data.
    ///
    /// On failure the medium is cut back to its previous end, so a half
    /// written record never becomes visible.
    pub fn append(&mut self, row_id: RowId, payload: &[u8]) -> Result<LobVersion> {
        if payload.len() > self.config.max_lob_size {
            return Err(Error::PayloadTooLarge(payload.len()));
        }
        self.write_record(row_id, payload)
    }

    /// Appends a payload that was already stored once, e.g. when compaction
    /// copies it. The size limit only applies to new payloads.
    pub fn relocate(&mut self, row_id: RowId, payload: &[u8]) -> Result<LobVersion> {
        self.write_record(row_id, payload)
    }

    fn write_record(&mut self, row_id: RowId, payload: &[u8]) -> Result<LobVersion> {
        let length =
            u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge(payload.len()))?;
        let checksum = crc32fast::hash(payload);
        let offset = self.valid_data_end;
        let new_end = offset
            .checked_add(VERSION_HEADER_BYTES as u64 + length as u64)
            .ok_or_else(|| Error::Other("Log size would overflow u64".into()))?;

        let mut buffer = Vec::with_capacity(VERSION_HEADER_BYTES + payload.len());
        buffer.extend_from_slice(&row_id.to_be_bytes());
        buffer.extend_from_slice(&length.to_be_bytes());
        buffer.extend_from_slice(&checksum.to_be_bytes());
        buffer.extend_from_slice(payload);

        if let Err(err) = self.commit_record(new_end, &buffer) {
            self.valid_data_end = offset;
            if let Err(rollback) = self.backend.set_len(offset) {
                warn!(offset, error = %rollback, "failed to truncate after a failed append");
            }
            if let Err(rollback) = self.write_valid_data_end() {
                warn!(offset, error = %rollback, "failed to restore valid data end after a failed append");
            }
            return Err(err);
        }

        Ok(LobVersion {
            row_id,
            offset,
            length,
            checksum,
            superseded: false,
        })
    }

    fn commit_record(&mut self, new_end: u64, record: &[u8]) -> Result<()> {
        self.backend.write_at(self.valid_data_end, record)?;
        self.valid_data_end = new_end;
        self.write_valid_data_end()?;
        if self.config.sync_on_append {
            self.backend.sync_all()?;
        }
        Ok(())
    }

    /// Reads a version's payload and checks it against the stored crc
    pub fn read_payload(&self, version: &LobVersion) -> Result<Vec<u8>> {
        if version.end() > self.valid_data_end {
            return Err(Error::CorruptState(format!(
                "version of row {} ends at {} past valid data end {}",
                version.row_id,
                version.end(),
                self.valid_data_end
            )));
        }
        let mut payload = vec![0u8; version.length as usize];
        self.backend.read_at(version.payload_offset(), &mut payload)?;
        if crc32fast::hash(&payload) != version.checksum {
            return Err(Error::CorruptState(format!(
                "checksum mismatch for row {} at offset {}",
                version.row_id, version.offset
            )));
        }
        Ok(payload)
    }

    /// End of committed data, which is also the logical file size
    pub fn current_size(&self) -> u64 {
        self.valid_data_end
    }

    pub fn physical_len(&self) -> Result<u64> {
        self.backend.physical_len()
    }

    pub fn identifier(&self) -> &str {
        self.backend.identifier()
    }

    pub fn sync_all(&mut self) -> Result<()> {
        self.backend.sync_all()
    }

    /// Atomically rename this log to a new identifier
    pub fn rename_to(&mut self, new_identifier: &str) -> Result<()> {
        self.backend.rename_to(new_identifier)
    }

    /// Deletes the log's medium
    pub fn discard(self) -> Result<()> {
        self.backend.discard()
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = vec![0u8; STORAGE_HEADER_SIZE];
        // magic [0..6)
        header[0..STORAGE_MAGIC.len()].copy_from_slice(STORAGE_MAGIC);
        // version [6..8)
        header[6..8].copy_from_slice(&STORAGE_FORMAT_VERSION.to_be_bytes());
        // flags [8..12) = 0
        header[8..12].copy_from_slice(&0u32.to_be_bytes());
        // max_lob [12..16)
        let max_lob = u32::try_from(self.config.max_lob_size).unwrap_or(u32::MAX);
        header[12..16].copy_from_slice(&max_lob.to_be_bytes());
        // endianness [16] = 1 (BE)
        header[16] = 1u8;
        // valid_data_end [17..25)
        header[17..25].copy_from_slice(&self.valid_data_end.to_be_bytes());

        self.backend.write_at(0, &header)?;
        self.backend.sync_all()
    }

    fn read_header(&mut self) -> Result<()> {
        let physical_len = self.backend.physical_len()?;
        if physical_len < STORAGE_HEADER_SIZE as u64 {
            return Err(Error::CorruptState(format!(
                "file holds {physical_len} bytes, shorter than the {STORAGE_HEADER_SIZE} byte header"
            )));
        }

        let mut header = vec![0u8; STORAGE_HEADER_SIZE];
        self.backend.read_at(0, &mut header)?;

        if &header[0..STORAGE_MAGIC.len()] != STORAGE_MAGIC {
            return Err(Error::InvalidMagic);
        }
        let version = u16::from_be_bytes([header[6], header[7]]);
        if version != STORAGE_FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        if header[16] != 1u8 {
            return Err(Error::CorruptState("unsupported endianness".into()));
        }

        let mut end_bytes = [0u8; 8];
        end_bytes.copy_from_slice(&header[17..25]);
        let valid_data_end = u64::from_be_bytes(end_bytes);

        if valid_data_end < STORAGE_HEADER_SIZE as u64 {
            return Err(Error::CorruptState(format!(
                "valid data end {valid_data_end} lies inside the header"
            )));
        }
        if valid_data_end > physical_len {
            return Err(Error::CorruptState(format!(
                "header records {valid_data_end} bytes of data but the file holds {physical_len}"
            )));
        }

        self.valid_data_end = valid_data_end;
        Ok(())
    }

    /// Update valid_data_end field in the header
    fn write_valid_data_end(&mut self) -> Result<()> {
        // Not synced here; sync_all() flushes it along with the data
        self.backend
            .write_at(VALID_DATA_END_OFFSET, &self.valid_data_end.to_be_bytes())
    }
}

fn decode_record_header(header: &[u8; VERSION_HEADER_BYTES]) -> (RowId, u32, u32) {
    let mut row_id = [0u8; 8];
    row_id.copy_from_slice(&header[0..8]);
    let length = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    let checksum = u32::from_be_bytes([header[12], header[13], header[14], header[15]]);
    (u64::from_be_bytes(row_id), length, checksum)
}
