use std::io;

use crate::error::{Error, Result};
use crate::log::{check_quota, LobBackend, LogConfig};
use crate::protocol_utils::{parse_storage_identifier, PROTOCOL_MEM, PROTOCOL_NAME_MEM};

/// In-memory storage backend.
///
/// Every `open` starts from an empty buffer, so the contents live exactly
/// as long as the backend value. The configured quota applies the same way
/// it does to files, which makes "disk full" reproducible without a disk.
pub struct MemoryLobBackend {
    identifier: String,
    data: Vec<u8>,
    max_len: Option<u64>,
}

impl LobBackend for MemoryLobBackend {
    fn open(identifier: &str, config: &LogConfig) -> Result<Self> {
        let (protocol, _) = parse_storage_identifier(identifier);
        if protocol != PROTOCOL_NAME_MEM {
            return Err(Error::Other(format!(
                "MemoryLobBackend only supports '{PROTOCOL_MEM}' identifiers, got '{protocol}://'"
            )));
        }

        Ok(Self {
            identifier: identifier.to_string(),
            data: Vec::new(),
            max_len: config.max_file_len,
        })
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn physical_len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| short_read(offset))?;
        let end = start
            .checked_add(buf.len())
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| short_read(offset))?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| Error::Other("Write would overflow u64".into()))?;
        check_quota(self.max_len, end)?;

        let start = offset as usize;
        let end = end as usize;
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn set_len(&mut self, size: u64) -> Result<()> {
        check_quota(self.max_len, size)?;
        self.data.resize(size as usize, 0);
        Ok(())
    }

    fn sync_all(&mut self) -> Result<()> {
        Ok(())
    }

    fn rename_to(&mut self, new_identifier: &str) -> Result<()> {
        self.identifier = new_identifier.to_string();
        Ok(())
    }

    fn discard(self) -> Result<()> {
        Ok(())
    }
}

fn short_read(offset: u64) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read past end of memory medium at offset {offset}"),
    ))
}
