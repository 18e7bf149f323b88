use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::log::{check_quota, LobBackend, LogConfig};
use crate::protocol_utils::{parse_storage_identifier, PROTOCOL_FILE, PROTOCOL_NAME_FILE};

/// File-based storage backend for native platforms
pub struct FileLobBackend {
    identifier: String,
    path: PathBuf,
    file: File,
    max_file_len: Option<u64>, // Optional hard limit for on-disk size
}

impl LobBackend for FileLobBackend {
    fn open(identifier: &str, config: &LogConfig) -> Result<Self> {
        let (protocol, path_str) = parse_storage_identifier(identifier);
        if protocol != PROTOCOL_NAME_FILE {
            return Err(Error::Other(format!(
                "FileLobBackend only supports '{PROTOCOL_FILE}' identifiers, got '{protocol}://'"
            )));
        }

        let path = PathBuf::from(path_str);

        // Create directory if it doesn't exist
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false) // Don't truncate existing store files
            .open(&path)?;

        // Try to obtain an exclusive lock
        file.try_lock_exclusive()
            .map_err(|e| Error::FileLocked(format!("{}: {e}", path.display())))?;

        let len = file.metadata()?.len();
        check_quota(config.max_file_len, len)?;

        Ok(Self {
            identifier: identifier.to_string(),
            path,
            file,
            max_file_len: config.max_file_len,
        })
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn physical_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        read_exact_at(&self.file, buf, offset).map_err(Error::from)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| Error::Other("Write would overflow u64".into()))?;
        check_quota(self.max_file_len, end)?;

        self.file.seek(SeekFrom::Start(offset))?;
        let mut writer = std::io::BufWriter::with_capacity(data.len().max(1), &mut self.file);
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    fn set_len(&mut self, size: u64) -> Result<()> {
        check_quota(self.max_file_len, size)?;
        self.file.set_len(size).map_err(Error::from)
    }

    fn sync_all(&mut self) -> Result<()> {
        self.file.sync_all().map_err(Error::from)
    }

    fn rename_to(&mut self, new_identifier: &str) -> Result<()> {
        let (_, new_path) = parse_storage_identifier(new_identifier);
        let new_path = PathBuf::from(new_path);
        std::fs::rename(&self.path, &new_path)?;
        self.path = new_path;
        self.identifier = new_identifier.to_string();
        Ok(())
    }

    fn discard(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(path).map_err(Error::from)
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt as _;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt as _;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

impl Drop for FileLobBackend {
    fn drop(&mut self) {
        // Ignore errors during drop, but try to unlock
        let _ = FileExt::unlock(&self.file);
    }
}
