use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{StoreError, StoreResult};

/// Flush/sync strategy for the WAL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every write (safest, highest latency).
    #[default]
    EveryWrite,
    /// Flush to the OS page cache only (fastest, least durable).
    OsDefault,
}

/// Configuration for the Write-Ahead Log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct WalWriter {
    /// `None` once a rollback has failed; the log then refuses appends
    /// until it is reopened.
    writer: Option<BufWriter<File>>,
    /// Current write offset in the log file.
    offset: u64,
    #[cfg(test)]
    fault: Option<Fault>,
}

/// Failure injected into the next append.
#[cfg(test)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Fault {
    /// The frame is written partially, then the write fails.
    Write,
    /// As `Write`, and cutting the file back fails too.
    WriteAndRollback,
}

impl WalWriter {
    fn new(file: File, offset: u64) -> Self {
        Self {
            writer: Some(BufWriter::new(file)),
            offset,
            #[cfg(test)]
            fault: None,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn write_frame(
        &mut self,
        length: u32,
        crc: u32,
        payload: &[u8],
        sync_mode: SyncMode,
    ) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(io::Error::other("WAL closed"));
        };
        writer.write_all(&length.to_le_bytes())?;
        writer.write_all(&crc.to_le_bytes())?;
        #[cfg(test)]
        if self.fault.is_some() {
            writer.flush()?;
            writer.write_all(&payload[..payload.len() / 2])?;
            return Err(io::Error::other("injected write failure"));
        }
        writer.write_all(payload)?;
        writer.flush()?;
        if matches!(sync_mode, SyncMode::EveryWrite) {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Discard buffered bytes without writing them, then cut the file back
    /// to `offset`. On failure the writer stays closed.
    fn rollback(&mut self, offset: u64) -> io::Result<()> {
        let Some(stale) = self.writer.take() else {
            return Err(io::Error::other("WAL closed"));
        };
        let (file, _discarded) = stale.into_parts();
        #[cfg(test)]
        if self.fault.take() == Some(Fault::WriteAndRollback) {
            return Err(io::Error::other("injected truncate failure"));
        }
        file.set_len(offset)?;
        self.writer = Some(BufWriter::new(file));
        self.offset = offset;
        Ok(())
    }
}

/// Crash-recoverable append-only log of serialized entries.
///
/// On-disk format, repeated per entry:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode)]
/// ```
///
/// On recovery the file is read front-to-back; entries failing the CRC check
/// are skipped and a truncated tail (torn write) ends recovery. A failed
/// append rolls the file back to its previous length, so the log never keeps
/// a partial entry from a write the caller saw fail. If that rollback fails
/// too, the log refuses further appends until it is reopened.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    config: WalConfig,
}

impl WriteAheadLog {
    /// Open (or create) the log file at the given path.
    pub fn open(path: &Path, config: WalConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter::new(file, offset)),
            config,
        })
    }

    /// Append a single entry. Returns the byte offset of the entry.
    pub fn append<T: Serialize>(&self, entry: &T) -> StoreResult<u64> {
        let payload =
            bincode::serialize(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("WAL entry exceeds 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut w = self.lock()?;
        if w.writer.is_none() {
            return Err(StoreError::Unavailable(
                "WAL closed after a failed rollback; reopen the store".into(),
            ));
        }
        let entry_offset = w.offset;

        if let Err(e) = w.write_frame(length, crc, &payload, self.config.sync_mode) {
            warn!(offset = entry_offset, error = %e, "WAL append failed; rolling back");
            if let Err(rollback) = w.rollback(entry_offset) {
                error!(offset = entry_offset, error = %rollback, "WAL rollback failed; log closed");
            }
            return Err(e.into());
        }

        w.offset += (HEADER_SIZE + payload.len()) as u64;
        debug!(offset = entry_offset, len = payload.len(), "WAL append");
        Ok(entry_offset)
    }

    /// Recover every valid entry, in append order, and cut off a torn tail
    /// so that later appends are not hidden behind a partial entry on the
    /// next recovery.
    pub fn recover_and_repair<T: DeserializeOwned>(&self) -> StoreResult<Vec<T>> {
        let (entries, valid_end) = self.scan()?;
        let mut w = self.lock()?;
        if valid_end < w.offset {
            warn!(valid_end, file_len = w.offset, "discarding torn WAL tail");
            w.rollback(valid_end)?;
        }
        Ok(entries)
    }

    /// Read the log front-to-back. Returns the decoded entries and the
    /// offset just past the last intact frame.
    fn scan<T: DeserializeOwned>(&self) -> StoreResult<(Vec<T>, u64)> {
        // Make sure buffered bytes are on disk before reading back.
        self.lock()?.flush()?;

        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, file_len, "invalid WAL entry length; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated WAL entry; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let next = offset + HEADER_SIZE as u64 + length as u64;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping entry");
                offset = next;
                continue;
            }

            match bincode::deserialize::<T>(&payload) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(offset, error = %e, "failed to deserialize WAL entry; skipping"),
            }
            offset = next;
        }

        debug!(recovered = entries.len(), valid_end = offset, "WAL recovery complete");
        Ok((entries, offset))
    }

    /// Remove all data from the log.
    pub fn truncate(&self) -> StoreResult<()> {
        let mut w = self.lock()?;
        w.flush()?;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        if matches!(self.config.sync_mode, SyncMode::EveryWrite) {
            file.sync_all()?;
        }
        w.writer = Some(BufWriter::new(Self::reopen_append(&self.path)?));
        w.offset = 0;
        debug!("WAL truncated");
        Ok(())
    }

    /// Atomically replace the log contents with `entries`.
    ///
    /// The new log is written to a sibling temp file, synced, then renamed
    /// over the current file. On failure the current log is left as it was.
    pub fn rewrite<T: Serialize>(&self, entries: &[T]) -> StoreResult<()> {
        let mut w = self.lock()?;
        w.flush()?;

        let tmp_path = self.path.with_extension("wal.tmp");
        let mut offset = 0u64;
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for entry in entries {
                let payload = bincode::serialize(entry)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let length = u32::try_from(payload.len())
                    .map_err(|_| StoreError::Serialization("WAL entry exceeds 4 GiB".into()))?;
                tmp.write_all(&length.to_le_bytes())?;
                tmp.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
                tmp.write_all(&payload)?;
                offset += (HEADER_SIZE + payload.len()) as u64;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        w.writer = Some(BufWriter::new(Self::reopen_append(&self.path)?));
        w.offset = offset;
        debug!(entries = entries.len(), bytes = offset, "WAL rewritten");
        Ok(())
    }

    /// Current write offset (log size in bytes).
    pub fn offset(&self) -> u64 {
        self.lock().map(|w| w.offset).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, WalWriter>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Unavailable("WAL mutex poisoned".into()))
    }

    fn reopen_append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).read(true).append(true).open(path)
    }

    /// Make the next append fail with `fault`.
    #[cfg(test)]
    pub(crate) fn inject_fault(&self, fault: Fault) {
        if let Ok(mut w) = self.writer.lock() {
            w.fault = Some(fault);
        }
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.path)
            .field("offset", &self.offset())
            .field("config", &self.config)
            .finish()
    }
}
