//! Checkpoint file for per-series history
//!
//! Layout:
//! - header: `[magic: u32][version: u32][entries: u64]`
//! - entries: `[length: u32][crc: u32][bincode(CheckpointEntry)]`
//!
//! Files are written to a sibling temp file and renamed into place, so a
//! crash mid-write leaves the previous checkpoint intact.

use super::StateStore;
use crate::errors::CheckpointError;
use crate::history::KeyState;
use crate::types::SeriesKey;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Size of the header in bytes
pub const CHECKPOINT_HEADER_SIZE: u64 = 16;

/// Magic number for checkpoint files
pub const CHECKPOINT_MAGIC: u32 = 0x5449_434B; // "TICK"

/// Version of the checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Upper bound on a single encoded entry
const MAX_ENTRY_SIZE: u32 = 64 * 1024 * 1024;

/// One persisted series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// Series identity
    pub key: SeriesKey,
    /// Retained history
    pub state: KeyState,
}

/// Decoded checkpoint header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointHeader {
    /// Format version
    pub version: u32,
    /// Number of entries that follow
    pub entries: u64,
}

/// File-backed [`StateStore`]
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Store writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for CheckpointStore {
    fn save(&mut self, entries: &[(SeriesKey, KeyState)]) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        write_checkpoint(&mut writer, entries)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&tmp, &self.path)?;
        info!(
            path = %self.path.display(),
            entries = entries.len(),
            "checkpoint written"
        );
        Ok(())
    }

    fn load(&self) -> Result<Vec<(SeriesKey, KeyState)>, CheckpointError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no checkpoint to load");
            return Ok(Vec::new());
        }
        let mut reader = BufReader::with_capacity(64 * 1024, File::open(&self.path)?);
        let (_, entries) = read_checkpoint(&mut reader)?;
        info!(
            path = %self.path.display(),
            entries = entries.len(),
            "checkpoint loaded"
        );
        Ok(entries
            .into_iter()
            .map(|entry| (entry.key, entry.state))
            .collect())
    }
}

/// Serialize entries in checkpoint format
pub fn write_checkpoint<W: Write>(
    writer: &mut W,
    entries: &[(SeriesKey, KeyState)],
) -> Result<(), CheckpointError> {
    writer.write_u32::<LittleEndian>(CHECKPOINT_MAGIC)?;
    writer.write_u32::<LittleEndian>(CHECKPOINT_VERSION)?;
    writer.write_u64::<LittleEndian>(entries.len() as u64)?;

    for (key, state) in entries {
        let data = bincode::serialize(&CheckpointEntry {
            key: key.clone(),
            state: state.clone(),
        })?;
        let len = u32::try_from(data.len())
            .ok()
            .filter(|len| *len <= MAX_ENTRY_SIZE)
            .ok_or_else(|| {
                CheckpointError::InvalidState(format!("entry for {key} is {} bytes", data.len()))
            })?;

        let mut hasher = Hasher::new();
        hasher.update(&data);

        writer.write_u32::<LittleEndian>(len)?;
        writer.write_u32::<LittleEndian>(hasher.finalize())?;
        writer.write_all(&data)?;
    }
    Ok(())
}

/// Read and verify the header only
pub fn read_header<R: Read>(reader: &mut R) -> Result<CheckpointHeader, CheckpointError> {
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != CHECKPOINT_MAGIC {
        return Err(CheckpointError::BadMagic(magic));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != CHECKPOINT_VERSION {
        return Err(CheckpointError::UnsupportedVersion(version));
    }
    let entries = reader.read_u64::<LittleEndian>()?;
    Ok(CheckpointHeader { version, entries })
}

/// Read a full checkpoint, verifying every entry CRC and invariant
pub fn read_checkpoint<R: Read>(
    reader: &mut R,
) -> Result<(CheckpointHeader, Vec<CheckpointEntry>), CheckpointError> {
    let header = read_header(reader)?;
    let mut entries = Vec::new();

    for index in 0..header.entries {
        let len = reader.read_u32::<LittleEndian>()?;
        let expected = reader.read_u32::<LittleEndian>()?;
        if len > MAX_ENTRY_SIZE {
            return Err(CheckpointError::InvalidState(format!(
                "entry {index} claims {len} bytes"
            )));
        }

        let mut data = vec![0u8; len as usize];
        reader.read_exact(&mut data)?;

        let mut hasher = Hasher::new();
        hasher.update(&data);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(CheckpointError::Corrupted {
                index,
                expected,
                actual,
            });
        }

        let entry: CheckpointEntry = bincode::deserialize(&data)?;
        entry.state.validate()?;
        entries.push(entry);
    }
    Ok((header, entries))
}
