//! Versioned state files
//!
//! Every persisted record lives in a `_state` directory as
//! `<prefix><version>.st`: a fixed header followed by the encoded payload.
//! Writes go to a temporary file that is synced and atomically renamed, so a
//! reader only ever sees complete files. Loading scans every location and the
//! highest version that passes validation wins; superseded files are kept
//! until [`VersionedStateStore::cleanup_stale`] prunes them.

use metagate_common::{compute_crc32c, Error, Result, StateFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Name of the per-location state directory
pub const STATE_DIR: &str = "_state";
/// Prefix of global state files
pub const GLOBAL_STATE_PREFIX: &str = "global-";
/// Prefix of index state files
pub const INDEX_STATE_PREFIX: &str = "state-";
/// Extension of committed state files
pub const STATE_FILE_SUFFIX: &str = ".st";
/// Extension of in-flight state files
pub const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Header written in front of every state payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateHeader {
    /// Magic number for validation
    pub magic: u32,
    /// Header layout version
    pub format_version: u16,
    /// Payload codec
    pub codec: u8,
    /// Record version
    pub version: u64,
    /// Payload length in bytes
    pub payload_len: u64,
    /// CRC32C of the payload
    pub checksum: u32,
    /// Seconds since the epoch (truncated)
    pub created_at: u32,
}

impl StateHeader {
    pub const MAGIC: u32 = 0x4D47_5354; // "MGST"
    pub const FORMAT_VERSION: u16 = 1;
    pub const SIZE: usize = 32;

    #[must_use]
    pub fn new(format: StateFormat, version: u64, payload: &[u8]) -> Self {
        Self {
            magic: Self::MAGIC,
            format_version: Self::FORMAT_VERSION,
            codec: format.code(),
            version,
            payload_len: payload.len() as u64,
            checksum: compute_crc32c(payload),
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as u32,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.format_version.to_le_bytes());
        buf[6] = self.codec;
        // buf[7] reserved
        buf[8..16].copy_from_slice(&self.version.to_le_bytes());
        buf[16..24].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[24..28].copy_from_slice(&self.checksum.to_le_bytes());
        buf[28..32].copy_from_slice(&self.created_at.to_le_bytes());
        buf
    }

    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let magic = u32::from_le_bytes(data[0..4].try_into().ok()?);
        if magic != Self::MAGIC {
            return None;
        }
        Some(Self {
            magic,
            format_version: u16::from_le_bytes(data[4..6].try_into().ok()?),
            codec: data[6],
            version: u64::from_le_bytes(data[8..16].try_into().ok()?),
            payload_len: u64::from_le_bytes(data[16..24].try_into().ok()?),
            checksum: u32::from_le_bytes(data[24..28].try_into().ok()?),
            created_at: u32::from_le_bytes(data[28..32].try_into().ok()?),
        })
    }
}

/// A decoded record together with where it came from
#[derive(Clone, Debug)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
    pub path: PathBuf,
}

/// A candidate state file found by a scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateFileRef {
    pub path: PathBuf,
    pub version: u64,
}

/// State store statistics
#[derive(Debug, Default)]
pub struct StateStoreStats {
    pub writes: AtomicU64,
    pub write_failures: AtomicU64,
    pub loads: AtomicU64,
    pub corrupt_files: AtomicU64,
    pub pruned_files: AtomicU64,
}

/// Writes and loads one kind of versioned record
pub struct VersionedStateStore {
    /// File name prefix (`global-` or `state-`)
    prefix: &'static str,
    /// Codec for new files
    format: StateFormat,
    /// Statistics
    stats: StateStoreStats,
}

impl VersionedStateStore {
    /// Create a store for files named `<prefix><version>.st`
    #[must_use]
    pub fn new(prefix: &'static str, format: StateFormat) -> Self {
        Self {
            prefix,
            format,
            stats: StateStoreStats::default(),
        }
    }

    /// File name prefix
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Codec used for writes
    #[must_use]
    pub const fn format(&self) -> StateFormat {
        self.format
    }

    /// Statistics
    pub const fn stats(&self) -> &StateStoreStats {
        &self.stats
    }

    /// File name for a version
    #[must_use]
    pub fn file_name(&self, version: u64) -> String {
        format!("{}{}{}", self.prefix, version, STATE_FILE_SUFFIX)
    }

    /// Write `record` tagged with `version` into every location
    ///
    /// A failure at any location fails the whole write. Older versions are
    /// left in place.
    pub fn write<T: Serialize>(&self, record: &T, version: u64, locations: &[PathBuf]) -> Result<()> {
        if locations.is_empty() {
            self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
            return Err(Error::persistence_io(
                self.file_name(version),
                "no state locations configured",
            ));
        }

        let payload = encode(self.format, record)?;
        let header = StateHeader::new(self.format, version, &payload);

        for dir in locations {
            if let Err(e) = self.write_one(dir, &header, &payload) {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }

        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        debug!(
            "wrote {} to {} location(s)",
            self.file_name(version),
            locations.len()
        );
        Ok(())
    }

    fn write_one(&self, dir: &Path, header: &StateHeader, payload: &[u8]) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| Error::persistence_io(dir, e))?;

        let file_name = self.file_name(header.version);
        let final_path = dir.join(&file_name);
        let temp_path = dir.join(format!("{file_name}{TEMP_FILE_SUFFIX}"));

        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| Error::persistence_io(&temp_path, e))?;

            let mut writer = BufWriter::new(file);
            writer
                .write_all(&header.to_bytes())
                .map_err(|e| Error::persistence_io(&temp_path, e))?;
            writer
                .write_all(payload)
                .map_err(|e| Error::persistence_io(&temp_path, e))?;
            writer
                .flush()
                .map_err(|e| Error::persistence_io(&temp_path, e))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| Error::persistence_io(&temp_path, e))?;
        }

        // Atomic rename
        if let Err(e) = std::fs::rename(&temp_path, &final_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(Error::persistence_io(&final_path, e));
        }

        // Persist the rename itself; not every platform allows syncing a directory
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            trace!("directory sync skipped for {:?}: {}", dir, e);
        }

        Ok(())
    }

    /// List candidate files across all locations, highest version first
    #[must_use]
    pub fn scan(&self, locations: &[PathBuf]) -> Vec<StateFileRef> {
        let mut found = Vec::new();

        for dir in locations {
            if !dir.exists() {
                continue;
            }
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("failed to list state directory {:?}: {}", dir, e);
                    continue;
                }
            };

            found.extend(entries.filter_map(|entry| entry.ok()).filter_map(|entry| {
                let name = entry.file_name();
                let name_str = name.to_string_lossy();
                // <prefix><version>.st
                name_str
                    .strip_prefix(self.prefix)
                    .and_then(|s| s.strip_suffix(STATE_FILE_SUFFIX))
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|version| StateFileRef {
                        path: entry.path(),
                        version,
                    })
            }));
        }

        found.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.path.cmp(&b.path)));
        found
    }

    /// Load the highest-versioned valid record across all locations
    ///
    /// Files that fail validation are logged and skipped.
    pub fn load_latest<T: DeserializeOwned>(&self, locations: &[PathBuf]) -> Option<Versioned<T>> {
        self.stats.loads.fetch_add(1, Ordering::Relaxed);

        for candidate in self.scan(locations) {
            match read_state_file(&candidate.path, candidate.version) {
                Ok(record) => {
                    trace!("loaded {:?}", candidate.path);
                    return Some(Versioned {
                        version: candidate.version,
                        record,
                        path: candidate.path,
                    });
                }
                Err(e) if e.is_corruption() => {
                    self.stats.corrupt_files.fetch_add(1, Ordering::Relaxed);
                    warn!("skipping corrupt state file: {}", e);
                }
                Err(e) => warn!("skipping unreadable state file: {}", e),
            }
        }

        None
    }

    /// Remove every version other than `keep_version` plus leftover temp files
    ///
    /// Called after `keep_version` was written everywhere, so any other
    /// version (higher ones included) is stale. Best effort: failures are
    /// logged. Returns the number of files removed.
    pub fn cleanup_stale(&self, locations: &[PathBuf], keep_version: u64) -> usize {
        let mut removed = 0;

        for candidate in self.scan(locations) {
            if candidate.version == keep_version {
                continue;
            }
            match std::fs::remove_file(&candidate.path) {
                Ok(()) => removed += 1,
                Err(e) => debug!("failed to prune {:?}: {}", candidate.path, e),
            }
        }

        for dir in locations {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.filter_map(|entry| entry.ok()) {
                let name = entry.file_name();
                let name_str = name.to_string_lossy();
                if name_str.starts_with(self.prefix)
                    && name_str.ends_with(TEMP_FILE_SUFFIX)
                    && std::fs::remove_file(entry.path()).is_ok()
                {
                    removed += 1;
                }
            }
        }

        self.stats
            .pruned_files
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }
}

/// Global and index stores sharing one codec
pub struct StateStores {
    pub global: VersionedStateStore,
    pub index: VersionedStateStore,
}

impl StateStores {
    #[must_use]
    pub fn new(format: StateFormat) -> Self {
        Self {
            global: VersionedStateStore::new(GLOBAL_STATE_PREFIX, format),
            index: VersionedStateStore::new(INDEX_STATE_PREFIX, format),
        }
    }
}

fn encode<T: Serialize>(format: StateFormat, record: &T) -> Result<Vec<u8>> {
    match format {
        StateFormat::Binary => {
            bincode::serialize(record).map_err(|e| Error::Serialization(e.to_string()))
        }
        StateFormat::Json => {
            serde_json::to_vec_pretty(record).map_err(|e| Error::Serialization(e.to_string()))
        }
    }
}

fn decode<T: DeserializeOwned>(format: StateFormat, payload: &[u8]) -> Result<T> {
    match format {
        StateFormat::Binary => {
            bincode::deserialize(payload).map_err(|e| Error::Deserialization(e.to_string()))
        }
        StateFormat::Json => {
            serde_json::from_slice(payload).map_err(|e| Error::Deserialization(e.to_string()))
        }
    }
}

/// Read and validate a single state file
pub fn read_state_file<T: DeserializeOwned>(path: &Path, expected_version: u64) -> Result<T> {
    let data = std::fs::read(path).map_err(|e| Error::persistence_io(path, e))?;

    let header = StateHeader::from_bytes(&data).ok_or_else(|| Error::corrupt(path, "invalid header"))?;
    if header.format_version != StateHeader::FORMAT_VERSION {
        return Err(Error::corrupt(
            path,
            format!("unsupported header version {}", header.format_version),
        ));
    }
    if header.version != expected_version {
        return Err(Error::corrupt(
            path,
            format!(
                "header version {} does not match file name version {}",
                header.version, expected_version
            ),
        ));
    }

    let payload = &data[StateHeader::SIZE..];
    if payload.len() as u64 != header.payload_len {
        return Err(Error::corrupt(
            path,
            format!(
                "truncated payload: {} of {} bytes",
                payload.len(),
                header.payload_len
            ),
        ));
    }
    if compute_crc32c(payload) != header.checksum {
        return Err(Error::corrupt(path, "checksum mismatch"));
    }

    let format = StateFormat::from_code(header.codec)
        .ok_or_else(|| Error::corrupt(path, format!("unknown codec {}", header.codec)))?;

    decode(format, payload).map_err(|e| Error::corrupt(path, e))
}
