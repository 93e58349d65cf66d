//! Settings store: the in-memory snapshot plus an explicit, caller-triggered commit.
//!
//! ## Image format
//!
//! ```text
//! +-------+---------+-------------+------------------+-----------+
//! | SCFG  | version | len (u32le) | bincode payload  | crc32 le  |
//! +-------+---------+-------------+------------------+-----------+
//! ```
//!
//! The CRC covers the payload only. A commit whose encoded image equals the last
//! committed image is skipped, so repeated commits never touch the medium and the
//! persisted bytes stay identical.
//!
//! ## Durability
//!
//! [`FileBackend`] writes a temp file, fsyncs it, rotates the current image to
//! `<file>.bak` and renames the temp file into place. On load the primary image is
//! tried first, then the backup, then defaults. A crash at any point leaves at
//! least one image whose checksum verifies.

use super::{SettingUpdate, Settings, MAX_SENSORS};
use crate::metrics;
use crc::{Crc, CRC_32_ISO_HDLC};
use fs2::FileExt;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"SCFG";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4;
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("corrupt settings image: {0}")]
    Corrupt(String),

    #[error("index {index} out of range (max {max})")]
    IndexOutOfRange { index: usize, max: usize },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Result of a successful [`SettingsStore::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Written { bytes: usize },
    Unchanged,
}

/// Persistent medium behind the store.
pub trait SettingsBackend: Send {
    /// Stored images in preference order (primary first). Missing images are omitted.
    fn load(&mut self) -> Result<Vec<Vec<u8>>, StoreError>;
    fn store(&mut self, image: &[u8]) -> Result<(), StoreError>;
    fn describe(&self) -> String;
}

pub fn encode_image(settings: &Settings) -> Result<Vec<u8>, StoreError> {
    let payload = bincode::serialize(settings)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + 4);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&CRC32.checksum(&payload).to_le_bytes());
    Ok(out)
}

pub fn decode_image(image: &[u8]) -> Result<Settings, StoreError> {
    if image.len() < HEADER_LEN + 4 {
        return Err(StoreError::Corrupt(format!("short image ({} bytes)", image.len())));
    }
    if &image[..4] != MAGIC {
        return Err(StoreError::Corrupt("bad magic".into()));
    }
    if image[4] != FORMAT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported format version {}",
            image[4]
        )));
    }
    let len = u32::from_le_bytes([image[5], image[6], image[7], image[8]]) as usize;
    if image.len() != HEADER_LEN + len + 4 {
        return Err(StoreError::Corrupt(format!(
            "length mismatch (header {}, image {})",
            len,
            image.len()
        )));
    }
    let payload = &image[HEADER_LEN..HEADER_LEN + len];
    let tail = &image[HEADER_LEN + len..];
    let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let actual = CRC32.checksum(payload);
    if stored != actual {
        return Err(StoreError::Corrupt(format!(
            "checksum mismatch (stored {:08X}, computed {:08X})",
            stored, actual
        )));
    }
    Ok(bincode::deserialize(payload)?)
}

/// In-memory snapshot with explicit write-back.
pub struct SettingsStore {
    current: Settings,
    backend: Box<dyn SettingsBackend>,
    last_committed: Option<Vec<u8>>,
    dirty: bool,
}

impl SettingsStore {
    /// Load the newest valid image from `backend`, falling back to defaults.
    pub fn open(mut backend: Box<dyn SettingsBackend>) -> Self {
        let mut current = None;
        let mut last_committed = None;
        match backend.load() {
            Ok(images) => {
                for (i, image) in images.into_iter().enumerate() {
                    match decode_image(&image) {
                        Ok(settings) => {
                            if i == 0 {
                                last_committed = Some(image);
                            } else {
                                warn!(
                                    "settings: primary image unusable, recovered from backup of {}",
                                    backend.describe()
                                );
                            }
                            current = Some(settings);
                            break;
                        }
                        Err(e) => warn!("settings: image {} of {} rejected: {}", i, backend.describe(), e),
                    }
                }
            }
            Err(e) => warn!("settings: failed to read {}: {}", backend.describe(), e),
        }
        let current = current.unwrap_or_else(|| {
            info!("settings: using defaults");
            Settings::default()
        });
        SettingsStore {
            current,
            backend,
            last_committed,
            dirty: false,
        }
    }

    /// Current snapshot. Never blocks.
    pub fn get(&self) -> &Settings {
        &self.current
    }

    /// True when the snapshot changed since the last successful commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Apply one field update in memory. Returns `true` if a string was truncated.
    pub fn set(&mut self, update: SettingUpdate<'_>) -> Result<bool, StoreError> {
        let s = &mut self.current;
        let truncated = match update {
            SettingUpdate::HostName(v) => s.host_name.set(v),
            SettingUpdate::ConsolePasswordHash(v) => s.console_password_hash.set(v),
            SettingUpdate::OneWirePin(pin) => {
                s.one_wire_pin = pin;
                false
            }
            SettingUpdate::MeasurementInterval(secs) => {
                s.measurement_interval_seconds = secs;
                false
            }
            SettingUpdate::SensorAddress { index, address } => {
                entry_mut(s, index)?.address = address;
                false
            }
            SettingUpdate::SensorTopic { index, topic } => entry_mut(s, index)?.topic.set(topic),
            SettingUpdate::DhtPin(pin) => {
                s.dht_pin = pin;
                false
            }
            SettingUpdate::DhtType(t) => {
                s.dht_type = t;
                false
            }
            SettingUpdate::DhtTopic { which, topic } => match which {
                super::DhtTopic::Temperature => s.dht_temperature_topic.set(topic),
                super::DhtTopic::Humidity => s.dht_humidity_topic.set(topic),
            },
            SettingUpdate::BmeBaseTopic(v) => s.bme_base_topic.set(v),
            SettingUpdate::BmeName { which, name } => match which {
                super::BmeName::Temperature => s.bme_temp_name.set(name),
                super::BmeName::Pressure => s.bme_pressure_name.set(name),
                super::BmeName::Humidity => s.bme_humidity_name.set(name),
                super::BmeName::GasResistance => s.bme_gas_resistance_name.set(name),
            },
        };
        self.dirty = true;
        Ok(truncated)
    }

    /// Persist the whole snapshot. On failure the in-memory snapshot stays valid.
    pub fn commit(&mut self) -> Result<CommitOutcome, StoreError> {
        let image = encode_image(&self.current)?;
        if self.last_committed.as_deref() == Some(image.as_slice()) {
            self.dirty = false;
            debug!("settings: commit skipped, image unchanged");
            return Ok(CommitOutcome::Unchanged);
        }
        self.backend.store(&image)?;
        let bytes = image.len();
        self.last_committed = Some(image);
        self.dirty = false;
        metrics::inc_commits();
        info!("settings: committed {} bytes to {}", bytes, self.backend.describe());
        Ok(CommitOutcome::Written { bytes })
    }
}

fn entry_mut(s: &mut Settings, index: usize) -> Result<&mut super::SensorEntry, StoreError> {
    s.sensor_entries
        .get_mut(index)
        .ok_or(StoreError::IndexOutOfRange {
            index,
            max: MAX_SENSORS - 1,
        })
}

/// Settings file on disk with a rotating `.bak` copy.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileBackend { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.bin".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".bak")
    }
}

impl SettingsBackend for FileBackend {
    fn load(&mut self) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut images = Vec::new();
        for candidate in [self.path.clone(), self.backup_path()] {
            match std::fs::read(&candidate) {
                Ok(bytes) => images.push(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(images)
    }

    fn store(&mut self, image: &[u8]) -> Result<(), StoreError> {
        use std::fs::{self, File, OpenOptions};
        use std::io::Write;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        fs::create_dir_all(&dir)?;

        // Serialize concurrent writers (e.g. `set-password` while the daemon runs)
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(self.sibling(".lock"))?;
        lock_file.lock_exclusive()?;

        let mut counter = 0u32;
        let tmp_path = loop {
            let candidate = self.sibling(&format!(".tmp-{}-{}", std::process::id(), counter));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut tmp) => {
                    tmp.write_all(image)?;
                    tmp.flush()?;
                    tmp.sync_all()?;
                    break candidate;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if self.path.exists() {
            fs::rename(&self.path, self.backup_path())?;
        }
        fs::rename(&tmp_path, &self.path)?;

        // Persist the renames (best-effort)
        if let Ok(dir_file) = File::open(&dir) {
            let _ = dir_file.sync_all();
        }
        drop(lock_file);
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Default)]
struct MemoryMedium {
    image: Option<Vec<u8>>,
    writes: usize,
    fail_writes: bool,
}

/// Volatile backend; clones share the same medium so tests can inspect it.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryMedium>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(image: Vec<u8>) -> Self {
        let backend = Self::default();
        if let Ok(mut m) = backend.inner.lock() {
            m.image = Some(image);
        }
        backend
    }

    pub fn image(&self) -> Option<Vec<u8>> {
        self.inner.lock().ok().and_then(|m| m.image.clone())
    }

    pub fn writes(&self) -> usize {
        self.inner.lock().map(|m| m.writes).unwrap_or(0)
    }

    /// Make subsequent writes fail, simulating a worn or absent medium.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut m) = self.inner.lock() {
            m.fail_writes = fail;
        }
    }
}

impl SettingsBackend for MemoryBackend {
    fn load(&mut self) -> Result<Vec<Vec<u8>>, StoreError> {
        let m = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory medium poisoned".into()))?;
        Ok(m.image.iter().cloned().collect())
    }

    fn store(&mut self, image: &[u8]) -> Result<(), StoreError> {
        let mut m = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory medium poisoned".into()))?;
        if m.fail_writes {
            return Err(StoreError::Unavailable("write rejected by medium".into()));
        }
        m.image = Some(image.to_vec());
        m.writes += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::OneWireAddress;

    #[test]
    fn image_detects_corruption() {
        let mut image = encode_image(&Settings::default()).unwrap();
        assert!(decode_image(&image).is_ok());
        let mid = image.len() / 2;
        image[mid] ^= 0x01;
        assert!(matches!(decode_image(&image), Err(StoreError::Corrupt(_))));
        assert!(matches!(decode_image(b"SCFG"), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn open_falls_back_to_defaults_on_garbage() {
        let store = SettingsStore::open(Box::new(MemoryBackend::with_image(vec![1, 2, 3])));
        assert_eq!(store.get(), &Settings::default());
    }

    #[test]
    fn index_out_of_range_is_reported() {
        let mut store = SettingsStore::open(Box::new(MemoryBackend::new()));
        let err = store
            .set(SettingUpdate::SensorAddress {
                index: MAX_SENSORS,
                address: OneWireAddress::default(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexOutOfRange { index: 4, max: 3 }));
        assert!(!store.is_dirty());
    }

    #[test]
    fn file_backend_recovers_from_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.bin");

        let mut store = SettingsStore::open(Box::new(FileBackend::new(&path)));
        store.set(SettingUpdate::MeasurementInterval(60)).unwrap();
        store.commit().unwrap();
        store.set(SettingUpdate::MeasurementInterval(90)).unwrap();
        store.commit().unwrap();

        // Corrupt the primary; the previous image survives in .bak
        std::fs::write(&path, b"not an image").unwrap();
        let reopened = SettingsStore::open(Box::new(FileBackend::new(&path)));
        assert_eq!(reopened.get().measurement_interval_seconds, 60);
    }
}
