//! Snapshot persistence for [`MemoryStore`].
//!
//! On-disk format:
//! ```text
//! [8 bytes: magic "DOCFSNAP"]
//! [8 bytes: payload length (little-endian u64)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized collections)]
//! ```
//!
//! Snapshots are written to a temporary file next to the target and renamed
//! into place, so a crash mid-save leaves the previous snapshot intact.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::codec::{decode, encode};
use crate::error::{StoreError, StoreResult};
use crate::memory::{Collections, MemoryStore};

const MAGIC: &[u8; 8] = b"DOCFSNAP";
const HEADER_SIZE: usize = 8 + 8 + 4;

impl MemoryStore {
    /// Write every collection to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let payload = {
            let collections = self.collections.read().expect("lock poisoned");
            encode(&*collections)?
        };
        let crc = crc32fast::hash(&payload);

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(MAGIC)?;
        tmp.write_all(&(payload.len() as u64).to_le_bytes())?;
        tmp.write_all(&crc.to_le_bytes())?;
        tmp.write_all(&payload)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

        debug!(path = %path.display(), bytes = payload.len(), "snapshot saved");
        Ok(())
    }

    /// Read a store back from a snapshot written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_SIZE || &bytes[..8] != MAGIC {
            return Err(StoreError::CorruptSnapshot("bad header".into()));
        }
        let mut len_buf = [0u8; 8];
        len_buf.copy_from_slice(&bytes[8..16]);
        let length = u64::from_le_bytes(len_buf) as usize;
        let mut crc_buf = [0u8; 4];
        crc_buf.copy_from_slice(&bytes[16..20]);
        let expected_crc = u32::from_le_bytes(crc_buf);

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != length {
            return Err(StoreError::CorruptSnapshot(format!(
                "expected {length} payload bytes, found {}",
                payload.len()
            )));
        }
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            return Err(StoreError::CorruptSnapshot(format!(
                "CRC mismatch: expected {expected_crc:08x}, computed {actual_crc:08x}"
            )));
        }

        let collections: Collections = decode(payload)?;
        debug!(path = %path.display(), collections = collections.len(), "snapshot loaded");
        Ok(Self::from_collections(collections))
    }

    /// Load `path` if it exists, otherwise start empty.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }
}
