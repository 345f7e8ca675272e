use std::fs::{self, File};
use std::io::Write;
use chrono::{DateTime, Utc};
use roaring::RoaringTreemap;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::SegmentMeta;

/// A live segment and the documents deleted from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub meta: SegmentMeta,
    pub deleted: Vec<u8>,   // serialized RoaringTreemap
}

impl ManifestEntry {
    pub fn new(meta: SegmentMeta, deleted: &RoaringTreemap) -> Result<Self> {
        let mut bytes = Vec::with_capacity(deleted.serialized_size());
        deleted.serialize_into(&mut bytes)?;
        Ok(ManifestEntry { meta, deleted: bytes })
    }

    pub fn deleted(&self) -> Result<RoaringTreemap> {
        RoaringTreemap::deserialize_from(&self.deleted[..]).map_err(|err| {
            Error::corrupted(format!("tombstones of segment {}: {}", self.meta.id, err))
        })
    }
}

/// The committed state of the index.
///
/// Whatever the manifest lists is the index; segment files it does not list
/// are leftovers and get removed at open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generation: u64,
    pub next_doc_id: u64,
    pub segments: Vec<ManifestEntry>,
    pub timestamp: DateTime<Utc>,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            generation: 0,
            next_doc_id: 0,
            segments: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

impl Manifest {
    /// Load manifest from disk
    // [ crc32 (4) | body length (8) | bincode body ]
    pub fn load(storage: &StorageLayout) -> Result<Option<Self>> {
        let path = storage.manifest_path();
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(path)?;
        if data.len() < 12 {
            return Err(Error::corrupted("manifest is truncated"));
        }
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&data[0..4]);
        let mut len = [0u8; 8];
        len.copy_from_slice(&data[4..12]);

        let body = &data[12..];
        if u64::from_le_bytes(len) != body.len() as u64 {
            return Err(Error::corrupted("manifest length mismatch"));
        }
        if crc32fast::hash(body) != u32::from_le_bytes(crc) {
            return Err(Error::corrupted("manifest checksum mismatch"));
        }

        let manifest = bincode::deserialize(body)
            .map_err(|err| Error::corrupted(format!("manifest body: {}", err)))?;
        Ok(Some(manifest))
    }

    /// Save manifest to disk: temp file, fsync, rename.
    pub fn save(&self, storage: &StorageLayout) -> Result<()> {
        let body = bincode::serialize(self)?;
        let tmp_path = storage.manifest_tmp_path();

        let result = (|| -> Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&crc32fast::hash(&body).to_le_bytes())?;
            file.write_all(&(body.len() as u64).to_le_bytes())?;
            file.write_all(&body)?;
            file.sync_all()?;
            fs::rename(&tmp_path, storage.manifest_path())?;
            StorageLayout::sync_dir(&storage.meta_dir)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    pub fn doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.meta.doc_count as u64).sum()
    }
}
