use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use crate::core::error::Result;
use crate::storage::segment::SegmentId;

/// Directory structure for data files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // Root directory
    pub segments_dir: PathBuf,  // Sealed segments (.seg files)
    pub meta_dir: PathBuf,      // Manifest and schema
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let segments_dir = base_dir.join("segments");
        let meta_dir = base_dir.join("meta");

        // Create directories
        fs::create_dir_all(&segments_dir)?;
        fs::create_dir_all(&meta_dir)?;

        Ok(StorageLayout {
            base_dir,
            segments_dir,
            meta_dir,
        })
    }

    pub fn segment_path(&self, id: &SegmentId) -> PathBuf {
        self.segments_dir.join(format!("{}.seg", id.0))
    }

    pub fn segment_tmp_path(&self, id: &SegmentId) -> PathBuf {
        self.segments_dir.join(format!("{}.seg.tmp", id.0))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.meta_dir.join("MANIFEST")
    }

    pub fn manifest_tmp_path(&self) -> PathBuf {
        self.meta_dir.join("MANIFEST.tmp")
    }

    pub fn schema_path(&self) -> PathBuf {
        self.meta_dir.join("schema.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    /// Sealed segment files present on disk
    pub fn list_segments(&self) -> Result<Vec<SegmentId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.segments_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("seg") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(SegmentId(id));
            }
        }
        Ok(ids)
    }

    /// Leftovers of interrupted writes
    pub fn list_temp_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in [&self.segments_dir, &self.meta_dir] {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    /// Make a completed rename durable
    pub fn sync_dir(dir: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            fs::File::open(dir)?.sync_all()?;
        }
        #[cfg(not(unix))]
        {
            let _ = dir;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();

        let id = SegmentId::new();
        fs::write(layout.segment_path(&id), b"x").unwrap();
        fs::write(layout.segment_tmp_path(&SegmentId::new()), b"x").unwrap();
        fs::write(layout.segments_dir.join("notes.txt"), b"x").unwrap();
        fs::write(layout.manifest_tmp_path(), b"x").unwrap();

        assert_eq!(layout.list_segments().unwrap(), vec![id]);
        assert_eq!(layout.list_temp_files().unwrap().len(), 2);
    }
}
