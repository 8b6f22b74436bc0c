use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use memmap2::Mmap;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::SourceError;

/// A memory-mapped zip archive (`.jar` or `.jmod`) opened once and read by
/// entry name.
pub struct Archive {
    path: PathBuf,
    zip: Mutex<ZipArchive<Cursor<Mmap>>>,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let io_error = |source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_error)?;
        // SAFETY: The file is opened read-only and the map is owned by the
        // archive for its whole lifetime.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_error)?;
        let zip = ZipArchive::new(Cursor::new(mmap)).map_err(|source| SourceError::Zip {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            zip: Mutex::new(zip),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads one entry; a missing entry is `Ok(None)`.
    pub fn read(&self, entry_name: &str) -> Result<Option<Vec<u8>>, SourceError> {
        let mut zip = self.zip.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entry = match zip.by_name(entry_name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(source) => {
                return Err(SourceError::Zip {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let mut bytes = Vec::with_capacity(prealloc_len(entry.size()));
        entry.read_to_end(&mut bytes).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(bytes))
    }

    /// Entry names in central directory order.
    pub fn entry_names(&self) -> Vec<String> {
        let mut zip = self.zip.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            match zip.by_index(i) {
                Ok(entry) => names.push(entry.name().to_string()),
                Err(e) => debug!(archive = %self.path.display(), index = i, error = %e, "skipping unreadable entry"),
            }
        }
        names
    }
}

// Declared sizes come from the archive itself and are not trusted past this.
const MAX_PREALLOC: u64 = 1 << 20;

fn prealloc_len(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

/// Whether an archive or directory entry is a class the scanner should visit.
pub fn is_scannable_class(entry_name: &str) -> bool {
    let file_name = entry_name.rsplit(['/', '\\']).next().unwrap_or(entry_name);
    file_name.ends_with(".class") && file_name != "package-info.class" && file_name != "module-info.class"
}
