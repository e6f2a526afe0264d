//! Temporary secondary storage.
//!
//! A [`TempStorage`] hands out seekable streams by id. Each hybrid buffer
//! asks for its stream once and owns it exclusively; the provider owns the
//! lifecycle (no buffer renames or deletes a handle).

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_common::utils::error::Result;
use strata_common::utils::hash::FxHashMap;
use tempfile::TempDir;

/// A readable, writable, seekable byte stream.
pub trait TempStream: Read + Write + Seek + Send {}

impl<S: Read + Write + Seek + Send> TempStream for S {}

/// Shared handle to a temporary stream.
pub type SharedStream = Arc<Mutex<Box<dyn TempStream>>>;

/// Provider of temporary streams.
pub trait TempStorage: Send + Sync {
    /// Returns the stream for `id`, creating it on first use.
    fn get_or_create(&self, id: &str) -> Result<SharedStream>;

    /// Returns true if a stream with `id` exists.
    fn has_stream(&self, id: &str) -> bool;
}

/// In-process temporary storage backed by byte vectors.
#[derive(Default)]
pub struct MemoryTempStorage {
    streams: Mutex<FxHashMap<String, SharedStream>>,
}

impl MemoryTempStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of streams created so far.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }
}

impl TempStorage for MemoryTempStorage {
    fn get_or_create(&self, id: &str) -> Result<SharedStream> {
        let mut streams = self.streams.lock();
        let stream = streams.entry(id.to_string()).or_insert_with(|| {
            let stream: Box<dyn TempStream> = Box::new(Cursor::new(Vec::new()));
            Arc::new(Mutex::new(stream))
        });
        Ok(Arc::clone(stream))
    }

    fn has_stream(&self, id: &str) -> bool {
        self.streams.lock().contains_key(id)
    }
}

/// File-backed temporary storage, one file per stream id.
pub struct FileTempStorage {
    dir: PathBuf,
    /// Keeps an owned temporary directory alive; `None` for caller directories.
    _temp_dir: Option<TempDir>,
    streams: Mutex<FxHashMap<String, SharedStream>>,
}

impl FileTempStorage {
    /// Creates storage in a fresh temporary directory, removed on drop.
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        Ok(Self {
            dir: temp_dir.path().to_path_buf(),
            _temp_dir: Some(temp_dir),
            streams: Mutex::new(FxHashMap::default()),
        })
    }

    /// Creates storage in `dir`. Files are left in place on drop.
    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            _temp_dir: None,
            streams: Mutex::new(FxHashMap::default()),
        })
    }

    /// Returns the directory holding the stream files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for stream `id`. The id bytes are hex encoded so distinct
    /// ids never share a file.
    fn path_for(&self, id: &str) -> PathBuf {
        let mut name = String::with_capacity(id.len() * 2 + 4);
        for byte in id.bytes() {
            let _ = write!(name, "{byte:02x}");
        }
        name.push_str(".tmp");
        self.dir.join(name)
    }
}

impl TempStorage for FileTempStorage {
    fn get_or_create(&self, id: &str) -> Result<SharedStream> {
        let mut streams = self.streams.lock();
        if let Some(stream) = streams.get(id) {
            return Ok(Arc::clone(stream));
        }

        let path = self.path_for(id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)?;
        tracing::debug!(stream = id, path = %path.display(), "created temporary stream");

        let stream: Box<dyn TempStream> = Box::new(file);
        let stream = Arc::new(Mutex::new(stream));
        streams.insert(id.to_string(), Arc::clone(&stream));
        Ok(stream)
    }

    fn has_stream(&self, id: &str) -> bool {
        self.streams.lock().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::SeekFrom;

    fn exercise(storage: &dyn TempStorage) {
        assert!(!storage.has_stream("a"));
        let stream = storage.get_or_create("a").unwrap();
        assert!(storage.has_stream("a"));

        {
            let mut s = stream.lock();
            s.write_all(b"hello").unwrap();
            s.seek(SeekFrom::Start(1)).unwrap();
            let mut buf = [0u8; 4];
            s.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"ello");
        }

        // Same id, same handle.
        let again = storage.get_or_create("a").unwrap();
        assert!(Arc::ptr_eq(&stream, &again));
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryTempStorage::new();
        exercise(&storage);
        assert_eq!(storage.stream_count(), 1);
    }

    #[test]
    fn test_file_storage() {
        let storage = FileTempStorage::new().unwrap();
        exercise(&storage);
        assert!(storage.dir().join("61.tmp").exists());
    }

    #[test]
    fn test_file_storage_in_dir_encodes_ids() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTempStorage::in_dir(dir.path().join("spill")).unwrap();
        storage.get_or_create("col/1:x").unwrap();
        assert!(dir.path().join("spill").join("636f6c2f313a78.tmp").exists());
    }

    #[test]
    fn test_similar_ids_get_separate_files() {
        let storage = FileTempStorage::new().unwrap();
        let slash = storage.get_or_create("col/1").unwrap();
        slash.lock().write_all(b"first").unwrap();

        let underscore = storage.get_or_create("col_1").unwrap();
        assert!(!Arc::ptr_eq(&slash, &underscore));
        underscore.lock().write_all(b"other!").unwrap();

        let mut buf = Vec::new();
        {
            let mut s = slash.lock();
            s.seek(SeekFrom::Start(0)).unwrap();
            s.read_to_end(&mut buf).unwrap();
        }
        assert_eq!(buf, b"first");
    }
}
