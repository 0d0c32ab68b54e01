use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A prefetch file already loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPrefetchFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl RawPrefetchFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        RawPrefetchFile {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Supplies prefetch files to an analysis run.
///
/// `enumerate` is called once per run; failing it aborts the run. `read` is called once per
/// entry, possibly from worker threads; failing it only skips that entry.
pub trait PrefetchSource: Sync {
    type Entry: Sync;

    fn enumerate(&self) -> io::Result<Vec<Self::Entry>>;

    /// The name reported for `entry` in records and failures.
    fn filename(&self, entry: &Self::Entry) -> String;

    fn read(&self, entry: &Self::Entry) -> io::Result<Vec<u8>>;
}

/// An explicit list of files on disk.
#[derive(Debug, Clone, Default)]
pub struct PathListSource {
    paths: Vec<PathBuf>,
}

impl PathListSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        PathListSource {
            paths: paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
        }
    }
}

impl PrefetchSource for PathListSource {
    type Entry = PathBuf;

    fn enumerate(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self.paths.clone())
    }

    fn filename(&self, entry: &PathBuf) -> String {
        match entry.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => entry.display().to_string(),
        }
    }

    fn read(&self, entry: &PathBuf) -> io::Result<Vec<u8>> {
        fs::read(entry)
    }
}
