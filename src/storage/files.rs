//! Backing data files
//!
//! One file per file selector, named `data_NNN.kid`. Files are created lazily
//! as allocation reaches them and grown in fixed steps.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::error::Result;

/// A single open data file and its physical length
struct DataFile {
    file: Mutex<File>,
    len: Mutex<u64>,
}

/// The ordered set of data files under a store directory
pub struct DataFiles {
    dir: PathBuf,
    files: RwLock<Vec<DataFile>>,
}

impl DataFiles {
    /// Open the first `count` data files in `dir`, creating the directory
    pub fn open(dir: &Path, count: u32) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut files = Vec::with_capacity(count as usize);
        for id in 0..count {
            files.push(Self::open_file(dir, id)?);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            files: RwLock::new(files),
        })
    }

    /// File ids of every data file already present in `dir`
    pub fn discover(dir: &Path) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        if !dir.exists() {
            return Ok(ids);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = Self::parse_file_id(&path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Number of data files currently open
    pub fn count(&self) -> u32 {
        self.files.read().len() as u32
    }

    /// Make sure file `id` exists and is at least `min_len` bytes long.
    ///
    /// Growth happens in multiples of `growth`, never beyond `capacity`.
    pub fn ensure(&self, id: u32, min_len: u64, growth: u64, capacity: u64) -> io::Result<()> {
        {
            let files = self.files.read();
            if let Some(data) = files.get(id as usize) {
                return Self::grow(data, min_len, growth, capacity);
            }
        }

        let mut files = self.files.write();
        while files.len() <= id as usize {
            let next = files.len() as u32;
            let data = Self::open_file(&self.dir, next)?;
            tracing::info!(file = next, "Created data file");
            files.push(data);
        }
        Self::grow(&files[id as usize], min_len, growth, capacity)
    }

    /// Write `data` at `offset` in file `id`
    pub fn write_at(&self, id: u32, offset: u64, data: &[u8]) -> io::Result<()> {
        let files = self.files.read();
        let data_file = files.get(id as usize).ok_or_else(|| missing(id))?;
        let mut file = data_file.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    /// Read `len` bytes at `offset` from file `id`
    pub fn read_at(&self, id: u32, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let files = self.files.read();
        let data_file = files.get(id as usize).ok_or_else(|| missing(id))?;
        let mut file = data_file.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// fsync every data file
    pub fn sync_all(&self) -> io::Result<()> {
        for data_file in self.files.read().iter() {
            data_file.file.lock().sync_all()?;
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn open_file(dir: &Path, id: u32) -> io::Result<DataFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(Self::file_path(dir, id))?;
        let len = file.metadata()?.len();
        Ok(DataFile {
            file: Mutex::new(file),
            len: Mutex::new(len),
        })
    }

    fn grow(data: &DataFile, min_len: u64, growth: u64, capacity: u64) -> io::Result<()> {
        let mut len = data.len.lock();
        if *len >= min_len {
            return Ok(());
        }
        let target = min_len.div_ceil(growth).saturating_mul(growth).min(capacity);
        data.file.lock().set_len(target)?;
        *len = target;
        Ok(())
    }

    /// Generate the path of data file `id`
    fn file_path(dir: &Path, id: u32) -> PathBuf {
        dir.join(format!("data_{:03}.kid", id))
    }

    /// "data_007.kid" → Some(7)
    fn parse_file_id(path: &Path) -> Option<u32> {
        if path.extension()? != "kid" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("data_")?.parse().ok()
    }
}

fn missing(id: u32) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("data file {} is not open", id))
}
