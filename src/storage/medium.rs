//! Trait abstraction for the storage medium to enable testing

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Name of the scratch file used by [`StorageMedium::probe`]
pub const PROBE_FILE: &str = "test_write.tmp";

/// Byte-addressable file store holding flat, named files
pub trait StorageMedium {
    /// Round-trips a scratch file to prove the medium is writable and readable
    fn probe(&mut self) -> io::Result<()>;

    fn exists(&self, name: &str) -> bool;

    /// Length of a file in bytes
    fn len(&self, name: &str) -> io::Result<u64>;

    /// Buffered reader positioned at `offset`
    fn reader_at(&self, name: &str, offset: u64) -> io::Result<Box<dyn BufRead + '_>>;

    /// Appends bytes, creating the file if needed, and flushes them to the medium
    fn append(&mut self, name: &str, data: &[u8]) -> io::Result<()>;

    /// Replaces the whole file content
    fn replace(&mut self, name: &str, data: &[u8]) -> io::Result<()>;

    /// Deletes a file; deleting a missing file is not an error
    fn remove(&mut self, name: &str) -> io::Result<()>;
}

/// Storage medium backed by a directory on a real filesystem
#[derive(Debug, Clone)]
pub struct DirMedium {
    root: PathBuf,
}

impl DirMedium {
    /// Creates a medium rooted at `root`. Nothing touches the disk until
    /// the first probe or write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a named file
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl StorageMedium for DirMedium {
    fn probe(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;

        let path = self.path_of(PROBE_FILE);
        fs::write(&path, b"test\r\n")?;
        let content = fs::read(&path)?;
        fs::remove_file(&path)?;

        if content != b"test\r\n" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "probe file read back different content",
            ));
        }
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    fn len(&self, name: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.path_of(name))?.len())
    }

    fn reader_at(&self, name: &str, offset: u64) -> io::Result<Box<dyn BufRead + '_>> {
        let mut file = File::open(self.path_of(name))?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn append(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_of(name))?;
        file.write_all(data)?;
        file.sync_data()
    }

    fn replace(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        // Write to a sibling temp file, then rename over the target so a
        // power loss leaves either the old or the new content.
        let path = self.path_of(name);
        let temp_path = self.path_of(&format!("{}.tmp", name));

        let result = (|| {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
            fs::rename(&temp_path, &path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    fn remove(&mut self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.path_of(name)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Reads an entire file into memory
pub(crate) fn read_all<M: StorageMedium + ?Sized>(medium: &M, name: &str) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    medium.reader_at(name, 0)?.read_to_end(&mut buf)?;
    Ok(buf)
}
