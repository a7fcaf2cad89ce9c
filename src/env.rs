//! Storage access used by table readers and builders.
//!
//! Readers consume a [`RandomAccessFile`]; builders write to any
//! [`std::io::Write`]. The unique id of a source keys block cache entries, so
//! it must identify the file *content*: two opens of the same file report the
//! same id, different files never do.

use std::fs::File;
#[cfg(not(unix))]
use std::io::{Read, Seek, SeekFrom};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::coding::put_varint64;
use crate::error::{Error, Result};

/// A read-only byte source supporting positioned reads.
pub trait RandomAccessFile: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// Reads extending past the end of the source fail with
    /// `InvalidArgument`.
    fn read(&self, offset: u64, len: usize) -> Result<Bytes>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// A stable identifier of the content, if one can be derived.
    fn unique_id(&self) -> Option<Vec<u8>> {
        None
    }
}

fn check_bounds(offset: u64, len: usize, size: u64) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::invalid_argument(format!(
            "read of {} bytes at offset {} beyond file size {}",
            len, offset, size
        ))),
    }
}

/// A [`RandomAccessFile`] backed by an OS file.
///
/// On unix reads are positioned (`pread`) and never contend with each other;
/// elsewhere they serialize on a lock around seek + read.
#[derive(Debug)]
pub struct FileSource {
    #[cfg(unix)]
    file: File,
    #[cfg(not(unix))]
    file: Mutex<File>,
    size: u64,
    unique_id: Option<Vec<u8>>,
}

impl FileSource {
    /// Opens `path` for positioned reads.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let unique_id = derive_unique_id(&metadata);

        #[cfg(not(unix))]
        let file = Mutex::new(file);
        Ok(Self { file, size: metadata.len(), unique_id })
    }
}

/// Leading byte of ids derived from file metadata.
pub(crate) const FILE_ID_TAG: u8 = b'F';

/// Builds an id from device, inode, length and modification time.
#[cfg(unix)]
fn derive_unique_id(metadata: &std::fs::Metadata) -> Option<Vec<u8>> {
    use std::os::unix::fs::MetadataExt;

    let mut id = vec![FILE_ID_TAG];
    put_varint64(&mut id, metadata.dev());
    put_varint64(&mut id, metadata.ino());
    put_varint64(&mut id, metadata.len());
    put_varint64(&mut id, metadata.mtime() as u64);
    put_varint64(&mut id, metadata.mtime_nsec() as u64);
    Some(id)
}

#[cfg(not(unix))]
fn derive_unique_id(_metadata: &std::fs::Metadata) -> Option<Vec<u8>> {
    None
}

impl RandomAccessFile for FileSource {
    fn read(&self, offset: u64, len: usize) -> Result<Bytes> {
        check_bounds(offset, len, self.size)?;

        let mut buf = vec![0u8; len];
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_exact_at(&mut buf, offset)?;
        }
        #[cfg(not(unix))]
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
        }
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn unique_id(&self) -> Option<Vec<u8>> {
        self.unique_id.clone()
    }
}

/// A [`RandomAccessFile`] over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct InMemoryFile {
    data: Bytes,
    unique_id: Option<Vec<u8>>,
}

impl InMemoryFile {
    /// Wraps `data` without a unique id.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), unique_id: None }
    }

    /// Wraps `data` with an explicit unique id.
    pub fn with_unique_id(data: impl Into<Bytes>, unique_id: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), unique_id: Some(unique_id.into()) }
    }

    /// The whole buffer.
    pub fn contents(&self) -> &Bytes {
        &self.data
    }
}

impl RandomAccessFile for InMemoryFile {
    fn read(&self, offset: u64, len: usize) -> Result<Bytes> {
        check_bounds(offset, len, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn unique_id(&self) -> Option<Vec<u8>> {
        self.unique_id.clone()
    }
}

/// A cloneable in-memory write target; all clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct MemSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything written so far.
    pub fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf.lock())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Write for MemSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
