//! Bounded random-access byte source over a file or an in-memory range.
//!
//! Generalizes the teacher's `Ext2Fs::read_sectors` (which adds a GPT
//! partition's `start_lba` to every sector read) to an arbitrary byte
//! offset, so a filesystem embedded at some offset inside a larger
//! container is transparent to everything above this layer.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// A source of bytes at absolute offsets. Implementors only need to
/// guarantee that concurrent `read_at` calls from behind a `&self` are safe
/// to serialize internally; callers never assume lock-free access.
pub trait ImageSource: Send + Sync {
    /// Total length of the source in bytes.
    fn len(&self) -> u64;

    /// Read `buf.len()` bytes starting at `offset`. Short reads are only
    /// acceptable at end-of-source, in which case the returned slice is
    /// shorter than `buf`; any other failure to fill `buf` is an error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

/// A plain file, opened read-only, accessed through a single mutex-guarded
/// cursor. Portable across platforms (unlike `FileExt::read_exact_at`),
/// matching the single-mutex concurrency model described for the block
/// cache: one lock, held only for the duration of one positioned read.
pub struct FileImage {
    file: Mutex<File>,
    len: u64,
}

impl FileImage {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ImageSource for FileImage {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut file = self.file.lock().expect("image mutex poisoned");
        file.seek(SeekFrom::Start(offset))?;
        read_best_effort(&mut *file, buf)
    }
}

/// An in-memory image, for embedding a filesystem in a larger buffer and
/// for the synthetic images this crate's own tests build.
pub struct MemoryImage {
    data: Vec<u8>,
}

impl MemoryImage {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ImageSource for MemoryImage {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = offset as usize;
        if offset > self.data.len() {
            return Err(Error::InvalidArgument("read offset past end of image"));
        }
        let available = &self.data[offset..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

fn read_best_effort(r: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(total)
}

/// A view of an [`ImageSource`] bounded to `[base, base + length)`, with all
/// reads translated by `base`. This is what lets a filesystem embedded in a
/// partitioned disk image be parsed without the rest of the crate knowing
/// about partitions at all.
pub struct BoundedImage {
    source: Box<dyn ImageSource>,
    base: u64,
    length: u64,
}

impl BoundedImage {
    pub fn new(source: Box<dyn ImageSource>, base: u64, length: Option<u64>) -> Result<Self> {
        let total = source.len();
        if base > total {
            return Err(Error::InvalidArgument("volume offset past end of image"));
        }
        let length = match length {
            Some(l) => {
                if base.checked_add(l).map(|end| end > total).unwrap_or(true) {
                    return Err(Error::InvalidArgument(
                        "volume length extends past end of image",
                    ));
                }
                l
            }
            None => total - base,
        };
        Ok(Self {
            source,
            base,
            length,
        })
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    /// Read `buf.len()` bytes at `offset` (relative to the bound). Fails
    /// unless the entire buffer could be filled, matching the "short reads
    /// are errors except at EOF" contract: reading exactly up to `len()` is
    /// fine, reading a buffer that would cross it is `OutOfRange`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(Error::InvalidArgument("offset overflow"))?;
        if end > self.length {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read out of range of bounded image",
            )));
        }
        let n = self.source.read_at(self.base + offset, buf)?;
        if n != buf.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read from image source",
            )));
        }
        Ok(())
    }
}
