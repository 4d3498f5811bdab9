//! `SharedVolume`: a thin `Arc<Mutex<Volume>>` wrapper for sharing one
//! opened volume across multiple owners/threads.
//!
//! Grounded on the teacher's `hal::fs::FILE_SYSTEM` global (`hal/vfs.rs`):
//! every VFS operation (`open`, `read`, `write`) locks the guarded
//! filesystem, does its work while holding the lock, and returns only owned
//! data — it never hands a borrow of the guarded value back to the caller.
//! `SharedVolume` is the same shape scoped to one handle (`Arc::clone`)
//! instead of the teacher's process-wide `OnceCell`/`static`.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::image::ImageSource;
use crate::volume::{Child, GetResult, Volume, VolumeOptions};

/// A cloneable, thread-safe handle to one opened [`Volume`]. Every method
/// acquires the volume's mutex for its own duration and releases it before
/// returning, so a [`FileEntry`](crate::volume::FileEntry) or
/// [`ChildrenIter`](crate::volume::ChildrenIter) — both of which borrow from
/// the `Volume` they came from — never has to outlive the lock guard.
#[derive(Clone)]
pub struct SharedVolume {
    inner: Arc<Mutex<Volume>>,
}

impl SharedVolume {
    pub fn new(volume: Volume) -> Self {
        SharedVolume {
            inner: Arc::new(Mutex::new(volume)),
        }
    }

    pub fn open(
        source: Box<dyn ImageSource>,
        volume_offset: u64,
        length: Option<u64>,
    ) -> Result<Self> {
        Ok(Self::new(Volume::open(source, volume_offset, length)?))
    }

    pub fn open_with_options(
        source: Box<dyn ImageSource>,
        volume_offset: u64,
        length: Option<u64>,
        options: VolumeOptions,
    ) -> Result<Self> {
        Ok(Self::new(Volume::open_with_options(
            source,
            volume_offset,
            length,
            options,
        )?))
    }

    /// Run `f` against the guarded volume, holding the lock for `f`'s whole
    /// duration. This is the escape hatch for anything not already covered
    /// by a convenience method below.
    pub fn with<R>(&self, f: impl FnOnce(&Volume) -> R) -> R {
        let guard = self.inner.lock().expect("shared volume mutex poisoned");
        f(&guard)
    }

    /// Read up to `buf.len()` bytes of `inode_id`'s content at `offset`,
    /// locking the volume only for this one call.
    pub fn read_file_at(&self, inode_id: u32, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.with(|volume| {
            let entry = match volume.by_inode(inode_id)? {
                GetResult::Entry(entry) => entry,
                GetResult::Empty => return Err(Error::NotFound),
            };
            entry.read_at(offset, buf)
        })
    }

    /// List one directory's children as owned [`Child`] values.
    pub fn children_of(&self, inode_id: u32) -> Result<Vec<Child>> {
        self.with(|volume| {
            let entry = match volume.by_inode(inode_id)? {
                GetResult::Entry(entry) => entry,
                GetResult::Empty => return Err(Error::NotFound),
            };
            Ok(entry.children()?.collect())
        })
    }

    /// Resolve a path to an inode id, without exposing a `FileEntry` borrow.
    pub fn by_path_inode(&self, path: &[u8]) -> Result<u32> {
        self.with(|volume| volume.by_path(path).map(|entry| entry.inode_id()))
    }

    pub fn signal_abort(&self) {
        self.with(Volume::signal_abort);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MemoryImage;
    use byteorder::{ByteOrder, LittleEndian as LE};

    fn build_image() -> Vec<u8> {
        let block_size = 1024u32;
        let inode_size = 128u16;
        let inodes_per_group = 32u32;
        let blocks_per_group = 8192u32;
        let total_blocks = 64u64;

        let mut image = vec![0u8; (total_blocks * block_size as u64) as usize];

        let sb = &mut image[1024..1024 + 1024];
        LE::write_u32(&mut sb[0x00..0x04], inodes_per_group);
        LE::write_u32(&mut sb[0x04..0x08], total_blocks as u32);
        LE::write_u32(&mut sb[0x14..0x18], 1);
        LE::write_u32(&mut sb[0x18..0x1C], 0);
        LE::write_u32(&mut sb[0x20..0x24], blocks_per_group);
        LE::write_u32(&mut sb[0x28..0x2C], inodes_per_group);
        LE::write_u16(&mut sb[0x38..0x3A], 0x53EF);
        LE::write_u32(&mut sb[0x4C..0x50], 1);
        LE::write_u32(&mut sb[0x54..0x58], 11);
        LE::write_u16(&mut sb[0x58..0x5A], inode_size);
        LE::write_u32(&mut sb[0x60..0x64], 0x0002);

        let gdt = &mut image[2048..2048 + 32];
        LE::write_u32(&mut gdt[0x00..0x04], 3);
        LE::write_u32(&mut gdt[0x04..0x08], 4);
        LE::write_u32(&mut gdt[0x08..0x0C], 5);

        let inode_table_block = 5u64;
        let offset = inode_table_block * block_size as u64;
        let buf = &mut image[offset as usize..offset as usize + inode_size as usize];
        LE::write_u16(&mut buf[0x00..0x02], 0x4000 | 0o755);
        LE::write_u32(&mut buf[0x04..0x08], block_size);
        LE::write_u16(&mut buf[0x1A..0x1C], 2);
        LE::write_u32(&mut buf[0x1C..0x20], 2);
        LE::write_u32(&mut buf[0x28..0x2C], 10);

        let root_block = &mut image[(10 * block_size as u64) as usize..(11 * block_size as u64) as usize];
        LE::write_u32(&mut root_block[0..4], 2);
        LE::write_u16(&mut root_block[4..6], 12);
        root_block[6] = 1;
        root_block[7] = 2;
        root_block[8] = b'.';
        LE::write_u32(&mut root_block[12..16], 2);
        LE::write_u16(&mut root_block[16..18], (block_size - 12) as u16);
        root_block[18] = 2;
        root_block[19] = 2;
        root_block[20] = b'.';
        root_block[21] = b'.';

        image
    }

    #[test]
    fn shared_volume_is_cloneable_and_serves_concurrent_callers() {
        let volume = Volume::open(Box::new(MemoryImage::new(build_image())), 0, None).unwrap();
        let shared = SharedVolume::new(volume);
        let other = shared.clone();

        let children = shared.children_of(2).unwrap();
        assert!(children.is_empty());
        assert_eq!(other.by_path_inode(b"/").unwrap(), 2);
    }

    #[test]
    fn signal_abort_is_visible_through_every_clone() {
        let volume = Volume::open(Box::new(MemoryImage::new(build_image())), 0, None).unwrap();
        let shared = SharedVolume::new(volume);
        let other = shared.clone();
        other.signal_abort();
        assert!(matches!(shared.children_of(2), Err(Error::Aborted)));
    }
}
