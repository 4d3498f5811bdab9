//! The public facade: `Volume`, `FileEntry`, `ExtendedAttribute` handles,
//! and the operations that tie every lower layer together.
//!
//! Structured after the teacher's `hal::fs`/`hal::vfs` split (a volume-wide
//! handle plus per-entry borrows), generalized from a writable in-kernel
//! VFS down to a read-only, userspace-facing navigator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::BlockCache;
use crate::dirent::{self, DxNode, DxRoot, FileTypeHint};
use crate::error::{Error, Result};
use crate::features::CompatFeatures;
use crate::filedata::FileDataStream;
use crate::group::{self, GroupDescriptor};
use crate::image::{BoundedImage, ImageSource};
use crate::inode::{EntryKind, Inode, InodeFlags};
use crate::path::{self, DirectoryLookup};
use crate::superblock::{Superblock, ROOT_INODE, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};
use crate::xattr::{self, ExtendedAttribute};

/// Tuning knobs for an opened volume. `cache_capacity` is the only one
/// exposed today; kept as a struct (rather than a bare parameter) so new
/// options don't break callers, matching the teacher's `OpenOptions`-style
/// structs in `hal::fs`.
#[derive(Debug, Clone, Copy)]
pub struct VolumeOptions {
    pub cache_capacity: usize,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        VolumeOptions {
            cache_capacity: 128,
        }
    }
}

/// An opened ext2/ext3/ext4 image. Owns the bounded image reader, the
/// decoded superblock and group descriptor table, and the block cache.
/// `FileEntry`, `ChildrenIter`, and `FileDataStream` all borrow from it, so
/// it must outlive every handle obtained from it.
pub struct Volume {
    image: BoundedImage,
    superblock: Superblock,
    groups: Vec<GroupDescriptor>,
    cache: BlockCache,
    aborted: AtomicBool,
}

/// Result of looking up an inode id directly: unallocated inodes are a
/// distinct, non-error outcome per §4.13.
pub enum GetResult<'a> {
    Entry(FileEntry<'a>),
    Empty,
}

impl Volume {
    pub fn open(source: Box<dyn ImageSource>, volume_offset: u64, length: Option<u64>) -> Result<Self> {
        Self::open_with_options(source, volume_offset, length, VolumeOptions::default())
    }

    pub fn open_with_options(
        source: Box<dyn ImageSource>,
        volume_offset: u64,
        length: Option<u64>,
        options: VolumeOptions,
    ) -> Result<Self> {
        let image = BoundedImage::new(source, volume_offset, length)?;

        let mut sb_buf = vec![0u8; SUPERBLOCK_SIZE];
        image.read_at(SUPERBLOCK_OFFSET, &mut sb_buf)?;
        let superblock = Superblock::decode(&sb_buf)?;

        let gdt_offset = group::table_offset(&superblock);
        let gdt_size = superblock.group_count() as usize * superblock.descriptor_size as usize;
        let mut gdt_buf = vec![0u8; gdt_size];
        image.read_at(gdt_offset, &mut gdt_buf)?;
        let groups = group::decode_table(&gdt_buf, &superblock)?;

        Ok(Volume {
            image,
            superblock,
            groups,
            cache: BlockCache::with_capacity(options.cache_capacity),
            aborted: AtomicBool::new(false),
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn block_size(&self) -> u32 {
        self.superblock.block_size()
    }

    pub fn signal_abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn check_abort(&self) -> Result<()> {
        if self.aborted.load(Ordering::SeqCst) {
            Err(Error::Aborted)
        } else {
            Ok(())
        }
    }

    /// Load a block through the shared cache, honoring `signal_abort`.
    fn load_block(&self, block_no: u64) -> Result<Arc<[u8]>> {
        self.check_abort()?;
        let block_size = self.block_size() as usize;
        self.cache.get_or_load(block_no, || {
            let mut buf = vec![0u8; block_size];
            self.image.read_at(block_no * block_size as u64, &mut buf)?;
            Ok(buf)
        })
    }

    pub fn read_inode(&self, id: u32) -> Result<Inode> {
        if id == 0 || id > self.superblock.inode_count {
            return Err(Error::InvalidArgument("inode id out of range"));
        }
        let index = id - 1;
        let group = (index / self.superblock.inodes_per_group) as usize;
        let index_in_group = index % self.superblock.inodes_per_group;
        let gd = self
            .groups
            .get(group)
            .ok_or(Error::Corrupt("inode's block group index out of range"))?;

        let inode_size = self.superblock.inode_size as u64;
        let offset = gd.inode_table * self.block_size() as u64 + index_in_group as u64 * inode_size;
        let mut buf = vec![0u8; inode_size as usize];
        self.image.read_at(offset, &mut buf)?;
        Inode::decode(&buf, self.superblock.ro_compat_features)
    }

    pub fn root(&self) -> Result<FileEntry<'_>> {
        match self.by_inode(ROOT_INODE)? {
            GetResult::Entry(entry) => Ok(entry),
            GetResult::Empty => Err(Error::Corrupt("root inode is unallocated")),
        }
    }

    pub fn by_inode(&self, id: u32) -> Result<GetResult<'_>> {
        if id == 0 || id == 1 {
            return Err(Error::InvalidArgument("inode 0 and 1 are reserved"));
        }
        let inode = self.read_inode(id)?;
        if inode.is_empty() {
            return Ok(GetResult::Empty);
        }
        Ok(GetResult::Entry(FileEntry {
            volume: self,
            inode_id: id,
            inode,
        }))
    }

    pub fn by_path(&self, path: &[u8]) -> Result<FileEntry<'_>> {
        let id = path::resolve(self, path)?;
        match self.by_inode(id)? {
            GetResult::Entry(entry) => Ok(entry),
            GetResult::Empty => Err(Error::NotFound),
        }
    }

    fn entry_size(&self, inode: &Inode) -> u64 {
        inode.size(self.superblock.ro_compat_features)
    }

    fn data_stream<'a>(&'a self, inode: &'a Inode) -> Result<FileDataStream<'a>> {
        let size = self.entry_size(inode);
        if inode.has_inline_data() {
            let data = self.inline_file_region(inode, size)?;
            return Ok(FileDataStream::new_inline(inode, size, data));
        }
        Ok(FileDataStream::new(inode, self.block_size(), size, move |b| {
            self.load_block(b)
        }))
    }

    /// Gather an `INLINE_DATA_FL` regular file's (or symlink's) content: the
    /// 60-byte in-inode `i_block` region, extended with the `system.data`
    /// xattr value when the data overflows it, per §5.8.
    fn inline_file_region(&self, inode: &Inode, size: u64) -> Result<Vec<u8>> {
        let attrs = self.in_inode_xattrs(inode)?;
        let system_data = attrs
            .iter()
            .find(|a| a.name == "system.data")
            .map(|a| a.value.as_slice());
        let mut combined = inode.i_block.to_vec();
        if let Some(extra) = system_data {
            combined.extend_from_slice(extra);
        }
        combined.resize(size as usize, 0);
        Ok(combined)
    }

    /// Materialize every logical block of a (non-inline) directory's
    /// content, one entry per block, each exactly `block_size` bytes.
    fn directory_blocks(&self, inode: &Inode) -> Result<Vec<Vec<u8>>> {
        let block_size = self.block_size() as usize;
        let size = self.entry_size(inode);
        let block_count = size.div_ceil(block_size as u64);
        let mut stream = self.data_stream(inode)?;
        let mut blocks = Vec::with_capacity(block_count as usize);
        for i in 0..block_count {
            stream.seek(i * block_size as u64);
            let mut buf = vec![0u8; block_size];
            stream.read(&mut buf)?;
            blocks.push(buf);
        }
        Ok(blocks)
    }

    fn inline_directory_region(&self, inode: &Inode) -> Result<Vec<DirEntry>> {
        let filetype_present = self
            .superblock
            .incompat_features
            .contains(crate::features::IncompatFeatures::FILETYPE);
        let attrs = self.in_inode_xattrs(inode)?;
        let system_data = attrs
            .iter()
            .find(|a| a.name == "system.data")
            .map(|a| a.value.as_slice());
        dirent::decode_inline(&inode.i_block[4..], system_data, filetype_present)
    }

    fn all_directory_entries(&self, inode: &Inode) -> Result<Vec<DirEntry>> {
        let filetype_present = self
            .superblock
            .incompat_features
            .contains(crate::features::IncompatFeatures::FILETYPE);
        if inode.has_inline_data() {
            return self.inline_directory_region(inode);
        }
        let blocks = self.directory_blocks(inode)?;
        let mut out = Vec::new();
        for block in blocks {
            out.extend(dirent::decode_linear(&block, filetype_present)?);
        }
        Ok(out)
    }

    fn lookup_child_by_name(&self, inode: &Inode, name: &[u8]) -> Result<Option<DirEntry>> {
        let uses_htree = self
            .superblock
            .compat_features
            .contains(CompatFeatures::DIR_INDEX)
            && inode.flags.contains(InodeFlags::INDEX_FL)
            && !inode.has_inline_data();

        if uses_htree {
            if let Some(found) = self.htree_lookup(inode, name)? {
                return Ok(Some(found));
            }
        }

        let entries = self.all_directory_entries(inode)?;
        Ok(entries.into_iter().find(|e| e.name == name))
    }

    fn htree_lookup(&self, inode: &Inode, name: &[u8]) -> Result<Option<DirEntry>> {
        let blocks = self.directory_blocks(inode)?;
        if blocks.is_empty() {
            return Ok(None);
        }
        let root = DxRoot::decode(&blocks[0])?;
        let hash = dirent::hash_name(name, root.hash_version, self.superblock.hash_seed);

        let mut block_no = root.child_for_hash(hash)? as usize;
        if root.indirect_levels > 0 {
            let node = DxNode::decode(
                blocks
                    .get(block_no)
                    .ok_or(Error::Corrupt("htree index block out of range"))?,
            )?;
            block_no = node.child_for_hash(hash)? as usize;
        }
        let leaf = blocks
            .get(block_no)
            .ok_or(Error::Corrupt("htree leaf block out of range"))?;
        let filetype_present = self
            .superblock
            .incompat_features
            .contains(crate::features::IncompatFeatures::FILETYPE);
        let entries = dirent::decode_linear(leaf, filetype_present)?;
        Ok(entries.into_iter().find(|e| e.name == name))
    }

    fn in_inode_xattrs(&self, inode: &Inode) -> Result<Vec<ExtendedAttribute>> {
        xattr::decode_in_inode(&inode.raw, inode.extra_isize, |value_inum, value_size| {
            self.read_external_xattr_value(value_inum, value_size)
        })
    }

    fn block_xattrs(&self, inode: &Inode) -> Result<Vec<ExtendedAttribute>> {
        if inode.file_acl == 0 {
            return Ok(Vec::new());
        }
        let block = self.load_block(inode.file_acl)?;
        xattr::decode_block(&block, |value_inum, value_size| {
            self.read_external_xattr_value(value_inum, value_size)
        })
    }

    fn read_external_xattr_value(&self, value_inum: u32, value_size: u32) -> Result<Vec<u8>> {
        let value_inode = self.read_inode(value_inum)?;
        let mut stream = self.data_stream(&value_inode)?;
        let mut buf = vec![0u8; value_size as usize];
        let mut written = 0;
        while written < buf.len() {
            let n = stream.read(&mut buf[written..])?;
            if n == 0 {
                break;
            }
            written += n;
        }
        buf.truncate(written);
        Ok(buf)
    }

    fn all_xattrs(&self, inode: &Inode) -> Result<Vec<ExtendedAttribute>> {
        let mut attrs = self.in_inode_xattrs(inode)?;
        attrs.extend(self.block_xattrs(inode)?);
        Ok(attrs)
    }

    fn symlink_target_bytes(&self, inode: &Inode) -> Result<Vec<u8>> {
        let size = self.entry_size(inode);
        crate::symlink::read_target(inode, size, self.data_stream(inode)?)
    }
}

type DirEntry = dirent::DirEntry;

impl DirectoryLookup for Volume {
    fn root_inode(&self) -> u32 {
        ROOT_INODE
    }

    fn lookup_child(&self, dir_inode: u32, name: &[u8]) -> Result<Option<u32>> {
        let inode = self.read_inode(dir_inode)?;
        Ok(self
            .lookup_child_by_name(&inode, name)?
            .map(|entry| entry.inode))
    }

    fn kind_of(&self, inode: u32) -> Result<EntryKind> {
        Ok(self.read_inode(inode)?.kind())
    }

    fn symlink_target(&self, inode: u32) -> Result<Vec<u8>> {
        let inode = self.read_inode(inode)?;
        self.symlink_target_bytes(&inode)
    }
}

/// A handle bound to one (Volume, inode id, decoded Inode). Borrows the
/// volume for its whole lifetime; dropping it never invalidates siblings
/// or the volume itself.
pub struct FileEntry<'a> {
    volume: &'a Volume,
    inode_id: u32,
    inode: Inode,
}

impl<'a> FileEntry<'a> {
    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }

    pub fn kind(&self) -> EntryKind {
        self.inode.kind()
    }

    pub fn mode(&self) -> u16 {
        self.inode.mode
    }

    pub fn uid(&self) -> u32 {
        self.inode.uid
    }

    pub fn gid(&self) -> u32 {
        self.inode.gid
    }

    pub fn link_count(&self) -> u16 {
        self.inode.link_count
    }

    pub fn size(&self) -> u64 {
        self.volume.entry_size(&self.inode)
    }

    /// Read up to `buf.len()` bytes starting at `offset`. Fails
    /// `NotRegular` for non-regular files, matching §4.13.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if self.kind() != EntryKind::Regular {
            return Err(Error::NotRegular);
        }
        let mut stream = self.volume.data_stream(&self.inode)?;
        stream.seek(offset);
        stream.read(buf)
    }

    pub fn children(&self) -> Result<ChildrenIter<'a>> {
        if self.kind() != EntryKind::Directory {
            return Err(Error::NotADirectory);
        }
        let entries = self.volume.all_directory_entries(&self.inode)?;
        Ok(ChildrenIter {
            entries: entries.into_iter().filter(|e| e.name != b"." && e.name != b"..").collect(),
            position: 0,
        })
    }

    pub fn lookup(&self, name: &[u8]) -> Result<Option<u32>> {
        if self.kind() != EntryKind::Directory {
            return Err(Error::NotADirectory);
        }
        Ok(self
            .volume
            .lookup_child_by_name(&self.inode, name)?
            .map(|e| e.inode))
    }

    pub fn xattr_count(&self) -> Result<usize> {
        Ok(self.volume.all_xattrs(&self.inode)?.len())
    }

    pub fn xattr_at(&self, index: usize) -> Result<ExtendedAttribute> {
        self.volume
            .all_xattrs(&self.inode)?
            .into_iter()
            .nth(index)
            .ok_or(Error::InvalidArgument("xattr index out of range"))
    }

    pub fn symlink_target(&self) -> Result<Vec<u8>> {
        if self.kind() != EntryKind::Symlink {
            return Err(Error::NotASymlink);
        }
        self.volume.symlink_target_bytes(&self.inode)
    }
}

/// A finite, single-pass iterator over one directory's children, excluding
/// the `.`/`..` stub entries. Restartable only by calling
/// [`FileEntry::children`] again.
pub struct ChildrenIter {
    entries: Vec<DirEntry>,
    position: usize,
}

pub struct Child {
    pub name: Vec<u8>,
    pub inode: u32,
    pub type_hint: FileTypeHint,
}

impl Iterator for ChildrenIter {
    type Item = Child;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.position)?.clone();
        self.position += 1;
        Some(Child {
            name: entry.name,
            inode: entry.inode,
            type_hint: entry.file_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MemoryImage;
    use byteorder::{ByteOrder, LittleEndian as LE};

    /// Builds a minimal, synthetic single-group ext2 image: superblock,
    /// one 32-byte group descriptor, an inode table with root (#2) as a
    /// directory containing "lost+found" (#11, also a directory).
    fn build_image() -> Vec<u8> {
        let block_size = 1024u32;
        let inode_size = 128u16;
        let inodes_per_group = 32u32;
        let blocks_per_group = 8192u32;
        let total_blocks = 64u64;

        let mut image = vec![0u8; (total_blocks * block_size as u64) as usize];

        // Superblock at 1024.
        let sb = &mut image[1024..1024 + 1024];
        LE::write_u32(&mut sb[0x00..0x04], inodes_per_group); // inode_count
        LE::write_u32(&mut sb[0x04..0x08], total_blocks as u32);
        LE::write_u32(&mut sb[0x14..0x18], 1); // first_data_block
        LE::write_u32(&mut sb[0x18..0x1C], 0); // log_block_size -> 1024
        LE::write_u32(&mut sb[0x20..0x24], blocks_per_group);
        LE::write_u32(&mut sb[0x28..0x2C], inodes_per_group);
        LE::write_u16(&mut sb[0x38..0x3A], 0x53EF);
        LE::write_u32(&mut sb[0x4C..0x50], 1); // rev_level
        LE::write_u32(&mut sb[0x54..0x58], 11); // first_ino
        LE::write_u16(&mut sb[0x58..0x5A], inode_size);
        LE::write_u32(&mut sb[0x60..0x64], 0x0002); // incompat FILETYPE

        // Group descriptor table at block 2 (1024-byte blocks => offset 2048).
        let gdt = &mut image[2048..2048 + 32];
        LE::write_u32(&mut gdt[0x00..0x04], 3); // block_bitmap
        LE::write_u32(&mut gdt[0x04..0x08], 4); // inode_bitmap
        LE::write_u32(&mut gdt[0x08..0x0C], 5); // inode_table at block 5

        let inode_table_block = 5u64;
        let write_inode = |image: &mut Vec<u8>, id: u32, mode: u16, block_ptr: u32, size: u32| {
            let offset =
                inode_table_block * block_size as u64 + (id as u64 - 1) * inode_size as u64;
            let buf = &mut image[offset as usize..offset as usize + inode_size as usize];
            LE::write_u16(&mut buf[0x00..0x02], mode);
            LE::write_u32(&mut buf[0x04..0x08], size);
            LE::write_u16(&mut buf[0x1A..0x1C], 2); // link_count
            LE::write_u32(&mut buf[0x1C..0x20], 2); // blocks_count (512B units)
            LE::write_u32(&mut buf[0x28..0x2C], block_ptr); // direct block 0
        };

        write_inode(&mut image, 2, 0x4000 | 0o755, 10, block_size);
        write_inode(&mut image, 11, 0x4000 | 0o700, 12, block_size);

        // Root directory block (10): "." , "..", "lost+found".
        let write_dirent = |buf: &mut [u8], offset: usize, inode: u32, rec_len: u16, name: &[u8], ft: u8| {
            LE::write_u32(&mut buf[offset..offset + 4], inode);
            LE::write_u16(&mut buf[offset + 4..offset + 6], rec_len);
            buf[offset + 6] = name.len() as u8;
            buf[offset + 7] = ft;
            buf[offset + 8..offset + 8 + name.len()].copy_from_slice(name);
        };
        {
            let root_block = &mut image[(10 * block_size as u64) as usize..(11 * block_size as u64) as usize];
            write_dirent(root_block, 0, 2, 12, b".", 2);
            write_dirent(root_block, 12, 2, 12, b"..", 2);
            write_dirent(root_block, 24, 11, (block_size as usize - 24) as u16, b"lost+found", 2);
        }
        {
            let lf_block = &mut image[(12 * block_size as u64) as usize..(13 * block_size as u64) as usize];
            write_dirent(lf_block, 0, 11, 12, b".", 2);
            write_dirent(lf_block, 12, 2, (block_size as usize - 12) as u16, b"..", 2);
        }

        image
    }

    #[test]
    fn opens_and_lists_root_children() {
        let volume = Volume::open(Box::new(MemoryImage::new(build_image())), 0, None).unwrap();
        let root = volume.root().unwrap();
        assert_eq!(root.kind(), EntryKind::Directory);
        let names: Vec<Vec<u8>> = root.children().unwrap().map(|c| c.name).collect();
        assert_eq!(names, vec![b"lost+found".to_vec()]);
    }

    #[test]
    fn resolves_path_to_lost_and_found() {
        let volume = Volume::open(Box::new(MemoryImage::new(build_image())), 0, None).unwrap();
        let entry = volume.by_path(b"/lost+found").unwrap();
        assert_eq!(entry.inode_id(), 11);
        assert_eq!(entry.mode(), 0x4000 | 0o700);
        assert_eq!(entry.link_count(), 2);
    }

    #[test]
    fn unallocated_inode_is_reported_as_empty() {
        let volume = Volume::open(Box::new(MemoryImage::new(build_image())), 0, None).unwrap();
        match volume.by_inode(20).unwrap() {
            GetResult::Empty => {}
            GetResult::Entry(_) => panic!("expected Empty for unallocated inode"),
        }
    }

    #[test]
    fn abort_flag_short_circuits_block_reads() {
        let volume = Volume::open(Box::new(MemoryImage::new(build_image())), 0, None).unwrap();
        volume.signal_abort();
        let entry = volume.root().unwrap();
        assert!(matches!(entry.children(), Err(Error::Aborted)));
    }
}
