//! Inode decoding.
//!
//! Field layout generalizes the teacher's `Inode` struct
//! (`drivers/fs/ext2/mod.rs`) with the ext3/4 extensions it never needed:
//! 64-bit uid/gid/size/blocks halves, nanosecond timestamps, and crtime.

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian as LE};

use crate::error::{Error, Result};
use crate::features::RoCompatFeatures;

pub const S_IFMT: u16 = 0xF000;
pub const S_IFSOCK: u16 = 0xC000;
pub const S_IFLNK: u16 = 0xA000;
pub const S_IFREG: u16 = 0x8000;
pub const S_IFBLK: u16 = 0x6000;
pub const S_IFDIR: u16 = 0x4000;
pub const S_IFCHR: u16 = 0x2000;
pub const S_IFIFO: u16 = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Unknown,
}

impl EntryKind {
    pub fn from_mode(mode: u16) -> Self {
        match mode & S_IFMT {
            S_IFREG => EntryKind::Regular,
            S_IFDIR => EntryKind::Directory,
            S_IFLNK => EntryKind::Symlink,
            S_IFCHR => EntryKind::CharDevice,
            S_IFBLK => EntryKind::BlockDevice,
            S_IFIFO => EntryKind::Fifo,
            S_IFSOCK => EntryKind::Socket,
            _ => EntryKind::Unknown,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InodeFlags: u32 {
        const INDEX_FL       = 0x0000_1000;
        const EXTENTS_FL     = 0x0008_0000;
        const EA_INODE_FL    = 0x0020_0000;
        const INLINE_DATA_FL = 0x1000_0000;
    }
}

/// A fully decoded `Timestamp`, combining the base 32-bit seconds field with
/// the optional ext4 nanosecond/epoch-extension word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl Timestamp {
    fn from_parts(base: u32, extra: Option<u32>) -> Self {
        match extra {
            Some(extra) => Timestamp {
                seconds: base as i64 + (((extra & 0x3) as i64) << 32),
                nanoseconds: extra >> 2,
            },
            None => Timestamp {
                seconds: base as i64,
                nanoseconds: 0,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub size_lo: u32,
    pub size_high: u32,
    pub link_count: u16,
    pub blocks_count: u32,
    pub flags: InodeFlags,
    pub i_block: [u8; 60],
    pub generation: u32,
    pub file_acl: u64,
    pub dtime: u32,
    pub atime: Timestamp,
    pub ctime: Timestamp,
    pub mtime: Timestamp,
    pub crtime: Option<Timestamp>,
    /// Size of the `i_extra_isize`-delimited extension region past the
    /// fixed 128-byte prefix; needed again by xattr decoding to locate the
    /// in-inode attribute area.
    pub extra_isize: u16,
    /// The full on-disk inode buffer, retained for the in-inode extended
    /// attribute region (§4.10), which lives past the fields this struct
    /// otherwise extracts.
    pub raw: Vec<u8>,
}

impl Inode {
    pub fn decode(buf: &[u8], ro_compat: RoCompatFeatures) -> Result<Self> {
        if buf.len() < 128 {
            return Err(Error::Corrupt("inode buffer shorter than 128 bytes"));
        }

        let mode = LE::read_u16(&buf[0x00..0x02]);
        let uid_lo = LE::read_u16(&buf[0x02..0x04]);
        let size_lo = LE::read_u32(&buf[0x04..0x08]);
        let atime_base = LE::read_u32(&buf[0x08..0x0C]);
        let ctime_base = LE::read_u32(&buf[0x0C..0x10]);
        let mtime_base = LE::read_u32(&buf[0x10..0x14]);
        let dtime = LE::read_u32(&buf[0x14..0x18]);
        let gid_lo = LE::read_u16(&buf[0x18..0x1A]);
        let link_count = LE::read_u16(&buf[0x1A..0x1C]);
        let blocks_count = LE::read_u32(&buf[0x1C..0x20]);
        let flags = InodeFlags::from_bits_truncate(LE::read_u32(&buf[0x20..0x24]));

        let mut i_block = [0u8; 60];
        i_block.copy_from_slice(&buf[0x28..0x64]);

        let generation = LE::read_u32(&buf[0x64..0x68]);
        let file_acl_lo = LE::read_u32(&buf[0x68..0x6C]);
        let size_high = LE::read_u32(&buf[0x6C..0x70]);

        // osd2 (Linux variant): l_i_blocks_high, l_i_file_acl_high,
        // l_i_uid_high, l_i_gid_high, l_i_checksum_lo, l_i_reserved.
        let osd2 = &buf[0x74..0x80];
        let file_acl_hi = LE::read_u16(&osd2[2..4]);
        let uid_hi = LE::read_u16(&osd2[4..6]);
        let gid_hi = LE::read_u16(&osd2[6..8]);

        let extra_isize = if buf.len() > 0x82 {
            LE::read_u16(&buf[0x80..0x82])
        } else {
            0
        };
        let extra_end = 128usize + extra_isize as usize;
        let has_extra = |field_end: usize| field_end <= extra_end && field_end <= buf.len();

        let read_extra_extension = |field_offset: usize| -> Option<u32> {
            if has_extra(field_offset + 4) {
                Some(LE::read_u32(&buf[field_offset..field_offset + 4]))
            } else {
                None
            }
        };

        let ctime_extra = read_extra_extension(0x84);
        let mtime_extra = read_extra_extension(0x88);
        let atime_extra = read_extra_extension(0x8C);
        let crtime = if has_extra(0x90 + 4) {
            let crtime_base = LE::read_u32(&buf[0x90..0x94]);
            let crtime_extra = read_extra_extension(0x94);
            Some(Timestamp::from_parts(crtime_base, crtime_extra))
        } else {
            None
        };

        Ok(Inode {
            mode,
            uid: (uid_lo as u32) | ((uid_hi as u32) << 16),
            gid: (gid_lo as u32) | ((gid_hi as u32) << 16),
            size_lo,
            size_high,
            link_count,
            blocks_count,
            flags,
            i_block,
            generation,
            file_acl: (file_acl_lo as u64) | ((file_acl_hi as u64) << 32),
            dtime,
            atime: Timestamp::from_parts(atime_base, atime_extra),
            ctime: Timestamp::from_parts(ctime_base, ctime_extra),
            mtime: Timestamp::from_parts(mtime_base, mtime_extra),
            crtime,
            extra_isize,
            raw: buf.to_vec(),
        })
    }

    pub fn kind(&self) -> EntryKind {
        EntryKind::from_mode(self.mode)
    }

    pub fn is_deleted(&self) -> bool {
        self.link_count == 0 && self.dtime != 0
    }

    /// Whether this inode is unallocated and should not be surfaced as a
    /// `FileEntry` at all (mode=0 with no link and no deletion time is just
    /// a zeroed, never-assigned slot).
    pub fn is_empty(&self) -> bool {
        self.mode == 0 && self.link_count == 0 && self.dtime == 0
    }

    pub fn size(&self, ro_compat: RoCompatFeatures) -> u64 {
        if self.kind() == EntryKind::Regular && ro_compat.contains(RoCompatFeatures::LARGE_FILE) {
            (self.size_lo as u64) | ((self.size_high as u64) << 32)
        } else {
            self.size_lo as u64
        }
    }

    /// The 15 classical block-pointer slots, valid only when `EXTENTS_FL`
    /// is clear.
    pub fn block_pointers(&self) -> [u32; 15] {
        let mut out = [0u32; 15];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = LE::read_u32(&self.i_block[i * 4..i * 4 + 4]);
        }
        out
    }

    pub fn uses_extents(&self) -> bool {
        self.flags.contains(InodeFlags::EXTENTS_FL)
    }

    pub fn has_inline_data(&self) -> bool {
        self.flags.contains(InodeFlags::INLINE_DATA_FL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf_with_mode(mode: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 128];
        LE::write_u16(&mut buf[0..2], mode);
        buf
    }

    #[test]
    fn classifies_entry_kind() {
        let inode = Inode::decode(&buf_with_mode(S_IFDIR | 0o755), RoCompatFeatures::empty()).unwrap();
        assert_eq!(inode.kind(), EntryKind::Directory);
    }

    #[test]
    fn deleted_requires_both_zero_links_and_dtime() {
        let mut buf = buf_with_mode(S_IFREG | 0o644);
        LE::write_u16(&mut buf[0x1A..0x1C], 0);
        LE::write_u32(&mut buf[0x14..0x18], 12345);
        let inode = Inode::decode(&buf, RoCompatFeatures::empty()).unwrap();
        assert!(inode.is_deleted());
    }

    #[test]
    fn size_combines_hi_half_only_for_large_regular_files() {
        let mut buf = buf_with_mode(S_IFREG);
        LE::write_u32(&mut buf[0x04..0x08], 1);
        LE::write_u32(&mut buf[0x6C..0x70], 1);
        let inode = Inode::decode(&buf, RoCompatFeatures::LARGE_FILE).unwrap();
        assert_eq!(inode.size(RoCompatFeatures::LARGE_FILE), (1u64 << 32) | 1);
        assert_eq!(inode.size(RoCompatFeatures::empty()), 1);
    }

    #[test]
    fn decodes_nanosecond_timestamp_extension() {
        let mut buf = vec![0u8; 160];
        LE::write_u16(&mut buf[0x80..0x82], 32); // extra_isize
        LE::write_u32(&mut buf[0x0C..0x10], 1_000);
        LE::write_u32(&mut buf[0x84..0x88], 500_000_000 << 2 | 0b01);
        let inode = Inode::decode(&buf, RoCompatFeatures::empty()).unwrap();
        assert_eq!(inode.ctime.seconds, 1_000 + (1i64 << 32));
        assert_eq!(inode.ctime.nanoseconds, 500_000_000);
    }
}
