//! Superblock decoding.
//!
//! Field offsets follow the on-disk ext2 superblock layout (cross-checked
//! against `original_source/libfsext/fsext_volume_header.h`); the struct
//! itself mirrors the teacher's field-commented style
//! (`drivers/fs/ext2/mod.rs::SuperBlock`) but is decoded with explicit
//! little-endian reads instead of the teacher's private `dvida_serialize`
//! derive, since that crate isn't something a standalone package can depend
//! on — `byteorder` fills the same role here, as it does in the closest
//! real-world analog in the pack (`other_examples/manifests/FauxFaux-ext4-rs`).

use byteorder::{ByteOrder, LittleEndian as LE};
use uuid::Uuid;

use crate::error::{Error, FeatureSet, Result};
use crate::features::{
    CompatFeatures, IncompatFeatures, RoCompatFeatures, ALWAYS_UNSUPPORTED_INCOMPAT,
    ALWAYS_UNSUPPORTED_RO_COMPAT, KNOWN_INCOMPAT,
};

/// Absolute byte offset of the superblock, regardless of block size.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// Size of the region this decoder reads and validates.
pub const SUPERBLOCK_SIZE: usize = 1024;

pub const EXT2_MAGIC: u16 = 0x53EF;
/// Root directory inode number, always 2.
pub const ROOT_INODE: u32 = 2;

#[derive(Debug, Clone)]
pub struct Superblock {
    pub inode_count: u32,
    pub block_count: u64,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub first_ino: u32,
    pub inode_size: u16,
    pub rev_level: u32,
    pub last_mount_time: u32,
    pub last_written_time: u32,
    pub creator_os: u32,
    pub state: u16,

    pub compat_features: CompatFeatures,
    pub incompat_features: IncompatFeatures,
    pub ro_compat_features: RoCompatFeatures,

    pub uuid_bytes: [u8; 16],
    pub volume_name: [u8; 16],
    pub last_mounted: [u8; 64],

    pub hash_seed: [u32; 4],
    pub def_hash_version: u8,
    /// Group descriptor size: 64 when the 64BIT incompat feature is set.
    pub descriptor_size: u16,
}

impl Superblock {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(Error::Corrupt("superblock buffer too short"));
        }

        let magic = LE::read_u16(&buf[0x38..0x3A]);
        if magic != EXT2_MAGIC {
            log::warn!("superblock magic {magic:#06x} != {EXT2_MAGIC:#06x}");
            return Err(Error::InvalidSignature);
        }

        let log_block_size = LE::read_u32(&buf[0x18..0x1C]);
        if log_block_size > 16 {
            return Err(Error::Corrupt("log_block_size out of range"));
        }

        let rev_level = LE::read_u32(&buf[0x4C..0x50]);
        if rev_level > 1 {
            return Err(Error::Corrupt("unrecognized superblock revision level"));
        }

        let (first_ino, inode_size, feature_compat, feature_incompat, feature_ro_compat) =
            if rev_level == 0 {
                (11, 128u16, 0u32, 0u32, 0u32)
            } else {
                (
                    LE::read_u32(&buf[0x54..0x58]),
                    LE::read_u16(&buf[0x58..0x5A]),
                    LE::read_u32(&buf[0x5C..0x60]),
                    LE::read_u32(&buf[0x60..0x64]),
                    LE::read_u32(&buf[0x64..0x68]),
                )
            };

        if inode_size < 128 || !inode_size.is_power_of_two() {
            return Err(Error::Corrupt("invalid inode_size"));
        }

        let incompat_features = IncompatFeatures::from_bits_truncate(feature_incompat);
        let unrecognized = feature_incompat & !KNOWN_INCOMPAT.bits();
        if unrecognized != 0 {
            log::warn!("unrecognized incompat feature bits {unrecognized:#x}");
            return Err(Error::UnsupportedFeature {
                set: FeatureSet::Incompat,
                bit: unrecognized,
            });
        }
        let always_bad = incompat_features & ALWAYS_UNSUPPORTED_INCOMPAT;
        if !always_bad.is_empty() {
            log::warn!("rejected incompat feature bits {:#x}", always_bad.bits());
            return Err(Error::UnsupportedFeature {
                set: FeatureSet::Incompat,
                bit: always_bad.bits(),
            });
        }

        let ro_compat_features = RoCompatFeatures::from_bits_truncate(feature_ro_compat);
        let always_bad_ro = ro_compat_features & ALWAYS_UNSUPPORTED_RO_COMPAT;
        if !always_bad_ro.is_empty() {
            log::warn!("rejected ro_compat feature bits {:#x}", always_bad_ro.bits());
            return Err(Error::UnsupportedFeature {
                set: FeatureSet::RoCompat,
                bit: always_bad_ro.bits(),
            });
        }

        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&buf[0x68..0x78]);
        let mut volume_name = [0u8; 16];
        volume_name.copy_from_slice(&buf[0x78..0x88]);
        let mut last_mounted = [0u8; 64];
        last_mounted.copy_from_slice(&buf[0x88..0xC8]);

        let blocks_count_lo = LE::read_u32(&buf[0x04..0x08]);
        let blocks_per_group = LE::read_u32(&buf[0x20..0x24]);
        let inodes_per_group = LE::read_u32(&buf[0x28..0x2C]);
        if blocks_per_group == 0 || inodes_per_group == 0 {
            return Err(Error::Corrupt("zero blocks_per_group/inodes_per_group"));
        }

        let has_64bit = incompat_features.contains(IncompatFeatures::BIT64);
        let blocks_count_hi = if has_64bit && buf.len() >= 0x158 {
            LE::read_u32(&buf[0x154..0x158])
        } else {
            0
        };
        let block_count = (blocks_count_lo as u64) | ((blocks_count_hi as u64) << 32);

        let hash_seed = if buf.len() >= 0xFC {
            [
                LE::read_u32(&buf[0xEC..0xF0]),
                LE::read_u32(&buf[0xF0..0xF4]),
                LE::read_u32(&buf[0xF4..0xF8]),
                LE::read_u32(&buf[0xF8..0xFC]),
            ]
        } else {
            [0; 4]
        };
        let def_hash_version = if buf.len() > 0xFC { buf[0xFC] } else { 0 };
        let descriptor_size = if has_64bit && buf.len() >= 0x100 {
            let size = LE::read_u16(&buf[0xFE..0x100]);
            if size == 0 { 32 } else { size }
        } else {
            32
        };

        let inode_count = LE::read_u32(&buf[0x00..0x04]);
        let block_size = 1024u32 << log_block_size;
        log::debug!(
            "decoded superblock: block_size={block_size} inode_count={inode_count} inode_size={inode_size} rev_level={rev_level}"
        );

        Ok(Superblock {
            inode_count,
            block_count,
            blocks_per_group,
            inodes_per_group,
            first_data_block: LE::read_u32(&buf[0x14..0x18]),
            log_block_size,
            first_ino,
            inode_size,
            rev_level,
            last_mount_time: LE::read_u32(&buf[0x2C..0x30]),
            last_written_time: LE::read_u32(&buf[0x30..0x34]),
            creator_os: LE::read_u32(&buf[0x48..0x4C]),
            state: LE::read_u16(&buf[0x3A..0x3C]),
            compat_features: CompatFeatures::from_bits_truncate(feature_compat),
            incompat_features,
            ro_compat_features,
            uuid_bytes,
            volume_name,
            last_mounted,
            hash_seed,
            def_hash_version,
            descriptor_size,
        })
    }

    pub fn block_size(&self) -> u32 {
        1024u32 << self.log_block_size
    }

    pub fn group_count(&self) -> u32 {
        self.block_count
            .div_ceil(self.blocks_per_group as u64)
            .try_into()
            .unwrap_or(u32::MAX)
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::from_bytes(self.uuid_bytes)
    }

    /// Trim the trailing NUL padding from a fixed-size on-disk string field.
    fn trimmed(bytes: &[u8]) -> String {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    pub fn label(&self) -> String {
        Self::trimmed(&self.volume_name)
    }

    pub fn last_mount_path(&self) -> String {
        Self::trimmed(&self.last_mounted)
    }
}
