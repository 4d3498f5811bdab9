//! Feature-flag bit assignments for the three ext2/3/4 feature words.
//!
//! Constant values and grouping mirror the teacher's flat `const`-table
//! style (`examples/michaelmelanson-panda-os/.../vfs/ext2/structs.rs`),
//! upgraded to `bitflags` (the idiom `ext4-view-rs` and `ext4-rs` use for
//! these same bitsets, per `examples/other_examples/manifests`) instead of
//! bare `u32` constants so unsupported-bit detection reads as set algebra.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompatFeatures: u32 {
        const DIR_PREALLOC  = 0x0001;
        const IMAGIC_INODES = 0x0002;
        const HAS_JOURNAL   = 0x0004;
        const EXT_ATTR      = 0x0008;
        const RESIZE_INO    = 0x0010;
        const DIR_INDEX     = 0x0020;
        const SPARSE_SUPER2 = 0x0200;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IncompatFeatures: u32 {
        const COMPRESSION  = 0x0001;
        const FILETYPE     = 0x0002;
        const RECOVER      = 0x0004;
        const JOURNAL_DEV  = 0x0008;
        const META_BG      = 0x0010;
        const EXTENTS      = 0x0040;
        const BIT64        = 0x0080;
        const MMP          = 0x0100;
        const FLEX_BG      = 0x0200;
        const EA_INODE     = 0x0400;
        const DIRDATA      = 0x1000;
        const CSUM_SEED    = 0x2000;
        const LARGEDIR     = 0x4000;
        const INLINE_DATA  = 0x8000;
        const ENCRYPT      = 0x10000;
        const CASEFOLD     = 0x20000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RoCompatFeatures: u32 {
        const SPARSE_SUPER  = 0x0001;
        const LARGE_FILE    = 0x0002;
        const BTREE_DIR     = 0x0004;
        const HUGE_FILE     = 0x0008;
        const GDT_CSUM      = 0x0010;
        const DIR_NLINK     = 0x0020;
        const EXTRA_ISIZE   = 0x0040;
        const QUOTA         = 0x0100;
        const BIGALLOC      = 0x0200;
        const METADATA_CSUM = 0x0400;
        const PROJECT       = 0x2000;
        const VERITY        = 0x8000;
        const READONLY      = 0x1000;
    }
}

/// Incompat bits this crate is able to interpret at all. A bit set outside
/// this mask means the on-disk layout contains structures we don't know how
/// to decode (e.g. compression streams, meta block groups).
pub const KNOWN_INCOMPAT: IncompatFeatures = IncompatFeatures::from_bits_truncate(
    IncompatFeatures::COMPRESSION.bits()
        | IncompatFeatures::FILETYPE.bits()
        | IncompatFeatures::RECOVER.bits()
        | IncompatFeatures::JOURNAL_DEV.bits()
        | IncompatFeatures::META_BG.bits()
        | IncompatFeatures::EXTENTS.bits()
        | IncompatFeatures::BIT64.bits()
        | IncompatFeatures::MMP.bits()
        | IncompatFeatures::FLEX_BG.bits()
        | IncompatFeatures::EA_INODE.bits()
        | IncompatFeatures::DIRDATA.bits()
        | IncompatFeatures::CSUM_SEED.bits()
        | IncompatFeatures::LARGEDIR.bits()
        | IncompatFeatures::INLINE_DATA.bits()
        | IncompatFeatures::ENCRYPT.bits()
        | IncompatFeatures::CASEFOLD.bits(),
);

/// Incompat bits that are individually rejected even though they're
/// recognized: we don't decompress, don't follow external journal devices
/// (the volume isn't even a filesystem in that case), and don't carry inline
/// directory-entry checksums (DIRDATA).
pub const ALWAYS_UNSUPPORTED_INCOMPAT: IncompatFeatures = IncompatFeatures::from_bits_truncate(
    IncompatFeatures::COMPRESSION.bits()
        | IncompatFeatures::JOURNAL_DEV.bits()
        | IncompatFeatures::DIRDATA.bits(),
);

/// Ro-compat bits rejected outright: BIGALLOC changes the meaning of every
/// block pointer (cluster, not block, addressing) which this decoder does
/// not implement.
pub const ALWAYS_UNSUPPORTED_RO_COMPAT: RoCompatFeatures =
    RoCompatFeatures::from_bits_truncate(RoCompatFeatures::BIGALLOC.bits());
