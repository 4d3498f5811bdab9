//! Symbolic link target resolution: fast symlinks stored directly in
//! `i_block`, versus longer targets read through the file data stream.

use crate::error::Result;
use crate::filedata::FileDataStream;
use crate::inode::Inode;

/// A fast symlink's target lives entirely in the inode's `i_block` area:
/// no block I/O is needed, and `i_blocks == 0` confirms no data block was
/// ever allocated for it.
pub fn is_fast_symlink(inode: &Inode, size: u64) -> bool {
    size <= 60 && inode.blocks_count == 0
}

pub fn read_fast_target(inode: &Inode, size: u64) -> Vec<u8> {
    inode.i_block[..size as usize].to_vec()
}

/// Read a symlink's target, either directly from `i_block` (fast symlink)
/// or through its file data stream.
pub fn read_target(
    inode: &Inode,
    size: u64,
    mut stream: FileDataStream<'_>,
) -> Result<Vec<u8>> {
    if is_fast_symlink(inode, size) {
        return Ok(read_fast_target(inode, size));
    }
    let mut buf = vec![0u8; size as usize];
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::RoCompatFeatures;
    use byteorder::{ByteOrder, LittleEndian as LE};

    fn symlink_inode(target: &[u8], blocks_count: u32) -> Inode {
        let mut buf = vec![0u8; 128];
        LE::write_u16(&mut buf[0..2], 0xA000); // S_IFLNK
        LE::write_u32(&mut buf[0x04..0x08], target.len() as u32);
        LE::write_u32(&mut buf[0x1C..0x20], blocks_count);
        buf[0x28..0x28 + target.len()].copy_from_slice(target);
        Inode::decode(&buf, RoCompatFeatures::empty()).unwrap()
    }

    #[test]
    fn fast_symlink_reads_from_i_block() {
        let inode = symlink_inode(b"foo/bar", 0);
        assert!(is_fast_symlink(&inode, 7));
        assert_eq!(read_fast_target(&inode, 7), b"foo/bar");
    }

    #[test]
    fn non_fast_symlink_when_blocks_allocated() {
        let inode = symlink_inode(b"x", 8);
        assert!(!is_fast_symlink(&inode, 1));
    }
}
