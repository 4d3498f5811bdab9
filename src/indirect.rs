//! Classical (ext2/ext3) indirect block-pointer resolution.
//!
//! Generalizes the teacher's `drivers/fs/ext2/block_iterator.rs`, which
//! already walks the 12 direct + single/double/triple indirect pointer
//! scheme, into a standalone logical-block resolver that loads indirect
//! blocks through the shared block cache instead of re-reading the device.

use byteorder::{ByteOrder, LittleEndian as LE};

use crate::error::{Error, Result};

const DIRECT_COUNT: u32 = 12;

/// Resolve `logical_block` through the classical 12-direct + 3-level
/// indirect pointer scheme. `pointers` is the inode's 15-slot block-pointer
/// array (direct 0..12, single/double/triple indirect at 12/13/14).
/// `load_block` fetches a physical block's raw pointer contents (through the
/// volume's block cache).
pub fn resolve(
    pointers: &[u32; 15],
    pointers_per_block: u32,
    logical_block: u32,
    load_block: impl Fn(u64) -> Result<std::sync::Arc<[u8]>>,
) -> Result<Option<u64>> {
    if logical_block < DIRECT_COUNT {
        return Ok(non_zero(pointers[logical_block as usize]));
    }
    let mut remaining = logical_block - DIRECT_COUNT;

    let single_span = pointers_per_block;
    if remaining < single_span {
        return resolve_level(pointers[12], &[remaining], pointers_per_block, &load_block);
    }
    remaining -= single_span;

    let double_span = pointers_per_block.saturating_mul(pointers_per_block);
    if remaining < double_span {
        let outer = remaining / pointers_per_block;
        let inner = remaining % pointers_per_block;
        return resolve_level(pointers[13], &[outer, inner], pointers_per_block, &load_block);
    }
    remaining -= double_span;

    let triple_span = double_span.saturating_mul(pointers_per_block);
    if remaining < triple_span {
        let outer = remaining / double_span;
        let mid_rem = remaining % double_span;
        let mid = mid_rem / pointers_per_block;
        let inner = mid_rem % pointers_per_block;
        return resolve_level(
            pointers[14],
            &[outer, mid, inner],
            pointers_per_block,
            &load_block,
        );
    }

    Err(Error::Corrupt("logical block exceeds indirect addressing range"))
}

/// Descend `levels.len()` indirect blocks starting from `root`, selecting
/// `levels[i]` at depth `i`, and return the final leaf pointer (or `None`
/// for a hole: a zero pointer anywhere along the path).
fn resolve_level(
    root: u32,
    levels: &[u32],
    pointers_per_block: u32,
    load_block: &impl Fn(u64) -> Result<std::sync::Arc<[u8]>>,
) -> Result<Option<u64>> {
    let mut block = match non_zero(root) {
        Some(b) => b,
        None => return Ok(None),
    };

    for (depth, &index) in levels.iter().enumerate() {
        if index >= pointers_per_block {
            return Err(Error::Corrupt("indirect block index out of range"));
        }
        let data = load_block(block)?;
        let offset = index as usize * 4;
        if offset + 4 > data.len() {
            return Err(Error::Corrupt("indirect block shorter than pointer table"));
        }
        let pointer = LE::read_u32(&data[offset..offset + 4]);
        match non_zero(pointer) {
            Some(next) => block = next,
            None => return Ok(None),
        }
        let _ = depth;
    }
    Ok(Some(block))
}

fn non_zero(pointer: u32) -> Option<u64> {
    if pointer == 0 {
        None
    } else {
        Some(pointer as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_direct_block() {
        let mut pointers = [0u32; 15];
        pointers[3] = 500;
        let result = resolve(&pointers, 256, 3, |_| unreachable!()).unwrap();
        assert_eq!(result, Some(500));
    }

    #[test]
    fn direct_hole_is_none() {
        let pointers = [0u32; 15];
        let result = resolve(&pointers, 256, 0, |_| unreachable!()).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn resolves_single_indirect_block() {
        let mut pointers = [0u32; 15];
        pointers[12] = 900;
        let mut block = vec![0u8; 256 * 4];
        LE::write_u32(&mut block[5 * 4..5 * 4 + 4], 12345);
        let result = resolve(&pointers, 256, 12 + 5, |b| {
            assert_eq!(b, 900);
            Ok(std::sync::Arc::from(block.clone().into_boxed_slice()))
        })
        .unwrap();
        assert_eq!(result, Some(12345));
    }

    #[test]
    fn resolves_double_indirect_block() {
        let mut pointers = [0u32; 15];
        pointers[13] = 42;
        let pointers_per_block = 4u32;
        let logical = DIRECT_COUNT + pointers_per_block + (1 * pointers_per_block + 2);

        let result = resolve(&pointers, pointers_per_block, logical, |b| {
            if b == 42 {
                let mut block = vec![0u8; 16];
                LE::write_u32(&mut block[1 * 4..1 * 4 + 4], 77);
                Ok(std::sync::Arc::from(block.into_boxed_slice()))
            } else if b == 77 {
                let mut block = vec![0u8; 16];
                LE::write_u32(&mut block[2 * 4..2 * 4 + 4], 999);
                Ok(std::sync::Arc::from(block.into_boxed_slice()))
            } else {
                panic!("unexpected block {b}")
            }
        })
        .unwrap();
        assert_eq!(result, Some(999));
    }
}
