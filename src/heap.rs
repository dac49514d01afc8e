//! Kernel heap — fixed byte pool, first-fit
//!
//! Task stacks and queue storage come out of one statically sized pool so
//! creation fails with `AllocationFailed` instead of growing unbounded.
//! Allocated blocks are kept sorted by offset; freeing merges implicitly
//! because gaps are recomputed from neighbours on every allocation.

use heapless::Vec;

use crate::config::{HEAP_BYTES, MAX_HEAP_BLOCKS};
use crate::error::Error;

/// Allocated byte range inside the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub const EMPTY: Region = Region { offset: 0, len: 0 };

    fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Byte pool
pub struct Heap {
    bytes: [u8; HEAP_BYTES],
    blocks: Vec<Region, MAX_HEAP_BLOCKS>,
}

impl Heap {
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; HEAP_BYTES],
            blocks: Vec::new(),
        }
    }

    /// Allocate `len` bytes, first fit
    ///
    /// Zero-length requests succeed without consuming a block.
    pub fn alloc(&mut self, len: usize) -> Result<Region, Error> {
        if len == 0 {
            return Ok(Region::EMPTY);
        }
        let mut cursor = 0;
        let mut at = self.blocks.len();
        for (i, block) in self.blocks.iter().enumerate() {
            if block.offset - cursor >= len {
                at = i;
                break;
            }
            cursor = block.end();
        }
        if at == self.blocks.len() && HEAP_BYTES - cursor < len {
            return Err(Error::AllocationFailed);
        }
        let region = Region { offset: cursor, len };
        self.blocks
            .insert(at, region)
            .map_err(|_| Error::AllocationFailed)?;
        self.bytes[region.offset..region.end()].fill(0);
        Ok(region)
    }

    /// Return a region to the pool
    pub fn free(&mut self, region: Region) {
        if region.len == 0 {
            return;
        }
        if let Some(i) = self.blocks.iter().position(|b| *b == region) {
            self.blocks.remove(i);
        }
    }

    pub fn slice(&self, region: Region) -> &[u8] {
        &self.bytes[region.offset..region.end()]
    }

    pub fn slice_mut(&mut self, region: Region) -> &mut [u8] {
        &mut self.bytes[region.offset..region.end()]
    }

    /// Bytes currently allocated
    pub fn used(&self) -> usize {
        self.blocks.iter().map(|b| b.len).sum()
    }

    /// Bytes not allocated (possibly fragmented)
    pub fn free_bytes(&self) -> usize {
        HEAP_BYTES - self.used()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
