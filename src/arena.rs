//! Bump allocator backing filtered copies and migrated events.
//!
//! The arena hands out aligned byte regions from a list of owned blocks and never
//! frees an individual region. Everything is released together when the arena is
//! dropped, which matches the write-once/read-many lifetime of parsed log data.
//!
//! Allocations are addressed through [`ArenaSlice`] handles instead of pointers, so
//! an event can refer to arena memory without borrowing the arena mutably.
//!
//! ```rust
//! use drivelog::Arena;
//!
//! let mut arena = Arena::new();
//! let slice = arena.alloc_copy(b"message bytes", 8);
//! assert_eq!(arena.get(slice), b"message bytes");
//! ```

use tracing::trace;

/// Default size of the first block.
pub const DEFAULT_INITIAL_BLOCK_SIZE: usize = 1024 * 1024;

/// Factor applied to the growth target after every new block.
pub const GROWTH_FACTOR: usize = 2;

/// Handle to a region allocated from an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaSlice {
    block: usize,
    offset: usize,
    len: usize,
}

impl ArenaSlice {
    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump allocator over growable blocks.
#[derive(Debug)]
pub struct Arena {
    blocks: Vec<Box<[u8]>>,
    /// Bytes already handed out from the last block
    cursor: usize,
    next_block_size: usize,
    allocated: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    /// Create an arena whose first block is [`DEFAULT_INITIAL_BLOCK_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_initial_size(DEFAULT_INITIAL_BLOCK_SIZE)
    }

    /// Create an arena with a custom first block size.
    ///
    /// No memory is reserved until the first allocation.
    pub fn with_initial_size(initial: usize) -> Self {
        Self { blocks: Vec::new(), cursor: 0, next_block_size: initial.max(1), allocated: 0 }
    }

    /// Allocate `size` zeroed bytes whose address is a multiple of `alignment`.
    ///
    /// Never fails recoverably: if the system cannot provide a block the process
    /// aborts, the same as any other Rust allocation.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two.
    pub fn allocate(&mut self, size: usize, alignment: usize) -> ArenaSlice {
        assert!(alignment.is_power_of_two(), "arena alignment must be a power of two");

        if let Some(offset) = self.fit_in_current(size, alignment) {
            return self.commit(offset, size);
        }

        // Worst-case padding so the aligned region always fits in the new block
        let needed = size + alignment - 1;
        let block_size = self.next_block_size.max(needed);
        trace!(block_size, blocks = self.blocks.len() + 1, "Arena growing");
        self.blocks.push(vec![0u8; block_size].into_boxed_slice());
        self.cursor = 0;
        self.next_block_size = self.next_block_size.saturating_mul(GROWTH_FACTOR);

        let offset = self
            .fit_in_current(size, alignment)
            .unwrap_or_else(|| unreachable!("fresh arena block sized for the request"));
        self.commit(offset, size)
    }

    /// Allocate and copy `bytes` into the arena.
    pub fn alloc_copy(&mut self, bytes: &[u8], alignment: usize) -> ArenaSlice {
        let slice = self.allocate(bytes.len(), alignment);
        self.get_mut(slice).copy_from_slice(bytes);
        slice
    }

    /// Borrow an allocated region.
    pub fn get(&self, slice: ArenaSlice) -> &[u8] {
        &self.blocks[slice.block][slice.offset..slice.offset + slice.len]
    }

    /// Borrow a region, or `None` if the handle does not belong to this arena.
    pub fn try_get(&self, slice: ArenaSlice) -> Option<&[u8]> {
        let end = slice.offset.checked_add(slice.len)?;
        self.blocks.get(slice.block)?.get(slice.offset..end)
    }

    /// Mutably borrow an allocated region.
    pub fn get_mut(&mut self, slice: ArenaSlice) -> &mut [u8] {
        &mut self.blocks[slice.block][slice.offset..slice.offset + slice.len]
    }

    /// Number of blocks owned by the arena.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total bytes handed out, excluding alignment padding.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Total capacity of all owned blocks.
    pub fn capacity(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    /// Aligned offset in the current block if `size` bytes fit.
    fn fit_in_current(&self, size: usize, alignment: usize) -> Option<usize> {
        let block = self.blocks.last()?;
        let addr = block.as_ptr() as usize + self.cursor;
        let padding = addr.next_multiple_of(alignment) - addr;
        let offset = self.cursor.checked_add(padding)?;
        let end = offset.checked_add(size)?;
        (end <= block.len()).then_some(offset)
    }

    fn commit(&mut self, offset: usize, size: usize) -> ArenaSlice {
        self.cursor = offset + size;
        self.allocated += size;
        ArenaSlice { block: self.blocks.len() - 1, offset, len: size }
    }
}
