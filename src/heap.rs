use std::{cell::RefCell, ptr::NonNull};

use log::{debug, trace};

use crate::{
    block::{Block, HEADER_SIZE},
    error::{Corruption, HeapError},
    freelist::FreeList,
    region::Region,
    utils::{WORD_SIZE, aligned_size},
};

/// A heap carved out of one caller supplied buffer.
///
/// The heap borrows the buffer for as long as it lives and never asks the
/// operating system for memory. Every block, free or allocated, starts with a
/// header recording its payload size; free blocks are additionally chained
/// in a list sorted by address so that neighbours can be merged back
/// together when they are released.
///
/// All operations take `&self` so any number of [`crate::HeapAlloc`] handles
/// can share one heap. The heap is not `Sync`: callers that need to share it
/// between threads have to put it behind a lock of their own.
pub struct Heap<'a> {
    region: Region<'a>,
    free_list: RefCell<FreeList>,
}

/// A free block as seen from outside the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    /// Offset of the block header from the start of the region.
    pub offset: usize,
    /// Payload bytes, excluding the header.
    pub size: usize,
}

/// Snapshot of the free space of a heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Usable length of the region.
    pub region_len: usize,
    /// Payload bytes available over all free blocks.
    pub free_bytes: usize,
    pub free_blocks: usize,
    /// Payload size of the largest free block, the biggest request that can
    /// currently succeed.
    pub largest_free: usize,
}

impl<'a> Heap<'a> {
    /// Turns `buffer` into a heap made of a single free block.
    ///
    /// The buffer has to start on an 8 byte boundary and be at least
    /// [`crate::MIN_REGION_SIZE`] bytes long. Trailing bytes past the last
    /// multiple of 8 are never used.
    pub fn new(buffer: &'a mut [u8]) -> Result<Self, HeapError> {
        let region = Region::new(buffer)?;
        let mut free_list = FreeList::new();
        free_list.reset(&region);

        debug!("heap initialized: {} bytes at {:p}", region.len(), region.base());

        Ok(Self {
            region,
            free_list: RefCell::new(free_list),
        })
    }

    /// Starts over with a single free block spanning the region.
    ///
    /// Every outstanding allocation is forgotten, which is why this needs
    /// exclusive access to the heap.
    pub fn reset(&mut self) {
        self.free_list.get_mut().reset(&self.region);
        debug!("heap reset: {} bytes at {:p}", self.region.len(), self.region.base());
    }

    /// Usable length of the region in bytes.
    pub fn region_len(&self) -> usize {
        self.region.len()
    }

    /// Allocates room for `bytes` bytes and returns a pointer to it.
    ///
    /// The pointer is aligned to 8 bytes and valid for at least
    /// [`crate::aligned_size`]`(bytes)` bytes. On failure nothing changes.
    pub fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, HeapError> {
        self.allocate_block(bytes).map(|(ptr, _)| ptr)
    }

    /// Like [`Heap::allocate`], also returning how many bytes the block
    /// really has, which can be more than what was asked for.
    pub(crate) fn allocate_block(&self, bytes: usize) -> Result<(NonNull<u8>, usize), HeapError> {
        let needed = aligned_size(bytes).ok_or(HeapError::OutOfMemory { requested: bytes })?;

        let mut free_list = self.free_list.borrow_mut();
        let Some(block) = free_list.find_best_fit(&self.region, needed) else {
            debug!("out of memory: {bytes} bytes requested, {} free blocks", free_list.len());
            return Err(HeapError::OutOfMemory { requested: bytes });
        };

        let granted = unsafe { free_list.remove_and_split(&self.region, block, needed) };
        let ptr = self.region.payload_ptr(block);
        trace!("allocate({bytes}) -> block {} ({granted} bytes) at {ptr:p}", block.offset());

        Ok((ptr, granted))
    }

    /// Gives the block behind `ptr` back to the heap and merges it with its
    /// free neighbours.
    ///
    /// Pointers that cannot have come from this heap are rejected with
    /// [`HeapError::ForeignPointer`].
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by an allocation on this heap that has
    /// not been deallocated yet. Freeing a block twice is not detected.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>) -> Result<(), HeapError> {
        let block = self.block_of(ptr)?;

        let mut free_list = self.free_list.borrow_mut();
        let merged = unsafe {
            free_list.insert(&self.region, block);
            free_list.merge(&self.region, block)
        };
        trace!("deallocate({ptr:p}) -> free block {}", merged.offset());

        Ok(())
    }

    /// Number of payload bytes the block behind `ptr` holds.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live allocation of this heap.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> Result<usize, HeapError> {
        let block = self.block_of(ptr)?;
        Ok(unsafe { self.region.size(block) })
    }

    /// Finds the block behind a payload pointer, checking that it sits inside
    /// the region and that its recorded size does too.
    fn block_of(&self, ptr: NonNull<u8>) -> Result<Block, HeapError> {
        let block = self.region.block_of(ptr)?;
        let size = unsafe { self.region.size(block) };

        match block.payload().checked_add(size) {
            Some(end) if end <= self.region.len() => Ok(block),
            _ => Err(HeapError::ForeignPointer {
                addr: ptr.as_ptr() as usize,
            }),
        }
    }

    /// The free blocks in list order, which is also address order.
    pub fn free_blocks(&self) -> Vec<FreeBlock> {
        let free_list = self.free_list.borrow();
        free_list
            .iter(&self.region)
            .map(|block| FreeBlock {
                offset: block.offset(),
                size: unsafe { self.region.size(block) },
            })
            .collect()
    }

    pub fn stats(&self) -> HeapStats {
        self.free_blocks().into_iter().fold(
            HeapStats {
                region_len: self.region.len(),
                ..HeapStats::default()
            },
            |mut stats, block| {
                stats.free_bytes += block.size;
                stats.free_blocks += 1;
                stats.largest_free = stats.largest_free.max(block.size);
                stats
            },
        )
    }

    /// Walks every block in the region and checks the free list against it.
    ///
    /// Blocks must tile the region exactly, the free list must be sorted by
    /// address and only name real blocks, and no two free blocks may touch.
    /// The walk reads the size word of allocated blocks, so it is only
    /// meaningful if callers have not written outside their allocations.
    pub fn check(&self) -> Result<(), Corruption> {
        let free_list = self.free_list.borrow();
        let free: Vec<Block> = free_list.iter(&self.region).collect();

        if let Some(pair) = free.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(Corruption::Unordered {
                offset: pair[1].offset(),
            });
        }

        let len = self.region.len();
        let mut pending = free.iter().copied().peekable();
        let mut previous_free: Option<Block> = None;
        let mut offset = 0;

        while offset < len {
            let block = Block::at(offset);
            if len - offset < HEADER_SIZE {
                return Err(Corruption::Overrun { offset });
            }

            let size = unsafe { self.region.size(block) };
            if size % WORD_SIZE != 0 {
                return Err(Corruption::BadSize { offset, size });
            }
            let end = match block.payload().checked_add(size) {
                Some(end) if end <= len => end,
                _ => return Err(Corruption::Overrun { offset }),
            };

            let is_free = pending.next_if_eq(&block).is_some();
            if let (true, Some(left)) = (is_free, previous_free) {
                return Err(Corruption::Adjacent {
                    left: left.offset(),
                    right: offset,
                });
            }

            previous_free = is_free.then_some(block);
            offset = end;
        }

        match pending.next() {
            Some(stray) => Err(Corruption::StrayFreeBlock {
                offset: stray.offset(),
            }),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn region(&self) -> &Region<'a> {
        &self.region
    }
}
