use log::trace;

use crate::{
    block::{Block, HEADER_SIZE, Header, MIN_PAYLOAD},
    list::{Iter, List},
    region::Region,
};

/// Linked list to keep track of free [`Block`]s, sorted by address.
///
/// The list stores nothing of its own: each free block keeps its links in the
/// payload it is not using, and the list only knows where the chain starts.
///
/// ```text
///                              Free List
///
///           +--------------------------------------------+
///           |                                            |
/// +---------|---------------------------------------------|-----------+
/// | +-------|-+    +-------+    +-------+    +-------+    +-|-------+  |
/// | |  Free   | -> | Block | -> | Block | -> | Block | -> |  Free   |  |
/// | +---------+    +-------+    +-------+    +-------+    +---------+  |
/// +--------------------------------------------------------------------+
/// ```
///
/// Keeping the list in address order is what makes coalescing cheap: the
/// physical neighbours of a block, if free, are exactly its list neighbours.
pub(crate) struct FreeList {
    items: List,
}

impl FreeList {
    /// Creates a new empty list.
    pub const fn new() -> Self {
        Self { items: List::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter<'r, 'a>(&'r self, region: &'r Region<'a>) -> Iter<'r, 'a> {
        self.items.iter(region)
    }

    /// Forgets every block and makes the whole region one free block.
    pub fn reset(&mut self, region: &Region<'_>) {
        let block = Block::at(0);
        let header = Header {
            size: region.len() - HEADER_SIZE,
            next: None,
            previous: None,
        };

        self.items.clear();
        unsafe {
            region.write_header(block, header);
            self.items.link(region, block, None, None);
        }
    }

    /// Returns the smallest free block that can hold `needed` payload bytes.
    ///
    /// Among blocks of the same size the first one, which is also the one
    /// with the lowest address, wins.
    pub fn find_best_fit(&self, region: &Region<'_>, needed: usize) -> Option<Block> {
        if self.is_empty() {
            return None;
        }

        let mut best: Option<(Block, usize)> = None;

        for block in self.items.iter(region) {
            let size = unsafe { region.size(block) };
            if size < needed {
                continue;
            }

            match best {
                Some((_, best_size)) if best_size <= size => {}
                _ => best = Some((block, size)),
            }

            if size == needed {
                // Nothing can fit better than an exact match.
                break;
            }
        }

        best.map(|(block, _)| block)
    }

    /// Takes `block` off the list so it can be handed out with room for
    /// `needed` bytes, and returns the payload size it ends up with.
    ///
    /// If what is left after `needed` can hold a block of its own, that
    /// remainder takes the place of `block` in the list. Otherwise the whole
    /// block is handed out and keeps its size.
    ///
    /// **SAFETY**: `block` must be on this list and hold at least `needed` bytes.
    pub unsafe fn remove_and_split(&mut self, region: &Region<'_>, block: Block, needed: usize) -> usize {
        unsafe {
            let size = region.size(block);
            debug_assert!(size >= needed);

            if size - needed < HEADER_SIZE + MIN_PAYLOAD {
                trace!("take whole block {} ({size} bytes)", block.offset());
                self.items.unlink(region, block);
                return size;
            }

            let remainder = block.split_at(needed);
            let remainder_size = size - needed - HEADER_SIZE;
            trace!(
                "split block {} into {needed} + {remainder_size} bytes at {}",
                block.offset(),
                remainder.offset()
            );

            region.set_size(remainder, remainder_size);
            self.items.replace(region, block, remainder);
            region.set_size(block, needed);

            needed
        }
    }

    /// Puts `block` back on the list, right before the first block with a
    /// higher address.
    ///
    /// **SAFETY**: `block` must be an allocated block of `region` whose size
    /// word is intact.
    pub unsafe fn insert(&mut self, region: &Region<'_>, block: Block) {
        let next = self.items.iter(region).find(|&entry| entry > block);
        let previous = match next {
            Some(next) => unsafe { region.previous(next) },
            None => self.items.last(),
        };
        trace!(
            "insert block {} after {:?}",
            block.offset(),
            previous.map(Block::offset)
        );

        unsafe { self.items.link(region, block, previous, next) };
    }

    /// Merges a freshly inserted `block` with its physical neighbours when
    /// they are free, and returns the block that now contains it.
    ///
    /// Since the list is coalesced after every insertion, one check per side
    /// is all it takes.
    ///
    /// **SAFETY**: `block` must be on this list.
    pub unsafe fn merge(&mut self, region: &Region<'_>, block: Block) -> Block {
        unsafe {
            if let Some(next) = region.next(block) {
                let size = region.size(block);
                if block.end(size) == next.offset() {
                    trace!("merge block {} into {}", next.offset(), block.offset());
                    let merged = size + HEADER_SIZE + region.size(next);
                    self.items.unlink(region, next);
                    region.set_size(block, merged);
                }
            }

            if let Some(previous) = region.previous(block) {
                let previous_size = region.size(previous);
                if previous.end(previous_size) == block.offset() {
                    trace!("merge block {} into {}", block.offset(), previous.offset());
                    let merged = previous_size + HEADER_SIZE + region.size(block);
                    self.items.unlink(region, block);
                    region.set_size(previous, merged);
                    return previous;
                }
            }

            block
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(8))]
    struct Arena([u8; 1024]);

    fn blocks(list: &FreeList, region: &Region<'_>) -> Vec<(usize, usize)> {
        list.iter(region)
            .map(|block| (block.offset(), unsafe { region.size(block) }))
            .collect()
    }

    /// Carves `sizes` out of a fresh region in order and returns the blocks.
    fn carve(list: &mut FreeList, region: &Region<'_>, sizes: &[usize]) -> Vec<Block> {
        list.reset(region);
        sizes
            .iter()
            .map(|&size| {
                let block = list.find_best_fit(region, size).unwrap();
                unsafe { list.remove_and_split(region, block, size) };
                block
            })
            .collect()
    }

    #[test]
    fn reset_spans_region() {
        let mut arena = Arena([0; 1024]);
        let region = Region::new(&mut arena.0).unwrap();
        let mut list = FreeList::new();
        list.reset(&region);

        assert_eq!(blocks(&list, &region), vec![(0, 1024 - HEADER_SIZE)]);
    }

    #[test]
    fn split_stamps_both_halves() {
        let mut arena = Arena([0; 1024]);
        let region = Region::new(&mut arena.0).unwrap();
        let mut list = FreeList::new();
        let carved = carve(&mut list, &region, &[64]);

        assert_eq!(carved, vec![Block::at(0)]);
        assert_eq!(unsafe { region.size(carved[0]) }, 64);
        assert_eq!(blocks(&list, &region), vec![(72, 1024 - 72 - HEADER_SIZE)]);
    }

    #[test]
    fn small_remainder_is_not_split() {
        let mut arena = Arena([0; 1024]);
        let region = Region::new(&mut arena.0).unwrap();
        let mut list = FreeList::new();
        list.reset(&region);

        // Leaves 16 bytes, not enough for a header plus links.
        let needed = 1024 - HEADER_SIZE - 16;
        let block = list.find_best_fit(&region, needed).unwrap();
        let granted = unsafe { list.remove_and_split(&region, block, needed) };

        assert_eq!(granted, 1024 - HEADER_SIZE);
        assert!(list.is_empty());
    }

    #[test]
    fn best_fit_prefers_smallest_then_lowest() {
        let mut arena = Arena([0; 1024]);
        let region = Region::new(&mut arena.0).unwrap();
        let mut list = FreeList::new();
        let carved = carve(&mut list, &region, &[64, 16, 32, 16, 32, 16]);

        unsafe {
            for &index in &[0, 2, 4] {
                list.insert(&region, carved[index]);
                list.merge(&region, carved[index]);
            }
        }

        // Free: 64 @0, 32 @96, 32 @152 and the tail.
        assert_eq!(list.find_best_fit(&region, 24), Some(carved[2]));
        assert_eq!(list.find_best_fit(&region, 40), Some(carved[0]));
        assert_eq!(list.find_best_fit(&region, 2048), None);
    }

    #[test]
    fn insert_keeps_address_order() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut arena = Arena([0; 1024]);
        let region = Region::new(&mut arena.0).unwrap();
        let mut list = FreeList::new();
        let carved = carve(&mut list, &region, &[16, 16, 16, 16, 16, 16]);
        // Use up the tail so only inserted blocks are on the list.
        let tail = list.find_best_fit(&region, 16).unwrap();
        unsafe { list.remove_and_split(&region, tail, region.size(tail)) };
        assert!(list.is_empty());

        unsafe {
            list.insert(&region, carved[3]);
            list.insert(&region, carved[1]);
            list.insert(&region, carved[5]);
        }

        let offsets: Vec<usize> = blocks(&list, &region).iter().map(|b| b.0).collect();
        assert_eq!(offsets, vec![24, 72, 120]);
    }

    #[test]
    fn merge_both_sides() {
        let mut arena = Arena([0; 1024]);
        let region = Region::new(&mut arena.0).unwrap();
        let mut list = FreeList::new();
        let carved = carve(&mut list, &region, &[16, 32, 48, 64]);

        unsafe {
            list.insert(&region, carved[0]);
            assert_eq!(list.merge(&region, carved[0]), carved[0]);
            list.insert(&region, carved[2]);
            assert_eq!(list.merge(&region, carved[2]), carved[2]);
            assert_eq!(list.len(), 3);

            list.insert(&region, carved[1]);
            assert_eq!(list.merge(&region, carved[1]), carved[0]);
        }

        assert_eq!(
            blocks(&list, &region),
            vec![
                (0, 16 + 32 + 48 + 2 * HEADER_SIZE),
                (carved[3].end(64), 1024 - carved[3].end(64) - HEADER_SIZE)
            ]
        );
    }
}
