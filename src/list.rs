use std::marker::PhantomData;

use crate::{
    block::{Block, Header, Link},
    region::Region,
};

/// Doubly linked list of blocks threaded through their own link slots.
///
/// The list never allocates: every node is a [`Block`] whose `next` and
/// `previous` slots live inside the region. It only keeps the ends and the
/// length; everything else is read from and written to the region.
pub(crate) struct List {
    head: Link,
    tail: Link,
    len: usize,
}

pub(crate) struct Iter<'r, 'a> {
    region: &'r Region<'a>,
    current: Link,
    remaining: usize,
    marker: PhantomData<&'r List>,
}

impl List {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn first(&self) -> Link {
        self.head
    }

    #[inline]
    pub fn last(&self) -> Link {
        self.tail
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forgets every node without touching the region.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Links `block` between `previous` and `next`, which must be adjacent in
    /// the list (or the corresponding end of it when `None`).
    ///
    /// **SAFETY**: `block` must be a block of `region` that is not in any list
    /// and whose link slots are free to be overwritten.
    pub unsafe fn link(&mut self, region: &Region<'_>, block: Block, previous: Link, next: Link) {
        unsafe {
            region.set_previous(block, previous);
            region.set_next(block, next);

            match previous {
                Some(previous) => region.set_next(previous, Some(block)),
                None => self.head = Some(block),
            }

            match next {
                Some(next) => region.set_previous(next, Some(block)),
                None => self.tail = Some(block),
            }
        }

        self.len += 1;
    }

    /// Detaches `block` from the list, joining its neighbours together.
    ///
    /// **SAFETY**: `block` must be a node of this list.
    pub unsafe fn unlink(&mut self, region: &Region<'_>, block: Block) {
        unsafe {
            let Header { next, previous, .. } = region.header(block);

            match previous {
                Some(previous) => region.set_next(previous, next),
                None => self.head = next,
            }

            match next {
                Some(next) => region.set_previous(next, previous),
                None => self.tail = previous,
            }
        }

        self.len -= 1;
    }

    /// Puts `new` in the place `old` occupies in the list.
    ///
    /// **SAFETY**: `old` must be a node of this list, `new` must not be, and
    /// the link slots of the two blocks must not overlap.
    pub unsafe fn replace(&mut self, region: &Region<'_>, old: Block, new: Block) {
        unsafe {
            let Header { next, previous, .. } = region.header(old);

            region.set_previous(new, previous);
            region.set_next(new, next);

            match previous {
                Some(previous) => region.set_next(previous, Some(new)),
                None => self.head = Some(new),
            }

            match next {
                Some(next) => region.set_previous(next, Some(new)),
                None => self.tail = Some(new),
            }
        }
    }

    pub fn iter<'r, 'a>(&'r self, region: &'r Region<'a>) -> Iter<'r, 'a> {
        Iter {
            region,
            current: self.first(),
            remaining: self.len,
            marker: PhantomData,
        }
    }
}

impl Iterator for Iter<'_, '_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;

        // Every node of a list is a free block, so its link slots are ours.
        self.current = unsafe { self.region.next(block) };
        self.remaining -= 1;

        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
