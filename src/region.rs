use std::{marker::PhantomData, ptr::NonNull};

use crate::{
    block::{Block, HEADER_SIZE, Header, Link, MIN_REGION_SIZE, decode_link, encode_link},
    error::HeapError,
    utils::WORD_SIZE,
};

/// The caller supplied memory a heap carves its blocks from.
///
/// Blocks are addressed by byte offsets from `base`, and all metadata access
/// goes through the accessors below. They are bounds checked in debug builds
/// and `unsafe` because the bytes they touch may also be reachable through
/// pointers already handed out to callers: they must only be used on headers
/// of blocks that exist, and on link slots of blocks that are free.
///
/// ```text
/// base                                                          base + len
/// +--------+---------+--------+------------------+--------+------------+
/// | Header | Payload | Header |     Payload      | Header |  Payload   |
/// +--------+---------+--------+------------------+--------+------------+
/// ```
pub(crate) struct Region<'a> {
    /// Start of the region, always aligned to [`WORD_SIZE`].
    base: NonNull<u8>,
    /// Usable length, a multiple of [`WORD_SIZE`].
    len: usize,
    marker: PhantomData<&'a mut [u8]>,
}

impl<'a> Region<'a> {
    /// Takes over `buffer`. A trailing part shorter than a word is left unused.
    pub fn new(buffer: &'a mut [u8]) -> Result<Self, HeapError> {
        let addr = buffer.as_ptr() as usize;
        if addr % WORD_SIZE != 0 {
            return Err(HeapError::MisalignedRegion { addr });
        }

        let len = buffer.len() & !(WORD_SIZE - 1);
        if len < MIN_REGION_SIZE {
            return Err(HeapError::HeapTooSmall {
                len: buffer.len(),
                min: MIN_REGION_SIZE,
            });
        }

        Ok(Self {
            base: NonNull::from(buffer).cast(),
            len,
            marker: PhantomData,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Pointer to the first payload byte of `block`.
    #[inline]
    pub fn payload_ptr(&self, block: Block) -> NonNull<u8> {
        debug_assert!(block.payload() < self.len);
        unsafe { self.base.add(block.payload()) }
    }

    /// Maps a payload pointer back to its block.
    ///
    /// This only checks that the pointer could have been produced by this
    /// region: it lies inside it, leaves room for a header in front of it and
    /// sits on a word boundary.
    pub fn block_of(&self, ptr: NonNull<u8>) -> Result<Block, HeapError> {
        let addr = ptr.as_ptr() as usize;
        let base = self.base.as_ptr() as usize;

        match addr.checked_sub(base) {
            Some(offset)
                if offset >= HEADER_SIZE && offset < self.len && offset % WORD_SIZE == 0 =>
            {
                Ok(Block::at(offset - HEADER_SIZE))
            }
            _ => Err(HeapError::ForeignPointer { addr }),
        }
    }

    #[inline]
    unsafe fn word(&self, offset: usize) -> u64 {
        debug_assert!(offset % WORD_SIZE == 0 && offset + WORD_SIZE <= self.len);
        unsafe { self.base.as_ptr().add(offset).cast::<u64>().read() }
    }

    #[inline]
    unsafe fn set_word(&self, offset: usize, value: u64) {
        debug_assert!(offset % WORD_SIZE == 0 && offset + WORD_SIZE <= self.len);
        unsafe { self.base.as_ptr().add(offset).cast::<u64>().write(value) }
    }

    /// Payload size recorded in the header of `block`.
    #[inline]
    pub unsafe fn size(&self, block: Block) -> usize {
        unsafe { self.word(block.offset()) as usize }
    }

    #[inline]
    pub unsafe fn set_size(&self, block: Block, size: usize) {
        unsafe { self.set_word(block.offset(), size as u64) }
    }

    #[inline]
    pub unsafe fn next(&self, block: Block) -> Link {
        unsafe { decode_link(self.word(block.next_slot())) }
    }

    #[inline]
    pub unsafe fn set_next(&self, block: Block, next: Link) {
        unsafe { self.set_word(block.next_slot(), encode_link(next)) }
    }

    #[inline]
    pub unsafe fn previous(&self, block: Block) -> Link {
        unsafe { decode_link(self.word(block.previous_slot())) }
    }

    #[inline]
    pub unsafe fn set_previous(&self, block: Block, previous: Link) {
        unsafe { self.set_word(block.previous_slot(), encode_link(previous)) }
    }

    /// Reads the full header record of a free block.
    pub unsafe fn header(&self, block: Block) -> Header {
        unsafe {
            Header {
                size: self.size(block),
                next: self.next(block),
                previous: self.previous(block),
            }
        }
    }

    /// Writes the full header record of a free block.
    pub unsafe fn write_header(&self, block: Block, header: Header) {
        unsafe {
            self.set_size(block, header.size);
            self.set_next(block, header.next);
            self.set_previous(block, header.previous);
        }
    }
}
