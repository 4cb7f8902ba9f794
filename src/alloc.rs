use std::{fmt, mem, ptr::NonNull};

use allocator_api2::alloc::{AllocError, Allocator, Layout};
use log::error;

use crate::{error::HeapError, heap::Heap, utils::WORD_SIZE};

/// Allocator handle bound to one [`Heap`].
///
/// The handle holds nothing but a reference to its heap, so copying it is
/// free and every copy hands out memory from the same place. Two handles are
/// equal exactly when they are bound to the same heap, which is what lets
/// containers move memory between handles.
///
/// It implements [`Allocator`], so the `allocator_api2` containers can live
/// inside the heap:
///
/// ```
/// use allocator_api2::vec::Vec;
/// use inblock::{Heap, HeapAlloc};
///
/// #[repr(C, align(8))]
/// struct Arena([u8; 1024]);
///
/// let mut arena = Arena([0; 1024]);
/// let heap = Heap::new(&mut arena.0).unwrap();
///
/// let mut numbers = Vec::new_in(HeapAlloc::new(&heap));
/// numbers.extend([1, 2, 3]);
/// assert_eq!(numbers.iter().sum::<i32>(), 6);
/// ```
#[derive(Clone, Copy)]
pub struct HeapAlloc<'h, 'a> {
    heap: &'h Heap<'a>,
}

impl<'h, 'a> HeapAlloc<'h, 'a> {
    pub const fn new(heap: &'h Heap<'a>) -> Self {
        Self { heap }
    }

    /// The heap this handle allocates from.
    pub fn heap(&self) -> &'h Heap<'a> {
        self.heap
    }

    /// Allocates room for `count` values of `T`.
    ///
    /// The memory is left uninitialized. Types aligned to more than 8 bytes
    /// are refused with [`HeapError::UnsupportedAlignment`].
    pub fn allocate_array<T>(&self, count: usize) -> Result<NonNull<T>, HeapError> {
        let align = mem::align_of::<T>();
        if align > WORD_SIZE {
            return Err(HeapError::UnsupportedAlignment { align });
        }

        let bytes = count
            .checked_mul(mem::size_of::<T>())
            .ok_or(HeapError::OutOfMemory { requested: usize::MAX })?;
        self.heap.allocate(bytes).map(NonNull::cast)
    }

    /// Releases memory obtained from [`HeapAlloc::allocate_array`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate_array::<T>` on a handle bound to the
    /// same heap and must not have been released already.
    pub unsafe fn deallocate_array<T>(&self, ptr: NonNull<T>, count: usize) -> Result<(), HeapError> {
        let ptr = ptr.cast::<u8>();
        debug_assert!(
            unsafe { self.heap.usable_size(ptr) }
                .is_ok_and(|size| size >= count.saturating_mul(mem::size_of::<T>()))
        );

        unsafe { self.heap.deallocate(ptr) }
    }
}

impl PartialEq for HeapAlloc<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.heap, other.heap)
    }
}

impl Eq for HeapAlloc<'_, '_> {}

impl fmt::Debug for HeapAlloc<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapAlloc")
            .field("heap", &(self.heap as *const Heap<'_>))
            .finish()
    }
}

unsafe impl Allocator for HeapAlloc<'_, '_> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.align() > WORD_SIZE {
            return Err(AllocError);
        }

        let (ptr, size) = self
            .heap
            .allocate_block(layout.size())
            .map_err(|_| AllocError)?;
        Ok(NonNull::slice_from_raw_parts(ptr, size))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        if let Err(err) = unsafe { self.heap.deallocate(ptr) } {
            error!("deallocate({ptr:p}): {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use allocator_api2::{boxed::Box, vec::Vec};

    use super::*;

    #[repr(C, align(8))]
    struct Arena([u8; 16384]);

    #[test]
    fn handles_on_same_heap_are_equal() {
        let mut one = Arena([0; 16384]);
        let mut two = Arena([0; 16384]);
        let first = Heap::new(&mut one.0).unwrap();
        let second = Heap::new(&mut two.0).unwrap();

        let a = HeapAlloc::new(&first);
        let b = a;
        let c = HeapAlloc::new(&first);
        let d = HeapAlloc::new(&second);

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, d);
        assert!(std::ptr::eq(a.heap(), &first));
        assert!(std::ptr::eq(d.heap(), &second));
    }

    #[test]
    fn typed_arrays() {
        let mut arena = Arena([0; 16384]);
        let heap = Heap::new(&mut arena.0).unwrap();
        let alloc = HeapAlloc::new(&heap);

        let values = alloc.allocate_array::<u32>(10).unwrap();
        assert_eq!(values.as_ptr() as usize % WORD_SIZE, 0);
        unsafe {
            for i in 0..10 {
                values.add(i).write(i as u32 * 3);
            }
            assert_eq!(values.add(9).read(), 27);
            alloc.deallocate_array(values, 10).unwrap();
        }

        assert_eq!(heap.stats().free_blocks, 1);
        assert!(alloc.allocate_array::<u64>(usize::MAX).is_err());
        assert!(alloc.allocate_array::<u64>(4096).is_err());
    }

    #[test]
    fn typed_arrays_refuse_wide_alignment() {
        #[allow(dead_code)]
        #[repr(align(16))]
        struct Wide([u8; 16]);

        let mut arena = Arena([0; 16384]);
        let heap = Heap::new(&mut arena.0).unwrap();
        let alloc = HeapAlloc::new(&heap);
        let before = heap.free_blocks();

        assert_eq!(
            alloc.allocate_array::<Wide>(1).err(),
            Some(HeapError::UnsupportedAlignment { align: 16 })
        );
        assert_eq!(heap.free_blocks(), before);

        let values = alloc.allocate_array::<u64>(2).unwrap();
        unsafe { alloc.deallocate_array(values, 2).unwrap() };
    }

    #[test]
    fn vec_of_vecs() {
        let mut arena = Arena([0; 16384]);
        let heap = Heap::new(&mut arena.0).unwrap();
        let alloc = HeapAlloc::new(&heap);

        {
            let mut matrix = Vec::new_in(alloc);
            for row in 0..16 {
                let mut values = Vec::new_in(alloc);
                for column in 0..16 {
                    values.push(row * column);
                }
                matrix.push(values);
            }

            let trace: i32 = (0..16).map(|i| matrix[i][i]).sum();
            assert_eq!(trace, (0..16).map(|i| i * i).sum());
            assert_eq!(heap.check(), Ok(()));
        }

        assert_eq!(heap.stats().free_blocks, 1);
        assert_eq!(heap.check(), Ok(()));
    }

    #[test]
    fn boxes_and_growth() {
        let mut arena = Arena([0; 16384]);
        let heap = Heap::new(&mut arena.0).unwrap();
        let alloc = HeapAlloc::new(&heap);

        let boxed = Box::new_in([7u64; 4], alloc);
        let mut grown = Vec::new_in(alloc);
        grown.resize(8, 0u8);
        for i in 0..1000 {
            grown.push(i as u8);
        }

        assert_eq!(boxed.iter().sum::<u64>(), 28);
        assert_eq!(grown.len(), 1008);

        drop(boxed);
        drop(grown);
        assert_eq!(heap.stats().free_blocks, 1);
    }

    #[test]
    fn refuses_large_alignment() {
        let mut arena = Arena([0; 16384]);
        let heap = Heap::new(&mut arena.0).unwrap();
        let alloc = HeapAlloc::new(&heap);

        let layout = Layout::from_size_align(64, 64).unwrap();
        assert!(alloc.allocate(layout).is_err());

        let layout = Layout::from_size_align(64, 8).unwrap();
        let block = alloc.allocate(layout).unwrap();
        assert!(block.len() >= 64);
        unsafe { alloc.deallocate(block.cast(), layout) };
    }

    #[test]
    fn exhaustion_surfaces_as_alloc_error() {
        let mut arena = Arena([0; 16384]);
        let heap = Heap::new(&mut arena.0).unwrap();

        let mut values: Vec<u8, _> = Vec::new_in(HeapAlloc::new(&heap));
        assert!(values.try_reserve(32768).is_err());
        assert!(values.try_reserve(1024).is_ok());
    }
}
