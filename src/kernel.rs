use std::{ptr::NonNull, slice, sync::OnceLock};

use log::debug;

use crate::{error::HeapError, utils::align};

/// Memory obtained straight from the operating system, to be used as the
/// backing region of a [`crate::Heap`].
///
/// The heap itself never talks to the kernel: it is handed a buffer and
/// lives inside it. `MappedRegion` is one way of getting such a buffer that
/// does not come from the global allocator. The mapping is page aligned,
/// zero filled, and returned to the kernel when the value is dropped, so the
/// borrow checker makes sure no heap outlives it.
///
/// ```
/// use inblock::{Heap, MappedRegion};
///
/// let mut region = MappedRegion::new(64 * 1024).unwrap();
/// let heap = Heap::new(region.as_mut_slice()).unwrap();
/// assert!(heap.allocate(1024).is_ok());
/// ```
pub struct MappedRegion {
    addr: NonNull<u8>,
    len: usize,
}

/// Marker type for the platform specific memory calls.
pub(crate) struct Kernel;

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls, so that the rest of the crate does not depend on the API of
/// each kernel.
trait PlatformMemory {
    /// Request a memory region of size `len`. It returns a pointer to the
    /// given location or `None` if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: NonNull<u8>, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    fn page_size() -> usize;
}

/// Virtual memory page size of the computer. This is usually 4096, but it
/// can only be known at runtime.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(Kernel::page_size)
}

impl MappedRegion {
    /// Maps at least `len` bytes, rounded up to a whole number of pages.
    pub fn new(len: usize) -> Result<Self, HeapError> {
        let len = align(len.max(1), page_size()).ok_or(HeapError::MapFailed { len })?;
        let addr = unsafe { Kernel::request_memory(len) }.ok_or(HeapError::MapFailed { len })?;

        debug!("mapped {len} bytes at {addr:p}");
        Ok(Self { addr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.addr.as_ptr(), self.len) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        debug!("unmapping {} bytes at {:p}", self.len, self.addr);
        unsafe { Kernel::return_memory(self.addr, self.len) };
    }
}

#[cfg(unix)]
mod unix {
    use std::{
        os::raw::{c_int, c_void},
        ptr::{self, NonNull},
    };

    use libc::{mmap, munmap, off_t, size_t};
    use log::debug;

    use super::{Kernel, PlatformMemory};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            let addr = unsafe { mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET) };
            if addr == libc::MAP_FAILED {
                return None;
            }

            NonNull::new(addr.cast::<u8>())
        }

        unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
            if unsafe { munmap(addr.as_ptr().cast::<c_void>(), len as size_t) } != 0 {
                debug!("munmap of {len} bytes at {addr:p} failed: {}", std::io::Error::last_os_error());
            }
        }

        fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{ffi::c_void, mem::MaybeUninit, ptr::NonNull};

    use log::debug;
    use windows::Win32::System::{Memory, SystemInformation};

    use super::{Kernel, PlatformMemory};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
            let released = unsafe { Memory::VirtualFree(addr.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE) };
            if let Err(err) = released {
                debug!("VirtualFree of {len} bytes at {addr:p} failed: {err}");
            }
        }

        fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
