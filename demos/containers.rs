//! Walks through the life of a few allocations on a small heap, printing the
//! free list after each step.

use allocator_api2::{boxed::Box, vec::Vec};
use inblock::{Heap, HeapAlloc};

#[repr(C, align(8))]
struct Arena([u8; 4096]);

fn log_alloc(heap: &Heap<'_>, label: &str, addr: *const u8, bytes: usize) {
    println!("{label}: requested {bytes} bytes, received {addr:?}");
    print_free_list(heap);
}

fn print_free_list(heap: &Heap<'_>) {
    for block in heap.free_blocks() {
        println!("    free block at +{:<5} {:>5} bytes", block.offset, block.size);
    }
}

fn main() {
    env_logger::init();

    let mut arena = Arena([0; 4096]);
    let heap = Heap::new(&mut arena.0).expect("arena is aligned and large enough");
    let alloc = HeapAlloc::new(&heap);

    println!("fresh heap");
    print_free_list(&heap);

    let first = heap.allocate(100).expect("fits");
    log_alloc(&heap, "first", first.as_ptr(), 100);

    let second = heap.allocate(200).expect("fits");
    log_alloc(&heap, "second", second.as_ptr(), 200);

    unsafe {
        heap.deallocate(first).expect("came from this heap");
        println!("freed first");
        print_free_list(&heap);

        heap.deallocate(second).expect("came from this heap");
        println!("freed second, everything merged back");
        print_free_list(&heap);
    }

    // Containers grow by allocating a larger block and releasing the old one.
    let mut values = Vec::new_in(alloc);
    for i in 0..5 {
        values.push(i * 10);
        println!(
            "pushed {}; capacity: {}; at: {:p}",
            values[i],
            values.capacity(),
            values.as_ptr()
        );
    }

    let a = Box::new_in([0u8; 64], alloc);
    let b = Box::new_in([0u8; 64], alloc);
    let ptr_a = a.as_ptr();
    drop(a);
    drop(b);

    let c = Box::new_in([0u8; 128], alloc);
    if ptr_a == c.as_ptr() {
        println!("merged blocks reused at {:p}", c.as_ptr());
    } else {
        println!("a was at {:p}, c is at {:p}", ptr_a, c.as_ptr());
    }

    drop(c);
    drop(values);
    println!("{:?}", heap.stats());
}
