//! Multiplies matrices made of nested vectors, once with the global allocator
//! and once with a heap living in a mapped region, and prints how long each
//! run took.
//!
//! Every multiplication copies rows by value, so the workload is dominated by
//! many short lived allocations of the same few sizes.

use std::time::Instant;

use allocator_api2::{
    alloc::{Allocator, Global},
    vec::Vec,
};
use inblock::{Heap, HeapAlloc, MappedRegion};

const SIZE: usize = 200;
const HEAP_SIZE: usize = SIZE * SIZE * size_of::<i32>() * 4 * 10;

type Matrix<A> = Vec<Vec<i32, A>, A>;

fn dot<A: Allocator>(a: Vec<i32, A>, b: Vec<i32, A>) -> i32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn multiply<A: Allocator + Copy>(a: &Matrix<A>, b: &Matrix<A>, alloc: A) -> Matrix<A> {
    let mut c = Vec::new_in(alloc);
    for row in a.iter() {
        let mut values = Vec::new_in(alloc);
        for column in b.iter() {
            values.push(dot(row.clone(), column.clone()));
        }
        c.push(values);
    }
    c
}

/// Same sequence on every run, so both allocators do identical work.
fn pseudo_random(state: &mut u32) -> i32 {
    *state ^= *state << 13;
    *state ^= *state >> 17;
    *state ^= *state << 5;
    (*state % 3) as i32
}

fn run<A: Allocator + Copy>(alloc: A) -> i64 {
    let mut a: Matrix<A> = Vec::new_in(alloc);
    let mut b: Matrix<A> = Vec::new_in(alloc);
    let mut state = 0x1337;

    for _ in 0..SIZE {
        let mut row_a = Vec::with_capacity_in(SIZE, alloc);
        let mut row_b = Vec::with_capacity_in(SIZE, alloc);
        for _ in 0..SIZE {
            row_a.push(pseudo_random(&mut state));
            row_b.push(pseudo_random(&mut state));
        }
        a.push(row_a);
        b.push(row_b);
    }

    for _ in 0..3 {
        a = multiply(&a, &b, alloc);
    }

    a.iter().flat_map(|row| row.iter()).map(|&x| x as i64).sum()
}

fn main() {
    env_logger::init();

    let start = Instant::now();
    let reference = run(Global);
    println!("global allocator: {:?}", start.elapsed());

    let mut region = MappedRegion::new(HEAP_SIZE).expect("mapping memory for the heap");
    let heap = Heap::new(region.as_mut_slice()).expect("mapped regions are page aligned");

    let start = Instant::now();
    let result = run(HeapAlloc::new(&heap));
    println!("inblock heap:     {:?}", start.elapsed());

    assert_eq!(reference, result);
    println!("checksum {result}, {:?}", heap.stats());
}
