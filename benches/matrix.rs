//! Heap versus global allocator benchmarks.

use allocator_api2::{
    alloc::{Allocator, Global},
    vec::Vec,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use inblock::{Heap, HeapAlloc, MappedRegion};

type Matrix<A> = Vec<Vec<i32, A>, A>;

fn filled<A: Allocator + Copy>(size: usize, alloc: A) -> Matrix<A> {
    let mut matrix = Vec::with_capacity_in(size, alloc);
    for row in 0..size {
        let mut values = Vec::with_capacity_in(size, alloc);
        values.extend((0..size).map(|column| ((row * 7 + column * 3) % 3) as i32));
        matrix.push(values);
    }
    matrix
}

/// Row by row product that copies both operands for every cell.
fn multiply<A: Allocator + Copy>(a: &Matrix<A>, b: &Matrix<A>, alloc: A) -> Matrix<A> {
    let mut c = Vec::with_capacity_in(a.len(), alloc);
    for row in a.iter() {
        let mut values = Vec::new_in(alloc);
        for column in b.iter() {
            let (x, y) = (row.clone(), column.clone());
            values.push(x.iter().zip(y.iter()).map(|(x, y)| x * y).sum());
        }
        c.push(values);
    }
    c
}

fn bench_matrix(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 48, 96];
    let mut group = c.benchmark_group("matrix_multiply");

    let mut region = MappedRegion::new(16 * 1024 * 1024).unwrap();
    let heap = Heap::new(region.as_mut_slice()).unwrap();

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("global", size), &size, |b, &size| {
            let (x, y) = (filled(size, Global), filled(size, Global));
            b.iter(|| black_box(multiply(&x, &y, Global)));
        });

        group.bench_with_input(BenchmarkId::new("inblock", size), &size, |b, &size| {
            let alloc = HeapAlloc::new(&heap);
            let (x, y) = (filled(size, alloc), filled(size, alloc));
            b.iter(|| black_box(multiply(&x, &y, alloc)));
        });
    }
    group.finish();
}

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 64, 256, 1024, 4096];
    let mut group = c.benchmark_group("alloc_free_cycle");

    let mut region = MappedRegion::new(1024 * 1024).unwrap();
    let heap = Heap::new(region.as_mut_slice()).unwrap();

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("inblock", size), &size, |b, &size| {
            b.iter(|| {
                let ptr = heap.allocate(black_box(size)).unwrap();
                unsafe { heap.deallocate(ptr).unwrap() };
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_matrix, bench_alloc_free_cycle);
criterion_main!(benches);
