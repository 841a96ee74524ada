use criterion::{Criterion, criterion_group, criterion_main};

use allocbench::arena::{PageArena, run_churn};
use allocbench::gc::{Heap, NODE_TYPE, linked_recursion};
use allocbench::strategy::{Arena, Boxed, Counted};
use allocbench::workload::{fill_slots, new_slots, recursive};
use allocbench::{Checksum, NodeAllocator};

use core::time::Duration;
use std::hint::black_box;

use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NUM_ARGS: usize = 1024;

lazy_static! {
    // Mixed recursion depths, the same on every run.
    static ref DEPTHS: Vec<u32> = {
        let mut r = StdRng::seed_from_u64(0);
        (0..NUM_ARGS).map(|_| r.random_range(0..=200)).collect()
    };
}

fn help_bench_recursive<A: NodeAllocator>(c: &mut Criterion) {
    let mut al = A::create().unwrap();
    let mut sink = Checksum::new();
    let mut i = 0;

    c.bench_function(&format!("recursive_{}", A::NAME), |b| b.iter(|| {
        let picked = recursive(&mut al, DEPTHS[i % NUM_ARGS]);
        sink.mix(al.value(&picked));
        drop(picked);
        al.recycle();

        i += 1;
    }));

    black_box(sink.finish());
}

fn bench_recursive_boxed(c: &mut Criterion) {
    help_bench_recursive::<Boxed>(c);
}

fn bench_recursive_counted(c: &mut Criterion) {
    help_bench_recursive::<Counted>(c);
}

fn bench_recursive_arena(c: &mut Criterion) {
    help_bench_recursive::<Arena>(c);
}

fn help_bench_fill<A: NodeAllocator>(c: &mut Criterion) {
    let mut al = A::create().unwrap();
    let mut slots = new_slots::<A>(4096);

    c.bench_function(&format!("fill_4096_{}", A::NAME), |b| b.iter(|| {
        fill_slots(&mut al, &mut slots);
        al.recycle();
    }));
}

fn bench_fill_boxed(c: &mut Criterion) {
    help_bench_fill::<Boxed>(c);
}

fn bench_fill_arena(c: &mut Criterion) {
    help_bench_fill::<Arena>(c);
}

fn bench_churn(c: &mut Criterion) {
    let mut pa = PageArena::new().unwrap();

    c.bench_function("churn_100000", |b| b.iter(|| {
        black_box(run_churn(&mut pa, 1, 100_000).unwrap());
    }));
}

fn bench_linked_recursion(c: &mut Criterion) {
    let mut heap = Heap::new().unwrap();
    let node_ty = heap.register_type(NODE_TYPE).unwrap();
    let mut i = 0;

    c.bench_function("linked_recursion", |b| b.iter(|| {
        linked_recursion(&mut heap, node_ty, None, DEPTHS[i % NUM_ARGS], 4).unwrap();

        i += 1;
    }));
}

criterion_group!{
    name = allocbench;
    config = Criterion::default().warm_up_time(Duration::from_millis(100)).measurement_time(Duration::from_millis(1000));
    targets = bench_recursive_boxed, bench_recursive_counted, bench_recursive_arena, bench_fill_boxed, bench_fill_arena, bench_churn, bench_linked_recursion
}

criterion_main!(allocbench);
