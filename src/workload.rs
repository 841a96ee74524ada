//! The allocation workloads: a recursive one where every level keeps its node alive until the
//! level below returns, and a flat one that churns a slot array.

use crate::error::BenchError;
use crate::{Checksum, NodeAllocator, identity_hash};

use std::thread;

/// Recursion deeper than this is refused by config validation. Each level is a stack frame, and
/// [`on_deep_stack`] sizes the stack for it.
pub const MAX_DEPTH: u32 = 50_000;

// Generous enough for an unoptimized frame of either recursion.
const STACK_BYTES_PER_LEVEL: usize = 4 * 1024;
const STACK_BYTES_BASE: usize = 2 * 1024 * 1024;

pub fn stack_bytes_for_depth(depth: u32) -> usize {
    STACK_BYTES_BASE + (depth as usize + 1) * STACK_BYTES_PER_LEVEL
}

/// Runs `f` to completion on a thread whose stack fits `depth` levels of recursion.
pub fn on_deep_stack<R, F>(depth: u32, f: F) -> Result<R, BenchError>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    let bytes = stack_bytes_for_depth(depth);
    thread::scope(|s| {
        let h = thread::Builder::new()
            .name("allocbench-deep".to_string())
            .stack_size(bytes)
            .spawn_scoped(s, f)
            .map_err(|e| BenchError::ThreadSpawn { bytes, reason: e.to_string() })?;
        h.join().map_err(|_| BenchError::WorkerPanicked(0))
    })
}

/// Allocates `level + 1` nodes, one per recursion level, and returns whichever of this level's
/// node and the returned child has the smaller identity hash.
#[inline(never)]
pub fn recursive<A: NodeAllocator>(al: &mut A, level: u32) -> A::Handle {
    let node = al.alloc(level as i32);

    if level == 0 {
        return node;
    }

    let child = recursive(al, level - 1);

    if identity_hash(A::identity(&node)) < identity_hash(A::identity(&child)) {
        node
    } else {
        child
    }
}

/// `iters` top-level calls of [`recursive`] at `depth`. Returns the number of allocations made,
/// which is `iters * (depth + 1)`.
pub fn run_recursive<A: NodeAllocator>(al: &mut A, iters: u64, depth: u32, sink: &mut Checksum) -> u64 {
    debug_assert!(depth <= MAX_DEPTH);
    let before = al.allocations();

    for _i in 0..iters {
        let picked = recursive(al, depth);
        sink.mix(al.value(&picked));
        drop(picked);
        al.recycle();
    }

    al.allocations() - before
}

/// Puts a fresh node in every slot. Whatever was there before is dropped.
#[inline]
pub fn fill_slots<A: NodeAllocator>(al: &mut A, slots: &mut [Option<A::Handle>]) {
    for (i, slot) in slots.iter_mut().enumerate() {
        *slot = Some(al.alloc(i as i32));
    }
}

/// `iters` passes of [`fill_slots`] over `slots`. Returns the number of allocations made, which is
/// `iters * slots.len()`.
pub fn run_array<A: NodeAllocator>(al: &mut A, iters: u64, slots: &mut [Option<A::Handle>], sink: &mut Checksum) -> u64 {
    let before = al.allocations();

    for iter in 0..iters {
        fill_slots(al, slots);

        if !slots.is_empty() {
            let i = (iter % slots.len() as u64) as usize;
            if let Some(h) = &slots[i] {
                sink.mix(al.value(h));
            }
        }

        // Every slot gets overwritten before it is read again, so the arena can start over here.
        al.recycle();
    }

    al.allocations() - before
}

pub fn new_slots<A: NodeAllocator>(len: usize) -> Vec<Option<A::Handle>> {
    std::iter::repeat_with(|| None).take(len).collect()
}

pub fn recursive_allocations(iters: u64, depth: u32) -> Option<u64> {
    iters.checked_mul(depth as u64 + 1)
}

pub fn array_allocations(threads: u32, iters: u64, array_size: u64) -> Option<u64> {
    (threads as u64).checked_mul(iters)?.checked_mul(array_size)
}
