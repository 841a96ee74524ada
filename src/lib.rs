//! Object allocation throughput microbenchmarks.
//!
//! Every variant allocates many short-lived [`Node`]s, times the run with a wall clock, and reports
//! allocations per second in millions. How a node gets its memory is pluggable through
//! [`NodeAllocator`]: an owned `Box`, a reference-counted `Rc`, or a bump-allocated word page from
//! [`arena::PageArena`]. The [`gc`] module is a small mark-and-sweep heap with its own workload.

pub mod arena;
pub mod config;
pub mod diag;
pub mod error;
pub mod gc;
pub mod platform;
mod platformalloc;
pub mod report;
pub mod runner;
pub mod strategy;
pub mod threaded;
pub mod workload;

pub use config::{Config, Strategy, Variant};
pub use error::BenchError;
pub use report::{Nanoseconds, Report, Throughput};

use ahash::RandomState;
use lazy_static::lazy_static;
use std::hint::black_box;

/// The one thing we allocate. A single integer, so the allocation itself dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Node {
    pub value: i32,
}

/// A way of getting memory for a [`Node`].
///
/// Handles own (or, for the arena, borrow by epoch) their node; dropping a handle releases it
/// wherever the strategy allows that.
pub trait NodeAllocator: Sized {
    type Handle;

    const NAME: &'static str;

    /// Bytes of memory one node costs this strategy, bookkeeping included.
    const OBJECT_BYTES: usize = size_of::<Node>();

    fn create() -> Result<Self, BenchError>;

    fn alloc(&mut self, value: i32) -> Self::Handle;

    fn value(&self, h: &Self::Handle) -> i32;

    /// The address of the node, which is its only identity.
    fn identity(h: &Self::Handle) -> usize;

    /// Called by the workloads once nothing allocated so far is still referenced.
    fn recycle(&mut self) {}

    /// How many nodes this allocator has handed out since it was created.
    fn allocations(&self) -> u64;
}

lazy_static! {
    static ref IDENTITY_HASHER: RandomState =
        RandomState::with_seeds(0x243f_6a88_85a3_08d3, 0x1319_8a2e_0370_7344, 0xa409_3822_299f_31d0, 0x082e_fa98_ec4e_6c89);
}

/// A stable, address-derived hash used to pick between two live nodes.
#[inline]
pub fn identity_hash(addr: usize) -> u64 {
    IDENTITY_HASHER.hash_one(addr)
}

/// Accumulates values the optimizer must assume are observed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Checksum(u64);

impl Checksum {
    pub fn new() -> Self {
        Self(0)
    }

    #[inline(always)]
    pub fn mix(&mut self, v: i32) {
        self.0 = self.0.rotate_left(5) ^ (v as u32 as u64);
    }

    pub fn merge(&mut self, other: Checksum) {
        self.0 = self.0.wrapping_add(other.0);
    }

    pub fn finish(self) -> u64 {
        black_box(self.0)
    }
}
