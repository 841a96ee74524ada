//! Bump allocation out of large word pages.
//!
//! Every allocation is laid out as two header words followed by the payload:
//!
//! ```text
//! [ owning page address | type tag | payload word 0 | ... | payload word SIZE-1 ]
//! ```
//!
//! Nothing is freed individually. [`PageArena::reset`] throws away everything at once, keeping
//! the first page for reuse, and bumps the arena's epoch. Every arena also gets a process-unique
//! id, so a handle can be checked against both the arena and the epoch it came from.

use crate::error::BenchError;
use crate::platformalloc::{sys_alloc_words, sys_dealloc_words};

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

pub const HEAP_PAGE_SIZE_WORDS: usize = 128_000;
pub const ALLOC_HEADER_WORDS: usize = 2;

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

pub struct PageArena {
    id: u64,
    pages: Vec<NonNull<usize>>,
    last_page: NonNull<usize>,
    curr_page_words_used: usize,
    epoch: u64,
    allocations: u64,
}

impl PageArena {
    pub fn new() -> Result<Self, BenchError> {
        let mut arena = Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            pages: Vec::new(),
            last_page: NonNull::dangling(),
            curr_page_words_used: 0,
            epoch: 0,
            allocations: 0,
        };
        arena.add_page()?;
        Ok(arena)
    }

    fn add_page(&mut self) -> Result<(), BenchError> {
        let page = sys_alloc_words(HEAP_PAGE_SIZE_WORDS)?;

        // Touch the fresh page so the first allocation on it doesn't pay for the fault.
        unsafe { page.as_ptr().write(HEAP_PAGE_SIZE_WORDS) };

        self.pages.push(page);
        self.last_page = page;
        self.curr_page_words_used = 0;
        Ok(())
    }

    /// Returns a pointer to `SIZE` zeroed payload words, tagged with `TYPE`.
    #[inline]
    pub fn alloc_words<const TYPE: usize, const SIZE: usize>(&mut self) -> Result<NonNull<usize>, BenchError> {
        const { assert!(SIZE + ALLOC_HEADER_WORDS <= HEAP_PAGE_SIZE_WORDS) };

        if self.curr_page_words_used + ALLOC_HEADER_WORDS + SIZE > HEAP_PAGE_SIZE_WORDS {
            self.add_page()?;
        }

        let last_page = self.last_page;
        let used = self.curr_page_words_used;

        let payload = unsafe {
            let header = last_page.as_ptr().add(used);
            header.write(last_page.as_ptr().addr());
            header.add(1).write(TYPE);
            let payload = header.add(ALLOC_HEADER_WORDS);
            payload.write_bytes(0, SIZE);
            NonNull::new_unchecked(payload)
        };

        self.curr_page_words_used = used + ALLOC_HEADER_WORDS + SIZE;
        self.allocations += 1;

        Ok(payload)
    }

    /// Releases every page but the first and starts over at its beginning.
    pub fn reset(&mut self) {
        for page in self.pages.drain(1..) {
            unsafe { sys_dealloc_words(page, HEAP_PAGE_SIZE_WORDS) };
        }
        self.last_page = self.pages[0];
        self.curr_page_words_used = 0;
        self.epoch += 1;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }
}

impl Drop for PageArena {
    fn drop(&mut self) {
        for page in self.pages.drain(..) {
            unsafe { sys_dealloc_words(page, HEAP_PAGE_SIZE_WORDS) };
        }
    }
}

const CHURN_TYPE: usize = 1;

/// `rounds` rounds of `per_round` header-only allocations, resetting the arena after each round.
/// Returns the number of allocations made.
pub fn run_churn(arena: &mut PageArena, rounds: u64, per_round: u64) -> Result<u64, BenchError> {
    let before = arena.allocations();
    for _round in 0..rounds {
        for _i in 0..per_round {
            std::hint::black_box(arena.alloc_words::<CHURN_TYPE, 0>()?);
        }
        arena.reset();
    }
    Ok(arena.allocations() - before)
}
