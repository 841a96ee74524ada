//! A small mark-and-sweep heap.
//!
//! Objects are bump-allocated into word pages and never freed one at a time. Each object starts
//! with a two-word header:
//!
//! ```text
//! [ type index | mark epoch | pointer fields ... | plain words ... ]
//! ```
//!
//! Pointer fields come first in the payload, as many as the type's `pointers_count`. Roots live on
//! an explicit stack. [`Heap::collect`] advances the mark epoch, stamps every object reachable
//! from the roots (and its page) with the new epoch, and drops every page that didn't get
//! stamped. The page currently being allocated into is never dropped.
//!
//! New objects and pages are stamped with the epoch current at their allocation, so they survive
//! exactly until the next collection that can't reach them.

use crate::error::BenchError;

pub const GC_PAGE_SIZE_WORDS: usize = 1_280_000;
pub const ALLOC_HEADER_WORDS: usize = 2;

const TYPE_WORD: usize = 0;
const EPOCH_WORD: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeDesc {
    pub required_words: usize,
    pub pointers_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GcType(u32);

/// A reference to an object: its page and the offset of its header within that page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GcRef {
    page: u32,
    offset: u32,
}

impl GcRef {
    // 0 is the null pointer, so pages are numbered from 1 when encoded.
    fn encode(r: Option<GcRef>) -> u64 {
        match r {
            None => 0,
            Some(r) => ((r.page as u64 + 1) << 32) | r.offset as u64,
        }
    }

    fn decode(w: u64) -> Option<GcRef> {
        if w == 0 {
            return None;
        }
        Some(GcRef {
            page: ((w >> 32) - 1) as u32,
            offset: (w & 0xffff_ffff) as u32,
        })
    }

    pub fn page(self) -> u32 {
        self.page
    }

    pub fn offset(self) -> u32 {
        self.offset
    }
}

struct HeapPage {
    words: Box<[u64]>,
    used: usize,
    epoch: u64,
    single_purpose: bool,
}

impl HeapPage {
    fn new(words: usize, epoch: u64, single_purpose: bool) -> Result<Self, BenchError> {
        let mut v: Vec<u64> = Vec::new();
        v.try_reserve_exact(words).map_err(|_| BenchError::AllocFailed { words })?;
        v.resize(words, 0);
        Ok(Self {
            words: v.into_boxed_slice(),
            used: 0,
            epoch,
            single_purpose,
        })
    }

    fn free_words(&self) -> usize {
        self.words.len() - self.used
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: u64,
    pub collections: u64,
    pub pages_added: u64,
    pub pages_freed: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapSummary {
    pub pages: usize,
    pub objects: usize,
    pub words_used: usize,
}

pub struct Heap {
    page_words: usize,
    types: Vec<TypeDesc>,
    pages: Vec<Option<HeapPage>>,
    free_page_slots: Vec<u32>,
    current: u32,
    epoch: u64,
    roots: Vec<GcRef>,
    pages_since_collect: usize,
    stats: HeapStats,
}

impl Heap {
    pub fn new() -> Result<Self, BenchError> {
        Self::with_page_words(GC_PAGE_SIZE_WORDS)
    }

    /// A heap whose regular pages hold `page_words` words.
    pub fn with_page_words(page_words: usize) -> Result<Self, BenchError> {
        if page_words <= ALLOC_HEADER_WORDS || page_words > u32::MAX as usize {
            return Err(BenchError::InvalidConfig(format!("gc page size of {page_words} words")));
        }
        let mut heap = Self {
            page_words,
            types: Vec::new(),
            pages: Vec::new(),
            free_page_slots: Vec::new(),
            current: 0,
            epoch: 0,
            roots: Vec::new(),
            pages_since_collect: 0,
            stats: HeapStats::default(),
        };
        heap.current = heap.add_page(page_words, false)?;
        heap.pages_since_collect = 0;
        Ok(heap)
    }

    pub fn register_type(&mut self, desc: TypeDesc) -> Result<GcType, BenchError> {
        if desc.pointers_count > desc.required_words {
            return Err(BenchError::InvalidConfig(format!("{desc:?} has more pointers than words")));
        }
        if desc.required_words + ALLOC_HEADER_WORDS > u32::MAX as usize {
            return Err(BenchError::InvalidConfig(format!("{desc:?} is too large")));
        }
        self.types.push(desc);
        Ok(GcType((self.types.len() - 1) as u32))
    }

    fn add_page(&mut self, words: usize, single_purpose: bool) -> Result<u32, BenchError> {
        let page = HeapPage::new(words, self.epoch, single_purpose)?;
        let idx = match self.free_page_slots.pop() {
            Some(idx) => {
                self.pages[idx as usize] = Some(page);
                idx
            }
            None => {
                self.pages.push(Some(page));
                (self.pages.len() - 1) as u32
            }
        };
        self.pages_since_collect += 1;
        self.stats.pages_added += 1;
        Ok(idx)
    }

    fn page(&self, idx: u32) -> &HeapPage {
        match self.pages.get(idx as usize) {
            Some(Some(p)) => p,
            _ => panic!("reference into released page {idx}"),
        }
    }

    fn page_mut(&mut self, idx: u32) -> &mut HeapPage {
        match self.pages.get_mut(idx as usize) {
            Some(Some(p)) => p,
            _ => panic!("reference into released page {idx}"),
        }
    }

    /// Allocates a zeroed object of type `ty`. Objects too big for a regular page get a page of
    /// their own.
    pub fn alloc(&mut self, ty: GcType) -> Result<GcRef, BenchError> {
        let desc = self.types[ty.0 as usize];
        let needed = ALLOC_HEADER_WORDS + desc.required_words;

        let page_idx = if needed > self.page_words {
            self.add_page(needed, true)?
        } else {
            if self.page(self.current).free_words() < needed {
                self.current = self.add_page(self.page_words, false)?;
            }
            self.current
        };

        let epoch = self.epoch;
        let page = self.page_mut(page_idx);
        let offset = page.used;
        // Pages come zeroed and offsets are never handed out twice, so the payload is already 0.
        page.words[offset + TYPE_WORD] = ty.0 as u64;
        page.words[offset + EPOCH_WORD] = epoch;
        page.used += needed;

        self.stats.allocations += 1;

        Ok(GcRef { page: page_idx, offset: offset as u32 })
    }

    fn desc_of(&self, r: GcRef) -> TypeDesc {
        let ty = self.page(r.page).words[r.offset as usize + TYPE_WORD];
        self.types[ty as usize]
    }

    pub fn field(&self, r: GcRef, i: usize) -> Option<GcRef> {
        assert!(i < self.desc_of(r).pointers_count, "field {i} of {r:?} is not a pointer");
        GcRef::decode(self.page(r.page).words[r.offset as usize + ALLOC_HEADER_WORDS + i])
    }

    pub fn set_field(&mut self, r: GcRef, i: usize, v: Option<GcRef>) {
        assert!(i < self.desc_of(r).pointers_count, "field {i} of {r:?} is not a pointer");
        self.page_mut(r.page).words[r.offset as usize + ALLOC_HEADER_WORDS + i] = GcRef::encode(v);
    }

    pub fn word(&self, r: GcRef, i: usize) -> u64 {
        let desc = self.desc_of(r);
        assert!(i >= desc.pointers_count && i < desc.required_words, "word {i} of {r:?} is not plain data");
        self.page(r.page).words[r.offset as usize + ALLOC_HEADER_WORDS + i]
    }

    pub fn set_word(&mut self, r: GcRef, i: usize, v: u64) {
        let desc = self.desc_of(r);
        assert!(i >= desc.pointers_count && i < desc.required_words, "word {i} of {r:?} is not plain data");
        self.page_mut(r.page).words[r.offset as usize + ALLOC_HEADER_WORDS + i] = v;
    }

    pub fn push_root(&mut self, r: GcRef) {
        self.roots.push(r);
    }

    pub fn pop_root(&mut self) -> Option<GcRef> {
        self.roots.pop()
    }

    pub fn pages_since_collect(&self) -> usize {
        self.pages_since_collect
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Marks everything reachable from the roots and releases every page (other than the current
    /// one) that holds nothing reachable. Returns the number of pages released.
    pub fn collect(&mut self) -> usize {
        self.epoch += 1;
        let epoch = self.epoch;

        let types = &self.types;
        let pages = &mut self.pages;

        let mut worklist: Vec<GcRef> = self.roots.clone();
        while let Some(r) = worklist.pop() {
            let page = match pages.get_mut(r.page as usize) {
                Some(Some(p)) => p,
                _ => panic!("root or field refers to released page {}", r.page),
            };
            let off = r.offset as usize;
            if page.words[off + EPOCH_WORD] == epoch {
                continue;
            }
            page.words[off + EPOCH_WORD] = epoch;
            page.epoch = epoch;

            let desc = types[page.words[off + TYPE_WORD] as usize];
            for i in 0..desc.pointers_count {
                if let Some(child) = GcRef::decode(page.words[off + ALLOC_HEADER_WORDS + i]) {
                    worklist.push(child);
                }
            }
        }

        let mut freed = 0;
        for (idx, slot) in pages.iter_mut().enumerate() {
            if idx == self.current as usize {
                continue;
            }
            let stale = match slot {
                Some(p) => p.epoch != epoch,
                None => false,
            };
            if stale {
                *slot = None;
                self.free_page_slots.push(idx as u32);
                freed += 1;
            }
        }
        self.page_mut(self.current).epoch = epoch;

        self.pages_since_collect = 0;
        self.stats.collections += 1;
        self.stats.pages_freed += freed as u64;

        crate::diag_info!("gc: collection {} released {} pages, {} remain", self.stats.collections, freed, self.page_count());

        freed
    }

    pub fn page_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_some()).count()
    }

    /// Walks every live page object by object.
    pub fn summary(&self) -> HeapSummary {
        let mut s = HeapSummary::default();
        for page in self.pages.iter().flatten() {
            s.pages += 1;
            let mut off = 0;
            let mut objects = 0;
            while off < page.used {
                let desc = self.types[page.words[off + TYPE_WORD] as usize];
                objects += 1;
                off += ALLOC_HEADER_WORDS + desc.required_words;
            }
            debug_assert_eq!(off, page.used);
            debug_assert!(!page.single_purpose || objects == 1);
            s.objects += objects;
            s.words_used += page.used;
        }
        s
    }
}

/// The linked node: one pointer to its parent, one plain word holding its level.
pub const NODE_TYPE: TypeDesc = TypeDesc { required_words: 2, pointers_count: 1 };
const NEXT: usize = 0;
const VALUE: usize = 1;

fn check_value(heap: &Heap, node: GcRef, expected: u64) -> Result<(), BenchError> {
    let found = heap.word(node, VALUE);
    if found != expected {
        return Err(BenchError::CorruptObject {
            page: node.page,
            offset: node.offset,
            expected: expected as usize,
            found: found as usize,
        });
    }
    Ok(())
}

/// Allocates `level + 1` linked nodes, each pointing at its parent and rooted for as long as its
/// call is on the stack, then checks on the way back up that every node still holds its level.
/// Collections run at the start of a call once `collect_every_pages` pages have been added.
pub fn linked_recursion(heap: &mut Heap, node_ty: GcType, parent: Option<GcRef>, level: u32, collect_every_pages: usize) -> Result<(), BenchError> {
    if heap.pages_since_collect() >= collect_every_pages {
        heap.collect();
    }

    let node = heap.alloc(node_ty)?;
    heap.set_field(node, NEXT, parent);
    heap.set_word(node, VALUE, level as u64);
    heap.push_root(node);

    if level > 0 {
        linked_recursion(heap, node_ty, Some(node), level - 1, collect_every_pages)?;
    }

    heap.pop_root();
    check_value(heap, node, level as u64)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GcOutcome {
    pub allocations: u64,
    pub stats: HeapStats,
    /// The heap as the run left it, before it was dropped.
    pub summary: HeapSummary,
}

/// `iters` calls of [`linked_recursion`] at `depth` on a fresh heap.
pub fn run_gc(iters: u64, depth: u32, collect_every_pages: usize) -> Result<GcOutcome, BenchError> {
    let mut heap = Heap::new()?;
    let node_ty = heap.register_type(NODE_TYPE)?;
    let before = heap.stats().allocations;

    for _i in 0..iters {
        linked_recursion(&mut heap, node_ty, None, depth, collect_every_pages)?;
    }

    let stats = heap.stats();
    Ok(GcOutcome {
        allocations: stats.allocations - before,
        stats,
        summary: heap.summary(),
    })
}
