// The three ways a node can get its memory.

use crate::arena::{ALLOC_HEADER_WORDS, PageArena};
use crate::error::BenchError;
use crate::{Node, NodeAllocator};

use std::alloc::{Layout, handle_alloc_error};
use std::ptr::NonNull;
use std::rc::Rc;

/// Owned heap allocation through the global allocator.
#[derive(Debug, Default)]
pub struct Boxed {
    allocations: u64,
}

impl NodeAllocator for Boxed {
    type Handle = Box<Node>;

    const NAME: &'static str = "boxed";

    fn create() -> Result<Self, BenchError> {
        Ok(Self::default())
    }

    #[inline(always)]
    fn alloc(&mut self, value: i32) -> Box<Node> {
        self.allocations += 1;
        Box::new(Node { value })
    }

    #[inline(always)]
    fn value(&self, h: &Box<Node>) -> i32 {
        h.value
    }

    #[inline(always)]
    fn identity(h: &Box<Node>) -> usize {
        (&**h as *const Node).addr()
    }

    fn allocations(&self) -> u64 {
        self.allocations
    }
}

/// Reference-counted handles. Each node carries its own strong and weak counts.
#[derive(Debug, Default)]
pub struct Counted {
    allocations: u64,
}

impl NodeAllocator for Counted {
    type Handle = Rc<Node>;

    const NAME: &'static str = "counted";

    const OBJECT_BYTES: usize = size_of::<Node>() + 2 * size_of::<usize>();

    fn create() -> Result<Self, BenchError> {
        Ok(Self::default())
    }

    #[inline(always)]
    fn alloc(&mut self, value: i32) -> Rc<Node> {
        self.allocations += 1;
        Rc::new(Node { value })
    }

    #[inline(always)]
    fn value(&self, h: &Rc<Node>) -> i32 {
        h.value
    }

    #[inline(always)]
    fn identity(h: &Rc<Node>) -> usize {
        Rc::as_ptr(h).addr()
    }

    fn allocations(&self) -> u64 {
        self.allocations
    }
}

const NODE_TYPE: usize = 2;
const NODE_WORDS: usize = size_of::<Node>().div_ceil(size_of::<usize>());

/// A node living in a [`PageArena`]. Only valid until that arena is recycled or dropped. The
/// arena id and epoch it was allocated under are kept so a read after either panics instead of
/// touching a released page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaHandle {
    node: NonNull<Node>,
    arena: u64,
    epoch: u64,
}

pub struct Arena {
    arena: PageArena,
}

impl NodeAllocator for Arena {
    type Handle = ArenaHandle;

    const NAME: &'static str = "arena";

    const OBJECT_BYTES: usize = (ALLOC_HEADER_WORDS + NODE_WORDS) * size_of::<usize>();

    fn create() -> Result<Self, BenchError> {
        Ok(Self { arena: PageArena::new()? })
    }

    #[inline(always)]
    fn alloc(&mut self, value: i32) -> ArenaHandle {
        let words = match self.arena.alloc_words::<NODE_TYPE, NODE_WORDS>() {
            Ok(p) => p,
            Err(_) => handle_alloc_error(Layout::new::<[usize; NODE_WORDS]>()),
        };
        let node = words.cast::<Node>();
        unsafe { node.as_ptr().write(Node { value }) };
        ArenaHandle { node, arena: self.arena.id(), epoch: self.arena.epoch() }
    }

    #[inline(always)]
    fn value(&self, h: &ArenaHandle) -> i32 {
        assert!(
            h.arena == self.arena.id() && h.epoch == self.arena.epoch(),
            "arena node read after its arena was recycled or dropped"
        );
        unsafe { h.node.as_ptr().read().value }
    }

    #[inline(always)]
    fn identity(h: &ArenaHandle) -> usize {
        h.node.as_ptr().addr()
    }

    fn recycle(&mut self) {
        self.arena.reset();
    }

    fn allocations(&self) -> u64 {
        self.arena.allocations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn help_values_round_trip<A: NodeAllocator>() {
        let mut al = A::create().unwrap();
        let hs: Vec<A::Handle> = (0..1000).map(|i| al.alloc(i)).collect();
        for (i, h) in hs.iter().enumerate() {
            assert_eq!(al.value(h), i as i32);
        }
        assert_eq!(al.allocations(), 1000);
    }

    fn help_identities_are_distinct<A: NodeAllocator>() {
        let mut al = A::create().unwrap();
        let hs: Vec<A::Handle> = (0..1000).map(|i| al.alloc(i)).collect();
        let ids: ahash::HashSet<usize> = hs.iter().map(A::identity).collect();
        assert_eq!(ids.len(), hs.len());
    }

    #[test]
    fn boxed_values() {
        help_values_round_trip::<Boxed>();
        help_identities_are_distinct::<Boxed>();
    }

    #[test]
    fn counted_values() {
        help_values_round_trip::<Counted>();
        help_identities_are_distinct::<Counted>();
    }

    #[test]
    fn arena_values() {
        help_values_round_trip::<Arena>();
        help_identities_are_distinct::<Arena>();
    }

    #[test]
    fn arena_nodes_are_one_header_apart() {
        let mut al = Arena::create().unwrap();
        let a = al.alloc(1);
        let b = al.alloc(2);
        assert_eq!(Arena::identity(&b) - Arena::identity(&a), Arena::OBJECT_BYTES);
    }

    #[test]
    fn arena_recycle_reuses_memory() {
        let mut al = Arena::create().unwrap();
        let a = al.alloc(1);
        let addr = Arena::identity(&a);
        al.recycle();
        let b = al.alloc(2);
        assert_eq!(Arena::identity(&b), addr);
        assert_eq!(al.value(&b), 2);
        assert_eq!(al.arena.page_count(), 1);
    }

    #[test]
    #[should_panic(expected = "recycled")]
    fn arena_stale_handle_panics() {
        let mut al = Arena::create().unwrap();
        let a = al.alloc(1);
        al.recycle();
        al.value(&a);
    }

    #[test]
    #[should_panic(expected = "recycled or dropped")]
    fn handle_from_a_dropped_arena_panics() {
        let mut a = Arena::create().unwrap();
        let hs: Vec<ArenaHandle> = (0..200_000).map(|i| a.alloc(i)).collect();
        let h = hs[hs.len() - 1];
        drop(a);

        // A fresh arena starts at the same epoch as the dropped one did.
        let b = Arena::create().unwrap();
        b.value(&h);
    }

    #[test]
    #[should_panic(expected = "recycled or dropped")]
    fn handle_from_another_live_arena_panics() {
        let mut a = Arena::create().unwrap();
        let b = Arena::create().unwrap();
        let h = a.alloc(5);
        b.value(&h);
    }
}
