// Each worker builds its own allocator and slot array and runs the array workload over them.
// Nothing is shared between workers but the start barrier.

use crate::error::BenchError;
use crate::platform::clock_monotonic;
use crate::report::Nanoseconds;
use crate::workload::{new_slots, run_array};
use crate::{Checksum, NodeAllocator};

use std::sync::Barrier;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadedOutcome {
    pub allocations: u64,
    pub elapsed: Nanoseconds,
    pub checksum: u64,
}

/// Runs `threads` workers, each doing `iters` fills of its own `array_size`-slot array. The clock
/// starts when every worker is ready and stops once all of them have been joined.
pub fn run_threaded<A: NodeAllocator>(threads: u32, iters: u64, array_size: usize) -> Result<ThreadedOutcome, BenchError> {
    if threads == 0 {
        return Err(BenchError::InvalidConfig("threads must be at least 1".to_string()));
    }
    let threads = threads as usize;

    let start_barrier = Barrier::new(threads + 1);

    thread::scope(|s| {
        let start_barrier = &start_barrier;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(move || -> Result<(u64, Checksum), BenchError> {
                    let created = A::create();
                    let mut slots = new_slots::<A>(array_size);

                    // Wait even if setup failed, so the coordinator isn't left at the barrier.
                    start_barrier.wait();

                    let mut al = created?;
                    let mut sink = Checksum::new();
                    let n = run_array(&mut al, iters, &mut slots, &mut sink);
                    Ok((n, sink))
                })
            })
            .collect();

        start_barrier.wait();
        let start = clock_monotonic();

        let mut results = Vec::with_capacity(threads);
        for (i, h) in handles.into_iter().enumerate() {
            results.push(h.join().map_err(|_| BenchError::WorkerPanicked(i)));
        }

        let end = clock_monotonic();

        let mut allocations = 0u64;
        let mut checksum = Checksum::new();
        for r in results {
            let (n, sink) = r??;
            allocations += n;
            checksum.merge(sink);
        }

        Ok(ThreadedOutcome {
            allocations,
            elapsed: end - start,
            checksum: checksum.finish(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Arena, Boxed, Counted};

    #[test]
    fn four_workers_allocate_four_times_as_much() {
        let out = run_threaded::<Boxed>(4, 10, 1000).unwrap();
        assert_eq!(out.allocations, 4 * 10 * 1000);
    }

    #[test]
    fn every_strategy_works_per_thread() {
        assert_eq!(run_threaded::<Counted>(3, 5, 100).unwrap().allocations, 1500);
        assert_eq!(run_threaded::<Arena>(2, 5, 100_000).unwrap().allocations, 1_000_000);
    }

    #[test]
    fn zero_iterations_still_join() {
        let out = run_threaded::<Boxed>(4, 0, 1000).unwrap();
        assert_eq!(out.allocations, 0);
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(run_threaded::<Boxed>(0, 1, 1), Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn same_work_same_checksum() {
        let a = run_threaded::<Boxed>(2, 3, 50).unwrap();
        let b = run_threaded::<Boxed>(2, 3, 50).unwrap();
        assert_eq!(a.checksum, b.checksum);
    }
}
