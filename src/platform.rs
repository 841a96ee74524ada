// Clocks. Wall-clock time is what the reports use; per-thread CPU time is available for
// diagnostics.

use crate::report::Nanoseconds;

#[cfg(target_os = "linux")]
pub mod p {
    use crate::report::Nanoseconds;
    use rustix::time::{ClockId, clock_gettime};

    fn clock(id: ClockId) -> Nanoseconds {
        let ts = clock_gettime(id);
        debug_assert!(ts.tv_sec >= 0);
        debug_assert!(ts.tv_nsec >= 0);
        Nanoseconds(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
    }

    pub fn clock_monotonic() -> Nanoseconds {
        clock(ClockId::Monotonic)
    }

    pub fn thread_cputime() -> Nanoseconds {
        clock(ClockId::ThreadCPUTime)
    }
}

#[cfg(not(target_os = "linux"))]
pub mod p {
    use crate::report::Nanoseconds;
    use lazy_static::lazy_static;
    use std::time::Instant;

    lazy_static! {
        static ref EPOCH: Instant = Instant::now();
    }

    pub fn clock_monotonic() -> Nanoseconds {
        Nanoseconds(EPOCH.elapsed().as_nanos() as u64)
    }

    // No portable per-thread CPU clock in std.
    pub fn thread_cputime() -> Nanoseconds {
        clock_monotonic()
    }
}

pub fn clock_monotonic() -> Nanoseconds {
    p::clock_monotonic()
}

pub fn thread_cputime() -> Nanoseconds {
    p::thread_cputime()
}

/// Runs `f` and returns its result together with the wall-clock time it took.
#[inline(never)]
pub fn timed<R, F: FnOnce() -> R>(f: F) -> (R, Nanoseconds) {
    let start = clock_monotonic();
    let r = f();
    let end = clock_monotonic();
    (r, end - start)
}
