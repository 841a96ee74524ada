use crate::error::BenchError;

use bytesize::ByteSize;
use thousands::Separable;

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Nanoseconds(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct NanosecondsPerAlloc(pub f64);

impl Nanoseconds {
    /// Whole milliseconds, truncated.
    pub fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    pub fn per_alloc(self, allocations: u64) -> NanosecondsPerAlloc {
        NanosecondsPerAlloc(self.0 as f64 / allocations as f64)
    }
}

impl fmt::Display for Nanoseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.separate_with_commas();
        if let Some(width) = f.width() {
            write!(f, "{s:>width$}")
        } else {
            write!(f, "{s}")
        }
    }
}

impl fmt::Display for NanosecondsPerAlloc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = if self.0.is_finite() {
            format!("{}.{}", (self.0 as u64).separate_with_commas(), (self.0 * 10.0) as u64 % 10)
        } else {
            "-".to_string()
        };
        write!(f, "{full:>width$}", width = f.width().unwrap_or(0))
    }
}

impl std::ops::Sub for Nanoseconds {
    type Output = Nanoseconds;
    fn sub(self, rhs: Nanoseconds) -> Nanoseconds {
        Nanoseconds(self.0 - rhs.0)
    }
}

/// Millions of allocations per second.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Throughput(pub f64);

impl Throughput {
    /// Allocations per whole elapsed millisecond, scaled to millions per second. A run shorter
    /// than one millisecond has no defined throughput.
    pub fn from_elapsed(allocations: u64, elapsed: Nanoseconds) -> Result<Throughput, BenchError> {
        let ms = elapsed.as_millis();
        if ms == 0 {
            return Err(BenchError::SubMillisecond);
        }
        Ok(Throughput(allocations as f64 / ms as f64 * 1000.0 / 1_000_000.0))
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// The outcome of one benchmark variant.
#[derive(Clone, Debug)]
pub struct Report {
    pub name: String,
    pub threads: u32,
    pub allocations: u64,
    pub elapsed: Nanoseconds,
    /// Bytes requested per allocation, for the summary line.
    pub object_bytes: usize,
    pub checksum: u64,
}

impl Report {
    pub fn throughput(&self) -> Result<Throughput, BenchError> {
        Throughput::from_elapsed(self.allocations, self.elapsed)
    }

    /// The two result lines: elapsed milliseconds, then throughput.
    pub fn lines(&self) -> [String; 2] {
        let ms = self.elapsed.as_millis().to_string();
        let tp = match self.throughput() {
            Ok(tp) => format!("Allocs per sec (in millions) {tp}"),
            Err(_) => "Allocs per sec (in millions) undefined".to_string(),
        };
        [ms, tp]
    }

    pub fn summary_line(&self) -> String {
        let name = &self.name;
        let threads = self.threads;
        let allocs = self.allocations.separate_with_commas();
        let elap = self.elapsed;
        let nspa = self.elapsed.per_alloc(self.allocations);
        let bytes = ByteSize::b(self.allocations.saturating_mul(self.object_bytes as u64)).to_string_as(true);
        format!("name: {name:>16}, threads: {threads:>5}, allocs: {allocs:>15}, ns: {elap:>16}, ns/a: {nspa:>7}, bytes: {bytes}")
    }

    pub fn print(&self) {
        let [ms, tp] = self.lines();
        println!("{ms}");
        println!("{tp}");

        if let Err(e) = self.throughput() {
            crate::diag_warn!("{}: {}", self.name, e);
        }
        if crate::diag::verbose() {
            println!("{}", self.summary_line());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(allocations: u64, elapsed_ns: u64) -> Report {
        Report {
            name: "test".to_string(),
            threads: 1,
            allocations,
            elapsed: Nanoseconds(elapsed_ns),
            object_bytes: 4,
            checksum: 0,
        }
    }

    #[test]
    fn throughput_in_millions_per_second() {
        // 2,000,000 allocations in 1 s is 2 million per second.
        let tp = Throughput::from_elapsed(2_000_000, Nanoseconds(1_000_000_000)).unwrap();
        assert!((tp.0 - 2.0).abs() < 1e-9, "{tp:?}");

        // 1,500 allocations in 3 ms is 500 per ms, 0.5 million per second.
        let tp = Throughput::from_elapsed(1_500, Nanoseconds(3_000_000)).unwrap();
        assert!((tp.0 - 0.5).abs() < 1e-9, "{tp:?}");
    }

    #[test]
    fn throughput_uses_whole_milliseconds() {
        // 1.9 ms truncates to 1 ms.
        let tp = Throughput::from_elapsed(1_000, Nanoseconds(1_900_000)).unwrap();
        assert!((tp.0 - 1.0).abs() < 1e-9, "{tp:?}");
    }

    #[test]
    fn throughput_is_non_negative() {
        for (allocs, ns) in [(0, 1_000_000), (1, 5_000_000), (u64::MAX, 1_000_000)] {
            let tp = Throughput::from_elapsed(allocs, Nanoseconds(ns)).unwrap();
            assert!(tp.0 >= 0.0);
        }
    }

    #[test]
    fn sub_millisecond_runs_are_undefined() {
        assert_eq!(Throughput::from_elapsed(0, Nanoseconds(0)), Err(BenchError::SubMillisecond));
        assert_eq!(Throughput::from_elapsed(1_000, Nanoseconds(999_999)), Err(BenchError::SubMillisecond));
    }

    #[test]
    fn lines_are_ms_then_throughput() {
        let [ms, tp] = report(3_000_000, 1_500_000_000).lines();
        assert_eq!(ms, "1500");
        assert_eq!(tp, "Allocs per sec (in millions) 2.00");
    }

    #[test]
    fn lines_for_degenerate_run() {
        let [ms, tp] = report(0, 20_000).lines();
        assert_eq!(ms, "0");
        assert_eq!(tp, "Allocs per sec (in millions) undefined");
    }

    #[test]
    fn nanoseconds_display_has_separators() {
        assert_eq!(Nanoseconds(1_234_567).to_string(), "1,234,567");
        assert_eq!(format!("{:>10}", Nanoseconds(1_000)), "     1,000");
    }

    #[test]
    fn per_alloc_display() {
        assert_eq!(Nanoseconds(25).per_alloc(10).to_string(), "2.5");
        assert_eq!(Nanoseconds(25).per_alloc(0).to_string(), "-");
    }

    #[test]
    fn summary_mentions_name_and_counts() {
        let line = report(1_048_576, 2_000_000).summary_line();
        assert!(line.contains("test"), "{line}");
        assert!(line.contains("1,048,576"), "{line}");
        assert!(line.contains("4.0 MiB"), "{line}");
    }
}
