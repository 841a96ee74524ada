//! Command line and run configuration. Every knob has a default, so running with no arguments
//! reproduces the plain recursive benchmark.

use crate::error::BenchError;
use crate::workload::{MAX_DEPTH, array_allocations, recursive_allocations};

use clap::{Parser, ValueEnum};

pub const RECURSION_ITERS: u64 = 1 << 24;
pub const RECURSION_DEPTH: u32 = 100;
pub const THREADS: u32 = 4;
pub const ARRAY_ITERS: u64 = 1024;
pub const ARRAY_SIZE: usize = 1 << 16;
pub const CHURN_ROUNDS: u64 = 1024;
pub const CHURN_PER_ROUND: u64 = 1024 * 256 * 3;
pub const GC_ITERS: u64 = 1 << 13;
pub const GC_DEPTH: u32 = 1000;
pub const COLLECT_EVERY_PAGES: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// Nested allocation, one node per recursion level.
    Recursive,
    /// Repeatedly refill one slot array.
    Array,
    /// The array workload on several threads at once.
    Threaded,
    /// Header-only bump allocations into a page arena, reset every round.
    Churn,
    /// Linked recursion on the mark-and-sweep heap.
    Gc,
    /// Every variant above, in order.
    All,
}

impl Variant {
    pub fn name(self) -> &'static str {
        match self {
            Variant::Recursive => "recursive",
            Variant::Array => "array",
            Variant::Threaded => "threaded",
            Variant::Churn => "churn",
            Variant::Gc => "gc",
            Variant::All => "all",
        }
    }

    /// The concrete variants this one stands for.
    pub fn expand(self) -> &'static [Variant] {
        match self {
            Variant::Recursive => &[Variant::Recursive],
            Variant::Array => &[Variant::Array],
            Variant::Threaded => &[Variant::Threaded],
            Variant::Churn => &[Variant::Churn],
            Variant::Gc => &[Variant::Gc],
            Variant::All => &[Variant::Recursive, Variant::Array, Variant::Threaded, Variant::Churn, Variant::Gc],
        }
    }

    /// Whether the `--strategy` choice applies. Churn and gc bring their own allocator.
    pub fn uses_strategy(self) -> bool {
        matches!(self, Variant::Recursive | Variant::Array | Variant::Threaded)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// `Box` through the global allocator.
    #[default]
    Boxed,
    /// `Rc` through the global allocator.
    Counted,
    /// Bump allocation from word pages.
    Arena,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Boxed => "boxed",
            Strategy::Counted => "counted",
            Strategy::Arena => "arena",
        }
    }
}

/// Object allocation throughput microbenchmarks.
#[derive(Clone, Debug, Parser)]
#[command(name = "allocbench", version, about)]
pub struct Config {
    /// Which benchmark to run.
    #[arg(long, value_enum, default_value_t = Variant::Recursive)]
    pub variant: Variant,

    /// Where nodes get their memory (recursive, array and threaded only).
    #[arg(long, value_enum, default_value_t = Strategy::Boxed)]
    pub strategy: Strategy,

    /// Iterations (rounds, for churn). Defaults depend on the variant.
    #[arg(long)]
    pub iters: Option<u64>,

    /// Recursion depth for the recursive and gc variants.
    #[arg(long)]
    pub depth: Option<u32>,

    /// Worker threads for the threaded variant.
    #[arg(long, default_value_t = THREADS)]
    pub threads: u32,

    /// Slots in each array for the array and threaded variants.
    #[arg(long, default_value_t = ARRAY_SIZE)]
    pub array_size: usize,

    /// Collect once this many pages have been added to the gc heap.
    #[arg(long, default_value_t = COLLECT_EVERY_PAGES)]
    pub collect_every_pages: usize,

    /// Print diagnostics to stderr and a summary line per result.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            variant: Variant::Recursive,
            strategy: Strategy::Boxed,
            iters: None,
            depth: None,
            threads: THREADS,
            array_size: ARRAY_SIZE,
            collect_every_pages: COLLECT_EVERY_PAGES,
            verbose: false,
        }
    }
}

impl Config {
    pub fn iters_for(&self, variant: Variant) -> u64 {
        self.iters.unwrap_or(match variant {
            Variant::Recursive | Variant::All => RECURSION_ITERS,
            Variant::Array | Variant::Threaded => ARRAY_ITERS,
            Variant::Churn => CHURN_ROUNDS,
            Variant::Gc => GC_ITERS,
        })
    }

    pub fn depth_for(&self, variant: Variant) -> u32 {
        self.depth.unwrap_or(match variant {
            Variant::Gc => GC_DEPTH,
            _ => RECURSION_DEPTH,
        })
    }

    /// How many allocations `variant` will make under this configuration, if that fits a `u64`.
    pub fn expected_allocations(&self, variant: Variant) -> Option<u64> {
        let iters = self.iters_for(variant);
        match variant {
            Variant::Recursive | Variant::Gc => recursive_allocations(iters, self.depth_for(variant)),
            Variant::Array => array_allocations(1, iters, self.array_size as u64),
            Variant::Threaded => array_allocations(self.threads, iters, self.array_size as u64),
            Variant::Churn => iters.checked_mul(CHURN_PER_ROUND),
            Variant::All => {
                let mut total = 0u64;
                for v in Variant::All.expand() {
                    total = total.checked_add(self.expected_allocations(*v)?)?;
                }
                Some(total)
            }
        }
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        for &v in self.variant.expand() {
            let depth = self.depth_for(v);
            match v {
                Variant::Recursive | Variant::Gc if depth > MAX_DEPTH => {
                    return Err(BenchError::InvalidConfig(format!("depth {depth} is above the maximum of {MAX_DEPTH}")));
                }
                Variant::Threaded if self.threads == 0 => {
                    return Err(BenchError::InvalidConfig("threads must be at least 1".to_string()));
                }
                Variant::Gc if self.collect_every_pages == 0 => {
                    return Err(BenchError::InvalidConfig("collect-every-pages must be at least 1".to_string()));
                }
                _ => {}
            }
            if self.expected_allocations(v).is_none() {
                return Err(BenchError::InvalidConfig(format!("{} allocation count overflows u64", v.name())));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("allocbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_arguments_is_the_recursive_benchmark() {
        let c = parse(&[]);
        assert_eq!(c.variant, Variant::Recursive);
        assert_eq!(c.strategy, Strategy::Boxed);
        assert_eq!(c.iters_for(c.variant), RECURSION_ITERS);
        assert_eq!(c.depth_for(c.variant), RECURSION_DEPTH);
        assert_eq!(c.expected_allocations(c.variant), Some((1 << 24) * 101));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn per_variant_defaults() {
        let c = Config::default();
        assert_eq!(c.iters_for(Variant::Threaded), ARRAY_ITERS);
        assert_eq!(c.expected_allocations(Variant::Threaded), Some(4 * 1024 * (1 << 16)));
        assert_eq!(c.iters_for(Variant::Churn), CHURN_ROUNDS);
        assert_eq!(c.iters_for(Variant::Gc), GC_ITERS);
        assert_eq!(c.depth_for(Variant::Gc), GC_DEPTH);
    }

    #[test]
    fn flags_override_defaults() {
        let c = parse(&["--variant", "threaded", "--strategy", "arena", "--iters", "7", "--threads", "2", "--array-size", "10"]);
        assert_eq!(c.variant, Variant::Threaded);
        assert_eq!(c.strategy, Strategy::Arena);
        assert_eq!(c.expected_allocations(Variant::Threaded), Some(140));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn unknown_variant_is_a_parse_error() {
        assert!(Config::try_parse_from(["allocbench", "--variant", "sideways"]).is_err());
    }

    #[test]
    fn bad_configs_are_rejected() {
        let c = parse(&["--variant", "threaded", "--threads", "0"]);
        assert!(matches!(c.validate(), Err(BenchError::InvalidConfig(_))));

        let c = parse(&["--depth", "50000"]);
        assert!(c.validate().is_ok());
        let c = parse(&["--variant", "gc", "--depth", "50000"]);
        assert!(c.validate().is_ok());

        let c = parse(&["--depth", "50001"]);
        assert!(matches!(c.validate(), Err(BenchError::InvalidConfig(_))));

        let c = parse(&["--variant", "gc", "--collect-every-pages", "0"]);
        assert!(matches!(c.validate(), Err(BenchError::InvalidConfig(_))));

        let c = parse(&["--iters", "18446744073709551615"]);
        assert!(matches!(c.validate(), Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn zero_threads_only_matters_for_threaded() {
        let c = parse(&["--variant", "array", "--threads", "0"]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn all_expands_to_every_variant() {
        let vs = Variant::All.expand();
        assert_eq!(vs.len(), 5);
        assert!(!vs.contains(&Variant::All));
        assert!(Variant::Recursive.uses_strategy());
        assert!(!Variant::Gc.uses_strategy());
    }
}
