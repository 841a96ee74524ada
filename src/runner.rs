// Turns a validated `Config` into timed runs. Setup (creating allocators, slot arrays, heaps)
// happens before the clock starts. The recursive and gc variants run on a thread whose stack is
// sized for their depth.

use crate::arena::{self, PageArena, run_churn};
use crate::config::{CHURN_PER_ROUND, Config, Strategy, Variant};
use crate::error::BenchError;
use crate::gc::{self, run_gc};
use crate::platform::{thread_cputime, timed};
use crate::report::Report;
use crate::strategy::{Arena, Boxed, Counted};
use crate::threaded::run_threaded;
use crate::workload::{new_slots, on_deep_stack, run_array, run_recursive};
use crate::{Checksum, NodeAllocator, diag_info, diag_warn};

use thousands::Separable;

/// Runs every variant `config` selects, in order.
pub fn run(config: &Config) -> Result<Vec<Report>, BenchError> {
    config.validate()?;

    let mut reports = Vec::new();
    for &v in config.variant.expand() {
        reports.push(run_variant(config, v)?);
    }
    Ok(reports)
}

pub fn run_variant(config: &Config, variant: Variant) -> Result<Report, BenchError> {
    diag_info!(
        "running {}, {} allocations expected",
        variant.name(),
        config.expected_allocations(variant).unwrap_or(0).separate_with_commas()
    );

    if !variant.uses_strategy() && config.strategy != Strategy::default() {
        diag_warn!("--strategy {} has no effect on the {} variant", config.strategy.name(), variant.name());
    }

    let r = match (variant, config.strategy) {
        (Variant::Recursive, Strategy::Boxed) => recursive_report::<Boxed>(config),
        (Variant::Recursive, Strategy::Counted) => recursive_report::<Counted>(config),
        (Variant::Recursive, Strategy::Arena) => recursive_report::<Arena>(config),
        (Variant::Array, Strategy::Boxed) => array_report::<Boxed>(config),
        (Variant::Array, Strategy::Counted) => array_report::<Counted>(config),
        (Variant::Array, Strategy::Arena) => array_report::<Arena>(config),
        (Variant::Threaded, Strategy::Boxed) => threaded_report::<Boxed>(config),
        (Variant::Threaded, Strategy::Counted) => threaded_report::<Counted>(config),
        (Variant::Threaded, Strategy::Arena) => threaded_report::<Arena>(config),
        (Variant::Churn, _) => churn_report(config),
        (Variant::Gc, _) => gc_report(config),
        (Variant::All, _) => Err(BenchError::InvalidConfig("all is not a single variant".to_string())),
    }?;

    diag_info!("{}: checksum {:#018x}", r.name, r.checksum);
    Ok(r)
}

fn report_name(variant: Variant, strategy: &str) -> String {
    format!("{}/{}", variant.name(), strategy)
}

fn recursive_report<A: NodeAllocator>(config: &Config) -> Result<Report, BenchError> {
    on_deep_stack(config.depth_for(Variant::Recursive), || recursive_report_here::<A>(config))?
}

fn recursive_report_here<A: NodeAllocator>(config: &Config) -> Result<Report, BenchError> {
    let iters = config.iters_for(Variant::Recursive);
    let depth = config.depth_for(Variant::Recursive);

    let mut al = A::create()?;
    let mut sink = Checksum::new();

    let cpu_start = thread_cputime();
    let (allocations, elapsed) = timed(|| run_recursive(&mut al, iters, depth, &mut sink));
    diag_info!("recursive: {} ns of thread cpu time", thread_cputime() - cpu_start);

    Ok(Report {
        name: report_name(Variant::Recursive, A::NAME),
        threads: 1,
        allocations,
        elapsed,
        object_bytes: A::OBJECT_BYTES,
        checksum: sink.finish(),
    })
}

fn array_report<A: NodeAllocator>(config: &Config) -> Result<Report, BenchError> {
    let iters = config.iters_for(Variant::Array);

    let mut al = A::create()?;
    let mut slots = new_slots::<A>(config.array_size);
    let mut sink = Checksum::new();

    let cpu_start = thread_cputime();
    let (allocations, elapsed) = timed(|| run_array(&mut al, iters, &mut slots, &mut sink));
    diag_info!("array: {} ns of thread cpu time", thread_cputime() - cpu_start);

    Ok(Report {
        name: report_name(Variant::Array, A::NAME),
        threads: 1,
        allocations,
        elapsed,
        object_bytes: A::OBJECT_BYTES,
        checksum: sink.finish(),
    })
}

fn threaded_report<A: NodeAllocator>(config: &Config) -> Result<Report, BenchError> {
    let iters = config.iters_for(Variant::Threaded);
    let out = run_threaded::<A>(config.threads, iters, config.array_size)?;

    Ok(Report {
        name: report_name(Variant::Threaded, A::NAME),
        threads: config.threads,
        allocations: out.allocations,
        elapsed: out.elapsed,
        object_bytes: A::OBJECT_BYTES,
        checksum: out.checksum,
    })
}

fn churn_report(config: &Config) -> Result<Report, BenchError> {
    let rounds = config.iters_for(Variant::Churn);

    let mut pages = PageArena::new()?;
    let (allocations, elapsed) = timed(|| run_churn(&mut pages, rounds, CHURN_PER_ROUND));
    let allocations = allocations?;
    diag_info!("churn: arena at epoch {} with {} page(s)", pages.epoch(), pages.page_count());

    Ok(Report {
        name: report_name(Variant::Churn, "arena"),
        threads: 1,
        allocations,
        elapsed,
        object_bytes: arena::ALLOC_HEADER_WORDS * size_of::<usize>(),
        checksum: pages.epoch(),
    })
}

fn gc_report(config: &Config) -> Result<Report, BenchError> {
    on_deep_stack(config.depth_for(Variant::Gc), || gc_report_here(config))?
}

fn gc_report_here(config: &Config) -> Result<Report, BenchError> {
    let iters = config.iters_for(Variant::Gc);
    let depth = config.depth_for(Variant::Gc);

    let (r, elapsed) = timed(|| run_gc(iters, depth, config.collect_every_pages));
    let out = r?;
    diag_info!(
        "gc: {} collections, {} pages added, {} released",
        out.stats.collections,
        out.stats.pages_added,
        out.stats.pages_freed
    );
    diag_info!(
        "gc: heap left with {} page(s), {} object(s), {} word(s) in use",
        out.summary.pages,
        out.summary.objects.separate_with_commas(),
        out.summary.words_used.separate_with_commas()
    );

    Ok(Report {
        name: report_name(Variant::Gc, "mark-sweep"),
        threads: 1,
        allocations: out.allocations,
        elapsed,
        object_bytes: (gc::ALLOC_HEADER_WORDS + gc::NODE_TYPE.required_words) * size_of::<u64>(),
        checksum: out.stats.collections,
    })
}
