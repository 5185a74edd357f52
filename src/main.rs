mod addr;
mod cache;
mod config;
mod error;
mod hierarchy;
mod replace;
mod trace;

use std::{fs, process};

use log::{error, info, warn};

use crate::{
    config::Config,
    error::SimError,
    hierarchy::{Hierarchy, HierarchyStats},
    trace::Trace,
};

struct RunOpts {
    n_warm: u64,
    n_refs: u64,
    heartbeat_int: u64,
    strict: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        error!("{err}");
        process::exit(1);
    }
}

fn run() -> Result<(), SimError> {
    let mut args = pico_args::Arguments::from_env();
    let opts = RunOpts {
        n_warm: args.opt_value_from_str("-w")?.unwrap_or(0),
        n_refs: args.opt_value_from_str("-i")?.unwrap_or(0),
        heartbeat_int: args.opt_value_from_str("-h")?.unwrap_or(0),
        strict: args.contains("--strict"),
    };

    let mut config: Config = if let Some(config_str) = args.opt_value_from_str::<_, String>("--config")? {
        serde_json::from_str(&config_str)?
    } else if let Some(config_path) = args.opt_value_from_str::<_, String>("-p")? {
        serde_json::from_str(&fs::read_to_string(config_path)?)?
    } else {
        Config::default()
    };
    config.override_from(&mut args)?;
    let mut hierarchy = config.to_hierarchy()?;

    let stats_path: Option<String> = args.opt_value_from_str("--json")?;
    let trace_path: String = args
        .opt_value_from_str("-t")?
        .ok_or(SimError::Usage("Must provide a trace with -t"))?;
    let refs_per_block: usize = args.opt_value_from_str("--buffer-size")?.unwrap_or(1024 * 16);
    let blocks_per_queue: usize = args.opt_value_from_str("--queue-size")?.unwrap_or(32);

    let leftover = args.finish();
    if !leftover.is_empty() {
        warn!("Ignoring unused arguments: {leftover:?}");
    }

    info!("{config:?}");
    for cache in hierarchy.levels() {
        let geo = cache.geometry;
        info!(
            "{}: {} bytes, {} sets x {} ways x {} byte blocks, hit latency {}",
            cache.name(),
            geo.capacity(),
            geo.n_sets,
            geo.n_ways,
            geo.block_size,
            cache.hit_latency
        );
    }
    let trace = Trace::read(trace_path.into(), refs_per_block, blocks_per_queue)?;
    let stats = simulate(&mut hierarchy, &trace, &opts)?;

    print_summary(&stats);
    if let Some(stats_path) = stats_path {
        let stats_file = fs::File::create(stats_path)?;
        serde_json::to_writer_pretty(stats_file, &stats)?;
    }
    Ok(())
}

/// Replays the trace one reference at a time. References without an explicit
/// time are stamped with their position in the trace.
fn simulate(hierarchy: &mut Hierarchy, trace: &Trace, opts: &RunOpts) -> Result<HierarchyStats, SimError> {
    let mut warmup = opts.n_warm > 0;
    let mut goal = if warmup { opts.n_warm } else { opts.n_refs };
    let mut next_heartbeat = opts.heartbeat_int;
    let mut ref_idx: u64 = 0;
    let mut skipped: u64 = 0;

    'replay: for block in trace.rec.iter() {
        for r in block? {
            let now = r.time.unwrap_or(ref_idx);
            match hierarchy.access_raw(r.address, r.kind, now) {
                Ok(_) => {}
                Err(source) if opts.strict => {
                    return Err(SimError::Access {
                        index: ref_idx,
                        source,
                    })
                }
                Err(err) => {
                    warn!("Skipping trace line {}: {err}", r.line);
                    skipped += 1;
                }
            }
            ref_idx += 1;

            if opts.heartbeat_int != 0 && ref_idx >= next_heartbeat {
                info!("References: {ref_idx}");
                next_heartbeat += opts.heartbeat_int;
            }

            if goal != 0 && ref_idx >= goal {
                if warmup {
                    hierarchy.clear_stats();
                    warmup = false;
                    goal = if opts.n_refs == 0 { 0 } else { ref_idx + opts.n_refs };
                    info!("Finished Warmup!");
                } else {
                    break 'replay;
                }
            }
        }
    }
    if warmup {
        warn!("Trace ended during warm-up after {ref_idx} references");
    }
    if skipped > 0 {
        warn!("Skipped {skipped} references with an invalid access type");
    }
    info!("Ran {ref_idx} references");

    Ok(hierarchy.make_stats())
}

fn print_summary(stats: &HierarchyStats) {
    println!(
        "references: {} (reads {}, writes {})",
        stats.references, stats.reads, stats.writes
    );
    for cache in &stats.caches {
        println!(
            "{}: hits {} misses {} miss rate {:.4} write-backs {} back-invalidations {} resident {}",
            cache.name,
            cache.hits,
            cache.misses,
            cache.miss_rate,
            cache.write_backs,
            cache.back_invalidations,
            cache.resident
        );
    }
    println!("memory accesses: {}", stats.memory_accesses);
    println!(
        "total latency: {} (avg {:.3} per reference)",
        stats.total_latency, stats.avg_latency
    );
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn opts() -> RunOpts {
        RunOpts {
            n_warm: 0,
            n_refs: 0,
            heartbeat_int: 0,
            strict: false,
        }
    }

    fn l1_only() -> Hierarchy {
        Config {
            l1_size: 4 * 32,
            l1_block_size: 32,
            l1_assoc: 1,
            l1_hit_latency: 1,
            mem_latency: 100,
            ..Config::default()
        }
        .to_hierarchy()
        .unwrap()
    }

    fn trace(text: &'static str) -> Trace {
        Trace::from_reader(Cursor::new(text), 2, 2)
    }

    #[test]
    fn replays_whole_trace() {
        let mut h = l1_only();
        let stats = simulate(&mut h, &trace("r 0\nr 0\nw 80\nr 0\n"), &opts()).unwrap();
        assert_eq!(stats.references, 4);
        assert_eq!(stats.writes, 1);
        // 0x80 conflicts with 0 in a 4-set direct-mapped cache
        assert_eq!(stats.total_latency, 101 + 1 + 101 + 201);
    }

    #[test]
    fn skips_invalid_types_unless_strict() {
        let mut h = l1_only();
        let stats = simulate(&mut h, &trace("r 0\nq 20\nr 0\n"), &opts()).unwrap();
        assert_eq!(stats.references, 2);
        assert_eq!(stats.total_latency, 102);

        let mut h = l1_only();
        let strict = RunOpts {
            strict: true,
            ..opts()
        };
        let err = simulate(&mut h, &trace("r 0\nq 20\nr 0\n"), &strict).unwrap_err();
        assert!(matches!(err, SimError::Access { index: 1, .. }));
    }

    #[test]
    fn warmup_resets_counters_not_contents() {
        let mut h = l1_only();
        let warm = RunOpts {
            n_warm: 1,
            ..opts()
        };
        let stats = simulate(&mut h, &trace("r 0\nr 0\nr 20\n"), &warm).unwrap();
        assert_eq!(stats.references, 2);
        assert_eq!(stats.caches[0].hits, 1);
        assert_eq!(stats.caches[0].misses, 1);
    }

    #[test]
    fn stops_after_measured_references() {
        let mut h = l1_only();
        let limited = RunOpts {
            n_warm: 1,
            n_refs: 2,
            ..opts()
        };
        let stats = simulate(&mut h, &trace("r 0\nr 0\nr 20\nr 40\nr 60\n"), &limited).unwrap();
        assert_eq!(stats.references, 2);
    }

    #[test]
    fn explicit_times_drive_lru() {
        let mut h = Config {
            l1_size: 2 * 32,
            l1_block_size: 32,
            l1_assoc: 2,
            ..Config::default()
        }
        .to_hierarchy()
        .unwrap();
        // 0x20 is touched last by timestamp even though it appears earlier
        let text = "r 0 1\nr 20 9\nr 0 5\nr 40 10\n";
        simulate(&mut h, &trace(text), &opts()).unwrap();
        assert!(!h.contains(0, 0));
        assert!(h.contains(0, 0x20));
    }

    #[test]
    fn parse_errors_abort_the_run() {
        let mut h = l1_only();
        let err = simulate(&mut h, &trace("r 0\nr zz\n"), &opts()).unwrap_err();
        assert!(matches!(err, SimError::Trace(_)));
    }
}
