//! Stress testing for the flusher.
//!
//! Runs writer, sync and writeback threads against one [`TestVolume`] and
//! checks the delta ordering invariant and sync durability while they race.

use crate::fixtures::TestVolume;
use deltaflush_core::{
    CancelToken, DeltaBackend, DeltaSnapshot, FlushError, FlushPolicyKind, StatsSnapshot,
    UnifyMode, WritebackBudget,
};
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Writer threads.
    pub writers: usize,
    /// Threads calling `sync`.
    pub syncers: usize,
    /// Threads calling `writeback`, standing in for the host scheduler.
    pub drainers: usize,
    /// Operations per thread.
    pub operations: usize,
    /// Upper bound on how long a writer holds its delta reference.
    pub max_hold: Duration,
    /// Bound on each sync or writeback call.
    pub op_timeout: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            writers: 4,
            syncers: 2,
            drainers: 1,
            operations: 200,
            max_hold: Duration::from_micros(200),
            op_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    /// Policy the volume ran.
    pub policy: FlushPolicyKind,
    /// Writes completed.
    pub writes: usize,
    /// Syncs that returned `Ok`.
    pub syncs_ok: usize,
    /// Syncs that gave up at their deadline.
    pub syncs_timed_out: usize,
    /// Syncs that failed with a backend error.
    pub syncs_failed: usize,
    /// Writeback calls made.
    pub drains: usize,
    /// Writeback calls that failed with a backend error.
    pub drains_failed: usize,
    /// Times `committed ≤ staging ≤ current` was observed broken.
    pub invariant_violations: usize,
    /// Explicit syncs that returned before the delta they started in was
    /// committed.
    pub durability_violations: usize,
    /// Wall time of the run in milliseconds.
    pub elapsed_ms: u64,
    /// Writes plus syncs per second.
    pub ops_per_second: f64,
    /// Counters at the end of the run.
    pub final_state: DeltaSnapshot,
    /// Flusher statistics at the end of the run.
    pub stats: StatsSnapshot,
}

impl StressReport {
    /// Returns true if no invariant or durability violation was seen.
    pub fn is_clean(&self) -> bool {
        self.invariant_violations == 0 && self.durability_violations == 0
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Policy: {:?}", self.policy);
        println!("Writes: {}", self.writes);
        println!(
            "Syncs: {} ok, {} timed out, {} failed",
            self.syncs_ok, self.syncs_timed_out, self.syncs_failed
        );
        println!("Drains: {} ({} failed)", self.drains, self.drains_failed);
        println!("Invariant violations: {}", self.invariant_violations);
        println!("Durability violations: {}", self.durability_violations);
        println!(
            "Final: staging {} committed {}",
            self.final_state.staging, self.final_state.committed
        );
        println!("Duration: {} ms", self.elapsed_ms);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

#[derive(Default)]
struct Counters {
    writes: AtomicUsize,
    syncs_ok: AtomicUsize,
    syncs_timed_out: AtomicUsize,
    syncs_failed: AtomicUsize,
    drains: AtomicUsize,
    drains_failed: AtomicUsize,
    invariant_violations: AtomicUsize,
    durability_violations: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs writers, syncers and drainers concurrently against `tv`.
pub fn run_stress(tv: &TestVolume, config: &StressConfig) -> StressReport {
    let counters = Counters::default();
    let durable_checked = tv.policy_kind() == FlushPolicyKind::Explicit;
    let start = Instant::now();

    thread::scope(|s| {
        for _ in 0..config.writers {
            s.spawn(|| writer_loop(tv, config, &counters));
        }
        for _ in 0..config.syncers {
            s.spawn(|| syncer_loop(tv, config, &counters, durable_checked));
        }
        for _ in 0..config.drainers {
            s.spawn(|| drainer_loop(tv, config, &counters));
        }
    });

    let elapsed = start.elapsed();
    let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
    let writes = load(&counters.writes);
    let syncs_ok = load(&counters.syncs_ok);
    let ops = writes + syncs_ok;
    let ops_per_second = if elapsed.as_secs_f64() > 0.0 {
        ops as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    StressReport {
        policy: tv.policy_kind(),
        writes,
        syncs_ok,
        syncs_timed_out: load(&counters.syncs_timed_out),
        syncs_failed: load(&counters.syncs_failed),
        drains: load(&counters.drains),
        drains_failed: load(&counters.drains_failed),
        invariant_violations: load(&counters.invariant_violations),
        durability_violations: load(&counters.durability_violations),
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        ops_per_second,
        final_state: tv.snapshot(),
        stats: tv.stats(),
    }
}

fn writer_loop(tv: &TestVolume, config: &StressConfig, counters: &Counters) {
    let mut rng = rand::thread_rng();
    let max_hold = u64::try_from(config.max_hold.as_micros()).unwrap_or(u64::MAX);
    for _ in 0..config.operations {
        let pin = tv.backend.begin_write();
        if max_hold > 0 {
            thread::sleep(Duration::from_micros(rng.gen_range(0..=max_hold)));
        }
        tv.backend.release_delta(tv.state(), pin);
        Counters::bump(&counters.writes);
        if !tv.invariant_holds() {
            Counters::bump(&counters.invariant_violations);
        }
    }
}

fn syncer_loop(
    tv: &TestVolume,
    config: &StressConfig,
    counters: &Counters,
    durable_checked: bool,
) {
    for _ in 0..config.operations {
        let before = tv.backend.current();
        let cancel = CancelToken::with_timeout(config.op_timeout);
        match tv.sync_with(UnifyMode::Allow, &cancel) {
            Ok(()) => {
                Counters::bump(&counters.syncs_ok);
                if durable_checked && !tv.state().committed().is_after_eq(before) {
                    Counters::bump(&counters.durability_violations);
                }
            }
            Err(FlushError::Interrupted) => Counters::bump(&counters.syncs_timed_out),
            Err(_) => Counters::bump(&counters.syncs_failed),
        }
        if !tv.invariant_holds() {
            Counters::bump(&counters.invariant_violations);
        }
    }
}

fn drainer_loop(tv: &TestVolume, config: &StressConfig, counters: &Counters) {
    for _ in 0..config.operations {
        let cancel = CancelToken::with_timeout(config.op_timeout);
        // A drain that finds nothing to flush runs into its deadline; that
        // is expected here.
        let result = tv.writeback_with(WritebackBudget::new(1024), &cancel);
        if let Err(FlushError::Backend(_)) = result {
            Counters::bump(&counters.drains_failed);
        }
        Counters::bump(&counters.drains);
        if !tv.invariant_holds() {
            Counters::bump(&counters.invariant_violations);
        }
    }
}
