//! Simulate command implementation.
//!
//! Mounts a volume over the simulated backend and races writers, syncers
//! and drainers against it.

use deltaflush_core::{FlushPolicyKind, FlusherConfig};
use deltaflush_testkit::{run_stress, SimHost, StressConfig, StressReport, TestVolume};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Options for one simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Flusher configuration to mount with.
    pub config: FlusherConfig,
    /// Thread counts, operations and timings.
    pub stress: StressConfig,
    /// Extra latency added to every backend transition and flush.
    pub backend_latency: Duration,
}

/// Runs the simulation and returns its report.
pub fn simulate(options: &SimulateOptions) -> StressReport {
    let mut config = options.config.clone();
    // Host-driven drains wait for any pending delta; bound them so an idle
    // drain cannot stall the run.
    if config.policy == FlushPolicyKind::HostDriven && config.drain_timeout.is_none() {
        config.drain_timeout = Some(options.stress.op_timeout);
    }

    let host = match config.policy {
        FlushPolicyKind::HostDriven => Some(Arc::new(SimHost::new(true))),
        FlushPolicyKind::Explicit => None,
    };
    let current = config.initial_delta.wrapping_add(1);
    let tv = TestVolume::mount(config, current, host);
    tv.backend.set_latency(options.backend_latency);

    info!(
        policy = ?tv.policy_kind(),
        writers = options.stress.writers,
        syncers = options.stress.syncers,
        drainers = options.stress.drainers,
        operations = options.stress.operations,
        "starting simulation"
    );
    let report = run_stress(&tv, &options.stress);
    tv.volume.unmount();

    if !report.is_clean() {
        warn!(
            invariant_violations = report.invariant_violations,
            durability_violations = report.durability_violations,
            "simulation found violations"
        );
    }
    report
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = simulate(options);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => report.print_summary("Simulation"),
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err("simulation found ordering or durability violations".into())
    }
}
