// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic readers feeding the [`SnapshotStore`].
//!
//! Each collector owns a disjoint set of gauge names. A reading that is unavailable on a given
//! tick is left out of that tick's output and the previous value stays in the store.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::snapshot::SnapshotStore;

pub type Reading = (String, f64);

pub trait Collector: Send {
    fn name(&self) -> &str;

    /// Takes one set of readings.
    fn collect(&mut self) -> Vec<Reading>;

    /// Whether a tick of this collector counts towards `PollCount`.
    fn counts_polls(&self) -> bool {
        false
    }
}

/// Lightweight readings of the agent process itself, plus a random jitter value.
///
/// This is the primary collector: each of its ticks increments the poll count.
pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!("Could not resolve agent pid, process readings disabled: {e}");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(7);

        if let Some(pid) = self.pid {
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::everything(),
            );
            match self.system.process(pid) {
                Some(process) => {
                    let disk = process.disk_usage();
                    readings.extend([
                        ("ResidentMemory".to_string(), process.memory() as f64),
                        ("VirtualMemory".to_string(), process.virtual_memory() as f64),
                        ("CPUUsage".to_string(), f64::from(process.cpu_usage())),
                        ("RunTime".to_string(), process.run_time() as f64),
                        ("DiskReadBytes".to_string(), disk.total_read_bytes as f64),
                        ("DiskWrittenBytes".to_string(), disk.total_written_bytes as f64),
                    ]);
                }
                None => debug!("Agent process {pid} not visible, skipping process readings"),
            }
        }

        readings.push(("RandomValue".to_string(), rand::random::<f64>()));
        readings
    }

    fn counts_polls(&self) -> bool {
        true
    }
}

/// Host-wide memory and per-CPU utilization.
pub struct HostCollector {
    system: System,
}

impl HostCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for HostCollector {
    fn name(&self) -> &str {
        "host"
    }

    fn collect(&mut self) -> Vec<Reading> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let mut readings = Vec::with_capacity(2 + self.system.cpus().len());
        let total = self.system.total_memory();
        if total > 0 {
            readings.push(("TotalMemory".to_string(), total as f64));
            readings.push(("FreeMemory".to_string(), self.system.free_memory() as f64));
        } else {
            debug!("Host memory statistics unavailable");
        }

        for (i, cpu) in self.system.cpus().iter().enumerate() {
            readings.push((
                format!("CPUutilization{}", i + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }
        readings
    }
}

/// Runs `collector` every `interval` until `cancel` fires. The first tick is immediate.
///
/// Sampling happens on the blocking pool since process and CPU refreshes read from procfs.
pub async fn run_collector(
    mut collector: Box<dyn Collector>,
    interval: Duration,
    store: Arc<SnapshotStore>,
    cancel: CancellationToken,
) {
    let name = collector.name().to_string();
    let counts_polls = collector.counts_polls();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!("Starting {name} collector every {interval:?}");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sampled = tokio::task::spawn_blocking(move || {
            let readings = collector.collect();
            (collector, readings)
        })
        .await;
        match sampled {
            Ok((returned, readings)) => {
                collector = returned;
                store.record(readings, counts_polls);
            }
            Err(e) => {
                error!("{name} collector failed: {e}");
                return;
            }
        }
    }
    debug!("{name} collector stopped");
}
