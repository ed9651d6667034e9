//! sysinfo-backed host sensors
//!
//! sysinfo calls block, so every collection runs on the blocking pool. The
//! sensor state is kept between calls because CPU usage and network
//! throughput are both deltas against the previous refresh.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use sysinfo::{Disks, Networks, System};
use tracing::{instrument, trace};

use super::{Collector, RawSample};
use crate::metrics::MetricKind;

const BYTES_PER_MEGABYTE: f64 = 1_000_000.0;

struct Sensors {
    system: System,
    disks: Disks,
    networks: Networks,
    last_network_refresh: Instant,
    host_name: Option<String>,
}

impl Sensors {
    fn new() -> Self {
        let mut system = System::new();
        // primes the CPU delta so the first tick has a baseline
        system.refresh_cpu_usage();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            last_network_refresh: Instant::now(),
            host_name: System::host_name(),
        }
    }

    fn sample(&self, kind: MetricKind, name: &str, value: f64) -> RawSample {
        let sample = RawSample::new(kind, name, value);
        match &self.host_name {
            Some(host) => sample.with_meta("host", host),
            None => sample,
        }
    }

    fn collect(&mut self) -> Vec<RawSample> {
        let mut samples = Vec::with_capacity(4);

        self.system.refresh_cpu_usage();
        let cpu = f64::from(self.system.global_cpu_usage()).clamp(0.0, 100.0);
        samples.push(self.sample(MetricKind::Cpu, "cpu_usage", cpu));

        self.system.refresh_memory();
        let total_memory = self.system.total_memory();
        if total_memory > 0 {
            let used = self.system.used_memory() as f64 / total_memory as f64 * 100.0;
            samples.push(self.sample(MetricKind::Memory, "memory_usage", used));
        }

        self.disks.refresh(true);
        let (total, available) = self.disks.iter().fold((0u64, 0u64), |(t, a), disk| {
            (t + disk.total_space(), a + disk.available_space())
        });
        if total > 0 {
            let used = total.saturating_sub(available) as f64 / total as f64 * 100.0;
            samples.push(
                self.sample(MetricKind::Disk, "disk_usage", used)
                    .with_meta("disks", self.disks.list().len().to_string()),
            );
        }

        self.networks.refresh(true);
        let elapsed = self.last_network_refresh.elapsed().as_secs_f64();
        self.last_network_refresh = Instant::now();
        if elapsed > 0.0 {
            let bytes: u64 = self
                .networks
                .iter()
                .map(|(_, data)| data.received() + data.transmitted())
                .sum();
            let throughput = bytes as f64 / elapsed / BYTES_PER_MEGABYTE;
            samples.push(
                self.sample(MetricKind::Network, "net_throughput", throughput)
                    .with_meta("interfaces", self.networks.len().to_string()),
            );
        }

        samples
    }
}

/// Collector reading CPU, memory, disk and network usage of the local host
pub struct SystemCollector {
    sensors: Arc<Mutex<Sensors>>,
}

impl SystemCollector {
    pub fn new() -> Self {
        Self {
            sensors: Arc::new(Mutex::new(Sensors::new())),
        }
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for SystemCollector {
    fn name(&self) -> &str {
        "system"
    }

    #[instrument(skip(self))]
    async fn collect_all(&self) -> anyhow::Result<Vec<RawSample>> {
        let sensors = self.sensors.clone();

        let samples = tokio::task::spawn_blocking(move || {
            let mut sensors = sensors
                .lock()
                .map_err(|_| anyhow::anyhow!("sensor state poisoned by an earlier panic"))?;
            anyhow::Ok(sensors.collect())
        })
        .await
        .context("system sensor task failed")??;

        trace!("collected {} system samples", samples.len());
        Ok(samples)
    }
}
