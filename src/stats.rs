//! Simulation statistics collection and reporting.
//!
//! Tracks row-buffer locality, request latency, queue occupancy, command
//! counts and bank occupancy for every channel, plus memory-wide request and
//! bandwidth figures. All structures serialize to JSON for `--stats-json`.

use std::collections::BTreeMap;

use serde::Serialize;

/// Occupancy statistics of one device-tree node.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NodeStats {
    pub level: &'static str,
    pub id: usize,
    /// Cycles with at least one request in flight.
    pub active_cycles: u64,
    /// Cycles spent refreshing.
    pub refresh_cycles: u64,
    /// Cycles that were both active and refreshing.
    pub refresh_overlap_cycles: u64,
    /// Active or refreshing cycles.
    pub busy_cycles: u64,
    /// Request-cycles accumulated while serving.
    pub serving_requests: u64,
    pub average_serving_requests: f64,
}

/// Per-channel controller statistics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ControllerStats {
    pub channel: usize,
    pub cycles: u64,

    pub row_hits: u64,
    pub row_hits_read: u64,
    pub row_hits_write: u64,
    pub row_misses: u64,
    pub row_misses_read: u64,
    pub row_misses_write: u64,
    pub row_conflicts: u64,
    pub row_conflicts_read: u64,
    pub row_conflicts_write: u64,

    pub bytes_read: u64,
    pub bytes_written: u64,

    /// Rows precharged without serving a single access.
    pub useless_activates: u64,
    /// Reads answered from the write queue without touching the device.
    pub forwarded_reads: u64,

    pub reads_completed: u64,
    pub read_latency_sum: u64,
    pub read_latency_avg: f64,

    pub queue_length_sum: u64,
    pub read_queue_length_sum: u64,
    pub write_queue_length_sum: u64,
    pub queue_length_avg: f64,
    pub read_queue_length_avg: f64,
    pub write_queue_length_avg: f64,

    /// Issued commands by mnemonic.
    pub commands: BTreeMap<&'static str, u64>,

    /// Channel and rank occupancy.
    pub nodes: Vec<NodeStats>,
}

impl ControllerStats {
    /// Fills in the averages after `cycles` cycles.
    ///
    /// # Arguments
    ///
    /// * `cycles` - Length of the statistics window.
    /// * `read_requests` - Reads routed to the channel in that window.
    pub fn finish(&mut self, cycles: u64, read_requests: u64) {
        self.cycles = cycles;
        let cyc = cycles.max(1) as f64;
        self.read_latency_avg = if read_requests == 0 {
            0.0
        } else {
            self.read_latency_sum as f64 / read_requests as f64
        };
        self.queue_length_avg = self.queue_length_sum as f64 / cyc;
        self.read_queue_length_avg = self.read_queue_length_sum as f64 / cyc;
        self.write_queue_length_avg = self.write_queue_length_sum as f64 / cyc;
    }

    /// Number of times `cmd` was issued.
    pub fn command_count(&self, cmd: &str) -> u64 {
        self.commands.get(cmd).copied().unwrap_or(0)
    }
}

/// Requests issued by one device tag.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DeviceRequests {
    pub reads: u64,
    pub writes: u64,
}

/// Memory-wide statistics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MemoryStats {
    pub host_seconds: f64,
    pub cycles: u64,
    /// Memory cycles scaled by the `cpu_tick:mem_tick` ratio.
    pub cpu_cycles: u64,
    /// Cycles in which any controller had a request in flight.
    pub active_cycles: u64,
    pub read_requests: u64,
    pub write_requests: u64,
    pub incoming_requests_per_channel: Vec<u64>,
    pub incoming_reads_per_channel: Vec<u64>,
    pub requests_per_device: BTreeMap<String, DeviceRequests>,
    /// Pages remapped after the physical address space ran out.
    pub page_replacements: u64,
    /// Peak bandwidth in bytes per second.
    pub max_bandwidth: f64,
    /// Bytes moved per simulated second.
    pub achieved_bandwidth: f64,
    pub channels: Vec<ControllerStats>,
}

impl MemoryStats {
    /// Prints a formatted summary of all simulation statistics.
    ///
    /// Displays request counts, row-buffer locality, latency, queue
    /// occupancy and bank busy time per channel in a human-readable format.
    pub fn print(&self) {
        let cyc = self.cycles.max(1) as f64;

        println!("\n==========================================================");
        println!("HBM MEMORY SIMULATION STATISTICS");
        println!("==========================================================");
        println!("host_seconds             {:.4} s", self.host_seconds);
        println!("sim_cycles               {}", self.cycles);
        println!("cpu_cycles               {}", self.cpu_cycles);
        println!(
            "active_cycles            {} ({:.2}%)",
            self.active_cycles,
            (self.active_cycles as f64 / cyc) * 100.0
        );
        println!("read_requests            {}", self.read_requests);
        println!("write_requests           {}", self.write_requests);
        println!("page_replacements        {}", self.page_replacements);
        println!("max_bandwidth            {:.2} GB/s", self.max_bandwidth / 1.0e9);
        println!(
            "achieved_bandwidth       {:.2} GB/s",
            self.achieved_bandwidth / 1.0e9
        );

        if !self.requests_per_device.is_empty() {
            println!("----------------------------------------------------------");
            println!("REQUESTS PER DEVICE");
            for (device, reqs) in &self.requests_per_device {
                let name = if device.is_empty() { "-" } else { device };
                println!(
                    "  {:<22} reads: {:<10} | writes: {}",
                    name, reqs.reads, reqs.writes
                );
            }
        }

        for ch in &self.channels {
            let ch_cyc = ch.cycles.max(1) as f64;
            println!("----------------------------------------------------------");
            println!("CHANNEL {}", ch.channel);
            println!(
                "  incoming               {} ({} reads)",
                self.incoming_requests_per_channel
                    .get(ch.channel)
                    .copied()
                    .unwrap_or(0),
                self.incoming_reads_per_channel
                    .get(ch.channel)
                    .copied()
                    .unwrap_or(0)
            );

            let print_locality = |name: &str, hits: u64, misses: u64, conflicts: u64| {
                let total = hits + misses + conflicts;
                let rate = if total > 0 {
                    (hits as f64 / total as f64) * 100.0
                } else {
                    0.0
                };
                println!(
                    "  {:<6} hits: {:<10} | misses: {:<10} | conflicts: {:<10} | hit_rate: {:.2}%",
                    name, hits, misses, conflicts, rate
                );
            };
            print_locality("all", ch.row_hits, ch.row_misses, ch.row_conflicts);
            print_locality(
                "read",
                ch.row_hits_read,
                ch.row_misses_read,
                ch.row_conflicts_read,
            );
            print_locality(
                "write",
                ch.row_hits_write,
                ch.row_misses_write,
                ch.row_conflicts_write,
            );

            println!("  bytes.read             {}", ch.bytes_read);
            println!("  bytes.written          {}", ch.bytes_written);
            println!("  useless_activates      {}", ch.useless_activates);
            println!("  forwarded_reads        {}", ch.forwarded_reads);
            println!("  read_latency.avg       {:.2} cycles", ch.read_latency_avg);
            println!("  queue_length.avg       {:.2}", ch.queue_length_avg);
            println!("  queue_length.read.avg  {:.2}", ch.read_queue_length_avg);
            println!("  queue_length.write.avg {:.2}", ch.write_queue_length_avg);

            let cmds: Vec<String> = ch
                .commands
                .iter()
                .map(|(name, n)| format!("{}={}", name, n))
                .collect();
            println!("  commands               {}", cmds.join(" "));

            for node in &ch.nodes {
                println!(
                    "  {:<9} {:<2} busy: {} ({:.2}%) | refresh: {} | avg_serving: {:.4}",
                    node.level,
                    node.id,
                    node.busy_cycles,
                    (node.busy_cycles as f64 / ch_cyc) * 100.0,
                    node.refresh_cycles,
                    node.average_serving_requests
                );
            }
        }
        println!("==========================================================");
    }

    /// Serializes the statistics as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
