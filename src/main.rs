//! HBM Simulator CLI.
//!
//! The main executable for the simulator. It handles command-line argument
//! parsing, configuration loading and the trace-driven simulation loop.
//!
//! # Exit Codes
//!
//! * `0`: The trace was fully served.
//! * `1`: Fatal error (bad input or a protocol invariant violation).
//! * `2`: The cycle limit was reached before the trace drained.

use clap::Parser;
use std::{fs, process};

use hbm_sim::config::Config;
use hbm_sim::memory::Memory;
use hbm_sim::sim::{self, RunOptions, RunOutcome, TraceReader};

/// Command-line arguments for the HBM simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Cycle-Accurate HBM DRAM Simulator")]
struct Args {
    /// Configuration file (TOML, or legacy `key = value`).
    #[arg(short, long, default_value = "configs/default.toml")]
    config: String,

    /// DRAM trace file.
    #[arg(short, long)]
    trace: String,

    /// Stop after this many memory cycles (overrides the configuration).
    #[arg(long)]
    cycle_limit: Option<u64>,

    /// Write statistics as JSON to this path.
    #[arg(long)]
    stats_json: Option<String>,
}

/// Main entry point for the HBM simulator.
///
/// # Behavior
///
/// 1. **Configuration**: Parses command-line arguments and loads the configuration file.
/// 2. **Initialization**: Constructs the `Memory` system (one controller per channel).
/// 3. **Simulation Loop**: Feeds the trace cycle by cycle until every request is served,
///    the cycle limit is hit, or a fatal error occurs.
/// 4. **Teardown**: Prints simulation statistics and exits with the outcome's code.
fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n[!] FATAL: {}", e);
            process::exit(1);
        }
    };
    if args.cycle_limit.is_some() {
        config.cycle_limit = args.cycle_limit;
    }

    println!("Global Configuration");
    println!("--------------------");
    println!("Device:");
    println!("  Standard:           {}", config.standard);
    println!("  Organization:       {:?}", config.organization);
    println!("  Speed:              {:?}", config.speed);
    println!("  Channels:           {}", config.channels);
    println!("  Ranks:              {}", config.ranks);
    println!("Address:");
    println!("  Mapping:            {:?}", config.mapping);
    println!("  Translation:        {:?}", config.translation);
    println!("Controller:");
    println!("  Scheduler:          {:?}", config.scheduler);
    println!("  Row Policy:         {:?}", config.row_policy);
    println!("  Refresh:            {:?}", config.refresh_mode);
    println!("  Queue Capacity:     {}", config.queue_capacity);
    println!(
        "  Write Watermarks:   {:.2} / {:.2}",
        config.write_low_watermark, config.write_high_watermark
    );
    println!(
        "  Clock Ratio:        {}:{} (cpu:mem)",
        config.cpu_tick, config.mem_tick
    );
    println!("--------------------");

    let mut memory = match Memory::new(&config) {
        Ok(memory) => memory,
        Err(e) => {
            eprintln!("\n[!] FATAL: {}", e);
            process::exit(1);
        }
    };

    let trace = match TraceReader::open(&args.trace) {
        Ok(trace) => trace,
        Err(e) => {
            eprintln!("\n[!] FATAL: {}", e);
            process::exit(1);
        }
    };
    println!("[*] Trace: {}", args.trace);

    let result = sim::run(&mut memory, trace, RunOptions::from_config(&config));
    memory.finish();
    let stats = memory.report();

    if let Some(path) = &args.stats_json {
        match stats.to_json() {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    eprintln!("[!] Could not write '{}': {}", path, e);
                }
            }
            Err(e) => eprintln!("[!] Could not serialize statistics: {}", e),
        }
    }

    match result {
        Err(e) => {
            eprintln!("\n[!] FATAL: {}", e);
            memory.print_internal_state();
            stats.print();
            process::exit(1);
        }
        Ok(summary) if summary.outcome == RunOutcome::CycleLimit => {
            println!(
                "\n[*] Cycle limit reached after {} cycles ({} requests pending)",
                summary.cycles,
                memory.pending_requests()
            );
            memory.print_internal_state();
            stats.print();
            process::exit(2);
        }
        Ok(summary) => {
            println!(
                "\n[*] Trace drained after {} cycles ({} reads, {} writes)",
                summary.cycles, summary.reads_sent, summary.writes_sent
            );
            stats.print();

            use std::io::Write;
            std::io::stdout().flush().ok();
        }
    }
}
