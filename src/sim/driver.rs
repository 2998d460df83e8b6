//! Trace-Driven Simulation Loop.
//!
//! Feeds trace requests into the memory system, one per memory cycle, holding
//! a stalled request until it is accepted. Once the trace is exhausted the
//! write-queue high watermark is forced to zero so buffered writes drain, and
//! the loop runs until every queue is empty.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::common::data::{Callback, Request, RequestType};
use crate::common::error::SimError;
use crate::config::Config;
use crate::memory::Memory;
use crate::sim::trace::TraceEntry;

/// Device tag attached to trace requests.
pub const TRACE_DEVICE: &str = "trace";

/// Limits applied by [`run`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Requests sent before statistics are reset.
    pub warmup: u64,
    /// Requests after which the trace is treated as exhausted (0 = no limit).
    pub request_limit: u64,
    /// Memory cycles after which the run stops early.
    pub cycle_limit: Option<u64>,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            warmup: config.warmup_insts,
            request_limit: config.expected_limit_insts,
            cycle_limit: config.cycle_limit,
        }
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Trace exhausted and every request served.
    Completed,
    /// The cycle ceiling was reached first.
    CycleLimit,
}

/// Summary of a finished run.
#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub cycles: u64,
    pub reads_sent: u64,
    pub writes_sent: u64,
    pub reads_completed: u64,
}

/// Runs `trace` through `memory` until it drains or a limit is hit.
///
/// # Arguments
///
/// * `memory` - Memory system under test.
/// * `trace` - Request source.
/// * `options` - Warmup and stop conditions.
///
/// # Errors
///
/// Propagates trace parse errors and every simulator invariant violation.
pub fn run<I>(memory: &mut Memory, trace: I, options: RunOptions) -> Result<RunSummary, SimError>
where
    I: IntoIterator<Item = Result<TraceEntry, SimError>>,
{
    let completed = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&completed);
    let on_read: Callback = Arc::new(move |_req: &Request| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let mut trace = trace.into_iter();
    let mut pending: Option<Request> = None;
    let mut end = false;
    let mut sent = 0u64;
    let mut reads_sent = 0u64;
    let mut writes_sent = 0u64;
    let mut cycles = 0u64;
    let mut warmed_up = options.warmup == 0;

    while !end || memory.pending_requests() > 0 {
        if !end && pending.is_none() {
            let limit_reached = options.request_limit > 0 && sent >= options.request_limit;
            match trace.next() {
                Some(entry) if !limit_reached => {
                    let entry = entry?;
                    let mut req = Request::new(entry.addr, entry.kind).from_device(TRACE_DEVICE);
                    if entry.kind == RequestType::Read {
                        req = req.on_complete(Arc::clone(&on_read));
                    }
                    pending = Some(req);
                }
                _ => {
                    log::info!("trace ended after {} requests at cycle {}", sent, cycles);
                    end = true;
                }
            }
        }

        if let Some(req) = pending.as_ref() {
            if memory.send(req)? {
                match req.kind {
                    RequestType::Read => reads_sent += 1,
                    _ => writes_sent += 1,
                }
                sent += 1;
                pending = None;
                if !warmed_up && sent >= options.warmup {
                    log::info!("warmup finished after {} requests, resetting statistics", sent);
                    memory.reset_stats();
                    warmed_up = true;
                }
            }
        } else if end {
            memory.set_high_writeq_watermark(0.0);
        }

        memory.cycle()?;
        cycles += 1;

        if options.cycle_limit.is_some_and(|limit| cycles >= limit) {
            log::warn!("cycle limit reached with {} requests pending", memory.pending_requests());
            return Ok(RunSummary {
                outcome: RunOutcome::CycleLimit,
                cycles,
                reads_sent,
                writes_sent,
                reads_completed: completed.load(Ordering::Relaxed),
            });
        }
    }

    Ok(RunSummary {
        outcome: RunOutcome::Completed,
        cycles,
        reads_sent,
        writes_sent,
        reads_completed: completed.load(Ordering::Relaxed),
    })
}
