//! HBM Memory System.
//!
//! The [`Memory`] façade owns one [`Controller`] per channel. It decodes the
//! byte address of every incoming request, routes it to the controller of
//! its channel and advances all controllers in lock-step.

/// Address decoding and page translation.
pub mod mapping;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::common::data::{Request, RequestType};
use crate::common::error::SimError;
use crate::config::Config;
use crate::controller::Controller;
use crate::dram::spec::DeviceSpec;
use crate::dram::types::Level;
use crate::stats::{DeviceRequests, MemoryStats};

use mapping::{AddressDecoder, PageTranslator, Translation};

/// The simulated memory system.
pub struct Memory {
    spec: Arc<DeviceSpec>,
    controllers: Vec<Controller>,
    decoder: AddressDecoder,
    translator: Option<PageTranslator>,
    cpu_tick: u64,
    mem_tick: u64,

    start_time: Instant,
    cycles: u64,
    active_cycles: u64,
    read_requests: u64,
    write_requests: u64,
    incoming_per_channel: Vec<u64>,
    incoming_reads_per_channel: Vec<u64>,
    per_device: BTreeMap<String, DeviceRequests>,
    max_bandwidth: f64,
}

impl Memory {
    /// Builds the device specification, controllers and address decoder.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] when the configuration describes an
    /// unsupported organization.
    pub fn new(config: &Config) -> Result<Self, SimError> {
        config.validate()?;
        let spec = Arc::new(DeviceSpec::new(config)?);
        let channels = spec.org.count[Level::Channel.index()];

        let controllers = (0..channels)
            .map(|id| Controller::new(config, Arc::clone(&spec), id))
            .collect();
        let decoder = AddressDecoder::new(&spec, config.mapping)?;
        let translator = match config.translation {
            Translation::None => None,
            Translation::Random => Some(PageTranslator::new(
                decoder.max_address(),
                config.translation_seed,
            )),
        };

        log::info!(
            "HBM {:?} {} Mb x {} channel(s), {} rank(s), {:?} mapping",
            config.organization,
            spec.org.size_mb,
            channels,
            spec.org.count[Level::Rank.index()],
            config.mapping
        );

        Ok(Self {
            spec,
            controllers,
            decoder,
            translator,
            cpu_tick: config.cpu_tick,
            mem_tick: config.mem_tick,
            start_time: Instant::now(),
            cycles: 0,
            active_cycles: 0,
            read_requests: 0,
            write_requests: 0,
            incoming_per_channel: vec![0; channels],
            incoming_reads_per_channel: vec![0; channels],
            per_device: BTreeMap::new(),
            max_bandwidth: 0.0,
        })
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn controller(&self, channel: usize) -> Option<&Controller> {
        self.controllers.get(channel)
    }

    pub fn decoder(&self) -> &AddressDecoder {
        &self.decoder
    }

    /// Memory cycles simulated so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Offers a request to the memory system.
    ///
    /// The request is copied on acceptance; the caller keeps the original
    /// and resends it after a stall.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if the target queue is full.
    ///
    /// # Errors
    ///
    /// Propagates [`Controller::enqueue`] errors.
    pub fn send(&mut self, request: &Request) -> Result<bool, SimError> {
        let mut req = request.clone();
        let phys = match self.translator.as_mut() {
            Some(t) => t.translate(&req.device, req.addr),
            None => req.addr,
        };
        req.addr_vec = self.decoder.decode(phys);

        let channel = req.addr_vec[Level::Channel.index()] as usize;
        let kind = req.kind;
        let device = req.device.clone();
        let Some(ctrl) = self.controllers.get_mut(channel) else {
            return Err(SimError::Config(format!(
                "address {:#x} decodes to missing channel {}",
                request.addr, channel
            )));
        };
        if !ctrl.enqueue(req)? {
            return Ok(false);
        }

        self.incoming_per_channel[channel] += 1;
        let entry = self.per_device.entry(device).or_default();
        match kind {
            RequestType::Read => {
                self.read_requests += 1;
                self.incoming_reads_per_channel[channel] += 1;
                entry.reads += 1;
            }
            RequestType::Write => {
                self.write_requests += 1;
                entry.writes += 1;
            }
            _ => {}
        }
        Ok(true)
    }

    /// Advances every controller by one memory cycle.
    ///
    /// # Errors
    ///
    /// Propagates the first controller error.
    pub fn cycle(&mut self) -> Result<(), SimError> {
        self.cycles += 1;
        let active = self.controllers.iter().any(Controller::is_active);
        for ctrl in &mut self.controllers {
            ctrl.cycle()?;
        }
        if active {
            self.active_cycles += 1;
        }
        Ok(())
    }

    /// Requests still queued or awaiting data in any controller.
    pub fn pending_requests(&self) -> usize {
        self.controllers.iter().map(Controller::pending_requests).sum()
    }

    pub fn set_high_writeq_watermark(&mut self, mark: f64) {
        for ctrl in &mut self.controllers {
            ctrl.set_high_writeq_watermark(mark);
        }
    }

    pub fn set_low_writeq_watermark(&mut self, mark: f64) {
        for ctrl in &mut self.controllers {
            ctrl.set_low_writeq_watermark(mark);
        }
    }

    /// Clears every statistic, e.g. after warmup.
    pub fn reset_stats(&mut self) {
        self.cycles = 0;
        self.active_cycles = 0;
        self.read_requests = 0;
        self.write_requests = 0;
        self.incoming_per_channel.iter_mut().for_each(|n| *n = 0);
        self.incoming_reads_per_channel.iter_mut().for_each(|n| *n = 0);
        self.per_device.clear();
        for ctrl in &mut self.controllers {
            ctrl.reset_stats();
        }
    }

    /// Closes the statistics window of every controller.
    pub fn finish(&mut self) {
        let channels = self.controllers.len() as f64;
        self.max_bandwidth =
            self.spec.speed.rate as f64 * 1e6 * self.spec.channel_width as f64 * channels / 8.0;
        for (i, ctrl) in self.controllers.iter_mut().enumerate() {
            ctrl.finish(self.incoming_reads_per_channel[i]);
        }
    }

    /// Snapshot of all statistics.
    pub fn report(&self) -> MemoryStats {
        let bytes: u64 = self
            .controllers
            .iter()
            .map(|c| c.stats().bytes_read + c.stats().bytes_written)
            .sum();
        let seconds = self.cycles as f64 / (self.spec.speed.freq * 1e6);
        MemoryStats {
            host_seconds: self.start_time.elapsed().as_secs_f64(),
            cycles: self.cycles,
            cpu_cycles: self.cycles * self.cpu_tick / self.mem_tick,
            active_cycles: self.active_cycles,
            read_requests: self.read_requests,
            write_requests: self.write_requests,
            incoming_requests_per_channel: self.incoming_per_channel.clone(),
            incoming_reads_per_channel: self.incoming_reads_per_channel.clone(),
            requests_per_device: self.per_device.clone(),
            page_replacements: self
                .translator
                .as_ref()
                .map_or(0, PageTranslator::replacements),
            max_bandwidth: self.max_bandwidth,
            achieved_bandwidth: if seconds > 0.0 {
                bytes as f64 / seconds
            } else {
                0.0
            },
            channels: self.controllers.iter().map(|c| c.stats().clone()).collect(),
        }
    }

    /// Prints the queue and device state of every controller.
    pub fn print_internal_state(&self) {
        println!("--------------");
        for ctrl in &self.controllers {
            println!("  controller {}:", ctrl.id());
            ctrl.print_state();
        }
        println!("--------------");
    }
}
