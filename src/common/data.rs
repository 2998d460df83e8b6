//! Memory Request Types.
//!
//! This module defines the request objects exchanged between the trace
//! driver and the memory controllers. A request is created by the driver,
//! decoded by the memory façade and then owned by exactly one controller queue
//! until its callback fires (reads) or its command retires (writes and
//! maintenance requests).

use std::fmt;
use std::sync::Arc;

use crate::common::addr::{unaddressed, AddrVec};

/// Completion callback invoked when a request finishes.
pub type Callback = Arc<dyn Fn(&Request) + Send + Sync>;

/// Kind of memory request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// Column read.
    Read,
    /// Column write.
    Write,
    /// Refresh, generated internally by the refresh unit.
    Refresh,
    /// Rank power-down entry.
    PowerDown,
    /// Rank self-refresh entry.
    SelfRefresh,
    /// Protocol extension without a command translation in the HBM table.
    Extension,
}

impl RequestType {
    /// Returns `true` for reads and writes, the request types that move data.
    pub fn is_data(self) -> bool {
        matches!(self, RequestType::Read | RequestType::Write)
    }
}

/// A memory request.
#[derive(Clone)]
pub struct Request {
    /// Byte address supplied by the driver.
    pub addr: u64,
    /// Per-level decoded address.
    pub addr_vec: AddrVec,
    /// Request kind.
    pub kind: RequestType,
    /// Tag of the device that issued the request (used for statistics).
    pub device: String,
    /// Invoked on completion.
    pub callback: Option<Callback>,
    /// Controller cycle at which the request was enqueued.
    pub arrive: u64,
    /// Controller cycle at which read data is returned.
    pub depart: u64,
    /// Cleared once the first command on behalf of this request is issued.
    pub is_first_command: bool,
}

impl Request {
    /// Creates a request for an integer byte address.
    pub fn new(addr: u64, kind: RequestType) -> Self {
        Self {
            addr,
            addr_vec: unaddressed(),
            kind,
            device: String::new(),
            callback: None,
            arrive: 0,
            depart: 0,
            is_first_command: true,
        }
    }

    /// Creates a request for an already decoded address vector.
    pub fn with_addr_vec(addr_vec: AddrVec, kind: RequestType) -> Self {
        Self {
            addr_vec,
            ..Self::new(0, kind)
        }
    }

    /// Attaches a completion callback.
    pub fn on_complete(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Sets the issuing device tag.
    pub fn from_device(mut self, device: &str) -> Self {
        self.device = device.to_string();
        self
    }

    /// Fires the completion callback, if any.
    pub fn complete(&self) {
        if let Some(cb) = &self.callback {
            cb(self);
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("addr_vec", &self.addr_vec)
            .field("kind", &self.kind)
            .field("device", &self.device)
            .field("arrive", &self.arrive)
            .field("depart", &self.depart)
            .finish()
    }
}
