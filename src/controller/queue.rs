//! Bounded Request Queues.
//!
//! Each controller owns four of these (read, write, activate, other). Order
//! is arrival order; the scheduler may pick from any position and
//! [`Queue::remove`] preserves the order of the rest.

use std::collections::VecDeque;

use crate::common::data::Request;
use crate::common::error::SimError;

/// A bounded FIFO of requests.
#[derive(Debug)]
pub struct Queue {
    name: &'static str,
    capacity: usize,
    entries: VecDeque<Request>,
}

impl Queue {
    /// Creates an empty queue.
    ///
    /// # Arguments
    ///
    /// * `name` - Label used in diagnostics.
    /// * `capacity` - Maximum number of queued requests.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Checks the capacity invariant.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::QueueOverflow`] if the queue has grown past its capacity.
    pub fn check_capacity(&self) -> Result<(), SimError> {
        if self.entries.len() > self.capacity {
            return Err(SimError::QueueOverflow {
                queue: self.name,
                len: self.entries.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Appends a request.
    ///
    /// # Returns
    ///
    /// `Err` carrying the request back when the queue is full.
    pub fn push(&mut self, req: Request) -> Result<(), Request> {
        if self.is_full() {
            return Err(req);
        }
        self.entries.push_back(req);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Request> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Request> {
        self.entries.get_mut(index)
    }

    /// Removes the request at `index`, keeping the order of the others.
    pub fn remove(&mut self, index: usize) -> Option<Request> {
        self.entries.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.entries.iter()
    }

    /// Returns `true` if a queued request targets the byte address `addr`.
    pub fn contains_addr(&self, addr: u64) -> bool {
        self.entries.iter().any(|r| r.addr == addr)
    }
}
