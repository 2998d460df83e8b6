//! Address Decoding and Page Translation.
//!
//! Byte addresses are first optionally translated from a per-device virtual
//! page to a physical page, then split into one index per device level. The
//! lowest bits select the byte within one transaction and are dropped.
//!
//! Two bit layouts are supported (most significant level first):
//! * **ChRaBaRoCo:** channel | rank | bank group | bank | row | column.
//! * **RoBaRaCoCh:** row | bank | bank group | rank | column | channel, which
//!   interleaves consecutive transactions across channels.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::Deserialize;

use crate::common::addr::{calc_log2, clear_lower_bits, slice_lower_bits, unaddressed, AddrVec};
use crate::common::error::SimError;
use crate::dram::spec::DeviceSpec;
use crate::dram::types::Level;

/// Page size used by random translation.
pub const PAGE_BITS: u32 = 12;

/// Bit layout of a physical address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum AddressMapping {
    ChRaBaRoCo,
    RoBaRaCoCh,
}

/// Virtual-to-physical page translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Translation {
    #[serde(rename = "none", alias = "None")]
    None,
    #[serde(rename = "random", alias = "Random")]
    Random,
}

/// Splits byte addresses into address vectors.
#[derive(Clone, Debug)]
pub struct AddressDecoder {
    mapping: AddressMapping,
    addr_bits: [u32; Level::COUNT],
    tx_bits: u32,
    max_address: u64,
}

impl AddressDecoder {
    /// Derives the bit widths of every level from the organization.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if the transaction size is not a power of two.
    pub fn new(spec: &DeviceSpec, mapping: AddressMapping) -> Result<Self, SimError> {
        let tx = spec.transaction_bytes();
        let tx_bits = calc_log2(tx);
        if 1u64 << tx_bits != tx {
            return Err(SimError::Config(format!(
                "transaction size {} bytes is not a power of two",
                tx
            )));
        }

        let count = &spec.org.count;
        let mut addr_bits = [0u32; Level::COUNT];
        let mut max_address = spec.channel_width / 8;
        for level in Level::ALL {
            let n = count[level.index()] as u64;
            addr_bits[level.index()] = calc_log2(n);
            if n != 0 {
                max_address *= n;
            }
        }
        let col = Level::Column.index();
        addr_bits[col] = addr_bits[col].saturating_sub(calc_log2(spec.prefetch_size));

        Ok(Self {
            mapping,
            addr_bits,
            tx_bits,
            max_address,
        })
    }

    pub fn mapping(&self) -> AddressMapping {
        self.mapping
    }

    /// Bits consumed by each level.
    pub fn addr_bits(&self) -> &[u32; Level::COUNT] {
        &self.addr_bits
    }

    /// Bytes of addressable memory.
    pub fn max_address(&self) -> u64 {
        self.max_address
    }

    /// Decodes a physical byte address.
    pub fn decode(&self, addr: u64) -> AddrVec {
        let mut rest = clear_lower_bits(addr, self.tx_bits);
        let mut vec = unaddressed();
        let last = Level::COUNT - 1;

        match self.mapping {
            AddressMapping::ChRaBaRoCo => {
                for i in (0..Level::COUNT).rev() {
                    vec[i] = slice_lower_bits(&mut rest, self.addr_bits[i]);
                }
            }
            AddressMapping::RoBaRaCoCh => {
                vec[0] = slice_lower_bits(&mut rest, self.addr_bits[0]);
                vec[last] = slice_lower_bits(&mut rest, self.addr_bits[last]);
                for i in 1..last {
                    vec[i] = slice_lower_bits(&mut rest, self.addr_bits[i]);
                }
            }
        }
        vec
    }
}

/// Random page allocator.
///
/// Every (device, virtual page) pair is bound on first touch to a random free
/// physical page. When no free page remains a random page is reused and the
/// replacement is counted.
pub struct PageTranslator {
    rng: Xoshiro256StarStar,
    page_table: HashMap<(String, u64), u64>,
    allocated: Vec<bool>,
    free_pages: u64,
    replacements: u64,
}

impl PageTranslator {
    /// Creates an allocator over `max_address` bytes of physical memory.
    ///
    /// # Arguments
    ///
    /// * `max_address` - Physical memory size in bytes.
    /// * `seed` - RNG seed; equal seeds give equal mappings.
    pub fn new(max_address: u64, seed: u64) -> Self {
        let pages = (max_address >> PAGE_BITS).max(1);
        Self {
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            page_table: HashMap::new(),
            allocated: vec![false; pages as usize],
            free_pages: pages,
            replacements: 0,
        }
    }

    /// Physical pages reused after the free pool ran out.
    pub fn replacements(&self) -> u64 {
        self.replacements
    }

    /// Translates a virtual byte address issued by `device`.
    pub fn translate(&mut self, device: &str, addr: u64) -> u64 {
        let vpn = addr >> PAGE_BITS;
        let offset = addr & ((1 << PAGE_BITS) - 1);
        let key = (device.to_string(), vpn);

        let ppn = match self.page_table.get(&key) {
            Some(&ppn) => ppn,
            None => {
                let ppn = self.allocate();
                self.page_table.insert(key, ppn);
                ppn
            }
        };
        (ppn << PAGE_BITS) | offset
    }

    fn allocate(&mut self) -> u64 {
        let pages = self.allocated.len();
        let mut page = self.rng.gen_range(0..pages);

        if self.free_pages == 0 {
            self.replacements += 1;
            return page as u64;
        }

        // Linear probe from the random start for a free page.
        while self.allocated[page] {
            page = (page + 1) % pages;
        }
        self.allocated[page] = true;
        self.free_pages -= 1;
        page as u64
    }
}
