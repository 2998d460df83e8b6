//! Decoded Address Vectors.
//!
//! A physical address is split into one index per level of the device
//! hierarchy (channel, rank, bank group, bank, row, column). Requests that do
//! not target a level (e.g. a rank-wide refresh) carry [`UNADDRESSED`] there.

use crate::dram::types::Level;

/// Marker for a level that a request does not address.
pub const UNADDRESSED: i64 = -1;

/// One index per [`Level`], outermost first.
pub type AddrVec = [i64; Level::COUNT];

/// Address prefix that identifies a bank (channel..bank, row excluded).
pub type RowGroup = [i64; Level::Row as usize];

/// Returns an address vector with no level addressed.
pub fn unaddressed() -> AddrVec {
    [UNADDRESSED; Level::COUNT]
}

/// Extracts the row-group prefix of an address vector.
pub fn row_group(addr: &AddrVec) -> RowGroup {
    let mut group = [UNADDRESSED; Level::Row as usize];
    group.copy_from_slice(&addr[..Level::Row as usize]);
    group
}

/// Expands a row-group back into an address vector with row and column unaddressed.
pub fn from_row_group(group: &RowGroup) -> AddrVec {
    let mut addr = unaddressed();
    addr[..Level::Row as usize].copy_from_slice(group);
    addr
}

/// Number of bits needed to index `val` entries (floor log2, 0 for 0 and 1).
pub fn calc_log2(val: u64) -> u32 {
    if val <= 1 {
        0
    } else {
        63 - val.leading_zeros()
    }
}

/// Splits off the lowest `bits` bits of `addr`.
///
/// # Returns
///
/// The extracted low bits; `addr` is shifted right by `bits` in place.
pub fn slice_lower_bits(addr: &mut u64, bits: u32) -> i64 {
    if bits == 0 {
        return 0;
    }
    let low = *addr & ((1u64 << bits) - 1);
    *addr >>= bits;
    low as i64
}

/// Drops the lowest `bits` bits of `addr`.
pub fn clear_lower_bits(addr: u64, bits: u32) -> u64 {
    addr >> bits
}
