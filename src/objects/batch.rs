/*!
 * Range Batches
 *
 * Parallel-array notifications for relocated and surviving object ranges.
 * Lengths are in bytes. The pointer-sized shape is canonical; the 32-bit
 * shape is derived by splitting oversize ranges, never by truncation.
 */

use crate::core::errors::BrokerError;
use crate::core::limits::NARROW_RANGE_MAX;
use crate::core::types::{Address, BrokerResult};
use serde::{Deserialize, Serialize};

/// Range length representation
pub trait RangeLength: Copy + Send + Sync + 'static {
    fn to_usize(self) -> usize;
}

impl RangeLength for usize {
    #[inline]
    fn to_usize(self) -> usize {
        self
    }
}

impl RangeLength for u32 {
    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

/// Relocated ranges: `old_starts[i]..+lengths[i]` now lives at `new_starts[i]`
///
/// Fields are private so the three arrays can only grow together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "RawMovedRanges<L>",
    bound(deserialize = "L: RangeLength + Deserialize<'de>")
)]
pub struct MovedRanges<L> {
    old_starts: Vec<Address>,
    new_starts: Vec<Address>,
    lengths: Vec<L>,
}

/// Canonical pointer-sized moved batch
pub type MovedRangeBatch = MovedRanges<usize>;
/// Legacy 32-bit moved batch
pub type NarrowMovedRangeBatch = MovedRanges<u32>;

impl<L: RangeLength> MovedRanges<L> {
    pub fn new() -> Self {
        Self {
            old_starts: Vec::new(),
            new_starts: Vec::new(),
            lengths: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            old_starts: Vec::with_capacity(capacity),
            new_starts: Vec::with_capacity(capacity),
            lengths: Vec::with_capacity(capacity),
        }
    }

    /// Append one relocated range
    pub fn push(&mut self, old_start: Address, new_start: Address, length: L) -> BrokerResult<()> {
        let len = length.to_usize();
        if len == 0 {
            return Err(BrokerError::invalid_argument("range length must be non-zero"));
        }
        if old_start.checked_add(len).is_none() || new_start.checked_add(len).is_none() {
            return Err(BrokerError::invalid_argument(format!(
                "range {:#x}+{} overflows the address space",
                old_start.max(new_start),
                len
            )));
        }
        self.old_starts.push(old_start);
        self.new_starts.push(new_start);
        self.lengths.push(length);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn old_starts(&self) -> &[Address] {
        &self.old_starts
    }

    pub fn new_starts(&self) -> &[Address] {
        &self.new_starts
    }

    pub fn lengths(&self) -> &[L] {
        &self.lengths
    }

    /// Iterate `(old_start, new_start, length)` triples
    pub fn iter(&self) -> impl Iterator<Item = (Address, Address, usize)> + '_ {
        self.old_starts
            .iter()
            .zip(&self.new_starts)
            .zip(&self.lengths)
            .map(|((old, new), len)| (*old, *new, len.to_usize()))
    }

    /// Total bytes relocated
    pub fn total_bytes(&self) -> u64 {
        self.lengths.iter().map(|l| l.to_usize() as u64).sum()
    }
}

impl MovedRangeBatch {
    /// Derive the 32-bit shape, splitting ranges longer than `u32::MAX`
    pub fn to_narrow(&self) -> NarrowMovedRangeBatch {
        let mut narrow = NarrowMovedRangeBatch::with_capacity(self.len());
        for (old, new, len) in self.iter() {
            for (offset, chunk) in split_range(len, NARROW_RANGE_MAX) {
                narrow.old_starts.push(old + offset);
                narrow.new_starts.push(new + offset);
                narrow.lengths.push(chunk as u32);
            }
        }
        narrow
    }
}

impl<L: RangeLength> Default for MovedRanges<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Ranges that survived in place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "RawSurvivedRanges<L>",
    bound(deserialize = "L: RangeLength + Deserialize<'de>")
)]
pub struct SurvivedRanges<L> {
    starts: Vec<Address>,
    lengths: Vec<L>,
}

/// Canonical pointer-sized survived batch
pub type SurvivedRangeBatch = SurvivedRanges<usize>;
/// Legacy 32-bit survived batch
pub type NarrowSurvivedRangeBatch = SurvivedRanges<u32>;

impl<L: RangeLength> SurvivedRanges<L> {
    pub fn new() -> Self {
        Self {
            starts: Vec::new(),
            lengths: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            starts: Vec::with_capacity(capacity),
            lengths: Vec::with_capacity(capacity),
        }
    }

    /// Append one surviving range
    pub fn push(&mut self, start: Address, length: L) -> BrokerResult<()> {
        let len = length.to_usize();
        if len == 0 {
            return Err(BrokerError::invalid_argument("range length must be non-zero"));
        }
        if start.checked_add(len).is_none() {
            return Err(BrokerError::invalid_argument(format!(
                "range {:#x}+{} overflows the address space",
                start, len
            )));
        }
        self.starts.push(start);
        self.lengths.push(length);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn starts(&self) -> &[Address] {
        &self.starts
    }

    pub fn lengths(&self) -> &[L] {
        &self.lengths
    }

    /// Iterate `(start, length)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (Address, usize)> + '_ {
        self.starts
            .iter()
            .zip(&self.lengths)
            .map(|(start, len)| (*start, len.to_usize()))
    }
}

impl SurvivedRangeBatch {
    /// Derive the 32-bit shape, splitting ranges longer than `u32::MAX`
    pub fn to_narrow(&self) -> NarrowSurvivedRangeBatch {
        let mut narrow = NarrowSurvivedRangeBatch::with_capacity(self.len());
        for (start, len) in self.iter() {
            for (offset, chunk) in split_range(len, NARROW_RANGE_MAX) {
                narrow.starts.push(start + offset);
                narrow.lengths.push(chunk as u32);
            }
        }
        narrow
    }
}

impl<L: RangeLength> Default for SurvivedRanges<L> {
    fn default() -> Self {
        Self::new()
    }
}

// Decoded batches are rebuilt through `push` so they hold the same invariants

#[derive(Deserialize)]
struct RawMovedRanges<L> {
    old_starts: Vec<Address>,
    new_starts: Vec<Address>,
    lengths: Vec<L>,
}

impl<L: RangeLength> TryFrom<RawMovedRanges<L>> for MovedRanges<L> {
    type Error = BrokerError;

    fn try_from(raw: RawMovedRanges<L>) -> Result<Self, Self::Error> {
        if raw.old_starts.len() != raw.lengths.len() || raw.new_starts.len() != raw.lengths.len() {
            return Err(BrokerError::invalid_argument(format!(
                "moved batch arrays differ in length ({}, {}, {})",
                raw.old_starts.len(),
                raw.new_starts.len(),
                raw.lengths.len()
            )));
        }
        let mut batch = Self::with_capacity(raw.lengths.len());
        for ((old, new), len) in raw.old_starts.into_iter().zip(raw.new_starts).zip(raw.lengths) {
            batch.push(old, new, len)?;
        }
        Ok(batch)
    }
}

#[derive(Deserialize)]
struct RawSurvivedRanges<L> {
    starts: Vec<Address>,
    lengths: Vec<L>,
}

impl<L: RangeLength> TryFrom<RawSurvivedRanges<L>> for SurvivedRanges<L> {
    type Error = BrokerError;

    fn try_from(raw: RawSurvivedRanges<L>) -> Result<Self, Self::Error> {
        if raw.starts.len() != raw.lengths.len() {
            return Err(BrokerError::invalid_argument(format!(
                "survived batch arrays differ in length ({}, {})",
                raw.starts.len(),
                raw.lengths.len()
            )));
        }
        let mut batch = Self::with_capacity(raw.lengths.len());
        for (start, len) in raw.starts.into_iter().zip(raw.lengths) {
            batch.push(start, len)?;
        }
        Ok(batch)
    }
}

/// Split `len` into `(offset, chunk)` pieces no longer than `max`
fn split_range(len: usize, max: usize) -> impl Iterator<Item = (usize, usize)> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset >= len {
            return None;
        }
        let chunk = (len - offset).min(max);
        let piece = (offset, chunk);
        offset += chunk;
        Some(piece)
    })
}
