/*!
 * Code Region Table
 *
 * Resolves instruction pointers to the one resident (function, revision)
 * that contains them, and functions to their resident code ranges.
 * Lookups are lock-free RCU reads; writes happen on JIT completion and unload.
 */

use super::region::{CodeRange, CompiledCodeRegion};
use crate::core::errors::BrokerError;
use crate::core::sync::RcuCell;
use crate::core::types::{Address, BrokerResult, FunctionId, IlToNativeEntry, ReJitId};
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Code region table
///
/// # Performance
/// - `lookup` is an atomic pointer load plus a `BTreeMap` range probe
/// - Per-function index in a sharded map so unrelated JIT threads do not contend
pub struct CodeRegionTable {
    by_start: RcuCell<BTreeMap<Address, CompiledCodeRegion>>,
    by_function: DashMap<FunctionId, Vec<CompiledCodeRegion>, RandomState>,
    il_maps: DashMap<(FunctionId, ReJitId), Arc<[IlToNativeEntry]>, RandomState>,
}

impl CodeRegionTable {
    pub fn new() -> Self {
        Self {
            by_start: RcuCell::new(BTreeMap::new()),
            by_function: DashMap::with_hasher(RandomState::new()),
            il_maps: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Register a resident compiled body
    ///
    /// Fails if the range is empty or overlaps a resident region.
    pub fn insert(&self, region: CompiledCodeRegion) -> BrokerResult<()> {
        if region.size() == 0 {
            return Err(BrokerError::invalid_argument("code region size must be non-zero"));
        }
        if region.start().checked_add(region.size()).is_none() {
            return Err(BrokerError::invalid_argument(
                "code region overflows the address space",
            ));
        }

        let mut conflict = None;
        let inserted = self.by_start.try_update(|map| {
            conflict = overlapping(map, &region.range);
            if conflict.is_some() {
                return None;
            }
            let mut next = map.clone();
            next.insert(region.start(), region);
            Some((next, ()))
        });

        if inserted.is_none() {
            return Err(BrokerError::invalid_argument(match conflict {
                Some(existing) => format!(
                    "code range {} overlaps {} of function {} revision {}",
                    region.range, existing.range, existing.function, existing.rejit
                ),
                None => format!("code range {} rejected", region.range),
            }));
        }

        self.by_function
            .entry(region.function)
            .or_default()
            .push(region);
        debug!(
            function = %region.function,
            rejit = %region.rejit,
            range = %region.range,
            "code region registered"
        );
        Ok(())
    }

    /// Region containing `ip`, if any
    #[inline]
    pub fn lookup(&self, ip: Address) -> Option<CompiledCodeRegion> {
        let map = self.by_start.peek();
        map.range(..=ip)
            .next_back()
            .map(|(_, region)| *region)
            .filter(|region| region.contains(ip))
    }

    /// Resolve `ip` to `(function, revision)`
    pub fn function_from_ip(&self, ip: Address) -> BrokerResult<(FunctionId, ReJitId)> {
        self.lookup(ip)
            .map(|region| (region.function, region.rejit))
            .ok_or_else(|| BrokerError::NotFound(format!("no managed code at {:#x}", ip)))
    }

    /// Resident regions of a function
    ///
    /// Without a revision the call only succeeds when exactly one revision
    /// is resident; otherwise the caller must say which one it means.
    pub fn code_regions(
        &self,
        function: FunctionId,
        rejit: Option<ReJitId>,
    ) -> BrokerResult<Vec<CompiledCodeRegion>> {
        let regions = self
            .by_function
            .get(&function)
            .ok_or_else(|| BrokerError::NotFound(format!("function {} has no code", function)))?;

        let selected: Vec<CompiledCodeRegion> = match rejit {
            Some(rejit) => regions.iter().filter(|r| r.rejit == rejit).copied().collect(),
            None => {
                let first = regions
                    .first()
                    .map(|r| r.rejit)
                    .ok_or_else(|| BrokerError::NotFound(format!("function {} has no code", function)))?;
                if regions.iter().any(|r| r.rejit != first) {
                    return Err(BrokerError::AmbiguousRevision(function.0));
                }
                regions.clone()
            }
        };

        if selected.is_empty() {
            return Err(BrokerError::NotFound(format!(
                "function {} has no code for the requested revision",
                function
            )));
        }
        Ok(selected)
    }

    /// Distinct revisions resident for a function, ascending
    pub fn revisions(&self, function: FunctionId) -> Vec<ReJitId> {
        let mut revisions: Vec<ReJitId> = self
            .by_function
            .get(&function)
            .map(|regions| regions.iter().map(|r| r.rejit).collect())
            .unwrap_or_default();
        revisions.sort_unstable();
        revisions.dedup();
        revisions
    }

    /// Drop every region of a function (unload); returns how many were removed
    pub fn remove_function(&self, function: FunctionId) -> usize {
        let Some((_, regions)) = self.by_function.remove(&function) else {
            return 0;
        };
        self.by_start.update(|map| {
            let mut next = map.clone();
            for region in &regions {
                next.remove(&region.start());
            }
            next
        });
        self.il_maps.retain(|(f, _), _| *f != function);
        debug!(function = %function, removed = regions.len(), "code regions removed");
        regions.len()
    }

    // =========================================================================
    // IL-to-native maps
    // =========================================================================

    /// Record the IL-to-native map produced by a compilation
    pub fn set_il_to_native_map(
        &self,
        function: FunctionId,
        rejit: ReJitId,
        entries: &[IlToNativeEntry],
    ) {
        self.il_maps.insert((function, rejit), Arc::from(entries));
    }

    fn il_map(&self, function: FunctionId, rejit: ReJitId) -> BrokerResult<Arc<[IlToNativeEntry]>> {
        self.il_maps
            .get(&(function, rejit))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                BrokerError::NotFound(format!(
                    "no IL-to-native map for function {} revision {}",
                    function, rejit
                ))
            })
    }

    /// First pass: number of map entries
    pub fn il_to_native_map_len(&self, function: FunctionId, rejit: ReJitId) -> BrokerResult<usize> {
        Ok(self.il_map(function, rejit)?.len())
    }

    /// Second pass: copy entries into a caller buffer, returns entries written
    pub fn copy_il_to_native_map(
        &self,
        function: FunctionId,
        rejit: ReJitId,
        out: &mut [IlToNativeEntry],
    ) -> BrokerResult<usize> {
        let map = self.il_map(function, rejit)?;
        if out.len() < map.len() {
            return Err(BrokerError::InsufficientBuffer {
                required: map.len(),
                provided: out.len(),
            });
        }
        out[..map.len()].copy_from_slice(&map);
        Ok(map.len())
    }

    /// Owned copy of the map
    pub fn il_to_native_map(
        &self,
        function: FunctionId,
        rejit: ReJitId,
    ) -> BrokerResult<Vec<IlToNativeEntry>> {
        Ok(self.il_map(function, rejit)?.to_vec())
    }

    pub fn len(&self) -> usize {
        self.by_start.peek().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) {
        self.by_start.store(BTreeMap::new());
        self.by_function.clear();
        self.il_maps.clear();
    }
}

impl Default for CodeRegionTable {
    fn default() -> Self {
        Self::new()
    }
}

fn overlapping(
    map: &BTreeMap<Address, CompiledCodeRegion>,
    range: &CodeRange,
) -> Option<CompiledCodeRegion> {
    let before = map
        .range(..=range.start)
        .next_back()
        .map(|(_, r)| *r)
        .filter(|r| r.range.overlaps(range));
    before.or_else(|| {
        map.range(range.start..range.end())
            .next()
            .map(|(_, r)| *r)
    })
}
