//! Dynamic segmentation with first-fit placement.
//!
//! Memory is one linear range `[0, total_memory)` split between placed
//! segments and a coalesced free-block list; together they always cover the
//! whole range exactly once.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, SimError};
use crate::memory::FreeList;
use crate::policy::{EvictionPolicy, Replacer};
use crate::types::{Algorithm, FreeBlock, ProcessId, Segment, SegmentId, SegmentKey};

#[derive(Debug, Clone)]
pub struct SegmentationEngine {
    total_memory: usize,
    free: FreeList,
    segments: BTreeMap<ProcessId, BTreeMap<SegmentId, Segment>>,
    policy: EvictionPolicy<SegmentKey>,
    allocation_failures: u64,
    evictions: u64,
    last_allocation: Option<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentationSnapshot {
    pub algorithm: Algorithm,
    pub total_memory: usize,
    pub used_memory: usize,
    pub free_memory: usize,
    /// Every placed segment, by base address
    pub memory: Vec<Segment>,
    pub segment_table: BTreeMap<ProcessId, Vec<Segment>>,
    pub free_blocks: Vec<FreeBlock>,
    pub largest_free_block: usize,
    pub allocation_failures: u64,
    pub evictions: u64,
    pub last_allocation: Option<Segment>,
}

impl SegmentationEngine {
    pub fn new(total_memory: usize) -> Result<Self> {
        if total_memory == 0 {
            return Err(SimError::Configuration("total_memory must be positive".into()));
        }
        Ok(Self::fresh(total_memory))
    }

    fn fresh(total_memory: usize) -> Self {
        SegmentationEngine {
            total_memory,
            free: FreeList::new(total_memory),
            segments: BTreeMap::new(),
            policy: EvictionPolicy::default(),
            allocation_failures: 0,
            evictions: 0,
            last_allocation: None,
        }
    }

    pub fn configure(&mut self, total_memory: usize) -> Result<()> {
        *self = Self::new(total_memory)?;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::fresh(self.total_memory);
    }

    /// Select which segment is evicted under capacity pressure. Placement is
    /// first-fit under either policy.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        let residents = self.memory_list().into_iter().map(|s| s.key());
        self.policy = EvictionPolicy::rebuilt(algorithm, residents);
    }

    pub fn algorithm(&self) -> Algorithm {
        self.policy.algorithm()
    }

    pub fn allocation_failures(&self) -> u64 {
        self.allocation_failures
    }

    /// Place a segment of `size` units.
    ///
    /// `size == 0` only touches an existing segment and returns `None`. When no
    /// single free block fits but the free blocks together could hold the
    /// request, existing segments are evicted one at a time, by policy, until
    /// it fits. Otherwise nothing but the failure counter changes.
    pub fn allocate(
        &mut self,
        process_id: &ProcessId,
        segment_id: SegmentId,
        size: usize,
    ) -> Result<Option<Segment>> {
        if size == 0 {
            self.touch(process_id, segment_id);
            return Ok(None);
        }

        let key = SegmentKey::new(process_id.clone(), segment_id);
        if self.get(&key).is_some() {
            return Err(SimError::InvalidArgument(format!("segment {key} is already allocated")));
        }

        if let Some(segment) = self.place(&key, size) {
            return Ok(Some(segment));
        }
        if self.free.total_free() < size {
            return Err(self.fail(size));
        }

        let mut trial = self.clone();
        loop {
            let Some(victim) = trial.pick_victim() else {
                return Err(self.fail(size));
            };
            trial.release(&victim)?;
            trial.evictions += 1;
            debug!(victim = %victim, algorithm = %trial.algorithm(), "segment evicted");

            if let Some(segment) = trial.place(&key, size) {
                *self = trial;
                return Ok(Some(segment));
            }
        }
    }

    /// Refresh the recency of a segment. No-op if it does not exist.
    pub fn touch(&mut self, process_id: &ProcessId, segment_id: SegmentId) -> bool {
        let key = SegmentKey::new(process_id.clone(), segment_id);
        if self.get(&key).is_none() {
            return false;
        }
        self.policy.record_access(&key);
        true
    }

    /// Remove a segment and return its span to the free list.
    pub fn deallocate(&mut self, process_id: &ProcessId, segment_id: SegmentId) -> Result<Segment> {
        let segment = self.release(&SegmentKey::new(process_id.clone(), segment_id))?;
        debug!(process = %process_id, segment = segment_id, base = segment.base, size = segment.size, "segment deallocated");
        Ok(segment)
    }

    /// Remove every segment of a process.
    pub fn deallocate_process(&mut self, process_id: &ProcessId) -> Result<Vec<Segment>> {
        let table = self
            .segments
            .remove(process_id)
            .ok_or_else(|| SimError::ProcessNotFound(process_id.clone()))?;

        for segment in table.values() {
            self.free.release(segment.base, segment.size);
            self.policy.forget(&segment.key());
        }
        debug!(process = %process_id, segments = table.len(), "process segments deallocated");
        Ok(table.into_values().collect())
    }

    pub fn snapshot(&self) -> SegmentationSnapshot {
        let free_memory = self.free.total_free();
        SegmentationSnapshot {
            algorithm: self.algorithm(),
            total_memory: self.total_memory,
            used_memory: self.total_memory - free_memory,
            free_memory,
            memory: self.memory_list(),
            segment_table: self
                .segments
                .iter()
                .map(|(pid, table)| (pid.clone(), table.values().cloned().collect()))
                .collect(),
            free_blocks: self.free.blocks().to_vec(),
            largest_free_block: self.free.largest(),
            allocation_failures: self.allocation_failures,
            evictions: self.evictions,
            last_allocation: self.last_allocation.clone(),
        }
    }

    fn get(&self, key: &SegmentKey) -> Option<&Segment> {
        self.segments.get(&key.process_id)?.get(&key.segment_id)
    }

    fn memory_list(&self) -> Vec<Segment> {
        let mut list: Vec<Segment> = self.segments.values().flat_map(|t| t.values().cloned()).collect();
        list.sort_by_key(|s| s.base);
        list
    }

    fn pick_victim(&self) -> Option<SegmentKey> {
        let residents: Vec<SegmentKey> = self.memory_list().iter().map(Segment::key).collect();
        self.policy.pick_victim(&residents)
    }

    /// First-fit placement. `None` if no single block is large enough.
    fn place(&mut self, key: &SegmentKey, size: usize) -> Option<Segment> {
        let index = self.free.first_fit(size)?;
        let base = self.free.take(index, size);
        let segment = Segment {
            process_id: key.process_id.clone(),
            segment_id: key.segment_id,
            size,
            base,
        };

        self.segments
            .entry(key.process_id.clone())
            .or_default()
            .insert(key.segment_id, segment.clone());
        self.policy.record_load(key.clone());
        self.last_allocation = Some(segment.clone());
        debug!(segment = %key, base, size, "segment placed");
        Some(segment)
    }

    fn release(&mut self, key: &SegmentKey) -> Result<Segment> {
        let not_found = || SimError::SegmentNotFound {
            process: key.process_id.clone(),
            segment: key.segment_id,
        };
        let table = self.segments.get_mut(&key.process_id).ok_or_else(not_found)?;
        let segment = table.remove(&key.segment_id).ok_or_else(not_found)?;
        if table.is_empty() {
            self.segments.remove(&key.process_id);
        }

        self.free.release(segment.base, segment.size);
        self.policy.forget(key);
        Ok(segment)
    }

    fn fail(&mut self, size: usize) -> SimError {
        self.allocation_failures += 1;
        warn!(size, failures = self.allocation_failures, "segment allocation failed");
        SimError::AllocationFailed { size }
    }
}
