//! Fixed-size paging with FIFO/LRU replacement.
//!
//! Frames hold `(process, page)` identities. When every frame is taken, the
//! active policy picks a victim; its page-table entry becomes unmapped and
//! the pair is recorded on the paging disk until it is loaded again.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::constants::MAX_PAGES_PER_REQUEST;
use crate::error::{require_positive, Result, SimError};
use crate::memory::{DiskStore, SlotTable};
use crate::policy::{EvictionPolicy, Replacer};
use crate::types::{next_pages, Access, Algorithm, Eviction, PageKey, PageNumber, PageTableEntry, ProcessId};

#[derive(Debug, Clone)]
pub struct PagingEngine {
    total_memory: usize,
    page_size: usize,
    frames: SlotTable,
    page_table: BTreeMap<ProcessId, Vec<PageTableEntry>>,
    disk: DiskStore,
    policy: EvictionPolicy<PageKey>,
    page_faults: u64,
    successful_allocations: u64,
    last_evicted_frame: Option<usize>,
}

/// Point-in-time view of a [`PagingEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PagingSnapshot {
    pub algorithm: Algorithm,
    pub total_memory: usize,
    pub page_size: usize,
    pub frame_count: usize,
    pub frames: Vec<Option<PageKey>>,
    pub page_table: BTreeMap<ProcessId, Vec<PageTableEntry>>,
    pub disk: Vec<PageKey>,
    pub page_faults: u64,
    pub successful_allocations: u64,
    pub last_evicted_frame: Option<usize>,
    pub utilization: usize,
}

impl PagingEngine {
    /// Build an engine with `total_memory / page_size` frames.
    pub fn new(total_memory: usize, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(SimError::Configuration("page_size must be positive".into()));
        }
        let frame_count = total_memory / page_size;
        if frame_count == 0 {
            return Err(SimError::Configuration(format!(
                "total_memory {total_memory} holds no page of size {page_size}"
            )));
        }
        Ok(Self::with_frames(total_memory, page_size, frame_count))
    }

    fn with_frames(total_memory: usize, page_size: usize, frame_count: usize) -> Self {
        PagingEngine {
            total_memory,
            page_size,
            frames: SlotTable::new(frame_count),
            page_table: BTreeMap::new(),
            disk: DiskStore::new(),
            policy: EvictionPolicy::default(),
            page_faults: 0,
            successful_allocations: 0,
            last_evicted_frame: None,
        }
    }

    /// Replace all state with a freshly configured engine.
    ///
    /// On error the current state is kept.
    pub fn configure(&mut self, total_memory: usize, page_size: usize) -> Result<()> {
        *self = Self::new(total_memory, page_size)?;
        Ok(())
    }

    /// Same as `configure` with the current parameters.
    pub fn reset(&mut self) {
        *self = Self::with_frames(self.total_memory, self.page_size, self.frames.len());
    }

    /// Switch policy. Residents stay put but are re-recorded as freshly
    /// loaded, in frame order.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.policy = EvictionPolicy::rebuilt(algorithm, self.frames.occupants());
    }

    pub fn algorithm(&self) -> Algorithm {
        self.policy.algorithm()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn page_faults(&self) -> u64 {
        self.page_faults
    }

    /// Add `page_number` to the process's table and map it.
    ///
    /// Idempotent: a page the process already has is left untouched. When no
    /// frame is free, a victim is evicted first, which counts as a fault.
    pub fn allocate(&mut self, process_id: &ProcessId, page_number: PageNumber) -> Result<()> {
        if self.entry(process_id, page_number).is_some() {
            return Ok(());
        }

        let frame = match self.frames.first_free() {
            Some(frame) => {
                self.successful_allocations += 1;
                frame
            }
            None => {
                let eviction = self.evict()?;
                self.page_faults += 1;
                eviction.frame
            }
        };

        let key = PageKey::new(process_id.clone(), page_number);
        self.page_table
            .entry(process_id.clone())
            .or_default()
            .push(PageTableEntry::unmapped(page_number));
        self.map(key, frame);
        debug!(process = %process_id, page = page_number, frame, "page allocated");
        Ok(())
    }

    /// Allocate `num_pages` pages numbered after the process's highest page.
    ///
    /// At most `MAX_PAGES_PER_REQUEST` pages per call.
    pub fn allocate_pages(&mut self, process_id: &ProcessId, num_pages: usize) -> Result<Vec<PageNumber>> {
        require_positive(num_pages, "num_pages")?;
        if num_pages > MAX_PAGES_PER_REQUEST {
            return Err(SimError::InvalidArgument(format!(
                "num_pages {num_pages} exceeds {MAX_PAGES_PER_REQUEST}"
            )));
        }
        let entries = self.page_table.get(process_id).map_or(&[][..], Vec::as_slice);
        let pages = next_pages(entries, num_pages)?;

        for page in pages.clone() {
            self.allocate(process_id, page)?;
        }
        Ok(pages.collect())
    }

    /// Touch a page. A hit refreshes recency; a miss is a page fault that
    /// loads the page, evicting a victim if no frame is free.
    pub fn request_access(&mut self, process_id: &ProcessId, page_number: PageNumber) -> Result<Access> {
        let table = self
            .page_table
            .get(process_id)
            .ok_or_else(|| SimError::ProcessNotFound(process_id.clone()))?;
        let entry = table
            .iter()
            .find(|e| e.page_number == page_number)
            .ok_or_else(|| SimError::PageNotAllocated { process: process_id.clone(), page: page_number })?;

        let key = PageKey::new(process_id.clone(), page_number);
        if let Some(frame) = entry.frame() {
            self.policy.record_access(&key);
            return Ok(Access::Hit { frame });
        }

        let (frame, evicted) = match self.frames.first_free() {
            Some(frame) => (frame, None),
            None => {
                let eviction = self.evict()?;
                (eviction.frame, Some(eviction.victim))
            }
        };
        self.page_faults += 1;
        self.map(key, frame);
        debug!(process = %process_id, page = page_number, frame, faults = self.page_faults, "page fault");
        Ok(Access::Fault { frame, evicted })
    }

    /// Free one frame according to the active policy.
    ///
    /// The victim's entry becomes unmapped and the pair is written to disk.
    pub fn evict(&mut self) -> Result<Eviction> {
        let residents = self.frames.occupants();
        let victim = self.policy.pick_victim(&residents).ok_or(SimError::EvictionImpossible)?;
        let frame = self.frames.position(&victim).ok_or(SimError::EvictionImpossible)?;

        self.frames.release(frame);
        self.policy.forget(&victim);
        if let Some(entry) = self.entry_mut(&victim.process_id, victim.page_number) {
            *entry = PageTableEntry::unmapped(victim.page_number);
        }
        self.disk.write(victim.clone());
        self.last_evicted_frame = Some(frame);

        debug!(victim = %victim, frame, algorithm = %self.algorithm(), "page evicted");
        Ok(Eviction { frame, victim })
    }

    /// Drop a process: free its frames, table and bookkeeping.
    pub fn deallocate(&mut self, process_id: &ProcessId) -> Result<()> {
        let table = self
            .page_table
            .remove(process_id)
            .ok_or_else(|| SimError::ProcessNotFound(process_id.clone()))?;

        for entry in &table {
            self.policy.forget(&PageKey::new(process_id.clone(), entry.page_number));
        }
        let freed = self.frames.release_process(process_id);
        self.disk.remove_process(process_id);
        debug!(process = %process_id, frames = freed.len(), "process deallocated");
        Ok(())
    }

    pub fn snapshot(&self) -> PagingSnapshot {
        PagingSnapshot {
            algorithm: self.algorithm(),
            total_memory: self.total_memory,
            page_size: self.page_size,
            frame_count: self.frames.len(),
            frames: self.frames.slots().to_vec(),
            page_table: self.page_table.clone(),
            disk: self.disk.pages(),
            page_faults: self.page_faults,
            successful_allocations: self.successful_allocations,
            last_evicted_frame: self.last_evicted_frame,
            utilization: self.frames.utilization(),
        }
    }

    fn map(&mut self, key: PageKey, frame: usize) {
        if let Some(entry) = self.entry_mut(&key.process_id, key.page_number) {
            *entry = PageTableEntry::in_frame(key.page_number, frame);
        }
        self.disk.remove(&key);
        self.frames.occupy(frame, key.clone());
        self.policy.record_load(key);
    }

    fn entry(&self, process_id: &ProcessId, page_number: PageNumber) -> Option<&PageTableEntry> {
        self.page_table
            .get(process_id)?
            .iter()
            .find(|e| e.page_number == page_number)
    }

    fn entry_mut(&mut self, process_id: &ProcessId, page_number: PageNumber) -> Option<&mut PageTableEntry> {
        self.page_table
            .get_mut(process_id)?
            .iter_mut()
            .find(|e| e.page_number == page_number)
    }
}
