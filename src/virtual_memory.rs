//! Demand-paged virtual memory backed by a swap store.
//!
//! Pages are born in swap and only reach a frame on a fault:
//! `allocate -> InSwap -> fault -> Resident -> evicted -> InSwap -> ...`.
//! A page is never in a frame and a swap slot at the same time.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{require_positive, Result, SimError};
use crate::memory::SlotTable;
use crate::policy::{EvictionPolicy, Replacer};
use crate::types::{next_pages, Access, Algorithm, PageKey, PageNumber, PageTableEntry, ProcessId};

#[derive(Debug, Clone)]
pub struct VirtualMemoryEngine {
    total_memory: usize,
    page_size: usize,
    swap_size: usize,
    frames: SlotTable,
    swap: SlotTable,
    page_table: BTreeMap<ProcessId, Vec<PageTableEntry>>,
    policy: EvictionPolicy<PageKey>,
    page_faults: u64,
    swap_operations: u64,
    last_evicted_frame: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualMemorySnapshot {
    pub algorithm: Algorithm,
    pub total_memory: usize,
    pub page_size: usize,
    pub swap_size: usize,
    pub frame_count: usize,
    pub swap_count: usize,
    pub frames: Vec<Option<PageKey>>,
    pub swap: Vec<Option<PageKey>>,
    pub page_table: BTreeMap<ProcessId, Vec<PageTableEntry>>,
    pub page_faults: u64,
    pub swap_operations: u64,
    pub last_evicted_frame: Option<usize>,
}

impl VirtualMemoryEngine {
    pub fn new(total_memory: usize, page_size: usize, swap_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(SimError::Configuration("page_size must be positive".into()));
        }
        if total_memory / page_size == 0 {
            return Err(SimError::Configuration(format!(
                "total_memory {total_memory} holds no page of size {page_size}"
            )));
        }
        if swap_size / page_size == 0 {
            return Err(SimError::Configuration(format!(
                "swap_size {swap_size} holds no page of size {page_size}"
            )));
        }
        Ok(Self::fresh(total_memory, page_size, swap_size))
    }

    fn fresh(total_memory: usize, page_size: usize, swap_size: usize) -> Self {
        VirtualMemoryEngine {
            total_memory,
            page_size,
            swap_size,
            frames: SlotTable::new(total_memory / page_size),
            swap: SlotTable::new(swap_size / page_size),
            page_table: BTreeMap::new(),
            policy: EvictionPolicy::default(),
            page_faults: 0,
            swap_operations: 0,
            last_evicted_frame: None,
        }
    }

    pub fn configure(&mut self, total_memory: usize, page_size: usize, swap_size: usize) -> Result<()> {
        *self = Self::new(total_memory, page_size, swap_size)?;
        Ok(())
    }

    /// Clear frames, swap, tables, bookkeeping and counters.
    pub fn reset(&mut self) {
        *self = Self::fresh(self.total_memory, self.page_size, self.swap_size);
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.policy = EvictionPolicy::rebuilt(algorithm, self.frames.occupants());
    }

    pub fn algorithm(&self) -> Algorithm {
        self.policy.algorithm()
    }

    pub fn page_faults(&self) -> u64 {
        self.page_faults
    }

    pub fn swap_operations(&self) -> u64 {
        self.swap_operations
    }

    /// Give a process `num_pages` new pages, all placed in swap.
    ///
    /// Either every page gets a slot or none does.
    pub fn allocate(&mut self, process_id: &ProcessId, num_pages: usize) -> Result<Vec<PageNumber>> {
        require_positive(num_pages, "num_pages")?;
        let free = self.swap.free_count();
        if free < num_pages {
            warn!(process = %process_id, num_pages, free, "out of swap space");
            return Err(SimError::OutOfSwapSpace { needed: num_pages, free });
        }

        let entries = self.page_table.get(process_id).map_or(&[][..], Vec::as_slice);
        let pages = next_pages(entries, num_pages)?;

        let table = self.page_table.entry(process_id.clone()).or_default();
        for page in pages.clone() {
            let slot = self
                .swap
                .first_free()
                .ok_or(SimError::OutOfSwapSpace { needed: 1, free: 0 })?;
            self.swap.occupy(slot, PageKey::new(process_id.clone(), page));
            table.push(PageTableEntry::in_swap(page, slot));
        }
        debug!(process = %process_id, num_pages, "pages allocated to swap");
        Ok(pages.collect())
    }

    /// Access a page, faulting it in from swap if it is not resident.
    ///
    /// Every failure is detected before anything is mutated, including the
    /// fault counter.
    pub fn request_access(&mut self, process_id: &ProcessId, page_number: PageNumber) -> Result<Access> {
        let table = self
            .page_table
            .get(process_id)
            .ok_or_else(|| SimError::ProcessNotFound(process_id.clone()))?;
        let entry = *table
            .iter()
            .find(|e| e.page_number == page_number)
            .ok_or_else(|| SimError::PageNotAllocated { process: process_id.clone(), page: page_number })?;

        let key = PageKey::new(process_id.clone(), page_number);
        if let Some(frame) = entry.frame() {
            self.policy.record_access(&key);
            return Ok(Access::Hit { frame });
        }

        let source = entry
            .swap_slot()
            .filter(|&slot| self.swap.get(slot) == Some(&key))
            .or_else(|| self.swap.position(&key))
            .ok_or_else(|| SimError::SwapSlotMissing { process: process_id.clone(), page: page_number })?;

        let (frame, evicted) = match self.frames.first_free() {
            Some(frame) => (frame, None),
            None => {
                let residents = self.frames.occupants();
                let victim = self.policy.pick_victim(&residents).ok_or(SimError::EvictionImpossible)?;
                let victim_frame = self.frames.position(&victim).ok_or(SimError::EvictionImpossible)?;
                let target = self.swap.first_free().ok_or_else(|| {
                    warn!(victim = %victim, "no swap slot for eviction");
                    SimError::OutOfSwapSpace { needed: 1, free: 0 }
                })?;
                self.swap_out(&victim, victim_frame, target);
                (victim_frame, Some(victim))
            }
        };

        self.page_faults += 1;
        self.promote(key, source, frame);
        debug!(process = %process_id, page = page_number, frame, faults = self.page_faults, "page fault");
        Ok(Access::Fault { frame, evicted })
    }

    /// Drop a process, releasing its frames and swap slots.
    pub fn deallocate(&mut self, process_id: &ProcessId) -> Result<()> {
        let table = self
            .page_table
            .remove(process_id)
            .ok_or_else(|| SimError::ProcessNotFound(process_id.clone()))?;
        for entry in &table {
            self.policy.forget(&PageKey::new(process_id.clone(), entry.page_number));
        }
        self.frames.release_process(process_id);
        self.swap.release_process(process_id);
        debug!(process = %process_id, pages = table.len(), "process deallocated");
        Ok(())
    }

    pub fn snapshot(&self) -> VirtualMemorySnapshot {
        VirtualMemorySnapshot {
            algorithm: self.algorithm(),
            total_memory: self.total_memory,
            page_size: self.page_size,
            swap_size: self.swap_size,
            frame_count: self.frames.len(),
            swap_count: self.swap.len(),
            frames: self.frames.slots().to_vec(),
            swap: self.swap.slots().to_vec(),
            page_table: self.page_table.clone(),
            page_faults: self.page_faults,
            swap_operations: self.swap_operations,
            last_evicted_frame: self.last_evicted_frame,
        }
    }

    /// Move a resident victim from `frame` into swap slot `slot`.
    fn swap_out(&mut self, victim: &PageKey, frame: usize, slot: usize) {
        self.frames.release(frame);
        self.swap.occupy(slot, victim.clone());
        self.policy.forget(victim);
        if let Some(entry) = self.entry_mut(victim) {
            *entry = PageTableEntry::in_swap(victim.page_number, slot);
        }
        self.swap_operations += 1;
        self.last_evicted_frame = Some(frame);
        debug!(victim = %victim, frame, slot, algorithm = %self.algorithm(), "page swapped out");
    }

    /// Move a page from swap slot `slot` into the free `frame`.
    fn promote(&mut self, key: PageKey, slot: usize, frame: usize) {
        self.swap.release(slot);
        if let Some(entry) = self.entry_mut(&key) {
            *entry = PageTableEntry::in_frame(key.page_number, frame);
        }
        self.frames.occupy(frame, key.clone());
        self.policy.record_load(key);
    }

    fn entry_mut(&mut self, key: &PageKey) -> Option<&mut PageTableEntry> {
        self.page_table
            .get_mut(&key.process_id)?
            .iter_mut()
            .find(|e| e.page_number == key.page_number)
    }
}
