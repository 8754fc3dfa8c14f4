use std::collections::BTreeSet;

use crate::types::{FreeBlock, PageKey, ProcessId};

/// Fixed array of page-sized slots, used for both physical frames and swap.
///
/// Each slot holds at most one `(process, page)` pair. Only identities are
/// tracked, never page contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    slots: Vec<Option<PageKey>>,
}

impl SlotTable {
    /// Create a table of `count` empty slots
    pub fn new(count: usize) -> Self {
        SlotTable { slots: vec![None; count] }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&PageKey> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Lowest-indexed empty slot
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    pub fn used_count(&self) -> usize {
        self.len() - self.free_count()
    }

    /// Slot currently holding `key`
    pub fn position(&self, key: &PageKey) -> Option<usize> {
        self.slots.iter().position(|s| s.as_ref() == Some(key))
    }

    /// Place `key` into an empty slot.
    pub fn occupy(&mut self, index: usize, key: PageKey) {
        debug_assert!(self.slots[index].is_none(), "slot {} already occupied", index);
        self.slots[index] = Some(key);
    }

    /// Empty a slot, returning whatever it held.
    pub fn release(&mut self, index: usize) -> Option<PageKey> {
        self.slots[index].take()
    }

    /// Empty every slot owned by `process`, returning the freed indices.
    pub fn release_process(&mut self, process: &ProcessId) -> Vec<usize> {
        let mut freed = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|k| &k.process_id == process) {
                *slot = None;
                freed.push(index);
            }
        }
        freed
    }

    /// Occupants in slot order
    pub fn occupants(&self) -> Vec<PageKey> {
        self.slots.iter().flatten().cloned().collect()
    }

    pub fn slots(&self) -> &[Option<PageKey>] {
        &self.slots
    }

    /// Occupied share of the table as an integer percentage
    pub fn utilization(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.used_count() * crate::constants::PERCENT / self.len()
    }
}

/// Paging disk: records which pages have been written out.
///
/// Presence only. Kept ordered so snapshots are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskStore {
    pages: BTreeSet<PageKey>,
}

impl DiskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, key: PageKey) {
        self.pages.insert(key);
    }

    /// Drop a page that has been read back into memory
    pub fn remove(&mut self, key: &PageKey) -> bool {
        self.pages.remove(key)
    }

    pub fn contains(&self, key: &PageKey) -> bool {
        self.pages.contains(key)
    }

    pub fn remove_process(&mut self, process: &ProcessId) {
        self.pages.retain(|k| &k.process_id != process);
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> Vec<PageKey> {
        self.pages.iter().cloned().collect()
    }
}

/// Free-block list over a linear address space.
///
/// Blocks stay sorted by base address and never overlap. After every
/// `release` the list is maximally coalesced: no zero-size block and no two
/// blocks with `a.base + a.size == b.base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeList {
    blocks: Vec<FreeBlock>,
}

impl FreeList {
    /// One free block spanning `[0, total)`.
    pub fn new(total: usize) -> Self {
        let blocks = if total > 0 { vec![FreeBlock::new(0, total)] } else { Vec::new() };
        FreeList { blocks }
    }

    #[cfg(test)]
    pub(crate) fn from_blocks(mut blocks: Vec<FreeBlock>) -> Self {
        blocks.sort_by_key(|b| b.base);
        FreeList { blocks }
    }

    pub fn blocks(&self) -> &[FreeBlock] {
        &self.blocks
    }

    pub fn total_free(&self) -> usize {
        self.blocks.iter().map(|b| b.size).sum()
    }

    pub fn largest(&self) -> usize {
        self.blocks.iter().map(|b| b.size).max().unwrap_or(0)
    }

    /// First block, in ascending base order, with room for `size` units.
    pub fn first_fit(&self, size: usize) -> Option<usize> {
        self.blocks.iter().position(|b| b.size >= size)
    }

    /// Carve `size` units off the low end of block `index`, returning the base.
    ///
    /// The remainder shrinks in place, or the block disappears if used up.
    pub fn take(&mut self, index: usize, size: usize) -> usize {
        let FreeBlock { base, size: available } = self.blocks[index];
        debug_assert!(available >= size);
        if available == size {
            self.blocks.remove(index);
        } else {
            self.blocks[index] = FreeBlock::new(base + size, available - size);
        }
        base
    }

    /// Return a span to the list and coalesce.
    pub fn release(&mut self, base: usize, size: usize) {
        if size > 0 {
            self.blocks.push(FreeBlock::new(base, size));
        }
        self.coalesce();
    }

    /// Sort by base and merge every adjacent pair, left to right.
    pub fn coalesce(&mut self) {
        self.blocks.retain(|b| b.size > 0);
        self.blocks.sort_by_key(|b| b.base);

        let mut merged: Vec<FreeBlock> = Vec::with_capacity(self.blocks.len());
        for block in self.blocks.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.end() == block.base => prev.size += block.size,
                _ => merged.push(block),
            }
        }
        self.blocks = merged;
    }

    /// No zero-size blocks, sorted, non-overlapping, and no adjacent pair.
    pub fn is_coalesced(&self) -> bool {
        self.blocks.iter().all(|b| b.size > 0)
            && self.blocks.windows(2).all(|w| w[0].end() < w[1].base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(p: &str, n: usize) -> PageKey {
        PageKey::new(p.into(), n)
    }

    #[test]
    fn test_slot_table_initialization() {
        let table = SlotTable::new(4);
        assert_eq!(table.len(), 4);
        assert_eq!(table.free_count(), 4);
        assert_eq!(table.first_free(), Some(0));
        assert_eq!(table.utilization(), 0);
    }

    #[test]
    fn test_slot_occupy_release() {
        let mut table = SlotTable::new(3);
        table.occupy(0, key("P1", 0));
        table.occupy(1, key("P1", 1));

        assert_eq!(table.first_free(), Some(2));
        assert_eq!(table.position(&key("P1", 1)), Some(1));
        assert_eq!(table.get(0), Some(&key("P1", 0)));

        assert_eq!(table.release(0), Some(key("P1", 0)));
        assert_eq!(table.first_free(), Some(0));
        assert_eq!(table.release(0), None);
    }

    #[test]
    fn test_slot_release_process() {
        let mut table = SlotTable::new(4);
        table.occupy(0, key("P1", 0));
        table.occupy(1, key("P2", 0));
        table.occupy(3, key("P1", 1));

        assert_eq!(table.release_process(&"P1".into()), vec![0, 3]);
        assert_eq!(table.occupants(), vec![key("P2", 0)]);
    }

    #[test]
    fn test_utilization() {
        let mut table = SlotTable::new(4);
        table.occupy(2, key("P1", 0));
        assert_eq!(table.utilization(), 25);
        table.occupy(0, key("P1", 1));
        table.occupy(1, key("P1", 2));
        assert_eq!(table.utilization(), 75);
    }

    #[test]
    fn test_disk_store() {
        let mut disk = DiskStore::new();
        disk.write(key("P2", 0));
        disk.write(key("P1", 3));
        disk.write(key("P1", 3));
        assert_eq!(disk.len(), 2);
        // ordered by process, then page
        assert_eq!(disk.pages(), vec![key("P1", 3), key("P2", 0)]);

        assert!(disk.remove(&key("P1", 3)));
        assert!(!disk.contains(&key("P1", 3)));

        disk.remove_process(&"P2".into());
        assert!(disk.is_empty());
    }

    #[test]
    fn test_free_list_first_fit_split() {
        let mut free = FreeList::from_blocks(vec![FreeBlock::new(0, 10), FreeBlock::new(20, 5)]);
        let index = free.first_fit(4).unwrap();
        assert_eq!(free.take(index, 4), 0);
        assert_eq!(free.blocks(), &[FreeBlock::new(4, 6), FreeBlock::new(20, 5)]);
    }

    #[test]
    fn test_free_list_first_fit_skips_small() {
        let free = FreeList::from_blocks(vec![FreeBlock::new(0, 2), FreeBlock::new(5, 8)]);
        assert_eq!(free.first_fit(3), Some(1));
        assert_eq!(free.first_fit(9), None);
    }

    #[test]
    fn test_free_list_exact_take_removes_block() {
        let mut free = FreeList::new(8);
        assert_eq!(free.take(0, 8), 0);
        assert!(free.blocks().is_empty());
        assert_eq!(free.total_free(), 0);
    }

    #[test]
    fn test_coalesce_both_neighbours() {
        let mut free = FreeList::from_blocks(vec![FreeBlock::new(0, 4), FreeBlock::new(6, 4)]);
        free.release(4, 2);
        assert_eq!(free.blocks(), &[FreeBlock::new(0, 10)]);
        assert!(free.is_coalesced());
    }

    #[test]
    fn test_coalesce_keeps_gaps() {
        let mut free = FreeList::new(0);
        free.release(10, 5);
        free.release(0, 3);
        assert_eq!(free.blocks(), &[FreeBlock::new(0, 3), FreeBlock::new(10, 5)]);
        assert_eq!(free.largest(), 5);
    }

    #[test]
    fn test_release_zero_size_is_ignored() {
        let mut free = FreeList::new(4);
        free.release(4, 0);
        assert_eq!(free.blocks(), &[FreeBlock::new(0, 4)]);
    }

    #[test]
    fn test_is_coalesced_detects_adjacent() {
        let free = FreeList::from_blocks(vec![FreeBlock::new(0, 4), FreeBlock::new(4, 4)]);
        assert!(!free.is_coalesced());
    }
}
