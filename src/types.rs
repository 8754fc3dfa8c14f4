use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

pub type PageNumber = usize;
pub type SegmentId = u32;

/// Canonical process identifier.
///
/// Opaque text compared by equality. Numeric ids coming in from the outside
/// are normalized to their decimal text once, at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        ProcessId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProcessId {
    fn from(id: &str) -> Self {
        ProcessId(id.to_string())
    }
}

impl From<String> for ProcessId {
    fn from(id: String) -> Self {
        ProcessId(id)
    }
}

impl From<u64> for ProcessId {
    fn from(id: u64) -> Self {
        ProcessId(id.to_string())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replacement policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Algorithm {
    #[default]
    Fifo,
    Lru,
}

impl FromStr for Algorithm {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FIFO" => Ok(Algorithm::Fifo),
            "LRU" => Ok(Algorithm::Lru),
            other => Err(SimError::InvalidArgument(format!(
                "unknown replacement algorithm: {other}"
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Fifo => write!(f, "FIFO"),
            Algorithm::Lru => write!(f, "LRU"),
        }
    }
}

/// A `(process, page)` pair: what a frame or swap slot holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub process_id: ProcessId,
    pub page_number: PageNumber,
}

impl PageKey {
    pub fn new(process_id: ProcessId, page_number: PageNumber) -> Self {
        PageKey { process_id, page_number }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.process_id, self.page_number)
    }
}

/// Identity of a placed segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    pub process_id: ProcessId,
    pub segment_id: SegmentId,
}

impl SegmentKey {
    pub fn new(process_id: ProcessId, segment_id: SegmentId) -> Self {
        SegmentKey { process_id, segment_id }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:s{}", self.process_id, self.segment_id)
    }
}

/// Where a page currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum PageLocation {
    Frame(usize),
    Swap(usize),
    Unmapped,
}

/// One row of a per-process page table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTableEntry {
    pub page_number: PageNumber,
    pub location: PageLocation,
    pub resident: bool,
}

impl PageTableEntry {
    pub fn unmapped(page_number: PageNumber) -> Self {
        PageTableEntry { page_number, location: PageLocation::Unmapped, resident: false }
    }

    pub fn in_frame(page_number: PageNumber, frame: usize) -> Self {
        PageTableEntry { page_number, location: PageLocation::Frame(frame), resident: true }
    }

    pub fn in_swap(page_number: PageNumber, slot: usize) -> Self {
        PageTableEntry { page_number, location: PageLocation::Swap(slot), resident: false }
    }

    /// The frame holding this page, if resident.
    pub fn frame(&self) -> Option<usize> {
        match self.location {
            PageLocation::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn swap_slot(&self) -> Option<usize> {
        match self.location {
            PageLocation::Swap(slot) => Some(slot),
            _ => None,
        }
    }
}

/// Numbers for `num_pages` new pages following the highest page in `entries`.
///
/// Fails with `InvalidArgument` when the range would run past `usize::MAX`.
pub(crate) fn next_pages(entries: &[PageTableEntry], num_pages: usize) -> Result<Range<PageNumber>, SimError> {
    let overflow = || SimError::InvalidArgument(format!("{num_pages} more pages overflow the page numbers"));
    let start = match entries.iter().map(|e| e.page_number).max() {
        Some(highest) => highest.checked_add(1).ok_or_else(overflow)?,
        None => 0,
    };
    let end = start.checked_add(num_pages).ok_or_else(overflow)?;
    Ok(start..end)
}

/// A page pushed out of its frame to make room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eviction {
    pub frame: usize,
    pub victim: PageKey,
}

/// Outcome of a page access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Access {
    /// Already resident; only recency was refreshed.
    Hit { frame: usize },
    /// Page fault. The page now lives in `frame`.
    Fault { frame: usize, evicted: Option<PageKey> },
}

impl Access {
    pub fn frame(&self) -> usize {
        match self {
            Access::Hit { frame } | Access::Fault { frame, .. } => *frame,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Access::Fault { .. })
    }
}

/// A segment placed in the linear address space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub process_id: ProcessId,
    pub segment_id: SegmentId,
    pub size: usize,
    pub base: usize,
}

impl Segment {
    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.process_id.clone(), self.segment_id)
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.base + self.size
    }
}

/// A free span `[base, base + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBlock {
    pub base: usize,
    pub size: usize,
}

impl FreeBlock {
    pub fn new(base: usize, size: usize) -> Self {
        FreeBlock { base, size }
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.base + self.size
    }
}
