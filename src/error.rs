//! Error kinds surfaced by the simulation engines.

use thiserror::Error;

use crate::types::{PageNumber, ProcessId, SegmentId};

/// Errors returned by engine operations.
///
/// A failed operation never leaves an engine partially mutated, so callers can
/// keep using the engine after any non-fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("process {0} not found")]
    ProcessNotFound(ProcessId),

    #[error("page {page} was never allocated to process {process}")]
    PageNotAllocated { process: ProcessId, page: PageNumber },

    #[error("segment {segment} of process {process} not found")]
    SegmentNotFound { process: ProcessId, segment: SegmentId },

    #[error("out of swap space: {needed} slot(s) needed, {free} free")]
    OutOfSwapSpace { needed: usize, free: usize },

    #[error("cannot place {size} units: no free block fits and no segment can be evicted")]
    AllocationFailed { size: usize },

    #[error("eviction impossible: no resident page to evict")]
    EvictionImpossible,

    #[error("page {page} of process {process} is neither resident nor in swap")]
    SwapSlotMissing { process: ProcessId, page: PageNumber },
}

impl SimError {
    /// Stable kind name, suitable for wire responses.
    pub fn kind(&self) -> &'static str {
        match self {
            SimError::Configuration(_) => "ConfigurationError",
            SimError::InvalidArgument(_) => "InvalidArgument",
            SimError::ProcessNotFound(_) => "ProcessNotFound",
            SimError::PageNotAllocated { .. } => "PageNotAllocated",
            SimError::SegmentNotFound { .. } => "SegmentNotFound",
            SimError::OutOfSwapSpace { .. } => "OutOfSwapSpace",
            SimError::AllocationFailed { .. } => "AllocationFailed",
            SimError::EvictionImpossible => "EvictionImpossible",
            SimError::SwapSlotMissing { .. } => "SwapSlotMissing",
        }
    }

    /// Internal invariant violations. These indicate corrupt engine state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimError::EvictionImpossible | SimError::SwapSlotMissing { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Reject zero where a positive count or size is required.
pub(crate) fn require_positive(value: usize, what: &str) -> Result<usize> {
    if value == 0 {
        return Err(SimError::InvalidArgument(format!("{what} must be positive")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(SimError::EvictionImpossible.kind(), "EvictionImpossible");
        assert_eq!(
            SimError::Configuration("page_size".into()).kind(),
            "ConfigurationError"
        );
        assert_eq!(
            SimError::ProcessNotFound(ProcessId::from("P1")).kind(),
            "ProcessNotFound"
        );
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(SimError::EvictionImpossible.is_fatal());
        assert!(SimError::SwapSlotMissing { process: "P1".into(), page: 0 }.is_fatal());
        assert!(!SimError::OutOfSwapSpace { needed: 1, free: 0 }.is_fatal());
        assert!(!SimError::AllocationFailed { size: 3 }.is_fatal());
    }

    #[test]
    fn test_display_mentions_entity() {
        let err = SimError::PageNotAllocated { process: "P7".into(), page: 3 };
        let text = err.to_string();
        assert!(text.contains("P7"));
        assert!(text.contains('3'));
    }

    #[test]
    fn test_require_positive() {
        assert_eq!(require_positive(5, "num_pages"), Ok(5));
        assert!(matches!(
            require_positive(0, "num_pages"),
            Err(SimError::InvalidArgument(msg)) if msg.contains("num_pages")
        ));
    }
}
