pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod manager;
pub mod memory;
pub mod paging;
pub mod policy;
pub mod segmentation;
pub mod types;
pub mod virtual_memory;

// Re-export commonly used items for convenience
pub use error::{Result, SimError};
pub use manager::{MemoryManager, Request, Response};
pub use paging::PagingEngine;
pub use segmentation::SegmentationEngine;
pub use types::{Access, Algorithm, PageKey, ProcessId};
pub use virtual_memory::VirtualMemoryEngine;
