// Default simulator configuration (sizes are in abstract units, e.g. KB)
pub const DEFAULT_TOTAL_MEMORY: usize = 4;
pub const DEFAULT_PAGE_SIZE: usize = 1;
pub const DEFAULT_SWAP_SIZE: usize = 8;
pub const DEFAULT_SEGMENT_MEMORY: usize = 16;

// LRU clock value reported for residents that have never been stamped
pub const UNSTAMPED: u64 = 0;

// Upper bound on pages handed out by one count-based allocation
pub const MAX_PAGES_PER_REQUEST: usize = 4096;

pub const PERCENT: usize = 100;
