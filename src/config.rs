//! Simulator configuration.
//!
//! ```toml
//! [paging]
//! total_memory = 4
//! page_size = 1
//! algorithm = "FIFO"
//!
//! [segmentation]
//! total_memory = 16
//!
//! [virtual_memory]
//! total_memory = 4
//! page_size = 1
//! swap_size = 8
//! algorithm = "LRU"
//! ```
//!
//! Every key is optional and falls back to the defaults in `constants`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;
use crate::types::Algorithm;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub paging: PagingConfig,
    pub segmentation: SegmentationConfig,
    pub virtual_memory: VirtualMemoryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub total_memory: usize,
    pub page_size: usize,
    pub algorithm: Algorithm,
}

impl Default for PagingConfig {
    fn default() -> Self {
        PagingConfig {
            total_memory: DEFAULT_TOTAL_MEMORY,
            page_size: DEFAULT_PAGE_SIZE,
            algorithm: Algorithm::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub total_memory: usize,
    pub algorithm: Algorithm,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        SegmentationConfig {
            total_memory: DEFAULT_SEGMENT_MEMORY,
            algorithm: Algorithm::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMemoryConfig {
    pub total_memory: usize,
    pub page_size: usize,
    pub swap_size: usize,
    pub algorithm: Algorithm,
}

impl Default for VirtualMemoryConfig {
    fn default() -> Self {
        VirtualMemoryConfig {
            total_memory: DEFAULT_TOTAL_MEMORY,
            page_size: DEFAULT_PAGE_SIZE,
            swap_size: DEFAULT_SWAP_SIZE,
            algorithm: Algorithm::default(),
        }
    }
}

impl SimConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}
