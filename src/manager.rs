//! Session object owning the three engines.
//!
//! Each engine sits behind its own lock, so at most one operation is in
//! flight per engine while the engines themselves stay independent.
//! Reconfiguring builds a complete new engine before swapping it in.

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::error::Result;
use crate::paging::{PagingEngine, PagingSnapshot};
use crate::segmentation::{SegmentationEngine, SegmentationSnapshot};
use crate::types::{Access, Algorithm, PageNumber, ProcessId, Segment, SegmentId};
use crate::virtual_memory::{VirtualMemoryEngine, VirtualMemorySnapshot};

/// One operation against one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    PagingConfigure { total_memory: usize, page_size: usize },
    PagingAlgorithm { algorithm: Algorithm },
    PagingAllocate { process_id: ProcessId, page_number: PageNumber },
    PagingAllocatePages { process_id: ProcessId, num_pages: usize },
    PagingAccess { process_id: ProcessId, page_number: PageNumber },
    PagingDeallocate { process_id: ProcessId },
    PagingReset,
    PagingShow,

    SegmentConfigure { total_memory: usize },
    SegmentAlgorithm { algorithm: Algorithm },
    SegmentAllocate { process_id: ProcessId, segment_id: SegmentId, size: usize },
    SegmentTouch { process_id: ProcessId, segment_id: SegmentId },
    SegmentDeallocate { process_id: ProcessId, segment_id: SegmentId },
    SegmentDeallocateProcess { process_id: ProcessId },
    SegmentReset,
    SegmentShow,

    VmConfigure { total_memory: usize, page_size: usize, swap_size: usize },
    VmAlgorithm { algorithm: Algorithm },
    VmAllocate { process_id: ProcessId, num_pages: usize },
    VmAccess { process_id: ProcessId, page_number: PageNumber },
    VmDeallocate { process_id: ProcessId },
    VmReset,
    VmShow,
}

impl Request {
    /// Whether the request only reads state
    pub fn is_query(&self) -> bool {
        matches!(self, Request::PagingShow | Request::SegmentShow | Request::VmShow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Ok { message: String },
    Pages { pages: Vec<PageNumber> },
    Access { access: Access },
    Segment { segment: Option<Segment> },
    Paging(PagingSnapshot),
    Segmentation(SegmentationSnapshot),
    VirtualMemory(VirtualMemorySnapshot),
}

impl Response {
    fn ok(message: impl Into<String>) -> Self {
        Response::Ok { message: message.into() }
    }
}

pub struct MemoryManager {
    paging: Mutex<PagingEngine>,
    segmentation: Mutex<SegmentationEngine>,
    virtual_memory: Mutex<VirtualMemoryEngine>,
}

impl MemoryManager {
    /// Build all three engines from `config`.
    pub fn new(config: &SimConfig) -> Result<Self> {
        let mut paging = PagingEngine::new(config.paging.total_memory, config.paging.page_size)?;
        paging.set_algorithm(config.paging.algorithm);

        let mut segmentation = SegmentationEngine::new(config.segmentation.total_memory)?;
        segmentation.set_algorithm(config.segmentation.algorithm);

        let vm = &config.virtual_memory;
        let mut virtual_memory = VirtualMemoryEngine::new(vm.total_memory, vm.page_size, vm.swap_size)?;
        virtual_memory.set_algorithm(vm.algorithm);

        info!(
            frames = paging.frame_count(),
            segment_memory = config.segmentation.total_memory,
            swap_size = vm.swap_size,
            "memory manager ready"
        );
        Ok(MemoryManager {
            paging: Mutex::new(paging),
            segmentation: Mutex::new(segmentation),
            virtual_memory: Mutex::new(virtual_memory),
        })
    }

    /// Exclusive access to the paging engine.
    pub fn paging(&self) -> MutexGuard<'_, PagingEngine> {
        self.paging.lock()
    }

    pub fn segmentation(&self) -> MutexGuard<'_, SegmentationEngine> {
        self.segmentation.lock()
    }

    pub fn virtual_memory(&self) -> MutexGuard<'_, VirtualMemoryEngine> {
        self.virtual_memory.lock()
    }

    pub fn configure_paging(&self, total_memory: usize, page_size: usize) -> Result<()> {
        let engine = PagingEngine::new(total_memory, page_size)?;
        *self.paging.lock() = engine;
        info!(total_memory, page_size, "paging reconfigured");
        Ok(())
    }

    pub fn configure_segmentation(&self, total_memory: usize) -> Result<()> {
        let engine = SegmentationEngine::new(total_memory)?;
        *self.segmentation.lock() = engine;
        info!(total_memory, "segmentation reconfigured");
        Ok(())
    }

    pub fn configure_virtual_memory(&self, total_memory: usize, page_size: usize, swap_size: usize) -> Result<()> {
        let engine = VirtualMemoryEngine::new(total_memory, page_size, swap_size)?;
        *self.virtual_memory.lock() = engine;
        info!(total_memory, page_size, swap_size, "virtual memory reconfigured");
        Ok(())
    }

    /// Dispatch one request. Errors are logged and handed back untouched.
    pub fn handle(&self, request: Request) -> Result<Response> {
        if !request.is_query() {
            debug!(?request, "handling request");
        }
        let result = self.dispatch(request);
        if let Err(e) = &result {
            warn!(kind = e.kind(), error = %e, "request failed");
        }
        result
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        use Request::*;

        let response = match request {
            PagingConfigure { total_memory, page_size } => {
                self.configure_paging(total_memory, page_size)?;
                Response::ok("Configuration updated successfully.")
            }
            PagingAlgorithm { algorithm } => {
                self.paging().set_algorithm(algorithm);
                Response::ok(format!("Paging algorithm set to {algorithm}."))
            }
            PagingAllocate { process_id, page_number } => {
                self.paging().allocate(&process_id, page_number)?;
                Response::Pages { pages: vec![page_number] }
            }
            PagingAllocatePages { process_id, num_pages } => {
                let pages = self.paging().allocate_pages(&process_id, num_pages)?;
                Response::Pages { pages }
            }
            PagingAccess { process_id, page_number } => {
                let access = self.paging().request_access(&process_id, page_number)?;
                Response::Access { access }
            }
            PagingDeallocate { process_id } => {
                self.paging().deallocate(&process_id)?;
                Response::ok(format!("Deallocated pages for process {process_id}."))
            }
            PagingReset => {
                self.paging().reset();
                Response::ok("Memory state reset successfully.")
            }
            PagingShow => Response::Paging(self.paging().snapshot()),

            SegmentConfigure { total_memory } => {
                self.configure_segmentation(total_memory)?;
                Response::ok("Configuration updated successfully.")
            }
            SegmentAlgorithm { algorithm } => {
                self.segmentation().set_algorithm(algorithm);
                Response::ok(format!("Segmentation algorithm set to {algorithm}."))
            }
            SegmentAllocate { process_id, segment_id, size } => {
                let segment = self.segmentation().allocate(&process_id, segment_id, size)?;
                Response::Segment { segment }
            }
            SegmentTouch { process_id, segment_id } => {
                self.segmentation().touch(&process_id, segment_id);
                Response::Segment { segment: None }
            }
            SegmentDeallocate { process_id, segment_id } => {
                let segment = self.segmentation().deallocate(&process_id, segment_id)?;
                Response::Segment { segment: Some(segment) }
            }
            SegmentDeallocateProcess { process_id } => {
                let removed = self.segmentation().deallocate_process(&process_id)?;
                Response::ok(format!("Deallocated {} segment(s) of process {process_id}.", removed.len()))
            }
            SegmentReset => {
                self.segmentation().reset();
                Response::ok("Memory state reset successfully.")
            }
            SegmentShow => Response::Segmentation(self.segmentation().snapshot()),

            VmConfigure { total_memory, page_size, swap_size } => {
                self.configure_virtual_memory(total_memory, page_size, swap_size)?;
                Response::ok("Configuration updated successfully.")
            }
            VmAlgorithm { algorithm } => {
                self.virtual_memory().set_algorithm(algorithm);
                Response::ok(format!("Virtual memory algorithm set to {algorithm}."))
            }
            VmAllocate { process_id, num_pages } => {
                let pages = self.virtual_memory().allocate(&process_id, num_pages)?;
                Response::Pages { pages }
            }
            VmAccess { process_id, page_number } => {
                let access = self.virtual_memory().request_access(&process_id, page_number)?;
                Response::Access { access }
            }
            VmDeallocate { process_id } => {
                self.virtual_memory().deallocate(&process_id)?;
                Response::ok(format!("Deallocated pages for process {process_id}."))
            }
            VmReset => {
                self.virtual_memory().reset();
                Response::ok("Memory state reset successfully.")
            }
            VmShow => Response::VirtualMemory(self.virtual_memory().snapshot()),
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::error::SimError;

    fn manager() -> MemoryManager {
        MemoryManager::new(&SimConfig::default()).unwrap()
    }

    #[test]
    fn test_new_applies_config() {
        let mut config = SimConfig::default();
        config.paging.algorithm = Algorithm::Lru;
        config.paging.total_memory = 8;
        let manager = MemoryManager::new(&config).unwrap();
        assert_eq!(manager.paging().algorithm(), Algorithm::Lru);
        assert_eq!(manager.paging().frame_count(), 8);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = SimConfig::default();
        config.virtual_memory.page_size = 0;
        assert!(matches!(MemoryManager::new(&config), Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_failed_reconfigure_keeps_engine() {
        let manager = manager();
        manager.paging().allocate(&"P1".into(), 0).unwrap();
        assert!(manager.configure_paging(4, 0).is_err());
        assert_eq!(manager.paging().snapshot().page_table.len(), 1);

        manager.configure_paging(8, 2).unwrap();
        let snap = manager.paging().snapshot();
        assert!(snap.page_table.is_empty());
        assert_eq!(snap.frame_count, 4);
    }

    #[test]
    fn test_handle_paging_flow() {
        let manager = manager();
        let response = manager
            .handle(Request::PagingAllocatePages { process_id: "P1".into(), num_pages: 4 })
            .unwrap();
        assert_eq!(response, Response::Pages { pages: vec![0, 1, 2, 3] });

        let response = manager
            .handle(Request::PagingAccess { process_id: "P1".into(), page_number: 0 })
            .unwrap();
        assert_eq!(response, Response::Access { access: Access::Hit { frame: 0 } });

        match manager.handle(Request::PagingShow).unwrap() {
            Response::Paging(snap) => assert_eq!(snap.page_faults, 0),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_handle_propagates_errors() {
        let manager = manager();
        let err = manager
            .handle(Request::VmAccess { process_id: "P1".into(), page_number: 0 })
            .unwrap_err();
        assert_eq!(err, SimError::ProcessNotFound("P1".into()));

        let err = manager
            .handle(Request::SegmentDeallocate { process_id: "P1".into(), segment_id: 0 })
            .unwrap_err();
        assert_eq!(err.kind(), "SegmentNotFound");
    }

    #[test]
    fn test_engines_are_independent() {
        let manager = manager();
        manager
            .handle(Request::PagingAllocatePages { process_id: "P1".into(), num_pages: 2 })
            .unwrap();
        manager
            .handle(Request::SegmentAllocate { process_id: "P1".into(), segment_id: 0, size: 4 })
            .unwrap();
        manager.handle(Request::PagingReset).unwrap();

        assert!(manager.paging().snapshot().page_table.is_empty());
        assert_eq!(manager.segmentation().snapshot().memory.len(), 1);
        assert!(manager.virtual_memory().snapshot().page_table.is_empty());
    }

    #[test]
    fn test_request_json_shape() {
        let request: Request =
            serde_json::from_str(r#"{"op":"vm_allocate","process_id":"P1","num_pages":2}"#).unwrap();
        assert_eq!(request, Request::VmAllocate { process_id: "P1".into(), num_pages: 2 });

        let request: Request = serde_json::from_str(r#"{"op":"paging_algorithm","algorithm":"LRU"}"#).unwrap();
        assert_eq!(request, Request::PagingAlgorithm { algorithm: Algorithm::Lru });
    }

    #[test]
    fn test_response_json_shape() {
        let json = serde_json::to_value(Response::ok("done")).unwrap();
        assert_eq!(json["kind"], "ok");
        assert_eq!(json["message"], "done");

        let manager = manager();
        let json = serde_json::to_value(manager.handle(Request::VmShow).unwrap()).unwrap();
        assert_eq!(json["kind"], "virtual_memory");
        assert_eq!(json["swap_count"], 8);
        assert_eq!(json["algorithm"], "FIFO");
    }

    #[test]
    fn test_concurrent_requests_serialize_per_engine() {
        let mut config = SimConfig::default();
        config.virtual_memory.swap_size = 64;
        let manager = Arc::new(MemoryManager::new(&config).unwrap());

        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    let pid = ProcessId::from(i);
                    manager
                        .handle(Request::VmAllocate { process_id: pid.clone(), num_pages: 4 })
                        .unwrap();
                    for page in 0..4 {
                        manager
                            .handle(Request::VmAccess { process_id: pid.clone(), page_number: page })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = manager.virtual_memory().snapshot();
        assert_eq!(snap.page_table.len(), 8);
        // every access was to a page not yet loaded
        assert_eq!(snap.page_faults, 32);
        assert_eq!(snap.frames.iter().flatten().count(), 4);
        assert_eq!(snap.swap.iter().flatten().count(), 28);
    }
}
