//! Contiguous DMA memory capability
//!
//! The schedule the controller walks must live in one physically contiguous,
//! naturally aligned region whose physical address is programmed into the
//! frame-list base register. Allocation itself is platform glue; the driver
//! consumes it through the [`ContiguousDma`] trait and keeps the returned
//! [`DmaRegion`] alive and unmoved for the whole run of the engine.

use core::ptr::NonNull;

use crate::error::Result;

/// Size of the schedule region handed to the controller (64 KiB)
pub const SCHEDULE_REGION_SIZE: usize = 64 * 1024;

/// Required physical alignment of the schedule region (64 KiB)
pub const SCHEDULE_REGION_ALIGN: usize = 64 * 1024;

/// One physically contiguous DMA region
///
/// Pairs the driver-visible virtual pointer with the physical address the
/// hardware dereferences. The region is exclusively owned by the driver;
/// the platform allocator must keep the backing memory mapped and resident
/// for as long as the handle exists.
#[derive(Debug)]
pub struct DmaRegion {
    virt: NonNull<u8>,
    phys: u32,
    len: usize,
}

impl DmaRegion {
    /// Wrap an allocated contiguous region
    ///
    /// # Safety
    ///
    /// `virt` must point to `len` bytes of memory that is physically
    /// contiguous starting at `phys`, mapped for the lifetime of the handle,
    /// and not aliased by any other DMA user.
    pub unsafe fn new(virt: NonNull<u8>, phys: u32, len: usize) -> Self {
        Self { virt, phys, len }
    }

    /// Virtual base pointer of the region
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.virt.as_ptr()
    }

    /// Physical base address seen by the controller
    #[inline(always)]
    pub fn phys(&self) -> u32 {
        self.phys
    }

    /// Region length in bytes
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Contiguous physical memory allocator capability
///
/// Provided by the surrounding platform (the driver never allocates on its
/// own). Allocation failure is fatal to a schedule (re)build and must be
/// reported before any hardware register is touched with a stale pointer.
pub trait ContiguousDma {
    /// Allocate `size` bytes of physically contiguous memory aligned to
    /// `align` bytes (physical alignment).
    fn allocate_contiguous(&mut self, size: usize, align: usize) -> Result<DmaRegion>;
}
