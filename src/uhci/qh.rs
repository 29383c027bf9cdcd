//! Queue Head (QH)
//!
//! Schedule node grouping the transfer descriptors of one logical pipe.
//! Only the two link words are hardware-visible; they are the engine's
//! entire view of the record. While a QH is linked into an active frame the
//! engine owns the element link (it advances it as TDs retire), so software
//! updates it only to queue new work onto an empty element.

use core::sync::atomic::{AtomicU32, Ordering};

use super::link;

/// Queue Head hardware record
///
/// Padded to 16 bytes so ring slots sit at a fixed stride; the engine
/// requires 16-byte alignment of the physical address.
#[repr(C, align(16))]
pub struct QueueHead {
    /// Horizontal link: next QH in the ring, never left dangling
    pub head_link: AtomicU32,
    /// Vertical link: first TD of the element chain, or the empty sentinel
    pub element_link: AtomicU32,
    _reserved: [u32; 2],
}

impl QueueHead {
    /// Create an unlinked queue head with both links terminated
    pub const fn new() -> Self {
        Self {
            head_link: AtomicU32::new(link::TERMINATE),
            element_link: AtomicU32::new(link::EMPTY),
            _reserved: [0; 2],
        }
    }

    /// Point the horizontal link at the next QH in the ring
    #[inline(always)]
    pub fn set_head(&self, qh_phys: u32) {
        self.head_link.store(qh_phys | link::QH, Ordering::Release);
    }

    /// Current horizontal link word
    #[inline(always)]
    pub fn head(&self) -> u32 {
        self.head_link.load(Ordering::Acquire)
    }

    /// Current element link word
    #[inline(always)]
    pub fn element(&self) -> u32 {
        self.element_link.load(Ordering::Acquire)
    }

    /// Whether no TD chain is queued on this QH
    #[inline(always)]
    pub fn element_is_empty(&self) -> bool {
        self.element() & link::TERMINATE != 0
    }

    /// Queue a TD chain: point the element link at its first descriptor
    #[inline(always)]
    pub fn set_element(&self, td_phys: u32) {
        self.element_link.store(td_phys, Ordering::Release);
    }

    /// Mark the element chain empty
    #[inline(always)]
    pub fn clear_element(&self) {
        self.element_link.store(link::EMPTY, Ordering::Release);
    }
}

const _: () = {
    assert!(core::mem::size_of::<QueueHead>() == 16);
    assert!(core::mem::align_of::<QueueHead>() == 16);
};
