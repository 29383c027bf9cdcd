//! DMA schedule builder
//!
//! Builds the hardware-walked schedule inside one contiguous DMA region:
//! a 1024-entry frame list in the first 4 KiB, followed by a closed ring of
//! 32 queue heads and a small TD arena. Every 32nd frame points at the next
//! ring anchor, so the engine visits each anchor once per 32 ms and always
//! has a valid next hop; the remaining frames carry the empty sentinel.
//!
//! Hardware link words are computed from the region's physical base plus a
//! slot index. Software bookkeeping (chain membership, allocation state)
//! lives in index-based arenas beside the region, so no raw pointer in the
//! schedule can dangle.

use core::sync::atomic::{fence, AtomicU32, Ordering};

use super::link;
use super::qh::QueueHead;
use super::td::{status, TransferDescriptor};
use crate::dma::{DmaRegion, SCHEDULE_REGION_ALIGN, SCHEDULE_REGION_SIZE};
use crate::error::{Result, UsbError};

/// Frame list entries, one per 1 ms USB frame
pub const FRAME_LIST_LEN: usize = 1024;

/// Queue heads in the anchor ring
pub const QH_RING_LEN: usize = 32;

/// Transfer descriptors in the arena
pub const TD_POOL_LEN: usize = 64;

/// Completions reported per poll before yielding back to the caller
pub const COMPLETION_BATCH: usize = 8;

const FRAME_LIST_BYTES: usize = FRAME_LIST_LEN * 4;
const QH_RING_OFFSET: usize = FRAME_LIST_BYTES;
const QH_STRIDE: usize = core::mem::size_of::<QueueHead>();
const TD_POOL_OFFSET: usize = QH_RING_OFFSET + QH_RING_LEN * QH_STRIDE;
const TD_STRIDE: usize = core::mem::size_of::<TransferDescriptor>();

/// Anchor index of the full-speed control pipe
///
/// The ring reserves slots for per-class anchors (low-speed control, bulk)
/// but this core only populates the full-speed control class; the others
/// are an extension point.
pub const CONTROL_ANCHOR: usize = 0;

/// One retired transfer descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Completion {
    /// Arena index of the retired TD
    pub td: u8,
    /// Final control/status word written by the engine
    pub status: u32,
    /// Bytes actually transferred
    pub actual_length: u16,
}

impl Completion {
    /// Whether the descriptor retired with an error status
    pub fn is_error(&self) -> bool {
        self.status & status::ANY_ERROR != 0
    }
}

#[derive(Clone, Copy, Debug)]
struct AnchorChain {
    first_td: Option<u8>,
    last_td: Option<u8>,
}

/// The hardware-readable schedule plus its driver-side bookkeeping
///
/// Owns the DMA region for the lifetime of one controller run; a restart
/// replaces the whole schedule rather than resizing it.
#[derive(Debug)]
pub struct Schedule {
    region: DmaRegion,
    td_allocated: u64,
    td_next: [Option<u8>; TD_POOL_LEN],
    chains: [AnchorChain; QH_RING_LEN],
}

impl Schedule {
    /// Build the frame list, QH ring and TD arena inside `region`
    ///
    /// The region must be at least 64 KiB and physically aligned to 64 KiB.
    /// On return every frame entry and every link word is initialized, so
    /// the engine can be pointed at the region without ever dereferencing
    /// an unset address.
    pub fn build(region: DmaRegion) -> Result<Self> {
        if region.len() < SCHEDULE_REGION_SIZE {
            return Err(UsbError::ScheduleRegion);
        }
        if region.phys() as usize & (SCHEDULE_REGION_ALIGN - 1) != 0 {
            return Err(UsbError::ScheduleRegion);
        }
        if region.as_ptr() as usize & (QH_STRIDE - 1) != 0 {
            return Err(UsbError::ScheduleRegion);
        }

        let schedule = Self {
            region,
            td_allocated: 0,
            td_next: [None; TD_POOL_LEN],
            chains: [AnchorChain {
                first_td: None,
                last_td: None,
            }; QH_RING_LEN],
        };

        // Close the anchor ring first so every frame entry written below
        // already points into a fully linked structure.
        for j in 0..QH_RING_LEN {
            let qh = schedule.qh(j);
            qh.set_head(schedule.qh_phys((j + 1) % QH_RING_LEN));
            qh.clear_element();
        }

        for i in 0..FRAME_LIST_LEN {
            let entry = if i % QH_RING_LEN == 0 {
                schedule.qh_phys(i / QH_RING_LEN) | link::QH
            } else {
                link::EMPTY
            };
            schedule.frame_slot(i).store(entry, Ordering::Release);
        }

        for i in 0..TD_POOL_LEN {
            schedule.td(i).reset();
        }

        // The frame-list base register must only be programmed after these
        // stores are visible to the engine.
        fence(Ordering::Release);

        Ok(schedule)
    }

    /// Physical address for the frame-list base register
    #[inline(always)]
    pub fn frame_list_base(&self) -> u32 {
        self.region.phys()
    }

    /// Physical address of ring slot `index`, untagged
    #[inline(always)]
    pub fn qh_phys(&self, index: usize) -> u32 {
        debug_assert!(index < QH_RING_LEN);
        self.region.phys() + (QH_RING_OFFSET + index * QH_STRIDE) as u32
    }

    /// Physical address of arena slot `index`, untagged
    #[inline(always)]
    pub fn td_phys(&self, index: usize) -> u32 {
        debug_assert!(index < TD_POOL_LEN);
        self.region.phys() + (TD_POOL_OFFSET + index * TD_STRIDE) as u32
    }

    /// Ring slot `index`
    pub fn qh(&self, index: usize) -> &QueueHead {
        debug_assert!(index < QH_RING_LEN);
        let offset = QH_RING_OFFSET + index * QH_STRIDE;
        unsafe { &*(self.region.as_ptr().add(offset) as *const QueueHead) }
    }

    /// Arena slot `index`
    pub fn td(&self, index: usize) -> &TransferDescriptor {
        debug_assert!(index < TD_POOL_LEN);
        let offset = TD_POOL_OFFSET + index * TD_STRIDE;
        unsafe { &*(self.region.as_ptr().add(offset) as *const TransferDescriptor) }
    }

    /// Raw frame list entry for frame `index`
    pub fn frame_entry(&self, index: usize) -> u32 {
        self.frame_slot(index).load(Ordering::Acquire)
    }

    fn frame_slot(&self, index: usize) -> &AtomicU32 {
        debug_assert!(index < FRAME_LIST_LEN);
        unsafe { &*(self.region.as_ptr().add(index * 4) as *const AtomicU32) }
    }

    /// Map a QH-tagged link word back to its ring index, if it points into
    /// this schedule's ring
    pub fn qh_index_of(&self, link_word: u32) -> Option<usize> {
        let addr = link_word & link::ADDR_MASK;
        let ring_base = self.region.phys() + QH_RING_OFFSET as u32;
        let offset = addr.checked_sub(ring_base)? as usize;
        if offset % QH_STRIDE != 0 {
            return None;
        }
        let index = offset / QH_STRIDE;
        (index < QH_RING_LEN).then_some(index)
    }

    /// Allocate an idle TD from the arena
    pub fn alloc_td(&mut self) -> Result<usize> {
        let free = !self.td_allocated;
        let slot = free.trailing_zeros() as usize;
        if slot >= TD_POOL_LEN {
            return Err(UsbError::NoResources);
        }
        self.td_allocated |= 1 << slot;
        self.td_next[slot] = None;
        self.td(slot).reset();
        Ok(slot)
    }

    /// Return a TD to the arena
    pub fn free_td(&mut self, index: usize) -> Result<()> {
        if index >= TD_POOL_LEN || self.td_allocated & (1 << index) == 0 {
            return Err(UsbError::InvalidParameter);
        }
        self.td_allocated &= !(1 << index);
        self.td_next[index] = None;
        self.td(index).reset();
        Ok(())
    }

    /// Number of idle arena slots
    pub fn td_free_count(&self) -> usize {
        TD_POOL_LEN - self.td_allocated.count_ones() as usize
    }

    /// Append an activated TD to an anchor's element chain
    ///
    /// The tail descriptor of a live chain has a terminated link word, so
    /// appending only ever writes a link the engine is not following.
    pub fn submit(&mut self, anchor: usize, td_index: usize) -> Result<()> {
        if anchor >= QH_RING_LEN || td_index >= TD_POOL_LEN {
            return Err(UsbError::InvalidParameter);
        }
        if self.td_allocated & (1 << td_index) == 0 {
            return Err(UsbError::InvalidParameter);
        }

        self.td(td_index).link.store(link::TERMINATE, Ordering::Release);

        let td_phys = self.td_phys(td_index);
        match self.chains[anchor].last_td {
            Some(tail) => {
                self.td_next[tail as usize] = Some(td_index as u8);
                self.td(tail as usize).link.store(td_phys, Ordering::Release);
            }
            None => {
                self.chains[anchor].first_td = Some(td_index as u8);
                self.qh(anchor).set_element(td_phys);
            }
        }
        self.chains[anchor].last_td = Some(td_index as u8);
        Ok(())
    }

    /// Retire completed descriptors
    ///
    /// Walks each anchor chain from the front and retires descriptors whose
    /// active bit the engine has cleared, stopping at the first still-active
    /// one (the engine executes a chain in order). At most
    /// [`COMPLETION_BATCH`] descriptors are retired per call; any remainder
    /// is picked up on the next poll.
    pub fn poll_completions(&mut self) -> heapless::Vec<Completion, COMPLETION_BATCH> {
        let mut retired = heapless::Vec::new();

        for anchor in 0..QH_RING_LEN {
            while let Some(head) = self.chains[anchor].first_td {
                let index = head as usize;
                let td = self.td(index);
                if td.is_active() || retired.is_full() {
                    break;
                }

                let word = td.status_word();
                // Capacity checked above.
                let _ = retired.push(Completion {
                    td: head,
                    status: word,
                    actual_length: status::actual_length(word),
                });

                self.chains[anchor].first_td = self.td_next[index];
                if self.chains[anchor].first_td.is_none() {
                    self.chains[anchor].last_td = None;
                    self.qh(anchor).clear_element();
                }
                // Slot bookkeeping only; the record was already retired by
                // the engine.
                self.td_allocated &= !(1 << index);
                self.td_next[index] = None;
                self.td(index).reset();
            }
        }

        retired
    }
}
