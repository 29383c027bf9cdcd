//! Test doubles: a scripted UHCI register model, a counting delay source
//! and a contiguous-memory allocator backed by the host heap.
//!
//! The register model implements just enough device behaviour to exercise
//! the lifecycle, port and interrupt protocols: write-one-to-clear status
//! bits, the self-clearing host-reset bit, the halted bit reacting to the
//! run bit, and PORTSC change-bit acknowledge plus enable latching.

use core::cell::RefCell;
use core::ptr::NonNull;
use std::boxed::Box;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::dma::{ContiguousDma, DmaRegion, SCHEDULE_REGION_SIZE};
use crate::error::{Result, UsbError};
use crate::uhci::register::RegisterIo;
use crate::uhci::{regs, Command, PortStatus, Status};

const W1C_PORT_BITS: u16 = PortStatus::CONNECT_CHANGE.bits()
    | PortStatus::ENABLE_CHANGE.bits()
    | PortStatus::OVER_CURRENT_CHANGE.bits();

struct IoState {
    command: u16,
    status: u16,
    intr_enable: u16,
    frame_number: u16,
    frame_list_base: u32,
    start_of_frame: u8,
    portsc: [u16; 2],
    reset_latency: u32,
    reset_reads_remaining: u32,
    halt_sticky: bool,
    enable_after: [u32; 2],
    enable_writes_seen: [u32; 2],
    writes: Vec<(u16, u32)>,
}

/// Scripted register file standing in for a UHCI controller
pub struct MockIo {
    state: RefCell<IoState>,
}

impl MockIo {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(IoState {
                command: 0,
                // A controller that has never run reports halted.
                status: Status::HALTED.bits(),
                intr_enable: 0,
                frame_number: 0,
                frame_list_base: 0,
                start_of_frame: 0,
                portsc: [0; 2],
                reset_latency: 0,
                reset_reads_remaining: 0,
                halt_sticky: false,
                enable_after: [0; 2],
                enable_writes_seen: [0; 2],
                writes: Vec::new(),
            }),
        }
    }

    pub fn with_command(self, bits: u16) -> Self {
        self.state.borrow_mut().command = bits;
        self
    }

    pub fn with_status(self, bits: u16) -> Self {
        self.state.borrow_mut().status = bits;
        self
    }

    pub fn with_frame_list_base(self, value: u32) -> Self {
        self.state.borrow_mut().frame_list_base = value;
        self
    }

    pub fn with_portsc(self, port: u8, bits: PortStatus) -> Self {
        self.state.borrow_mut().portsc[port as usize - 1] = bits.bits();
        self
    }

    /// HCRESET stays visible for this many command-register reads
    pub fn with_reset_latency(self, reads: u32) -> Self {
        self.state.borrow_mut().reset_latency = reads;
        self
    }

    /// Engine refuses to leave halted when the run bit is set
    pub fn with_halt_sticky(self) -> Self {
        self.state.borrow_mut().halt_sticky = true;
        self
    }

    /// Port enable latches on the nth write carrying the enable bit
    pub fn with_port_enable_after(self, port: u8, writes: u32) -> Self {
        self.state.borrow_mut().enable_after[port as usize - 1] = writes;
        self
    }

    pub fn status(&self) -> u16 {
        self.state.borrow().status
    }

    pub fn intr_enable(&self) -> u16 {
        self.state.borrow().intr_enable
    }

    pub fn start_of_frame(&self) -> u8 {
        self.state.borrow().start_of_frame
    }

    pub fn portsc(&self, port: u8) -> u16 {
        self.state.borrow().portsc[port as usize - 1]
    }

    /// Every write seen, as `(offset, value)` pairs in order
    pub fn writes(&self) -> Vec<(u16, u32)> {
        self.state.borrow().writes.clone()
    }

    /// Values written to one register, in order
    pub fn writes_to(&self, offset: u16) -> Vec<u32> {
        self.state
            .borrow()
            .writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    fn write_portsc(state: &mut IoState, index: usize, value: u16) {
        let mut sc = state.portsc[index];
        sc &= !(value & W1C_PORT_BITS);

        if value & PortStatus::RESET.bits() != 0 {
            sc |= PortStatus::RESET.bits();
        } else {
            sc &= !PortStatus::RESET.bits();
        }

        if value & PortStatus::ENABLED.bits() != 0 {
            state.enable_writes_seen[index] += 1;
            if state.enable_after[index] != 0
                && state.enable_writes_seen[index] >= state.enable_after[index]
            {
                sc |= PortStatus::ENABLED.bits();
            }
        } else {
            sc &= !PortStatus::ENABLED.bits();
        }

        state.portsc[index] = sc;
    }
}

impl RegisterIo for MockIo {
    fn read8(&self, offset: u16) -> Result<u8> {
        let state = self.state.borrow();
        match offset {
            regs::START_OF_FRAME => Ok(state.start_of_frame),
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn read16(&self, offset: u16) -> Result<u16> {
        let mut state = self.state.borrow_mut();
        match offset {
            regs::COMMAND => {
                if state.reset_reads_remaining > 0 {
                    state.reset_reads_remaining -= 1;
                    Ok(state.command | Command::HOST_RESET.bits())
                } else {
                    Ok(state.command & !Command::HOST_RESET.bits())
                }
            }
            regs::STATUS => Ok(state.status),
            regs::INTR_ENABLE => Ok(state.intr_enable),
            regs::FRAME_NUMBER => Ok(state.frame_number),
            regs::PORTSC1 => Ok(state.portsc[0]),
            regs::PORTSC2 => Ok(state.portsc[1]),
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn read32(&self, offset: u16) -> Result<u32> {
        let state = self.state.borrow();
        match offset {
            regs::FRAME_LIST_BASE => Ok(state.frame_list_base),
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn write8(&mut self, offset: u16, value: u8) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.writes.push((offset, value as u32));
        match offset {
            regs::START_OF_FRAME => {
                state.start_of_frame = value;
                Ok(())
            }
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn write16(&mut self, offset: u16, value: u16) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.writes.push((offset, value as u32));
        match offset {
            regs::COMMAND => {
                if value & Command::HOST_RESET.bits() != 0 {
                    state.reset_reads_remaining = state.reset_latency;
                }
                if value & Command::RUN_STOP.bits() != 0 && !state.halt_sticky {
                    state.status &= !Status::HALTED.bits();
                }
                state.command = value & !Command::HOST_RESET.bits();
                Ok(())
            }
            regs::STATUS => {
                // Write-one-to-clear.
                state.status &= !value;
                Ok(())
            }
            regs::INTR_ENABLE => {
                state.intr_enable = value;
                Ok(())
            }
            regs::FRAME_NUMBER => {
                state.frame_number = value;
                Ok(())
            }
            regs::PORTSC1 => {
                Self::write_portsc(&mut state, 0, value);
                Ok(())
            }
            regs::PORTSC2 => {
                Self::write_portsc(&mut state, 1, value);
                Ok(())
            }
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn write32(&mut self, offset: u16, value: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.writes.push((offset, value));
        match offset {
            regs::FRAME_LIST_BASE => {
                state.frame_list_base = value;
                Ok(())
            }
            _ => Err(UsbError::RegisterAccess),
        }
    }
}

/// Delay source that only counts elapsed time
pub struct MockDelay {
    elapsed_ns: u64,
}

impl MockDelay {
    pub fn new() -> Self {
        Self { elapsed_ns: 0 }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}

/// Fake physical base handed out for the first mock region
pub const MOCK_PHYS_BASE: u32 = 0x0060_0000;

#[repr(C, align(65536))]
struct AlignedRegion([u8; SCHEDULE_REGION_SIZE]);

/// Contiguous allocator backed by the host heap
pub struct MockDma {
    regions: Vec<Box<AlignedRegion>>,
    fail: bool,
}

impl MockDma {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            fail: false,
        }
    }

    /// Allocator whose every allocation fails
    pub fn failing() -> Self {
        Self {
            regions: Vec::new(),
            fail: true,
        }
    }

    pub fn allocations(&self) -> usize {
        self.regions.len()
    }

    fn backing(&mut self) -> (NonNull<u8>, usize) {
        let mut region = Box::new(AlignedRegion([0; SCHEDULE_REGION_SIZE]));
        let virt = NonNull::new(region.0.as_mut_ptr()).unwrap();
        let index = self.regions.len();
        self.regions.push(region);
        (virt, index)
    }

    /// A region with an aligned physical base but a caller-chosen length
    pub fn allocate_region_with_len(&mut self, len: usize) -> DmaRegion {
        let (virt, index) = self.backing();
        let phys = MOCK_PHYS_BASE + index as u32 * SCHEDULE_REGION_SIZE as u32;
        unsafe { DmaRegion::new(virt, phys, len) }
    }

    /// A region reporting an arbitrary (possibly misaligned) physical base
    pub fn allocate_region_at(&mut self, phys: u32, len: usize) -> DmaRegion {
        let (virt, _) = self.backing();
        unsafe { DmaRegion::new(virt, phys, len) }
    }
}

impl ContiguousDma for MockDma {
    fn allocate_contiguous(&mut self, size: usize, align: usize) -> Result<DmaRegion> {
        if self.fail {
            return Err(UsbError::NoResources);
        }
        assert!(size <= SCHEDULE_REGION_SIZE, "mock regions are 64 KiB");
        assert!(align <= SCHEDULE_REGION_SIZE);
        Ok(self.allocate_region_with_len(size))
    }
}
