//! Shared test utilities for uhci-hcd integration tests
//!
//! Provides simulated platform capabilities built only on the crate's
//! public traits: a register file with UHCI-flavoured side effects, a
//! counting delay source and a heap-backed contiguous allocator.

use core::ptr::NonNull;

use embedded_hal::delay::DelayNs;
use uhci_hcd::dma::{ContiguousDma, DmaRegion, SCHEDULE_REGION_SIZE};
use uhci_hcd::uhci::{regs, Command, PortStatus, RegisterIo, Status};
use uhci_hcd::{Result, UsbError};

const PORT_W1C: u16 = PortStatus::CONNECT_CHANGE.bits()
    | PortStatus::ENABLE_CHANGE.bits()
    | PortStatus::OVER_CURRENT_CHANGE.bits();

/// Register file with just enough device behaviour for lifecycle tests:
/// the host-reset bit self-clears immediately, the run bit clears the
/// halted status, the status register is write-one-to-clear and a port
/// enables on the first enable write.
pub struct TestRegisters {
    pub command: u16,
    pub status: u16,
    pub intr_enable: u16,
    pub frame_number: u16,
    pub frame_list_base: u32,
    pub start_of_frame: u8,
    pub portsc: [u16; 2],
}

impl TestRegisters {
    pub fn new() -> Self {
        Self {
            command: 0,
            status: Status::HALTED.bits(),
            intr_enable: 0,
            frame_number: 0,
            frame_list_base: 0,
            start_of_frame: 0,
            portsc: [0; 2],
        }
    }

    /// Simulate a device appearing on a root port
    pub fn attach_device(&mut self, port: usize) {
        self.portsc[port - 1] |=
            PortStatus::CONNECT_CHANGE.bits() | PortStatus::CONNECT_STATUS.bits();
    }

    /// Simulate the engine raising a status condition
    pub fn raise_status(&mut self, bits: Status) {
        self.status |= bits.bits();
    }
}

impl RegisterIo for TestRegisters {
    fn read8(&self, offset: u16) -> Result<u8> {
        match offset {
            regs::START_OF_FRAME => Ok(self.start_of_frame),
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn read16(&self, offset: u16) -> Result<u16> {
        match offset {
            regs::COMMAND => Ok(self.command),
            regs::STATUS => Ok(self.status),
            regs::INTR_ENABLE => Ok(self.intr_enable),
            regs::FRAME_NUMBER => Ok(self.frame_number),
            regs::PORTSC1 => Ok(self.portsc[0]),
            regs::PORTSC2 => Ok(self.portsc[1]),
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn read32(&self, offset: u16) -> Result<u32> {
        match offset {
            regs::FRAME_LIST_BASE => Ok(self.frame_list_base),
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn write8(&mut self, offset: u16, value: u8) -> Result<()> {
        match offset {
            regs::START_OF_FRAME => {
                self.start_of_frame = value;
                Ok(())
            }
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn write16(&mut self, offset: u16, value: u16) -> Result<()> {
        match offset {
            regs::COMMAND => {
                if value & Command::RUN_STOP.bits() != 0 {
                    self.status &= !Status::HALTED.bits();
                } else {
                    self.status |= Status::HALTED.bits();
                }
                self.command = value & !Command::HOST_RESET.bits();
                Ok(())
            }
            regs::STATUS => {
                self.status &= !value;
                Ok(())
            }
            regs::INTR_ENABLE => {
                self.intr_enable = value;
                Ok(())
            }
            regs::FRAME_NUMBER => {
                self.frame_number = value;
                Ok(())
            }
            regs::PORTSC1 | regs::PORTSC2 => {
                let i = ((offset - regs::PORTSC1) / 2) as usize;
                let mut sc = self.portsc[i];
                sc &= !(value & PORT_W1C);
                if value & PortStatus::RESET.bits() != 0 {
                    sc |= PortStatus::RESET.bits();
                } else {
                    sc &= !PortStatus::RESET.bits();
                }
                if value & PortStatus::ENABLED.bits() != 0 {
                    if sc & PortStatus::CONNECT_STATUS.bits() != 0 {
                        sc |= PortStatus::ENABLED.bits();
                    }
                } else {
                    sc &= !PortStatus::ENABLED.bits();
                }
                self.portsc[i] = sc;
                Ok(())
            }
            _ => Err(UsbError::RegisterAccess),
        }
    }

    fn write32(&mut self, offset: u16, value: u32) -> Result<()> {
        match offset {
            regs::FRAME_LIST_BASE => {
                self.frame_list_base = value;
                Ok(())
            }
            _ => Err(UsbError::RegisterAccess),
        }
    }
}

/// Clonable handle over a [`TestRegisters`], so a test can keep poking the
/// simulated device after handing the register capability to the controller
#[derive(Clone)]
pub struct SharedRegisters(pub std::rc::Rc<std::cell::RefCell<TestRegisters>>);

impl SharedRegisters {
    pub fn new() -> Self {
        Self(std::rc::Rc::new(std::cell::RefCell::new(
            TestRegisters::new(),
        )))
    }
}

impl RegisterIo for SharedRegisters {
    fn read8(&self, offset: u16) -> Result<u8> {
        self.0.borrow().read8(offset)
    }

    fn read16(&self, offset: u16) -> Result<u16> {
        self.0.borrow().read16(offset)
    }

    fn read32(&self, offset: u16) -> Result<u32> {
        self.0.borrow().read32(offset)
    }

    fn write8(&mut self, offset: u16, value: u8) -> Result<()> {
        self.0.borrow_mut().write8(offset, value)
    }

    fn write16(&mut self, offset: u16, value: u16) -> Result<()> {
        self.0.borrow_mut().write16(offset, value)
    }

    fn write32(&mut self, offset: u16, value: u32) -> Result<()> {
        self.0.borrow_mut().write32(offset, value)
    }
}

/// Delay source accumulating simulated time
pub struct TestDelay {
    pub elapsed_ns: u64,
}

impl TestDelay {
    pub fn new() -> Self {
        Self { elapsed_ns: 0 }
    }
}

impl DelayNs for TestDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}

#[repr(C, align(65536))]
struct AlignedBlock([u8; SCHEDULE_REGION_SIZE]);

/// Heap-backed contiguous allocator handing out 64 KiB aligned regions
/// with fabricated physical addresses
pub struct TestAllocator {
    blocks: Vec<Box<AlignedBlock>>,
}

impl TestAllocator {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }
}

impl ContiguousDma for TestAllocator {
    fn allocate_contiguous(&mut self, size: usize, align: usize) -> Result<DmaRegion> {
        assert!(size <= SCHEDULE_REGION_SIZE);
        assert!(align <= SCHEDULE_REGION_SIZE);
        let mut block = Box::new(AlignedBlock([0; SCHEDULE_REGION_SIZE]));
        let virt = NonNull::new(block.0.as_mut_ptr()).unwrap();
        let phys = 0x0100_0000 + self.blocks.len() as u32 * SCHEDULE_REGION_SIZE as u32;
        self.blocks.push(block);
        Ok(unsafe { DmaRegion::new(virt, phys, size) })
    }
}
