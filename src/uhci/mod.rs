//! UHCI (Universal Host Controller Interface) implementation
//!
//! Register offsets and bit definitions for USB 1.1 UHCI-class host
//! controllers, per the Intel UHCI Design Guide revision 1.1. The register
//! window is I/O-mapped on PC-class parts; all offsets below are relative to
//! the base address the platform discovered for the controller.
//!
//! # Register layout
//!
//! | Offset | Width | Register |
//! |--------|-------|---------------------------|
//! | 0x00   | 16    | USBCMD command            |
//! | 0x02   | 16    | USBSTS status             |
//! | 0x04   | 16    | USBINTR interrupt enable  |
//! | 0x06   | 16    | FRNUM frame number        |
//! | 0x08   | 32    | FLBASEADDR frame list base|
//! | 0x0C   | 8     | SOF start-of-frame modify |
//! | 0x10   | 16    | PORTSC1 port 1 status     |
//! | 0x12   | 16    | PORTSC2 port 2 status     |

pub mod controller;
pub mod diag;
pub mod port;
pub mod qh;
pub mod register;
pub mod schedule;
pub mod td;

pub use controller::{
    ControllerState, InterruptOutcome, ResetReport, RestartOutcome, UhciController,
};
pub use diag::RegisterSnapshot;
pub use port::{PortEvent, PortStatusChange};
pub use qh::QueueHead;
pub use register::{MmioRegisters, RegisterIo};
pub use schedule::{Completion, Schedule};
pub use td::TransferDescriptor;

use crate::error::{Result, UsbError};
use bitflags::bitflags;

/// Register offsets relative to the controller base
#[allow(missing_docs)]
pub mod regs {
    pub const COMMAND: u16 = 0x00;
    pub const STATUS: u16 = 0x02;
    pub const INTR_ENABLE: u16 = 0x04;
    pub const FRAME_NUMBER: u16 = 0x06;
    pub const FRAME_LIST_BASE: u16 = 0x08;
    pub const START_OF_FRAME: u16 = 0x0C;
    pub const PORTSC1: u16 = 0x10;
    pub const PORTSC2: u16 = 0x12;
}

/// Schedule link pointer tag bits (frame list entries, QH/TD link words)
#[allow(missing_docs)]
pub mod link {
    /// Terminate: the pointer is not followed
    pub const TERMINATE: u32 = 1 << 0;
    /// The target is a queue head (clear means transfer descriptor)
    pub const QH: u32 = 1 << 1;
    /// Depth-first traversal of the element chain
    pub const DEPTH_FIRST: u32 = 1 << 2;
    /// Mask extracting the physical address from a link word
    pub const ADDR_MASK: u32 = !0xF;
    /// A frame or element with no work scheduled
    pub const EMPTY: u32 = TERMINATE;
}

bitflags! {
    /// USBCMD register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Command: u16 {
        /// Run/Stop: engine executes the schedule while set
        const RUN_STOP = 1 << 0;
        /// Host controller reset, self-clearing
        const HOST_RESET = 1 << 1;
        /// Global USB reset
        const GLOBAL_RESET = 1 << 2;
        /// Enter global suspend mode
        const GLOBAL_SUSPEND = 1 << 3;
        /// Force global resume
        const GLOBAL_RESUME = 1 << 4;
        /// Software debug (single-step) mode
        const SOFTWARE_DEBUG = 1 << 5;
        /// Configure flag, software-defined
        const CONFIGURE = 1 << 6;
        /// Allow 64-byte packets at frame end
        const MAX_PACKET_64 = 1 << 7;
    }
}

bitflags! {
    /// USBSTS register bits, all write-one-to-clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u16 {
        /// A TD with interrupt-on-complete finished
        const USB_INTERRUPT = 1 << 0;
        /// A TD completed with an error status
        const USB_ERROR_INTERRUPT = 1 << 1;
        /// Resume signalling seen while suspended
        const RESUME_DETECT = 1 << 2;
        /// PCI-side error while accessing the schedule
        const HOST_SYSTEM_ERROR = 1 << 3;
        /// Schedule processing error, engine halts
        const PROCESS_ERROR = 1 << 4;
        /// Engine is halted
        const HALTED = 1 << 5;
    }
}

impl Status {
    /// Every interrupt-related status bit
    pub const ALL_INTERRUPTS: Status = Status::all();

    /// Conditions that indicate an engine fault rather than a completion
    pub const FATAL: Status = Status::RESUME_DETECT
        .union(Status::HOST_SYSTEM_ERROR)
        .union(Status::PROCESS_ERROR)
        .union(Status::HALTED);
}

bitflags! {
    /// USBINTR interrupt enable register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptEnable: u16 {
        /// Timeout / CRC error interrupt
        const TIMEOUT_CRC = 1 << 0;
        /// Resume interrupt
        const RESUME = 1 << 1;
        /// Interrupt on complete
        const COMPLETE = 1 << 2;
        /// Short packet interrupt
        const SHORT_PACKET = 1 << 3;
    }
}

bitflags! {
    /// PORTSC register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortStatus: u16 {
        /// Current connect status (read-only)
        const CONNECT_STATUS = 1 << 0;
        /// Connect status change (write-one-to-clear)
        const CONNECT_CHANGE = 1 << 1;
        /// Port enabled
        const ENABLED = 1 << 2;
        /// Port enable/disable change (write-one-to-clear)
        const ENABLE_CHANGE = 1 << 3;
        /// Resume detect
        const RESUME_DETECT = 1 << 6;
        /// Low-speed device attached
        const LOW_SPEED = 1 << 8;
        /// Port reset
        const RESET = 1 << 9;
        /// Over-current active
        const OVER_CURRENT = 1 << 10;
        /// Over-current change (write-one-to-clear)
        const OVER_CURRENT_CHANGE = 1 << 11;
        /// Port suspended
        const SUSPEND = 1 << 12;
    }
}

impl PortStatus {
    /// Change/resume bits that make a root port worth servicing
    pub const ANY_CHANGE: PortStatus = PortStatus::CONNECT_CHANGE
        .union(PortStatus::OVER_CURRENT_CHANGE)
        .union(PortStatus::RESUME_DETECT);
}

/// Number of root-hub ports on a UHCI controller
pub const ROOT_PORT_COUNT: u8 = 2;

/// Type-safe root-hub port identifier (ports are numbered 1 and 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortId(u8);

impl PortId {
    /// Create a new port ID, validating range
    pub const fn new(port: u8) -> Result<Self> {
        if port == 0 || port > ROOT_PORT_COUNT {
            Err(UsbError::InvalidParameter)
        } else {
            Ok(Self(port))
        }
    }

    /// PORTSC register offset for this port
    #[inline(always)]
    pub const fn portsc_offset(self) -> u16 {
        regs::PORTSC1 + (self.0 as u16 - 1) * 2
    }

    /// Raw port number (1-based)
    #[inline(always)]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Timing constants for the reset and port protocols (milliseconds / ticks)
#[allow(missing_docs)]
pub mod timing {
    /// Global reset hold time
    pub const GLOBAL_RESET_HOLD_MS: u32 = 10;
    /// Polling granularity for reset and port waits
    pub const TICK_MS: u32 = 1;
    /// Ticks to wait for the HCRESET bit to self-clear
    pub const HC_RESET_TICKS: u32 = 60;
    /// Ticks to wait for the engine to signal halted after reset
    pub const HALT_SETTLE_TICKS: u32 = 10;
    /// Settle time after asserting the run bit
    pub const RUN_SETTLE_MS: u32 = 10;
    /// Port reset assertion hold time
    pub const PORT_RESET_HOLD_MS: u32 = 50;
    /// Ticks to wait for port reset completion
    pub const PORT_RESET_TICKS: u32 = 16;
    /// Enable attempts before declaring a port unusable
    pub const PORT_ENABLE_TICKS: u32 = 16;
    /// Nominal root-hub poll period for the caller's timer
    pub const ROOT_POLL_PERIOD_MS: u32 = 1000;
}

/// Start-of-frame modify register default (1 ms frame period)
pub const SOF_DEFAULT: u8 = 0x40;
