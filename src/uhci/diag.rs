//! Diagnostic dump
//!
//! Read-only introspection of register and schedule state for fault
//! analysis. Nothing here mutates hardware or driver-owned state; register
//! read failures are logged as warnings and substitute nothing (the dump is
//! simply skipped), per the diagnostic error policy.

use core::fmt;

use super::schedule::{Schedule, FRAME_LIST_LEN, QH_RING_LEN};
use super::{link, regs};
use crate::error::Result;
use crate::uhci::register::RegisterIo;

/// One read-only capture of the primary registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot {
    /// USBCMD
    pub command: u16,
    /// USBSTS
    pub status: u16,
    /// USBINTR
    pub interrupt_enable: u16,
    /// FRNUM
    pub frame_number: u16,
    /// FLBASEADDR
    pub frame_list_base: u32,
    /// SOF modify
    pub start_of_frame: u8,
    /// PORTSC1 and PORTSC2
    pub portsc: [u16; 2],
}

impl RegisterSnapshot {
    /// Capture the six primary registers plus both port registers
    pub fn capture<IO: RegisterIo>(io: &IO) -> Result<Self> {
        Ok(Self {
            command: io.read16(regs::COMMAND)?,
            status: io.read16(regs::STATUS)?,
            interrupt_enable: io.read16(regs::INTR_ENABLE)?,
            frame_number: io.read16(regs::FRAME_NUMBER)?,
            frame_list_base: io.read32(regs::FRAME_LIST_BASE)?,
            start_of_frame: io.read8(regs::START_OF_FRAME)?,
            portsc: [io.read16(regs::PORTSC1)?, io.read16(regs::PORTSC2)?],
        })
    }
}

impl fmt::Display for RegisterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "regs: cmd={:04x}, sts={:04x}, intr={:04x}, frnum={:04x}, \
             flbase={:08x}, sof={:02x}, portsc1={:04x}, portsc2={:04x}",
            self.command,
            self.status,
            self.interrupt_enable,
            self.frame_number,
            self.frame_list_base,
            self.start_of_frame,
            self.portsc[0],
            self.portsc[1],
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RegisterSnapshot {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "regs: cmd={=u16:04x}, sts={=u16:04x}, intr={=u16:04x}, frnum={=u16:04x}, \
             flbase={=u32:08x}, sof={=u8:02x}, portsc1={=u16:04x}, portsc2={=u16:04x}",
            self.command,
            self.status,
            self.interrupt_enable,
            self.frame_number,
            self.frame_list_base,
            self.start_of_frame,
            self.portsc[0],
            self.portsc[1],
        );
    }
}

/// Frame-list entries that point into the schedule (everything that is not
/// the empty sentinel), as `(frame index, raw entry)` pairs
///
/// Capacity covers the 32 anchor entries of a freshly built schedule; a
/// schedule with more populated frames is truncated.
pub fn populated_frames(schedule: &Schedule) -> heapless::Vec<(u16, u32), 64> {
    let mut entries = heapless::Vec::new();
    for i in 0..FRAME_LIST_LEN {
        let entry = schedule.frame_entry(i);
        if entry != link::EMPTY && entries.push((i as u16, entry)).is_err() {
            break;
        }
    }
    entries
}

/// Dump registers and schedule links for external logging
///
/// Used when the engine halts unexpectedly. Register read failures are
/// warnings here, never fatal.
pub fn dump_all<IO: RegisterIo>(io: &IO, schedule: Option<&Schedule>) {
    match RegisterSnapshot::capture(io) {
        Ok(_snapshot) => {
            #[cfg(feature = "defmt")]
            defmt::warn!("{}", _snapshot);
        }
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::warn!("register snapshot failed: {}", _e);
        }
    }

    if let Some(schedule) = schedule {
        for _j in 0..QH_RING_LEN {
            #[cfg(feature = "defmt")]
            defmt::info!(
                "QH[{}] at {=u32:08x}: h_next={=u32:08x} e_next={=u32:08x}",
                _j,
                schedule.qh_phys(_j),
                schedule.qh(_j).head(),
                schedule.qh(_j).element(),
            );
        }
        let _frames = populated_frames(schedule);
        #[cfg(feature = "defmt")]
        defmt::info!("{} populated frame-list entries", _frames.len());
    }
}
