//! Root-hub port manager
//!
//! Level-triggered polling substitute for a hot-plug interrupt path: the
//! caller invokes the poll from a periodic timer (nominally once per
//! second), and the poll must tolerate firing with no pending change.
//!
//! On a new connection the port-reset timing protocol runs inline: assert
//! reset, hold ~50 ms, release, then bounded polls for reset completion and
//! for the enable bit. A port that never enables is reported but does not
//! affect the controller or the other port.

use embedded_hal::delay::DelayNs;

use super::{timing, PortId, PortStatus};
use crate::error::Result;
use crate::uhci::register::RegisterIo;
use crate::wait::wait_until;

/// Root-hub port transition observed by a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortEvent {
    /// A device was connected and the reset protocol ran
    Connected {
        /// Whether the port reached the enabled state; a device on a port
        /// that never enabled is unusable but the driver continues
        enabled: bool,
    },
    /// The previously connected device is gone
    Disconnected,
}

/// A port event paired with the port that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortStatusChange {
    /// Which root port changed
    pub port: PortId,
    /// What happened
    pub event: PortEvent,
}

/// Service one root port, running the reset protocol on a new connection
///
/// Returns `Ok(None)` when no change/resume bit is pending.
pub(crate) fn poll_root_port<IO, D>(
    io: &mut IO,
    delay: &mut D,
    port: PortId,
) -> Result<Option<PortEvent>>
where
    IO: RegisterIo,
    D: DelayNs,
{
    let offset = port.portsc_offset();

    let sc = PortStatus::from_bits_truncate(io.read16(offset)?);
    if !sc.intersects(PortStatus::ANY_CHANGE) {
        return Ok(None);
    }

    // Acknowledge the connect change before sampling connect status.
    io.write16(offset, PortStatus::CONNECT_CHANGE.bits())?;

    let sc = PortStatus::from_bits_truncate(io.read16(offset)?);
    if !sc.contains(PortStatus::CONNECT_STATUS) {
        #[cfg(feature = "defmt")]
        defmt::info!("port {}: device disconnected", port.value());
        return Ok(Some(PortEvent::Disconnected));
    }

    #[cfg(feature = "defmt")]
    defmt::info!("port {}: device connected, resetting", port.value());

    io.write16(offset, PortStatus::RESET.bits())?;
    delay.delay_ms(timing::PORT_RESET_HOLD_MS);

    let raw = io.read16(offset)?;
    io.write16(offset, raw & !PortStatus::RESET.bits())?;

    let io_view = &*io;
    let reset_done = wait_until(delay, timing::PORT_RESET_TICKS, timing::TICK_MS, || {
        Ok(io_view.read16(offset)? & PortStatus::RESET.bits() == 0)
    })?;
    if !reset_done.is_satisfied() {
        #[cfg(feature = "defmt")]
        defmt::warn!("port {}: reset did not complete", port.value());
    }

    let ack_and_enable =
        PortStatus::CONNECT_CHANGE | PortStatus::ENABLE_CHANGE | PortStatus::ENABLED;
    let mut enabled = false;
    for _ in 0..timing::PORT_ENABLE_TICKS {
        io.write16(offset, ack_and_enable.bits())?;
        delay.delay_ms(timing::TICK_MS);
        if io.read16(offset)? & PortStatus::ENABLED.bits() != 0 {
            enabled = true;
            break;
        }
    }

    if !enabled {
        #[cfg(feature = "defmt")]
        defmt::warn!("port {}: not enabled, device unusable", port.value());
    }

    Ok(Some(PortEvent::Connected { enabled }))
}
