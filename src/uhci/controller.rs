//! Controller lifecycle state machine and interrupt handling
//!
//! Drives global reset, host-controller reset, schedule installation and
//! run, and decodes the status register on each interrupt notification.
//! The controller context is an explicit object threaded through every
//! operation; hardware access, tick delays and contiguous memory arrive as
//! capabilities at construction.
//!
//! Reset timing anomalies are tolerated (logged and surfaced in the
//! [`ResetReport`], matching observed hardware) but a restart that leaves
//! the engine halted is fatal to the start sequence.

use embedded_hal::delay::DelayNs;

use super::port::{poll_root_port, PortEvent, PortStatusChange};
use super::schedule::{Completion, Schedule, COMPLETION_BATCH};
use super::{diag, regs, timing, Command, InterruptEnable, PortId, Status};
use super::{ROOT_PORT_COUNT, SOF_DEFAULT};
use crate::dma::{ContiguousDma, SCHEDULE_REGION_ALIGN, SCHEDULE_REGION_SIZE};
use crate::error::{Result, UsbError};
use crate::uhci::register::RegisterIo;
use crate::wait::wait_until;

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerState {
    /// No hardware interaction yet
    Uninitialized,
    /// Global and host-controller reset issued
    Reset,
    /// Schedule built and frame-list base programmed
    ScheduleInstalled,
    /// Run bit set and engine observed not halted
    Running,
    /// Engine signalled halt after running
    Halted,
    /// Unrecoverable hardware response
    Failed,
}

/// Outcome of a [`UhciController::reset`] sequence
///
/// Both anomalies are tolerated; the reset proceeds to reinitialize the
/// frame-number and start-of-frame registers either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetReport {
    /// The host-controller reset bit cleared within its window
    pub reset_completed: bool,
    /// The engine signalled halted within its window
    pub engine_stopped: bool,
}

/// Outcome of a [`UhciController::restart`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RestartOutcome {
    /// A fresh schedule was installed and the engine left halted
    Started,
    /// The run bit was already set; nothing was touched
    AlreadyRunning,
}

/// Outcome of decoding one interrupt notification
#[derive(Debug, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// No interrupt bit set: the shared line fired for another device
    NotOurs,
    /// Observed bits were acknowledged (write-one-to-clear, exactly those)
    Acknowledged {
        /// Status bits that were observed and cleared
        status: Status,
        /// Descriptors retired by the completion poll
        completions: heapless::Vec<Completion, COMPLETION_BATCH>,
    },
}

/// UHCI host controller context
///
/// Owns the register window, the tick-delay source, the contiguous memory
/// capability and the current schedule. Single-threaded by design: the only
/// concurrency is against the hardware engine, bounded by field ownership
/// in the schedule records.
pub struct UhciController<IO, D, A> {
    io: IO,
    delay: D,
    dma: A,
    state: ControllerState,
    schedule: Option<Schedule>,
}

impl<IO, D, A> UhciController<IO, D, A>
where
    IO: RegisterIo,
    D: DelayNs,
    A: ContiguousDma,
{
    /// Create a controller context over the given capabilities
    pub fn new(io: IO, delay: D, dma: A) -> Self {
        Self {
            io,
            delay,
            dma,
            state: ControllerState::Uninitialized,
            schedule: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Currently installed schedule, if any
    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    /// Reset the controller
    ///
    /// Disables all interrupt sources, asserts global reset for 10 ms, then
    /// host-controller reset, and polls (bounded) for the reset bit to
    /// clear and the engine to halt. Regardless of how the polls fared the
    /// frame number and start-of-frame registers are reinitialized to their
    /// defaults.
    pub fn reset(&mut self) -> Result<ResetReport> {
        #[cfg(feature = "defmt")]
        defmt::info!("resetting controller");

        self.io.write16(regs::INTR_ENABLE, 0)?;

        self.io.write16(regs::COMMAND, Command::GLOBAL_RESET.bits())?;
        self.delay.delay_ms(timing::GLOBAL_RESET_HOLD_MS);

        self.io.write16(regs::COMMAND, Command::HOST_RESET.bits())?;

        // The reset bit goes low when the controller is done.
        let io = &self.io;
        let reset_done = wait_until(&mut self.delay, timing::HC_RESET_TICKS, timing::TICK_MS, || {
            Ok(io.read16(regs::COMMAND)? & Command::HOST_RESET.bits() == 0)
        })?;
        if !reset_done.is_satisfied() {
            #[cfg(feature = "defmt")]
            defmt::warn!("controller did not reset");
        }

        let io = &self.io;
        let stopped = wait_until(&mut self.delay, timing::HALT_SETTLE_TICKS, timing::TICK_MS, || {
            Ok(io.read16(regs::STATUS)? & Status::HALTED.bits() != 0)
        })?;
        if !stopped.is_satisfied() {
            #[cfg(feature = "defmt")]
            defmt::warn!("controller did not stop");
        }

        self.io.write16(regs::FRAME_NUMBER, 0)?;
        self.io.write8(regs::START_OF_FRAME, SOF_DEFAULT)?;

        self.state = ControllerState::Reset;
        Ok(ResetReport {
            reset_completed: reset_done.is_satisfied(),
            engine_stopped: stopped.is_satisfied(),
        })
    }

    /// Build a fresh schedule and start the engine
    ///
    /// Returns [`RestartOutcome::AlreadyRunning`] without allocating or
    /// writing any register when the run bit is already set. Otherwise a
    /// new DMA region replaces any previous schedule; descriptors the
    /// engine still referenced before the frame-list base switch are not
    /// drained (see crate docs on restart semantics).
    pub fn restart(&mut self) -> Result<RestartOutcome> {
        if self.io.read16(regs::COMMAND)? & Command::RUN_STOP.bits() != 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!("already started");
            return Ok(RestartOutcome::AlreadyRunning);
        }

        #[cfg(feature = "defmt")]
        defmt::info!("restarting");

        // Allocation failure must propagate before hardware sees anything.
        let region = self
            .dma
            .allocate_contiguous(SCHEDULE_REGION_SIZE, SCHEDULE_REGION_ALIGN)?;
        let schedule = Schedule::build(region)?;

        self.io
            .write32(regs::FRAME_LIST_BASE, schedule.frame_list_base())?;
        self.schedule = Some(schedule);
        self.state = ControllerState::ScheduleInstalled;

        // Assume 64-byte packets at frame end and start the engine.
        self.io.write16(
            regs::COMMAND,
            (Command::MAX_PACKET_64 | Command::RUN_STOP).bits(),
        )?;

        self.delay.delay_ms(timing::RUN_SETTLE_MS);

        if self.io.read16(regs::STATUS)? & Status::HALTED.bits() != 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!("engine still halted after run");
            self.state = ControllerState::Failed;
            return Err(UsbError::StartFailed);
        }

        self.state = ControllerState::Running;
        Ok(RestartOutcome::Started)
    }

    /// Enable interrupt sources, restart the engine and service the root
    /// ports once
    ///
    /// The caller's periodic timer re-arms the root-hub poll afterwards.
    /// A restart failure propagates; interrupts stay configured but the
    /// ports are not polled against a non-running engine.
    pub fn start(&mut self) -> Result<()> {
        #[cfg(feature = "defmt")]
        defmt::info!("enabling");

        let sources = InterruptEnable::TIMEOUT_CRC
            | InterruptEnable::RESUME
            | InterruptEnable::COMPLETE
            | InterruptEnable::SHORT_PACKET;
        self.io.write16(regs::INTR_ENABLE, sources.bits())?;

        self.restart()?;

        let _ = self.on_timer_tick()?;
        Ok(())
    }

    /// Full bring-up: reset then start
    pub fn initialize(&mut self) -> Result<()> {
        let _report = self.reset()?;
        self.start()
    }

    /// Recovery entry point: identical sequence to [`initialize`], kept
    /// separate so the caller's restart policy reads explicitly
    ///
    /// [`initialize`]: Self::initialize
    pub fn reset_and_restart(&mut self) -> Result<()> {
        self.initialize()
    }

    /// Decode and acknowledge one interrupt notification
    ///
    /// A zero status register means the shared line fired for another
    /// device; that is not an error. Fault bits are logged individually and
    /// a halted engine additionally produces a full diagnostic dump and
    /// moves the state to [`ControllerState::Halted`] (recovery is the
    /// caller's decision). Exactly the observed bits are written back, then
    /// retired descriptors are collected.
    pub fn handle_interrupt(&mut self) -> Result<InterruptOutcome> {
        let status =
            Status::from_bits_truncate(self.io.read16(regs::STATUS)?) & Status::ALL_INTERRUPTS;
        if status.is_empty() {
            // The interrupt was not for us.
            return Ok(InterruptOutcome::NotOurs);
        }

        if status.intersects(Status::FATAL) {
            if status.contains(Status::RESUME_DETECT) {
                #[cfg(feature = "defmt")]
                defmt::info!("resume detect");
            }
            if status.contains(Status::HOST_SYSTEM_ERROR) {
                #[cfg(feature = "defmt")]
                defmt::warn!("host system error");
            }
            if status.contains(Status::PROCESS_ERROR) {
                #[cfg(feature = "defmt")]
                defmt::warn!("host controller process error");
            }
            if status.contains(Status::HALTED) {
                #[cfg(feature = "defmt")]
                defmt::warn!("host controller halted");
                diag::dump_all(&self.io, self.schedule.as_ref());
                self.state = ControllerState::Halted;
            }
        }

        self.io.write16(regs::STATUS, status.bits())?;

        let completions = match self.schedule.as_mut() {
            Some(schedule) => schedule.poll_completions(),
            None => heapless::Vec::new(),
        };
        #[cfg(feature = "defmt")]
        if !completions.is_empty() {
            defmt::info!("{} descriptor(s) retired", completions.len());
        }

        Ok(InterruptOutcome::Acknowledged {
            status,
            completions,
        })
    }

    /// Inbound surface for the event loop's hardware-interrupt notification
    pub fn on_hardware_interrupt(&mut self) -> Result<InterruptOutcome> {
        self.handle_interrupt()
    }

    /// Inbound surface for the event loop's periodic timer
    ///
    /// Services both root ports; the caller re-arms its timer (nominally
    /// every [`timing::ROOT_POLL_PERIOD_MS`]).
    pub fn on_timer_tick(&mut self) -> Result<heapless::Vec<PortStatusChange, 2>> {
        let mut changes = heapless::Vec::new();
        for n in 1..=ROOT_PORT_COUNT {
            let port = PortId::new(n)?;
            if let Some(event) = self.poll_root_port(port)? {
                // Capacity is one slot per port.
                let _ = changes.push(PortStatusChange { port, event });
            }
        }
        Ok(changes)
    }

    /// Service one root port (see [`poll_root_port`][crate::uhci::port])
    pub fn poll_root_port(&mut self, port: PortId) -> Result<Option<PortEvent>> {
        poll_root_port(&mut self.io, &mut self.delay, port)
    }

    /// Read-only register snapshot for fault analysis
    pub fn register_snapshot(&self) -> Result<diag::RegisterSnapshot> {
        diag::RegisterSnapshot::capture(&self.io)
    }
}

#[cfg(test)]
impl<IO, D, A> UhciController<IO, D, A> {
    pub(crate) fn capabilities(&self) -> (&IO, &A) {
        (&self.io, &self.dma)
    }
}
