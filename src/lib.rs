#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

//! USB host controller driver core for UHCI-class controllers
//!
//! Programs the I/O-mapped register engine of a USB 1.1 UHCI host
//! controller: builds the DMA-resident schedule of queue heads and transfer
//! descriptors the engine walks once per 1 ms frame, sequences controller
//! reset and start, runs the root-hub port reset protocol, and decodes
//! interrupt notifications.
//!
//! # Core components
//!
//! - [`uhci::register`] - width-typed access to the register window
//! - [`uhci::schedule`] - frame list, queue-head ring and TD arena builder
//! - [`uhci::controller`] - lifecycle state machine and interrupt handling
//! - [`uhci::port`] - root-hub port polling and reset protocol
//! - [`uhci::diag`] - read-only register/schedule dumps
//! - [`dma`] - contiguous DMA memory capability
//!
//! # Platform integration
//!
//! The driver core consumes its environment as capabilities: a
//! [`uhci::RegisterIo`] implementation over the controller's register
//! window, an `embedded_hal::delay::DelayNs` tick source, and a
//! [`dma::ContiguousDma`] allocator. PCI discovery, IRQ policy and the
//! blocking event loop stay with the caller, which invokes
//! [`uhci::UhciController::initialize`] once, then
//! [`on_hardware_interrupt`](uhci::UhciController::on_hardware_interrupt)
//! and [`on_timer_tick`](uhci::UhciController::on_timer_tick) as its events
//! arrive.
//!
//! # Restart semantics
//!
//! A restart installs a freshly built schedule by replacing the frame-list
//! base pointer. Descriptors the engine still holds references to at the
//! moment of the switch are not drained first; callers must quiesce
//! transfers before restarting if they need those completions.

#[cfg(test)]
extern crate std;

pub mod dma;
pub mod error;
pub mod uhci;
pub mod wait;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Result, UsbError};
pub use uhci::{
    ControllerState, InterruptOutcome, PortEvent, PortId, ResetReport, RestartOutcome,
    UhciController,
};
