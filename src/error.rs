//! UHCI driver error types

use core::fmt;

/// Driver operation result type
pub type Result<T> = core::result::Result<T, UsbError>;

/// UHCI driver error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbError {
    /// Platform register read/write reported a failure
    RegisterAccess,
    /// Controller stayed halted after the run bit was asserted
    StartFailed,
    /// Contiguous DMA memory could not be allocated
    NoResources,
    /// DMA region too small or not aligned for the schedule
    ScheduleRegion,
    /// Invalid parameter
    InvalidParameter,
    /// Operation not valid in the current controller state
    InvalidState,
    /// Bounded hardware wait expired
    Timeout,
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterAccess => write!(f, "register access failed"),
            Self::StartFailed => write!(f, "controller did not leave halted state"),
            Self::NoResources => write!(f, "no contiguous DMA memory available"),
            Self::ScheduleRegion => write!(f, "DMA region unsuitable for schedule"),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}
