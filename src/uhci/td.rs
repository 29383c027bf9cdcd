//! Transfer Descriptor (TD)
//!
//! One hardware-executable USB transaction: link pointer, control/status,
//! token and buffer pointer, per the Intel UHCI Design Guide section 3.2.
//!
//! TDs linked into an active frame are owned field-by-field: once the active
//! bit is set the engine owns the status word (it writes actual length and
//! completion status there) and software only reads it until the bit clears.
//! The single software write site is [`TransferDescriptor::activate`].

use core::sync::atomic::{AtomicU32, Ordering};

use super::link;

/// Control/status word bit definitions
#[allow(missing_docs)]
pub mod status {
    pub const BITSTUFF_ERROR: u32 = 1 << 17;
    pub const CRC_TIMEOUT: u32 = 1 << 18;
    pub const NAK: u32 = 1 << 19;
    pub const BABBLE: u32 = 1 << 20;
    pub const DATA_BUFFER_ERROR: u32 = 1 << 21;
    pub const STALLED: u32 = 1 << 22;
    pub const ACTIVE: u32 = 1 << 23;
    pub const INTERRUPT_ON_COMPLETE: u32 = 1 << 24;
    pub const ISOCHRONOUS: u32 = 1 << 25;
    pub const LOW_SPEED: u32 = 1 << 26;
    pub const SHORT_PACKET_DETECT: u32 = 1 << 29;

    /// Any completion status that is an error
    pub const ANY_ERROR: u32 =
        BITSTUFF_ERROR | CRC_TIMEOUT | BABBLE | DATA_BUFFER_ERROR | STALLED;

    /// Actual length field: stored as n-1, all-ones meaning zero bytes
    #[inline(always)]
    pub const fn actual_length(word: u32) -> u16 {
        (word.wrapping_add(1) & 0x3FF) as u16
    }

    /// Error counter field (bits 28:27)
    #[inline(always)]
    pub const fn error_count(word: u32) -> u8 {
        ((word >> 27) & 0x3) as u8
    }

    /// Encode the error counter field
    #[inline(always)]
    pub const fn with_error_count(count: u8) -> u32 {
        ((count & 0x3) as u32) << 27
    }
}

/// Token word bit definitions and builders
#[allow(missing_docs)]
pub mod token {
    pub const PID_IN: u32 = 0x69;
    pub const PID_OUT: u32 = 0xE1;
    pub const PID_SETUP: u32 = 0x2D;

    const DEVICE_SHIFT: u32 = 8;
    const ENDPOINT_SHIFT: u32 = 15;
    const DATA_TOGGLE_SHIFT: u32 = 19;
    const MAX_LEN_SHIFT: u32 = 21;

    /// Field encode: max length is stored as n-1, with 0 encoded as 0x7FF
    #[inline(always)]
    const fn encode_max_len(len: u16) -> u32 {
        ((len as u32).wrapping_sub(1) & 0x7FF) << MAX_LEN_SHIFT
    }

    const fn encode(pid: u32, len: u16, endpoint: u8, device: u8, toggle: u8) -> u32 {
        encode_max_len(len)
            | (((toggle & 1) as u32) << DATA_TOGGLE_SHIFT)
            | (((endpoint & 0xF) as u32) << ENDPOINT_SHIFT)
            | (((device & 0x7F) as u32) << DEVICE_SHIFT)
            | pid
    }

    /// SETUP token (data toggle is always 0)
    pub const fn setup(len: u16, endpoint: u8, device: u8) -> u32 {
        encode(PID_SETUP, len, endpoint, device, 0)
    }

    /// IN token
    pub const fn in_token(len: u16, endpoint: u8, device: u8, toggle: u8) -> u32 {
        encode(PID_IN, len, endpoint, device, toggle)
    }

    /// OUT token
    pub const fn out_token(len: u16, endpoint: u8, device: u8, toggle: u8) -> u32 {
        encode(PID_OUT, len, endpoint, device, toggle)
    }

    pub const fn pid(word: u32) -> u32 {
        word & 0xFF
    }

    pub const fn device_address(word: u32) -> u8 {
        ((word >> DEVICE_SHIFT) & 0x7F) as u8
    }

    pub const fn endpoint(word: u32) -> u8 {
        ((word >> ENDPOINT_SHIFT) & 0xF) as u8
    }

    pub const fn data_toggle(word: u32) -> u8 {
        ((word >> DATA_TOGGLE_SHIFT) & 1) as u8
    }

    /// Decode the max length field back to a byte count
    pub const fn max_length(word: u32) -> u16 {
        (((word >> MAX_LEN_SHIFT).wrapping_add(1)) & 0x7FF) as u16
    }
}

/// Transfer Descriptor hardware record
///
/// Exactly the 16 bytes the engine walks; driver bookkeeping (chain
/// neighbours, owning pool slot) lives in the schedule arena, referenced by
/// index, never inside the record.
#[repr(C, align(16))]
pub struct TransferDescriptor {
    /// Link to the next TD/QH (bit 0 terminate, bit 1 QH, bit 2 depth-first)
    pub link: AtomicU32,
    /// Control/status word, engine-owned while the active bit is set
    pub status: AtomicU32,
    /// Token: PID, device address, endpoint, data toggle, max length
    pub token: AtomicU32,
    /// Physical address of the data buffer
    pub buffer: AtomicU32,
}

impl TransferDescriptor {
    /// Default error counter: retry three times before stalling out
    pub const DEFAULT_ERROR_COUNT: u8 = 3;

    /// Create an idle descriptor (terminated link, inactive status)
    pub const fn new() -> Self {
        Self {
            link: AtomicU32::new(link::TERMINATE),
            status: AtomicU32::new(0),
            token: AtomicU32::new(0),
            buffer: AtomicU32::new(0),
        }
    }

    /// Whether the engine still owns this descriptor
    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.status.load(Ordering::Acquire) & status::ACTIVE != 0
    }

    /// Snapshot of the control/status word
    #[inline(always)]
    pub fn status_word(&self) -> u32 {
        self.status.load(Ordering::Acquire)
    }

    /// Arm the descriptor for execution
    ///
    /// Token and buffer are stored first; the status word with the active
    /// bit is stored last with release ordering so the engine never observes
    /// a half-initialized record. After this call software must not write
    /// any field until the active bit clears.
    pub fn activate(&self, token_word: u32, buffer_phys: u32, low_speed: bool) {
        self.token.store(token_word, Ordering::Relaxed);
        self.buffer.store(buffer_phys, Ordering::Relaxed);

        let mut word = status::ACTIVE | status::with_error_count(Self::DEFAULT_ERROR_COUNT);
        if low_speed {
            word |= status::LOW_SPEED;
        }
        self.status.store(word, Ordering::Release);
    }

    /// Return the descriptor to the idle state after retirement
    pub fn reset(&self) {
        self.link.store(link::TERMINATE, Ordering::Relaxed);
        self.token.store(0, Ordering::Relaxed);
        self.buffer.store(0, Ordering::Relaxed);
        self.status.store(0, Ordering::Release);
    }
}

// The engine dereferences 16-byte-aligned physical addresses; the record
// layout is part of the hardware contract.
const _: () = {
    assert!(core::mem::size_of::<TransferDescriptor>() == 16);
    assert!(core::mem::align_of::<TransferDescriptor>() == 16);
};
