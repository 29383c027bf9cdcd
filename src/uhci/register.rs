//! Register access layer
//!
//! Width-typed access to the controller's register window. UHCI register
//! semantics are per-byte/word significant, so every call performs exactly
//! one access of the requested width and never widens or splits it.
//!
//! Platform failures surface as [`UsbError::RegisterAccess`] instead of a
//! silently stale value; diagnostic callers log and continue, lifecycle
//! callers propagate.

use core::sync::atomic::{fence, Ordering};

use crate::error::{Result, UsbError};

/// Width-typed register window access
///
/// Implemented over whatever the platform hands the driver: a memory-mapped
/// window ([`MmioRegisters`]), port I/O syscalls, or a test double. Offsets
/// are relative to the controller's register base.
pub trait RegisterIo {
    /// Read one byte at `offset`
    fn read8(&self, offset: u16) -> Result<u8>;
    /// Read one 16-bit word at `offset`
    fn read16(&self, offset: u16) -> Result<u16>;
    /// Read one 32-bit word at `offset`
    fn read32(&self, offset: u16) -> Result<u32>;
    /// Write one byte at `offset`
    fn write8(&mut self, offset: u16, value: u8) -> Result<()>;
    /// Write one 16-bit word at `offset`
    fn write16(&mut self, offset: u16, value: u16) -> Result<()>;
    /// Write one 32-bit word at `offset`
    fn write32(&mut self, offset: u16, value: u32) -> Result<()>;
}

/// Memory-mapped register window over a fixed base pointer
///
/// Accesses are volatile with acquire/release fences around them so register
/// writes that gate engine behaviour are not reordered against the DMA
/// schedule stores they depend on.
pub struct MmioRegisters {
    base: *mut u8,
    len: usize,
}

impl MmioRegisters {
    /// Wrap a mapped register window of `len` bytes at `base`
    ///
    /// # Safety
    ///
    /// `base` must point to the controller's register window, mapped
    /// uncached and valid for the lifetime of the value, with no other
    /// software accessing it.
    pub unsafe fn new(base: *mut u8, len: usize) -> Self {
        Self { base, len }
    }

    fn check(&self, offset: u16, width: usize) -> Result<()> {
        if offset as usize + width > self.len {
            return Err(UsbError::InvalidParameter);
        }
        Ok(())
    }

    #[inline(always)]
    unsafe fn read<T: Copy>(&self, offset: u16) -> T {
        fence(Ordering::SeqCst);
        let value = unsafe { core::ptr::read_volatile(self.base.add(offset as usize) as *const T) };
        fence(Ordering::SeqCst);
        value
    }

    #[inline(always)]
    unsafe fn write<T: Copy>(&mut self, offset: u16, value: T) {
        fence(Ordering::SeqCst);
        unsafe { core::ptr::write_volatile(self.base.add(offset as usize) as *mut T, value) };
        fence(Ordering::SeqCst);
    }
}

impl RegisterIo for MmioRegisters {
    fn read8(&self, offset: u16) -> Result<u8> {
        self.check(offset, 1)?;
        Ok(unsafe { self.read::<u8>(offset) })
    }

    fn read16(&self, offset: u16) -> Result<u16> {
        self.check(offset, 2)?;
        Ok(unsafe { self.read::<u16>(offset) })
    }

    fn read32(&self, offset: u16) -> Result<u32> {
        self.check(offset, 4)?;
        Ok(unsafe { self.read::<u32>(offset) })
    }

    fn write8(&mut self, offset: u16, value: u8) -> Result<()> {
        self.check(offset, 1)?;
        unsafe { self.write(offset, value) };
        Ok(())
    }

    fn write16(&mut self, offset: u16, value: u16) -> Result<()> {
        self.check(offset, 2)?;
        unsafe { self.write(offset, value) };
        Ok(())
    }

    fn write32(&mut self, offset: u16, value: u32) -> Result<()> {
        self.check(offset, 4)?;
        unsafe { self.write(offset, value) };
        Ok(())
    }
}
