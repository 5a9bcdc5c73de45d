//! Memory-mapped register access for a capture channel.
//!
//! The interrupt block is described with [`tock_registers`]. Generation
//! specific DMA registers are reached by offset through [`RegLayout`], since
//! their placement differs between FLITE and the CSI DMA generations.
//!
//! [`RegLayout`]: consts::RegLayout

use core::ptr::NonNull;

use crate::config::CSI_VIRTUAL_CH_MAX;
use crate::hal::CamifHw;

pub mod consts;
pub mod int;

use int::IntRegisters;

/// [`CamifHw`] backed by a mapped channel register file.
pub struct CamifRegisters {
    base: NonNull<u8>,
    int: IntRegisters,
}
unsafe impl Send for CamifRegisters {}
unsafe impl Sync for CamifRegisters {}

impl CamifRegisters {
    /// Create a new facade over the channel MMIO region.
    ///
    /// # Safety
    ///
    /// The caller must ensure the provided pointer is a valid mapping for the
    /// whole channel register file for the lifetime of the returned object.
    pub const unsafe fn new(base: NonNull<u8>) -> Self {
        Self {
            base,
            int: unsafe { IntRegisters::from_base(base) },
        }
    }

    fn reg(&self, offset: usize) -> *mut u32 {
        unsafe { self.base.as_ptr().add(offset) as *mut u32 }
    }
}

impl CamifHw for CamifRegisters {
    fn read_status(&self) -> u32 {
        self.int.read_status()
    }

    fn clear_status(&self, bits: u32) {
        self.int.clear_status(bits);
    }

    fn read_error_ids(&self) -> [u32; CSI_VIRTUAL_CH_MAX] {
        self.int.take_error_ids()
    }

    fn write_register(&self, offset: usize, value: u32) {
        unsafe { self.reg(offset).write_volatile(value) }
    }

    fn read_register(&self, offset: usize) -> u32 {
        unsafe { self.reg(offset).read_volatile() }
    }

    fn reset(&self) {
        self.int.sw_reset();
    }

    fn enable(&self) {
        self.int.set_enable(true);
    }

    fn disable(&self) {
        self.int.set_enable(false);
    }

    fn set_irq_mask(&self, mask: u32) {
        self.int.set_mask(mask);
    }
}
