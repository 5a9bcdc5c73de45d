//! Hardware abstraction layer for a capture channel
//!
//! [`CamifHw`] is the register capability the channel consumes. Every access
//! made by the crate goes through [`HwPort`], which enforces the DUMMY rule:
//! a dummy channel keeps its software bookkeeping but never touches hardware.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::config::CSI_VIRTUAL_CH_MAX;
use crate::registers::consts::{IRQ_MASK_ALL, IRQ_MASK_OVERFLOW};

/// Register level access to one channel.
pub trait CamifHw: Send + Sync {
    /// Pending interrupt sources.
    fn read_status(&self) -> u32;

    /// Acknowledge the given interrupt sources.
    fn clear_status(&self, bits: u32);

    /// Read and acknowledge the per-VC CSI error words.
    fn read_error_ids(&self) -> [u32; CSI_VIRTUAL_CH_MAX] {
        [0; CSI_VIRTUAL_CH_MAX]
    }

    fn write_register(&self, offset: usize, value: u32);

    fn read_register(&self, offset: usize) -> u32;

    fn reset(&self);

    /// Start capture.
    fn enable(&self);

    /// Stop capture at the next frame boundary.
    fn disable(&self);

    /// Set the interrupt mask; a set bit masks that source.
    fn set_irq_mask(&self, mask: u32);
}

/// Gatekeeper in front of [`CamifHw`].
pub struct HwPort<H: CamifHw> {
    hw: H,
    dummy: bool,
    irq_mask: AtomicU32,
    writes: AtomicUsize,
}

impl<H: CamifHw> HwPort<H> {
    pub fn new(hw: H, dummy: bool) -> Self {
        Self {
            hw,
            dummy,
            irq_mask: AtomicU32::new(IRQ_MASK_ALL),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn hw(&self) -> &H {
        &self.hw
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    /// Number of hardware writes issued through this port.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    #[inline]
    fn gate(&self) -> bool {
        if self.dummy {
            return false;
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn read_status(&self) -> u32 {
        if self.dummy { 0 } else { self.hw.read_status() }
    }

    pub fn clear_status(&self, bits: u32) {
        if bits != 0 && self.gate() {
            self.hw.clear_status(bits);
        }
    }

    pub fn read_error_ids(&self) -> [u32; CSI_VIRTUAL_CH_MAX] {
        if self.dummy {
            [0; CSI_VIRTUAL_CH_MAX]
        } else {
            self.hw.read_error_ids()
        }
    }

    pub fn write(&self, offset: usize, value: u32) {
        if self.gate() {
            self.hw.write_register(offset, value);
        }
    }

    pub fn read(&self, offset: usize) -> u32 {
        if self.dummy { 0 } else { self.hw.read_register(offset) }
    }

    pub fn reset(&self) {
        if self.gate() {
            self.hw.reset();
        }
    }

    pub fn enable(&self) {
        if self.gate() {
            self.hw.enable();
        }
    }

    pub fn disable(&self) {
        if self.gate() {
            self.hw.disable();
        }
    }

    fn store_mask(&self, mask: u32) {
        self.irq_mask.store(mask, Ordering::Release);
        if self.gate() {
            self.hw.set_irq_mask(mask);
        }
    }

    pub fn mask_all_irqs(&self) {
        self.store_mask(IRQ_MASK_ALL);
    }

    pub fn unmask_all_irqs(&self) {
        self.store_mask(0);
    }

    pub fn mask_overflow(&self) {
        let prev = self.irq_mask.fetch_or(IRQ_MASK_OVERFLOW, Ordering::AcqRel);
        if prev & IRQ_MASK_OVERFLOW != IRQ_MASK_OVERFLOW && self.gate() {
            self.hw.set_irq_mask(prev | IRQ_MASK_OVERFLOW);
        }
    }

    /// Unmask overflow sources; returns whether they were masked.
    pub fn unmask_overflow(&self) -> bool {
        let prev = self.irq_mask.fetch_and(!IRQ_MASK_OVERFLOW, Ordering::AcqRel);
        if prev & IRQ_MASK_OVERFLOW == 0 {
            return false;
        }
        if self.gate() {
            self.hw.set_irq_mask(prev & !IRQ_MASK_OVERFLOW);
        }
        true
    }
}
