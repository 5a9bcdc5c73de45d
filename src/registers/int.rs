use core::fmt;
use core::ptr::NonNull;
use tock_registers::LocalRegisterCopy;
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::register_structs;
use tock_registers::registers::ReadWrite;

use crate::config::CSI_VIRTUAL_CH_MAX;

register_structs! {
    /// Interrupt and control block at the start of every channel register file.
    pub IntRegs {
        (0x00 => pub ctrl: ReadWrite<u32, CTRL::Register>),
        (0x04 => pub int_mask: ReadWrite<u32, STATUS::Register>),
        // Write one to clear.
        (0x08 => pub int_status: ReadWrite<u32, STATUS::Register>),
        (0x0C => _reserved0),
        (0x10 => pub err_id: [ReadWrite<u32>; 4]),
        (0x20 => @END),
    }
}

tock_registers::register_bitfields! {u32,
    CTRL [
        ENABLE OFFSET(0) NUMBITS(1) [],
        SW_RESET OFFSET(1) NUMBITS(1) []
    ],
    STATUS [
        FRAME_START OFFSET(0) NUMBITS(1) [],
        FRAME_END OFFSET(1) NUMBITS(1) [],
        LINE OFFSET(2) NUMBITS(1) [],
        LAST_CAPTURE OFFSET(3) NUMBITS(1) [],
        OVERFLOW_Y OFFSET(4) NUMBITS(1) [],
        OVERFLOW_CB OFFSET(5) NUMBITS(1) [],
        OVERFLOW_CR OFFSET(6) NUMBITS(1) [],
        ERROR OFFSET(7) NUMBITS(1) [],
        DMA_END OFFSET(8) NUMBITS(4) []
    ]
}

/// Decoded copy of a status word.
#[derive(Clone, Copy)]
pub struct IrqStatus(LocalRegisterCopy<u32, STATUS::Register>);

impl IrqStatus {
    pub fn new(raw: u32) -> Self {
        Self(LocalRegisterCopy::new(raw))
    }

    pub fn raw(&self) -> u32 {
        self.0.get()
    }

    pub fn is_empty(&self) -> bool {
        self.raw() == 0
    }

    pub fn frame_start(&self) -> bool {
        self.0.is_set(STATUS::FRAME_START)
    }

    pub fn frame_end(&self) -> bool {
        self.0.is_set(STATUS::FRAME_END)
    }

    pub fn line(&self) -> bool {
        self.0.is_set(STATUS::LINE)
    }

    pub fn last_capture(&self) -> bool {
        self.0.is_set(STATUS::LAST_CAPTURE)
    }

    pub fn overflow_y(&self) -> bool {
        self.0.is_set(STATUS::OVERFLOW_Y)
    }

    pub fn overflow_cb(&self) -> bool {
        self.0.is_set(STATUS::OVERFLOW_CB)
    }

    pub fn overflow_cr(&self) -> bool {
        self.0.is_set(STATUS::OVERFLOW_CR)
    }

    pub fn overflow(&self) -> bool {
        self.overflow_y() || self.overflow_cb() || self.overflow_cr()
    }

    pub fn error(&self) -> bool {
        self.0.is_set(STATUS::ERROR)
    }

    /// DMA write of a frame finished on `vc`.
    pub fn dma_end(&self, vc: usize) -> bool {
        vc < CSI_VIRTUAL_CH_MAX && self.0.read(STATUS::DMA_END) & (1 << vc) != 0
    }
}

impl fmt::Debug for IrqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IrqStatus(0x{:x})", self.raw())
    }
}

/// Raw status bits, usable to build status words and interrupt masks.
pub mod bits {
    use super::STATUS;

    pub const FRAME_START: u32 = STATUS::FRAME_START.mask << STATUS::FRAME_START.shift;
    pub const FRAME_END: u32 = STATUS::FRAME_END.mask << STATUS::FRAME_END.shift;
    pub const LINE: u32 = STATUS::LINE.mask << STATUS::LINE.shift;
    pub const LAST_CAPTURE: u32 = STATUS::LAST_CAPTURE.mask << STATUS::LAST_CAPTURE.shift;
    pub const OVERFLOW_Y: u32 = STATUS::OVERFLOW_Y.mask << STATUS::OVERFLOW_Y.shift;
    pub const OVERFLOW_CB: u32 = STATUS::OVERFLOW_CB.mask << STATUS::OVERFLOW_CB.shift;
    pub const OVERFLOW_CR: u32 = STATUS::OVERFLOW_CR.mask << STATUS::OVERFLOW_CR.shift;
    pub const ERROR: u32 = STATUS::ERROR.mask << STATUS::ERROR.shift;

    pub const fn dma_end(vc: usize) -> u32 {
        1 << (STATUS::DMA_END.shift + vc)
    }
}

pub struct IntRegisters {
    base: NonNull<IntRegs>,
}

impl IntRegisters {
    /// # Safety
    ///
    /// `base` must map the channel register file for the lifetime of the
    /// returned object.
    pub const unsafe fn from_base(base: NonNull<u8>) -> Self {
        Self { base: base.cast() }
    }

    #[inline]
    pub fn regs(&self) -> &IntRegs {
        unsafe { self.base.as_ref() }
    }

    pub fn read_status(&self) -> u32 {
        self.regs().int_status.get()
    }

    pub fn clear_status(&self, bits: u32) {
        self.regs().int_status.set(bits);
    }

    pub fn set_mask(&self, mask: u32) {
        self.regs().int_mask.set(mask);
    }

    /// Read and acknowledge the per-VC error words.
    pub fn take_error_ids(&self) -> [u32; CSI_VIRTUAL_CH_MAX] {
        let mut ids = [0; CSI_VIRTUAL_CH_MAX];
        for (id, reg) in ids.iter_mut().zip(self.regs().err_id.iter()) {
            *id = reg.get();
            reg.set(*id);
        }
        ids
    }

    pub fn set_enable(&self, enable: bool) {
        if enable {
            self.regs().ctrl.modify(CTRL::ENABLE::SET);
        } else {
            self.regs().ctrl.modify(CTRL::ENABLE::CLEAR);
        }
    }

    pub fn sw_reset(&self) {
        self.regs().ctrl.modify(CTRL::SW_RESET::SET);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_coalesced_word() {
        let status = IrqStatus::new(bits::FRAME_START | bits::FRAME_END | bits::OVERFLOW_CB);
        assert!(status.frame_start());
        assert!(status.frame_end());
        assert!(!status.line());
        assert!(status.overflow());
        assert!(!status.overflow_y());
    }

    #[test]
    fn dma_end_is_per_vc() {
        let status = IrqStatus::new(bits::dma_end(2));
        assert!(status.dma_end(2));
        assert!(!status.dma_end(1));
        assert!(!status.dma_end(CSI_VIRTUAL_CH_MAX));
        assert_eq!(bits::dma_end(0), 1 << 8);
    }

    #[test]
    fn overflow_bits_match_mask() {
        assert_eq!(
            bits::OVERFLOW_Y | bits::OVERFLOW_CB | bits::OVERFLOW_CR,
            super::super::consts::IRQ_MASK_OVERFLOW
        );
    }
}
