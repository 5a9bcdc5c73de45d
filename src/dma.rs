//! DMA output programming for one channel.
//!
//! [`BufferCtrl`] turns frame manager decisions into register writes through
//! a [`HwPort`]. It keeps a software mirror of each VC's output enable so the
//! deferred workers can tell a starved channel from an armed one without
//! reading hardware.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{CSI_VIRTUAL_CH_MAX, Downstream};
use crate::hal::{CamifHw, HwPort};
use crate::osal::DmaAddr;
use crate::registers::consts::{PATH_M2M, PATH_NONE, PATH_OTF, RegLayout};

/// Next ring index after `frameptr`.
pub const fn advance(frameptr: usize, num_frames: usize) -> usize {
    if num_frames == 0 {
        return 0;
    }
    (frameptr + 1) % num_frames
}

/// Ring index `offset` slots behind `frameptr`, wrapping through zero.
pub const fn previous(frameptr: usize, num_frames: usize, offset: usize) -> usize {
    if num_frames == 0 {
        return 0;
    }
    let offset = offset % num_frames;
    if frameptr >= offset {
        frameptr - offset
    } else {
        num_frames - (offset - frameptr)
    }
}

pub struct BufferCtrl {
    layout: &'static RegLayout,
    enabled: [AtomicBool; CSI_VIRTUAL_CH_MAX],
}

impl BufferCtrl {
    pub fn new(layout: &'static RegLayout) -> Self {
        Self {
            layout,
            enabled: Default::default(),
        }
    }

    /// Whether DMA output on `vc` is currently enabled.
    pub fn is_enabled(&self, vc: usize) -> bool {
        self.enabled
            .get(vc)
            .is_some_and(|e| e.load(Ordering::Acquire))
    }

    fn set_output<H: CamifHw>(&self, port: &HwPort<H>, vc: usize, enable: bool) {
        port.write(self.layout.dma_ctrl[vc], enable as u32);
        self.enabled[vc].store(enable, Ordering::Release);
    }

    /// Bind `addr` to the next-frame slot of `vc` and enable output.
    pub fn arm<H: CamifHw>(&self, port: &HwPort<H>, vc: usize, addr: DmaAddr) {
        if vc >= CSI_VIRTUAL_CH_MAX {
            return;
        }
        let Ok(addr) = u32::try_from(addr) else {
            error!("[VC{}] {:#x} is not a 32-bit device address", vc, addr);
            self.disarm(port, vc);
            return;
        };
        port.write(self.layout.dma_addr[vc], addr);
        if !self.is_enabled(vc) {
            self.set_output(port, vc, true);
        }
    }

    /// Null the address and disable output on `vc`.
    pub fn disarm<H: CamifHw>(&self, port: &HwPort<H>, vc: usize) {
        if vc >= CSI_VIRTUAL_CH_MAX {
            return;
        }
        port.write(self.layout.dma_addr[vc], 0);
        self.set_output(port, vc, false);
    }

    /// Program ring slot `slot` of a multi-buffered `vc`.
    pub fn arm_slot<H: CamifHw>(&self, port: &HwPort<H>, vc: usize, slot: usize, addr: DmaAddr) {
        if vc >= CSI_VIRTUAL_CH_MAX {
            return;
        }
        let Ok(addr) = u32::try_from(addr) else {
            error!("[VC{}] slot {}: {:#x} is not a 32-bit device address", vc, slot, addr);
            return;
        };
        port.write(self.layout.dma_addr[vc] + slot * 4, addr);
    }

    /// Enable output on a multi-buffered `vc` once its slots are programmed.
    pub fn enable_ring<H: CamifHw>(&self, port: &HwPort<H>, vc: usize) {
        if vc < CSI_VIRTUAL_CH_MAX {
            self.set_frameptr(port, vc, 0);
            self.set_output(port, vc, true);
        }
    }

    pub fn frameptr<H: CamifHw>(&self, port: &HwPort<H>, vc: usize) -> usize {
        if vc >= CSI_VIRTUAL_CH_MAX {
            return 0;
        }
        port.read(self.layout.frameptr[vc]) as usize
    }

    pub fn set_frameptr<H: CamifHw>(&self, port: &HwPort<H>, vc: usize, ptr: usize) {
        if vc < CSI_VIRTUAL_CH_MAX {
            port.write(self.layout.frameptr[vc], ptr as u32);
        }
    }

    pub fn set_otf<H: CamifHw>(&self, port: &HwPort<H>, enable: bool) {
        port.write(self.layout.otf_ctrl, enable as u32);
    }

    pub fn set_path<H: CamifHw>(&self, port: &HwPort<H>, downstream: Downstream) {
        let path = match downstream {
            Downstream::None => PATH_NONE,
            Downstream::Memory => PATH_M2M,
            Downstream::Otf => PATH_OTF,
        };
        port.write(self.layout.path_ctrl, path);
    }

    pub fn request_abort<H: CamifHw>(&self, port: &HwPort<H>) {
        port.write(self.layout.dma_abort, 1);
    }
}
