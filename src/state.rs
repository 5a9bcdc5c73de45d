//! Per-channel state flags.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::CSI_VIRTUAL_CH_MAX;

/// Named channel flags.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ChannelFlag {
    Opened = 0,
    /// Output feeds an ischain.
    JoinIschain,
    /// Output feeds the 3AA on-the-fly.
    OtfWith3aa,
    /// Software-only channel. Overrides the hardware effect of every other flag.
    Dummy,
    /// Channel owns a DMA engine and an interrupt line.
    DmaEnable,
    StartStream,
    LastCapture,
    BufErrVc0,
    BufErrVc1,
    BufErrVc2,
    BufErrVc3,
    MultibufVc1,
    MultibufVc2,
    MultibufVc3,
    /// Error threshold reached, hardware disabled until restart.
    DtpStop,
    /// Latched after a buffer ownership failure.
    Fatal,
}

impl ChannelFlag {
    #[inline]
    const fn bit(self) -> u32 {
        1 << self as u32
    }

    pub const fn buf_err(vc: usize) -> Option<Self> {
        match vc {
            0 => Some(Self::BufErrVc0),
            1 => Some(Self::BufErrVc1),
            2 => Some(Self::BufErrVc2),
            3 => Some(Self::BufErrVc3),
            _ => None,
        }
    }

    /// VC0 never multi-buffers.
    pub const fn multibuf(vc: usize) -> Option<Self> {
        match vc {
            1 => Some(Self::MultibufVc1),
            2 => Some(Self::MultibufVc2),
            3 => Some(Self::MultibufVc3),
            _ => None,
        }
    }
}

/// Board level flags that survive `open`.
const BASELINE: u32 = ChannelFlag::Dummy.bit() | ChannelFlag::DmaEnable.bit();

/// Atomic set of [`ChannelFlag`]s shared by the ISR, deferred work and
/// process context.
#[derive(Debug)]
pub struct ChannelState {
    bits: AtomicU32,
}

impl ChannelState {
    pub fn new(dummy: bool, dma_enable: bool) -> Self {
        let mut bits = 0;
        if dummy {
            bits |= ChannelFlag::Dummy.bit();
        }
        if dma_enable {
            bits |= ChannelFlag::DmaEnable.bit();
        }
        Self {
            bits: AtomicU32::new(bits),
        }
    }

    pub fn test(&self, flag: ChannelFlag) -> bool {
        self.bits.load(Ordering::Acquire) & flag.bit() != 0
    }

    pub fn set(&self, flag: ChannelFlag) {
        self.bits.fetch_or(flag.bit(), Ordering::AcqRel);
    }

    pub fn clear(&self, flag: ChannelFlag) {
        self.bits.fetch_and(!flag.bit(), Ordering::AcqRel);
    }

    /// Clear `flag`, returning whether it was set.
    pub fn test_and_clear(&self, flag: ChannelFlag) -> bool {
        self.bits.fetch_and(!flag.bit(), Ordering::AcqRel) & flag.bit() != 0
    }

    /// Drop everything but the board level flags.
    pub fn reset_baseline(&self) {
        self.bits.fetch_and(BASELINE, Ordering::AcqRel);
    }

    pub fn clear_buf_errs(&self) {
        for vc in 0..CSI_VIRTUAL_CH_MAX {
            if let Some(flag) = ChannelFlag::buf_err(vc) {
                self.clear(flag);
            }
        }
    }

    pub fn is_opened(&self) -> bool {
        self.test(ChannelFlag::Opened)
    }

    pub fn is_streaming(&self) -> bool {
        self.test(ChannelFlag::StartStream)
    }
}
