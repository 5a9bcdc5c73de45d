//! Frame buffer lifecycle and interrupt sequencing for Exynos FIMC-IS capture
//! channels (MIPI-CSI receivers with DMA, and the older FLITE block).
//!
//! A [`Camif`] owns one hardware channel. Buffers move through
//! REQUEST → PROCESS → COMPLETE as the hardware raises frame start and frame
//! end interrupts: [`Camif::irq_handler`] runs in the interrupt handler and
//! only schedules work, [`Camif::run_deferred`] performs the buffer
//! transitions, and the process-context calls (open, stream, enqueue, ...)
//! return explicit results.
//!
//! Register access, platform services and the downstream consumers are
//! supplied by the caller through the [`CamifHw`], [`Osal`], [`NotifySink`],
//! [`BufferDone`] and [`GroupTrigger`] traits.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

mod config;
mod dma;
mod err;
mod framemgr;
mod hal;
mod isr;
mod notify;
mod osal;
mod platform;
mod registers;
mod state;
mod stream;
mod tasklet;
mod worker;

use alloc::sync::Arc;

pub use config::*;
pub use dma::{advance, previous};
pub use err::*;
pub use framemgr::{
    FIMC_IS_MAX_PLANES, FRAMES_MAX, Frame, FrameBatch, FrameBuffer, FrameGuard, FrameInfo,
    FrameManager, FrameQueues, FrameState, FrameStatus,
};
pub use hal::CamifHw;
pub use isr::{InterruptContext, SwChecker};
pub use notify::*;
pub use osal::*;
pub use platform::{SENSOR_POSITION_MAX, SensorMailbox};
pub use registers::CamifRegisters;
pub use registers::consts::*;
pub use registers::int::{IrqStatus, bits as status_bits};
pub use state::{ChannelFlag, ChannelState};
use spin::Mutex;

use crate::dma::BufferCtrl;
use crate::framemgr::AtomicContext;
use crate::hal::HwPort;
use crate::tasklet::Tasklets;

/// Minimum buffers a multi-buffered VC needs to ring.
const MULTIBUF_MIN: usize = 2;

/// Image format the sensor is configured to send.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageFormat {
    pub width: u32,
    pub height: u32,
    /// FourCC code.
    pub pixelformat: u32,
}

/// One CSI or FLITE capture channel.
pub struct Camif<H: CamifHw, O: Osal> {
    config: CamifConfig,
    process_depth: usize,
    multibuf_depth: usize,
    port: HwPort<H>,
    osal: O,
    buf: BufferCtrl,
    state: ChannelState,
    irq_ctx: InterruptContext,
    frames: FrameManager,
    vc_frames: [FrameManager; CSI_VIRTUAL_CH_MAX],
    tasklets: Tasklets,
    format: Mutex<Option<ImageFormat>>,
    stream_lock: Mutex<()>,
    notify: Arc<dyn NotifySink>,
    done: Arc<dyn BufferDone>,
    trigger: Option<Arc<dyn GroupTrigger>>,
    mailbox: Option<Arc<SensorMailbox>>,
}

impl<H: CamifHw, O: Osal> Camif<H, O> {
    pub fn new(
        config: CamifConfig,
        hw: H,
        osal: O,
        notify: Arc<dyn NotifySink>,
        done: Arc<dyn BufferDone>,
    ) -> Result<Self, CamifError> {
        if config.sensor_position >= SENSOR_POSITION_MAX {
            error!(
                "[CAMIF{}] sensor position {} out of range",
                config.instance, config.sensor_position
            );
            return Err(CamifError::InvalidArgument);
        }
        let variant = config.variant();
        let id = config.instance * CSI_VIRTUAL_CH_MAX as u32;
        debug!("[CAMIF{}] {:?}", config.instance, config);
        Ok(Self {
            process_depth: config.process_depth(),
            multibuf_depth: config.multibuf_depth(),
            port: HwPort::new(hw, config.dummy),
            osal,
            buf: BufferCtrl::new(variant.layout()),
            state: ChannelState::new(config.dummy, config.dma_enable),
            irq_ctx: InterruptContext::default(),
            frames: FrameManager::new(id),
            vc_frames: core::array::from_fn(|vc| FrameManager::new(id + vc as u32)),
            tasklets: Tasklets::new(),
            format: Mutex::new(None),
            stream_lock: Mutex::new(()),
            notify,
            done,
            trigger: None,
            mailbox: None,
            config,
        })
    }

    /// Attach the group scheduler fed by an OTF channel.
    pub fn with_trigger(mut self, trigger: Arc<dyn GroupTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Attach the shared sensor fcount mailbox.
    pub fn with_mailbox(mut self, mailbox: Arc<SensorMailbox>) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    pub fn instance(&self) -> u32 {
        self.config.instance
    }

    pub fn config(&self) -> &CamifConfig {
        &self.config
    }

    pub fn hw(&self) -> &H {
        self.port.hw()
    }

    pub fn osal(&self) -> &O {
        &self.osal
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn interrupt_context(&self) -> &InterruptContext {
        &self.irq_ctx
    }

    pub fn frames(&self) -> &FrameManager {
        &self.frames
    }

    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }

    /// Hardware writes issued so far; always zero for a dummy channel.
    pub fn hw_write_count(&self) -> usize {
        self.port.write_count()
    }

    fn check_fatal(&self) -> Result<(), CamifError> {
        if self.state.test(ChannelFlag::Fatal) {
            return Err(CamifError::Fatal);
        }
        Ok(())
    }

    fn check_opened(&self) -> Result<(), CamifError> {
        self.check_fatal()?;
        if !self.state.is_opened() {
            return Err(CamifError::NotOpened);
        }
        Ok(())
    }

    pub fn open(&self) -> Result<(), CamifError> {
        let _guard = self.stream_lock.lock();
        if self.state.is_opened() {
            return Err(CamifError::AlreadyOpened);
        }
        self.state.reset_baseline();
        self.irq_ctx.reset();
        self.tasklets.clear();
        *self.format.lock() = None;

        if self.state.test(ChannelFlag::DmaEnable) && !self.port.is_dummy() {
            self.osal.request_irq(self.config.irq).map_err(|e| {
                error!(
                    "[CAMIF{}] request_irq({}) failed: {:?}",
                    self.instance(),
                    self.config.irq,
                    e
                );
                CamifError::IrqRequest(self.config.irq)
            })?;
        }
        self.state.set(ChannelFlag::Opened);
        info!("[CAMIF{}] open ({:?})", self.instance(), self.config.kind);
        Ok(())
    }

    pub fn close(&self) -> Result<(), CamifError> {
        let _guard = self.stream_lock.lock();
        if !self.state.is_opened() {
            return Err(CamifError::NotOpened);
        }
        if self.state.is_streaming() {
            error!("[CAMIF{}] close while streaming", self.instance());
            return Err(CamifError::Busy);
        }
        if self.state.test(ChannelFlag::DmaEnable) && !self.port.is_dummy() {
            self.osal.free_irq(self.config.irq);
        }
        self.tasklets.clear();
        self.state.reset_baseline();
        info!("[CAMIF{}] close", self.instance());
        Ok(())
    }

    pub fn set_format(&self, width: u32, height: u32, pixelformat: u32) -> Result<(), CamifError> {
        self.check_opened()?;
        if self.state.is_streaming() {
            return Err(CamifError::Busy);
        }
        if width == 0 || height == 0 {
            return Err(CamifError::InvalidArgument);
        }
        *self.format.lock() = Some(ImageFormat {
            width,
            height,
            pixelformat,
        });
        debug!("[CAMIF{}] format {}x{}", self.instance(), width, height);
        Ok(())
    }

    pub fn format(&self) -> Option<ImageFormat> {
        *self.format.lock()
    }

    fn check_buffers(&self, buffers: &[FrameBuffer]) -> Result<(), CamifError> {
        if buffers.len() > FRAMES_MAX {
            error!(
                "[CAMIF{}] {} buffers, at most {} supported",
                self.instance(),
                buffers.len(),
                FRAMES_MAX
            );
            return Err(CamifError::InvalidArgument);
        }
        if let Some(index) = buffers.iter().position(|b| !b.fits_32bit()) {
            error!(
                "[CAMIF{}] buffer {} is above the 32-bit DMA window: {:x?}",
                self.instance(),
                index,
                buffers[index].dvaddr
            );
            return Err(CamifError::InvalidArgument);
        }
        Ok(())
    }

    /// Replace the main buffer pool. Every buffer starts FREE.
    ///
    /// At most [`FRAMES_MAX`] buffers are accepted, each plane addressable by
    /// 32 bits.
    pub fn setup_buffers(&self, buffers: &[FrameBuffer]) -> Result<(), CamifError> {
        let _guard = self.stream_lock.lock();
        self.check_fatal()?;
        if self.state.is_streaming() {
            return Err(CamifError::Busy);
        }
        self.check_buffers(buffers)?;
        self.frames.setup(buffers);
        Ok(())
    }

    /// Hand buffer `index` to the channel (FREE → REQUEST).
    ///
    /// A streaming channel whose output went idle for lack of buffers is
    /// re-armed with it right away.
    pub fn enqueue(&self, index: usize) -> Result<(), CamifError> {
        self.check_opened()?;
        let mut q = self.frames.barrier();
        let frame = q
            .frame_mut(index)
            .ok_or(CamifError::UntrackedFrame { index })?;
        if frame.state != FrameState::Free {
            return Err(CamifError::InvalidFrameState { index });
        }
        frame.status = FrameStatus::Ok;
        frame.fcount = 0;
        q.trans(index, FrameState::Request)?;

        if self.state.is_streaming()
            && self.state.test(ChannelFlag::DmaEnable)
            && !self.buf.is_enabled(0)
        {
            if let Some(next) = q.peek(FrameState::Request) {
                let addr = q.frame(next).map_or(0, |f| f.dvaddr());
                self.buf.arm(&self.port, 0, addr);
                q.trans(next, FrameState::Process)?;
                debug!("[CAMIF{}] frame {} re-armed", self.instance(), next);
            }
        }
        Ok(())
    }

    /// Take back the oldest completed buffer (COMPLETE → FREE).
    pub fn dequeue(&self) -> Option<FrameInfo> {
        let mut q = self.frames.barrier();
        let index = q.trans_head(FrameState::Complete, FrameState::Free)?;
        q.frame(index).map(|f| f.info())
    }

    /// Give `vc` its ring of internal buffers.
    pub fn setup_vc_buffers(&self, vc: usize, buffers: &[FrameBuffer]) -> Result<(), CamifError> {
        let _guard = self.stream_lock.lock();
        self.check_fatal()?;
        if self.multibuf_depth == 0 {
            return Err(CamifError::Unsupported);
        }
        if ChannelFlag::multibuf(vc).is_none()
            || buffers.len() < MULTIBUF_MIN
            || buffers.len() > self.multibuf_depth
        {
            return Err(CamifError::InvalidArgument);
        }
        if self.state.is_streaming() {
            return Err(CamifError::Busy);
        }
        self.check_buffers(buffers)?;
        self.vc_frames[vc].setup(buffers);
        Ok(())
    }

    fn vc_manager(&self, vc: usize) -> Result<&FrameManager, CamifError> {
        ChannelFlag::multibuf(vc).ok_or(CamifError::InvalidArgument)?;
        self.vc_frames.get(vc).ok_or(CamifError::InvalidArgument)
    }

    /// Hand the completed VC frame captured at `fcount` to the caller
    /// (COMPLETE → FREE).
    pub fn vc_frame_by_fcount(&self, vc: usize, fcount: u32) -> Option<FrameInfo> {
        let mut q = self.vc_manager(vc).ok()?.barrier();
        let index = q.find(FrameState::Complete, |f| f.fcount == fcount)?;
        q.trans(index, FrameState::Free).ok()?;
        q.frame(index).map(|f| f.info())
    }

    /// Return a VC frame taken with [`Camif::vc_frame_by_fcount`] to the ring.
    pub fn vc_release(&self, vc: usize, index: usize) -> Result<(), CamifError> {
        let mut q = self.vc_manager(vc)?.barrier();
        let state = q
            .frame(index)
            .map(|f| f.state)
            .ok_or(CamifError::UntrackedFrame { index })?;
        if state != FrameState::Free {
            return Err(CamifError::InvalidFrameState { index });
        }
        q.trans(index, FrameState::Process)
    }

    pub fn vc_frames(&self, vc: usize) -> Option<&FrameManager> {
        self.vc_manager(vc).ok()
    }

    /// Hardware ring head of `vc`.
    pub fn vc_frameptr(&self, vc: usize) -> usize {
        self.buf.frameptr(&self.port, vc)
    }

    /// CSI error words accumulated since the last frame end.
    pub fn error_code(&self) -> [u32; CSI_VIRTUAL_CH_MAX] {
        core::array::from_fn(|vc| self.irq_ctx.error_id(vc))
    }

    /// Drain the deferred work scheduled by [`Camif::irq_handler`].
    ///
    /// Recoverable failures are logged and the drain continues. A fatal one
    /// latches the channel, stops the drain and is returned.
    pub fn run_deferred(&self) -> Result<(), CamifError> {
        let ctx = AtomicContext::new(&self.osal);
        self.tasklets.run(&self.osal, |work| match self.run_work(&ctx, work) {
            Err(e) if e.is_fatal() => {
                error!("[CAMIF{}] {:?} failed: {}", self.instance(), work, e);
                self.state.set(ChannelFlag::Fatal);
                Err(e)
            }
            Err(e) => {
                warn!("[CAMIF{}] {:?} failed: {}", self.instance(), work, e);
                Ok(())
            }
            Ok(()) => Ok(()),
        })
    }
}
