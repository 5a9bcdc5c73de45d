//! Stream on/off.

use crate::config::{CSI_VIRTUAL_CH_MAX, Downstream};
use crate::err::CamifError;
use crate::framemgr::{FrameBatch, FrameState, FrameStatus};
use crate::hal::CamifHw;
use crate::osal::Osal;
use crate::state::ChannelFlag;
use crate::Camif;

/// Time the hardware gets to settle after a forced disable.
const FORCE_STOP_SETTLE_MS: u32 = 200;

impl<H: CamifHw, O: Osal> Camif<H, O> {
    /// Start or stop capture.
    ///
    /// `nowait` only matters when stopping; see [`Camif::stop`].
    pub fn stream(&self, enable: bool, nowait: bool) -> Result<(), CamifError> {
        if enable { self.start() } else { self.stop(nowait) }
    }

    pub fn start(&self) -> Result<(), CamifError> {
        let _guard = self.stream_lock.lock();
        self.check_fatal()?;
        if !self.state.is_opened() {
            return Err(CamifError::NotOpened);
        }
        if self.state.is_streaming() {
            error!("[CAMIF{}] already started", self.instance());
            return Err(CamifError::AlreadyStarted);
        }

        self.irq_ctx.reset();
        self.tasklets.clear();
        self.state.clear(ChannelFlag::LastCapture);
        self.state.clear(ChannelFlag::DtpStop);
        self.state.clear_buf_errs();

        self.port.reset();

        let downstream = self.config.downstream;
        match downstream {
            Downstream::Otf => {
                self.state.set(ChannelFlag::JoinIschain);
                self.state.set(ChannelFlag::OtfWith3aa);
            }
            Downstream::Memory => {
                self.state.set(ChannelFlag::JoinIschain);
                self.state.clear(ChannelFlag::OtfWith3aa);
            }
            Downstream::None => {
                self.state.clear(ChannelFlag::JoinIschain);
                self.state.clear(ChannelFlag::OtfWith3aa);
            }
        }

        if self.state.test(ChannelFlag::DmaEnable) {
            self.buf.disarm(&self.port, 0);
            let mut q = self.frames.barrier();
            if let Some(index) = q.peek(FrameState::Request) {
                let addr = q.frame(index).map_or(0, |f| f.dvaddr());
                self.buf.arm(&self.port, 0, addr);
                q.trans(index, FrameState::Process)?;
            }
        }

        self.buf
            .set_otf(&self.port, self.state.test(ChannelFlag::OtfWith3aa));
        self.buf.set_path(&self.port, downstream);
        self.arm_multibuf()?;

        self.port.unmask_all_irqs();
        self.state.set(ChannelFlag::StartStream);
        self.port.enable();

        info!(
            "[CAMIF{}] stream on ({:?}, depth {})",
            self.instance(),
            downstream,
            self.process_depth
        );
        Ok(())
    }

    /// Stop capture.
    ///
    /// Without `nowait` this waits for the last-capture interrupt. On timeout
    /// the hardware is forced down and [`CamifError::Timeout`] is returned,
    /// but the channel is stopped and reusable either way. With `nowait` the
    /// hardware is reset immediately.
    ///
    /// Frames still in PROCESS or REQUEST are completed with
    /// [`FrameStatus::Error`] and handed back through `BufferDone`.
    pub fn stop(&self, nowait: bool) -> Result<(), CamifError> {
        let _guard = self.stream_lock.lock();
        // Cleared first: deferred work and enqueue re-check it under the
        // frame lock and never arm a stopped channel.
        if !self.state.test_and_clear(ChannelFlag::StartStream) {
            error!("[CAMIF{}] already stopped", self.instance());
            return Err(CamifError::AlreadyStopped);
        }

        {
            let _q = self.frames.barrier();
            self.buf.disarm(&self.port, 0);
        }
        self.buf.set_otf(&self.port, false);
        self.port.disable();

        let mut result = Ok(());
        if self.port.is_dummy() || nowait {
            self.port.reset();
            self.state.set(ChannelFlag::LastCapture);
        } else {
            result = self.wait_last_capture();
        }

        self.port.mask_all_irqs();
        self.flush_multibuf();
        self.drain();

        info!("[CAMIF{}] stream off", self.instance());
        result
    }

    fn wait_last_capture(&self) -> Result<(), CamifError> {
        let start = self.osal.get_time_us();
        let timeout_us = self.config.stop_timeout_ms.saturating_mul(1000);
        while !self.state.test(ChannelFlag::LastCapture) {
            if self.osal.timeout_check(start, timeout_us) {
                error!(
                    "[CAMIF{}] last capture timeout after {}ms, forcing stop",
                    self.instance(),
                    self.config.stop_timeout_ms
                );
                self.port.disable();
                self.state.set(ChannelFlag::LastCapture);
                self.osal.msleep(FORCE_STOP_SETTLE_MS);
                self.port.reset();
                return Err(CamifError::Timeout);
            }
            self.osal.msleep(1);
        }
        Ok(())
    }

    /// Complete every PROCESS, then REQUEST, frame with an error and return
    /// it to its owner.
    fn drain(&self) {
        let mut batch = FrameBatch::new();
        {
            let mut q = self.frames.barrier();
            for state in [FrameState::Process, FrameState::Request] {
                if let Err(e) = q.flush(state, FrameStatus::Error, &mut batch) {
                    error!("[CAMIF{}] drain stopped: {}", self.instance(), e);
                    q.dump();
                    break;
                }
            }
        }
        for index in batch.iter() {
            debug!("[CAMIF{}] frame {} drained", self.instance(), index);
            self.done.complete(index, FrameStatus::Error);
        }
    }

    fn arm_multibuf(&self) -> Result<(), CamifError> {
        for vc in 1..CSI_VIRTUAL_CH_MAX {
            let Some(flag) = ChannelFlag::multibuf(vc) else {
                continue;
            };
            let mut q = self.vc_frames[vc].barrier();
            if q.total() == 0 {
                continue;
            }
            for index in 0..q.total() {
                let addr = q.frame(index).map_or(0, |f| f.dvaddr());
                self.buf.arm_slot(&self.port, vc, index, addr);
                if q.frame(index).is_some_and(|f| f.state != FrameState::Process) {
                    q.trans(index, FrameState::Process)?;
                }
            }
            self.buf.enable_ring(&self.port, vc);
            self.state.set(flag);
            debug!(
                "[CAMIF{}][VC{}] {} buffers armed",
                self.instance(),
                vc,
                q.total()
            );
        }
        Ok(())
    }

    fn flush_multibuf(&self) {
        for vc in 1..CSI_VIRTUAL_CH_MAX {
            let Some(flag) = ChannelFlag::multibuf(vc) else {
                continue;
            };
            if !self.state.test_and_clear(flag) {
                continue;
            }
            self.buf.disarm(&self.port, vc);
            let mut q = self.vc_frames[vc].barrier();
            for index in 0..q.total() {
                if q.frame(index).is_some_and(|f| f.state != FrameState::Free) {
                    let _ = q.trans(index, FrameState::Free);
                }
            }
        }
    }
}
