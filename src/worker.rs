//! Deferred frame workers.
//!
//! These run outside hard interrupt context, drained by
//! [`Camif::run_deferred`]. They move frames between states, re-arm the DMA
//! output and notify the next pipeline stage. Notifications are always sent
//! after the frame lock is released.

use crate::config::CSI_VIRTUAL_CH_MAX;
use crate::dma::{advance, previous};
use crate::err::CamifError;
use crate::framemgr::{
    AtomicContext, FrameBatch, FrameInfo, FrameQueues, FrameState, FrameStatus,
};
use crate::hal::CamifHw;
use crate::notify::CamifEvent;
use crate::osal::Osal;
use crate::registers::consts::CSIS_ERRORS;
use crate::state::ChannelFlag;
use crate::tasklet::Work;
use crate::Camif;

impl<H: CamifHw, O: Osal> Camif<H, O> {
    pub(crate) fn run_work(&self, ctx: &AtomicContext<'_>, work: Work) -> Result<(), CamifError> {
        if !self.state.is_streaming() {
            debug!("[CAMIF{}] {:?} after stream off, skipped", self.instance(), work);
            return Ok(());
        }
        match work {
            Work::FrameStart { fcount } => self.frame_start_work(ctx, fcount),
            Work::FrameEnd { fcount } => self.frame_end_work(ctx, fcount),
            Work::VcDmaEnd { vc, fcount } => self.vc_dma_end_work(ctx, vc, fcount),
        }
    }

    /// Stream went off after this work was dispatched. Checked under the
    /// frame lock; `stop` owns the remaining frames from then on.
    fn stopped(&self, what: &str) -> bool {
        if self.state.is_streaming() {
            return false;
        }
        debug!("[CAMIF{}] stream off during {}, skipped", self.instance(), what);
        true
    }

    fn trigger_group(&self, fcount: u32) {
        let Some(trigger) = &self.trigger else {
            return;
        };
        let target = fcount.wrapping_add(trigger.skip_shots());
        if trigger.has_waiter() {
            self.irq_ctx.clear_drop_print();
            trigger.set_sensor_fcount(target);
            trigger.trigger();
        } else {
            trigger.set_sensor_fcount(target);
            let cnt = self.irq_ctx.inc_drop_print();
            let interval = self.config.drop_log_interval.max(1);
            if cnt < interval || cnt % interval == 0 {
                info!(
                    "[CAMIF{}] group trigger dropped, fcount {} kept ({})",
                    self.instance(),
                    target,
                    cnt + 1
                );
            }
        }
    }

    fn frame_start_work(&self, ctx: &AtomicContext<'_>, fcount: u32) -> Result<(), CamifError> {
        if self.state.test(ChannelFlag::OtfWith3aa) {
            self.trigger_group(fcount);
        }

        if self.state.test(ChannelFlag::DmaEnable) {
            let mut q = self.frames.barrier_irqs(ctx);
            if self.stopped("frame start") {
                return Ok(());
            }
            let in_process = q.queued_count(FrameState::Process);
            if in_process < self.process_depth {
                match q.peek(FrameState::Request) {
                    Some(index) => {
                        let addr = q.frame(index).map_or(0, |f| f.dvaddr());
                        self.buf.arm(&self.port, 0, addr);
                        q.trans(index, FrameState::Process)?;
                    }
                    None => self.buf.disarm(&self.port, 0),
                }
            } else if self.process_depth > 1 {
                warn!(
                    "[CAMIF{}] {} frames already in process (fcount {})",
                    self.instance(),
                    in_process,
                    fcount
                );
            }
        }

        self.notify.notify(self.instance(), CamifEvent::FrameStart { fcount });
        Ok(())
    }

    fn complete_head(
        &self,
        q: &mut FrameQueues,
        fcount: u32,
        status: FrameStatus,
    ) -> Result<Option<FrameInfo>, CamifError> {
        let Some(index) = q.peek(FrameState::Process) else {
            return Ok(None);
        };
        if let Some(frame) = q.frame_mut(index) {
            frame.fcount = fcount;
            frame.status = status;
        }
        q.trans(index, FrameState::Complete)?;
        Ok(q.frame(index).map(|f| f.info()))
    }

    fn frame_end_work(&self, ctx: &AtomicContext<'_>, fcount: u32) -> Result<(), CamifError> {
        self.handle_errors(ctx, fcount)?;

        if self.port.unmask_overflow() {
            debug!("[CAMIF{}] overflow interrupt unmasked", self.instance());
        }

        let corrupted = self.state.test(ChannelFlag::BufErrVc0);
        let status = if corrupted {
            FrameStatus::Corrupted
        } else {
            FrameStatus::Ok
        };

        let mut completed = None;
        if self.state.test(ChannelFlag::DmaEnable) {
            let mut q = self.frames.barrier_irqs(ctx);
            if self.stopped("frame end") {
                return Ok(());
            }
            let armed = self.buf.is_enabled(0);
            if armed && self.process_depth > 1 {
                // The head is still being written until `process_depth`
                // frames are queued.
                if q.queued_count(FrameState::Process) == self.process_depth {
                    completed = self.complete_head(&mut q, fcount, status)?;
                    if completed.is_none() {
                        error!("[CAMIF{}] process queue empty at frame end", self.instance());
                        q.dump();
                        return Err(CamifError::ProcessQueueEmpty { fcount });
                    }
                }
            } else {
                completed = self.complete_head(&mut q, fcount, status)?;
                if completed.is_none() && armed {
                    error!("[CAMIF{}] armed but nothing in process", self.instance());
                    q.dump();
                    return Err(CamifError::ProcessQueueEmpty { fcount });
                }
                if completed.is_some() {
                    match q.peek(FrameState::Request) {
                        Some(index) => {
                            let addr = q.frame(index).map_or(0, |f| f.dvaddr());
                            self.buf.arm(&self.port, 0, addr);
                            q.trans(index, FrameState::Process)?;
                        }
                        None => {
                            warn!(
                                "[CAMIF{}] request queue empty (fcount {})",
                                self.instance(),
                                fcount
                            );
                            if armed {
                                self.buf.disarm(&self.port, 0);
                            }
                        }
                    }
                }
            }
        }

        self.notify.notify(
            self.instance(),
            CamifEvent::FrameEnd {
                fcount,
                frame: completed,
                corrupted,
            },
        );
        if corrupted {
            self.state.clear(ChannelFlag::BufErrVc0);
        }
        Ok(())
    }

    /// Report and recover from CSI errors gathered during the frame.
    fn handle_errors(&self, ctx: &AtomicContext<'_>, fcount: u32) -> Result<(), CamifError> {
        let ids = self.irq_ctx.take_errors();
        if ids.iter().all(|&id| id == 0) {
            self.irq_ctx.clear_error_count();
            return Ok(());
        }

        for (vc, &id) in ids.iter().enumerate() {
            if id == 0 {
                continue;
            }
            for &(bit, name) in CSIS_ERRORS.iter() {
                if id & bit != 0 {
                    error!("[CAMIF{}][VC{}] {} (fcount {})", self.instance(), vc, name, fcount);
                }
            }
            if let Some(flag) = ChannelFlag::buf_err(vc) {
                self.state.set(flag);
            }
        }

        if self.state.test(ChannelFlag::DmaEnable) {
            // Output stays idle until PROCESS is empty; both change in one
            // critical section.
            let mut flushed = FrameBatch::new();
            {
                let mut q = self.frames.barrier_irqs(ctx);
                if self.stopped("error recovery") {
                    return Ok(());
                }
                self.buf.disarm(&self.port, 0);
                while let Some(frame) = self.complete_head(&mut q, fcount, FrameStatus::Error)? {
                    flushed.push(frame.index);
                }
            }
            for index in flushed.iter() {
                self.done.complete(index, FrameStatus::Error);
            }
        }

        let error_count = self.irq_ctx.inc_error_count();
        if error_count >= self.config.error_count_threshold {
            error!(
                "[CAMIF{}] {} consecutive error frames, capture disabled",
                self.instance(),
                error_count
            );
            self.port.disable();
            self.state.set(ChannelFlag::DtpStop);
            self.notify
                .notify(self.instance(), CamifEvent::ErrorThreshold { error_count });
        }
        Ok(())
    }

    fn vc_dma_end_work(
        &self,
        ctx: &AtomicContext<'_>,
        vc: usize,
        fcount: u32,
    ) -> Result<(), CamifError> {
        let armed = ChannelFlag::multibuf(vc).is_some_and(|f| self.state.test(f));
        if !armed || vc >= CSI_VIRTUAL_CH_MAX {
            return Ok(());
        }

        let done = {
            let mut q = self.vc_frames[vc].barrier_irqs(ctx);
            if self.stopped("vc dma end") {
                return Ok(());
            }
            let n = q.total();
            if n == 0 {
                return Ok(());
            }
            let head = self.buf.frameptr(&self.port, vc) % n;
            let prev = previous(head, n, 1);

            let mut done = None;
            if q.frame(prev).is_some_and(|f| f.state == FrameState::Process) {
                if let Some(frame) = q.frame_mut(prev) {
                    frame.fcount = fcount;
                    frame.status = FrameStatus::Ok;
                }
                q.trans(prev, FrameState::Complete)?;
                done = Some(prev);
            } else {
                warn!(
                    "[CAMIF{}][VC{}] slot {} finished but was not in process",
                    self.instance(),
                    vc,
                    prev
                );
            }

            match q.frame(head).map(|f| f.state) {
                Some(FrameState::Complete) => q.trans(head, FrameState::Process)?,
                Some(FrameState::Free) => {
                    warn!(
                        "[CAMIF{}][VC{}] slot {} held by user, skipped",
                        self.instance(),
                        vc,
                        head
                    );
                    self.buf.set_frameptr(&self.port, vc, advance(head, n));
                }
                _ => {}
            }
            done
        };

        if let Some(index) = done {
            self.notify
                .notify(self.instance(), CamifEvent::VcFrameEnd { vc, index, fcount });
        }
        Ok(())
    }
}
