//! Interrupt sequencing.
//!
//! [`Camif::irq_handler`] decodes the status word, keeps `sw_checker` in
//! step with the hardware, counts frames and schedules the deferred workers.
//! It never blocks and never allocates.

use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use crate::config::CSI_VIRTUAL_CH_MAX;
use crate::hal::CamifHw;
use crate::osal::Osal;
use crate::registers::consts::{CSIS_ERR_LOST_FE_VC, CSIS_ERR_LOST_FS_VC};
use crate::registers::int::IrqStatus;
use crate::state::ChannelFlag;
use crate::tasklet::Work;
use crate::Camif;

/// The interrupt the sequencer expects next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SwChecker {
    ExpectFrameStart = 0,
    ExpectFrameEnd = 1,
}

/// Runtime counters shared by the ISR and the deferred workers.
#[derive(Debug, Default)]
pub struct InterruptContext {
    sw_checker: AtomicU8,
    fcount: AtomicU32,
    overflow_cnt: AtomicU32,
    overflow_reports: AtomicU32,
    lost_cnt: AtomicU32,
    error_id: [AtomicU32; CSI_VIRTUAL_CH_MAX],
    error_count: AtomicU32,
    drop_print_cnt: AtomicU32,
}

impl InterruptContext {
    pub fn reset(&self) {
        self.set_sw_checker(SwChecker::ExpectFrameStart);
        self.fcount.store(0, Ordering::Release);
        self.overflow_cnt.store(0, Ordering::Relaxed);
        self.overflow_reports.store(0, Ordering::Relaxed);
        self.lost_cnt.store(0, Ordering::Relaxed);
        for id in &self.error_id {
            id.store(0, Ordering::Relaxed);
        }
        self.error_count.store(0, Ordering::Relaxed);
        self.drop_print_cnt.store(0, Ordering::Relaxed);
    }

    pub fn sw_checker(&self) -> SwChecker {
        match self.sw_checker.load(Ordering::Acquire) {
            0 => SwChecker::ExpectFrameStart,
            _ => SwChecker::ExpectFrameEnd,
        }
    }

    fn set_sw_checker(&self, checker: SwChecker) {
        self.sw_checker.store(checker as u8, Ordering::Release);
    }

    pub fn fcount(&self) -> u32 {
        self.fcount.load(Ordering::Acquire)
    }

    fn inc_fcount(&self) -> u32 {
        self.fcount.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn overflow_cnt(&self) -> u32 {
        self.overflow_cnt.load(Ordering::Relaxed)
    }

    /// How many overflow log lines were emitted.
    pub fn overflow_reports(&self) -> u32 {
        self.overflow_reports.load(Ordering::Relaxed)
    }

    /// Interrupts skipped because the other kind was expected.
    pub fn lost_cnt(&self) -> u32 {
        self.lost_cnt.load(Ordering::Relaxed)
    }

    pub fn error_id(&self, vc: usize) -> u32 {
        self.error_id
            .get(vc)
            .map_or(0, |id| id.load(Ordering::Acquire))
    }

    pub(crate) fn accumulate_errors(&self, ids: &[u32; CSI_VIRTUAL_CH_MAX]) {
        for (acc, &id) in self.error_id.iter().zip(ids.iter()) {
            acc.fetch_or(id, Ordering::AcqRel);
        }
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.error_id.iter().any(|id| id.load(Ordering::Acquire) != 0)
    }

    pub(crate) fn take_errors(&self) -> [u32; CSI_VIRTUAL_CH_MAX] {
        let mut ids = [0; CSI_VIRTUAL_CH_MAX];
        for (out, acc) in ids.iter_mut().zip(self.error_id.iter()) {
            *out = acc.swap(0, Ordering::AcqRel);
        }
        ids
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_error_count(&self) -> u32 {
        self.error_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn clear_error_count(&self) {
        self.error_count.store(0, Ordering::Relaxed);
    }

    /// Count a dropped trigger; returns the count before this one.
    pub(crate) fn inc_drop_print(&self) -> u32 {
        self.drop_print_cnt.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn clear_drop_print(&self) {
        self.drop_print_cnt.store(0, Ordering::Relaxed);
    }
}

impl<H: CamifHw, O: Osal> Camif<H, O> {
    /// Interrupt entry for the channel's line.
    pub fn irq_handler(&self) {
        let raw = self.port.read_status();
        self.port.clear_status(raw);
        let status = IrqStatus::new(raw);
        let mut scheduled = false;

        if self.state.test(ChannelFlag::LastCapture) {
            if status.is_empty() {
                error!("[CAMIF{}] unintended interrupt after last capture", self.instance());
                self.port.reset();
            } else {
                info!(
                    "[CAMIF{}] interrupt after last capture (0x{:x})",
                    self.instance(),
                    raw
                );
            }
        } else {
            if status.error() {
                scheduled |= self.isr_errors();
            }

            let start = status.frame_start();
            let end = status.frame_end() || status.line();
            if start && end {
                warn!(
                    "[CAMIF{}] start/end overlapped (0x{:x}, fcount {})",
                    self.instance(),
                    raw,
                    self.irq_ctx.fcount()
                );
                scheduled |= self.isr_frame_end();
                scheduled |= self.isr_frame_start();
            } else if start {
                if self.irq_ctx.sw_checker() != SwChecker::ExpectFrameStart {
                    self.irq_ctx.lost_cnt.fetch_add(1, Ordering::Relaxed);
                    if self.config.variant().counts_lost_frames() {
                        self.irq_ctx.inc_fcount();
                    }
                    warn!(
                        "[CAMIF{}] lost end interrupt (fcount {})",
                        self.instance(),
                        self.irq_ctx.fcount()
                    );
                } else {
                    scheduled |= self.isr_frame_start();
                }
            } else if end {
                if self.irq_ctx.sw_checker() != SwChecker::ExpectFrameEnd {
                    self.irq_ctx.lost_cnt.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "[CAMIF{}] lost start interrupt (fcount {})",
                        self.instance(),
                        self.irq_ctx.fcount()
                    );
                } else {
                    scheduled |= self.isr_frame_end();
                }
            }

            for vc in 1..CSI_VIRTUAL_CH_MAX {
                let armed = ChannelFlag::multibuf(vc).is_some_and(|f| self.state.test(f));
                if status.dma_end(vc) && armed {
                    let fcount = self.irq_ctx.fcount();
                    scheduled |= self.schedule(Work::VcDmaEnd { vc, fcount });
                }
            }
        }

        if status.last_capture() {
            info!("[CAMIF{}] last capture", self.instance());
            self.state.set(ChannelFlag::LastCapture);
        }

        if status.overflow() {
            self.port.mask_overflow();
            let cnt = self.irq_ctx.overflow_cnt.fetch_add(1, Ordering::Relaxed);
            if cnt % self.config.overflow_log_interval.max(1) == 0 {
                self.irq_ctx.overflow_reports.fetch_add(1, Ordering::Relaxed);
                error!(
                    "[CAMIF{}] fifo overflow{}{}{} ({})",
                    self.instance(),
                    if status.overflow_y() { " Y" } else { "" },
                    if status.overflow_cb() { " CB" } else { "" },
                    if status.overflow_cr() { " CR" } else { "" },
                    cnt + 1
                );
            }
        }

        if scheduled {
            self.osal.kick_deferred(self.instance());
        }
    }

    fn schedule(&self, work: Work) -> bool {
        let queued = self.tasklets.schedule(work);
        if !queued {
            debug!("[CAMIF{}] {:?} still pending, dropped", self.instance(), work);
        }
        queued
    }

    fn isr_frame_start(&self) -> bool {
        self.irq_ctx.set_sw_checker(SwChecker::ExpectFrameEnd);
        let fcount = self.irq_ctx.inc_fcount();
        if self.state.test(ChannelFlag::JoinIschain) {
            if let Some(mailbox) = &self.mailbox {
                // Unready mailbox just means no companion is listening.
                let _ = mailbox.publish(self.config.sensor_position, fcount);
            }
        }
        self.schedule(Work::FrameStart { fcount })
    }

    fn isr_frame_end(&self) -> bool {
        self.irq_ctx.set_sw_checker(SwChecker::ExpectFrameStart);
        let fcount = self.irq_ctx.fcount();
        self.schedule(Work::FrameEnd { fcount })
    }

    /// Accumulate CSI error words. A lost start or end on VC0 is replayed so
    /// the frame bookkeeping stays aligned with the sensor.
    fn isr_errors(&self) -> bool {
        let ids = self.port.read_error_ids();
        if ids.iter().all(|&id| id == 0) {
            return false;
        }
        if !self.irq_ctx.has_errors() {
            self.buf.request_abort(&self.port);
        }
        self.irq_ctx.accumulate_errors(&ids);

        let mut scheduled = false;
        if ids[0] & CSIS_ERR_LOST_FE_VC != 0 {
            scheduled |= self.isr_frame_end();
            scheduled |= self.isr_frame_start();
        } else if ids[0] & CSIS_ERR_LOST_FS_VC != 0 {
            scheduled |= self.isr_frame_start();
            scheduled |= self.isr_frame_end();
        }
        scheduled
    }
}
