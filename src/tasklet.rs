//! Deferred work queue.
//!
//! The ISR schedules [`Work`] items here and the platform drains them from a
//! tasklet-like context through [`Tasklets::run`]. Each kind of work has one
//! slot: scheduling a kind that is already pending is dropped, and a drain
//! already in progress on another CPU makes a second drain a no-op. Items run
//! in the order they were scheduled. Nothing here allocates.

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::config::CSI_VIRTUAL_CH_MAX;
use crate::err::CamifError;
use crate::osal::IrqControl;

const NR_WORK_SLOTS: usize = 2 + CSI_VIRTUAL_CH_MAX;

/// A unit of deferred work with the fcount captured when it was scheduled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Work {
    FrameStart { fcount: u32 },
    FrameEnd { fcount: u32 },
    VcDmaEnd { vc: usize, fcount: u32 },
}

impl Work {
    fn slot(&self) -> usize {
        match *self {
            Work::FrameStart { .. } => 0,
            Work::FrameEnd { .. } => 1,
            Work::VcDmaEnd { vc, .. } => 2 + vc.min(CSI_VIRTUAL_CH_MAX - 1),
        }
    }
}

struct PendingRing {
    items: [Option<Work>; NR_WORK_SLOTS],
    head: usize,
    len: usize,
    scheduled: u32,
}

impl PendingRing {
    const fn new() -> Self {
        Self {
            items: [None; NR_WORK_SLOTS],
            head: 0,
            len: 0,
            scheduled: 0,
        }
    }

    fn push(&mut self, work: Work) -> bool {
        let bit = 1 << work.slot();
        if self.scheduled & bit != 0 || self.len == NR_WORK_SLOTS {
            return false;
        }
        self.items[(self.head + self.len) % NR_WORK_SLOTS] = Some(work);
        self.len += 1;
        self.scheduled |= bit;
        true
    }

    fn pop(&mut self) -> Option<Work> {
        if self.len == 0 {
            return None;
        }
        let work = self.items[self.head].take();
        self.head = (self.head + 1) % NR_WORK_SLOTS;
        self.len -= 1;
        if let Some(work) = work {
            self.scheduled &= !(1 << work.slot());
        }
        work
    }
}

pub struct Tasklets {
    pending: Mutex<PendingRing>,
    running: AtomicBool,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for Tasklets {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasklets {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(PendingRing::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Queue `work`; returns false if the same kind is still pending.
    pub fn schedule(&self, work: Work) -> bool {
        self.pending.lock().push(work)
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len
    }

    /// Drop everything pending.
    pub fn clear(&self) {
        *self.pending.lock() = PendingRing::new();
    }

    fn pop(&self, irq: &dyn IrqControl) -> Option<Work> {
        let flags = irq.irq_save();
        let next = self.pending.lock().pop();
        irq.irq_restore(flags);
        next
    }

    fn has_pending(&self, irq: &dyn IrqControl) -> bool {
        let flags = irq.irq_save();
        let len = self.pending.lock().len;
        irq.irq_restore(flags);
        len != 0
    }

    /// Run pending work until the queue is empty or `f` fails.
    ///
    /// A work item is released from its slot before it runs, so the ISR may
    /// schedule it again meanwhile. The queue lock is shared with the ISR and
    /// is only taken here with local interrupts masked.
    ///
    /// Work scheduled while another drain holds the queue is run by that
    /// drain, even when it arrives after the last item was taken.
    pub fn run(
        &self,
        irq: &dyn IrqControl,
        mut f: impl FnMut(Work) -> Result<(), CamifError>,
    ) -> Result<(), CamifError> {
        loop {
            if self.running.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            {
                let _guard = RunGuard(&self.running);
                while let Some(work) = self.pop(irq) {
                    f(work)?;
                }
            }
            if !self.has_pending(irq) {
                return Ok(());
            }
        }
    }
}
