//! Frame pool bookkeeping.
//!
//! A [`FrameManager`] owns the capture buffers of one channel and labels each
//! with a [`FrameState`]. Frames are never created or destroyed while a
//! stream runs, only moved between the per-state queues, so the per-state
//! counts always add up to the pool size and an index sits in exactly one
//! queue.
//!
//! All access goes through a [`FrameGuard`]. Process context takes it with
//! [`FrameManager::barrier`]; interrupt side work takes it through an
//! [`AtomicContext`], which also masks local interrupts for the duration of
//! the critical section.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

use crate::err::CamifError;
use crate::osal::{DmaAddr, IrqControl, IrqFlags};

pub const FIMC_IS_MAX_PLANES: usize = 4;

/// Largest pool a manager accepts.
pub const FRAMES_MAX: usize = 32;

const NR_FRAME_STATE: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameState {
    Free = 0,
    Request = 1,
    Process = 2,
    Complete = 3,
}

impl FrameState {
    pub const ALL: [FrameState; NR_FRAME_STATE] = [
        FrameState::Free,
        FrameState::Request,
        FrameState::Process,
        FrameState::Complete,
    ];

    fn name(self) -> &'static str {
        match self {
            FrameState::Free => "FREE",
            FrameState::Request => "REQUEST",
            FrameState::Process => "PROCESS",
            FrameState::Complete => "COMPLETE",
        }
    }
}

/// Outcome of a capture, handed back with the buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FrameStatus {
    #[default]
    Ok,
    Error,
    /// Captured, but the receiver flagged errors during the frame.
    Corrupted,
}

/// Addresses of a buffer supplied by the queue owner.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameBuffer {
    pub num_planes: usize,
    pub dvaddr: [DmaAddr; FIMC_IS_MAX_PLANES],
    pub kvaddr: [u64; FIMC_IS_MAX_PLANES],
}

impl FrameBuffer {
    pub fn single(dvaddr: DmaAddr) -> Self {
        let mut buf = Self {
            num_planes: 1,
            ..Default::default()
        };
        buf.dvaddr[0] = dvaddr;
        buf
    }

    /// Whether every plane is reachable through a 32-bit DMA address register.
    pub fn fits_32bit(&self) -> bool {
        self.dvaddr.iter().all(|&addr| u32::try_from(addr).is_ok())
    }
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub index: usize,
    pub state: FrameState,
    pub buffer: FrameBuffer,
    /// fcount stamped when the capture completed.
    pub fcount: u32,
    pub status: FrameStatus,
    /// Id of the manager that owns this frame.
    pub owner: u32,
}

impl Frame {
    /// Device address the hardware writes the first plane to.
    pub fn dvaddr(&self) -> DmaAddr {
        self.buffer.dvaddr[0]
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            index: self.index,
            fcount: self.fcount,
            dvaddr: self.dvaddr(),
            status: self.status,
        }
    }
}

/// Snapshot of a frame handed out of the lock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub index: usize,
    pub fcount: u32,
    pub dvaddr: DmaAddr,
    pub status: FrameStatus,
}

/// Frame indices taken out of a critical section, oldest first.
///
/// Holds up to [`FRAMES_MAX`] entries so it can be filled under an
/// interrupt-masking lock without allocating.
#[derive(Clone, Debug)]
pub struct FrameBatch {
    indices: [usize; FRAMES_MAX],
    len: usize,
}

impl FrameBatch {
    pub const fn new() -> Self {
        Self {
            indices: [0; FRAMES_MAX],
            len: 0,
        }
    }

    pub(crate) fn push(&mut self, index: usize) {
        if let Some(slot) = self.indices.get_mut(self.len) {
            *slot = index;
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices[..self.len].iter().copied()
    }
}

impl Default for FrameBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// The frame pool and its per-state queues.
pub struct FrameQueues {
    id: u32,
    frames: Vec<Frame>,
    queues: [VecDeque<usize>; NR_FRAME_STATE],
}

impl FrameQueues {
    fn new(id: u32) -> Self {
        Self {
            id,
            frames: Vec::new(),
            queues: Default::default(),
        }
    }

    /// Replace the pool; every frame starts FREE.
    ///
    /// Each queue reserves room for the whole pool so transitions never
    /// allocate.
    pub fn setup(&mut self, buffers: &[FrameBuffer]) {
        let n = buffers.len();
        self.frames = buffers
            .iter()
            .enumerate()
            .map(|(index, buffer)| Frame {
                index,
                state: FrameState::Free,
                buffer: *buffer,
                fcount: 0,
                status: FrameStatus::Ok,
                owner: self.id,
            })
            .collect();
        self.queues = Default::default();
        for queue in self.queues.iter_mut() {
            queue.reserve_exact(n);
        }
        self.queues[FrameState::Free as usize].extend(0..n);
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn total(&self) -> usize {
        self.frames.len()
    }

    pub fn queued_count(&self, state: FrameState) -> usize {
        self.queues[state as usize].len()
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frame_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    /// Head of the `state` queue.
    pub fn peek(&self, state: FrameState) -> Option<usize> {
        self.queues[state as usize].front().copied()
    }

    pub fn find(&self, state: FrameState, pred: impl Fn(&Frame) -> bool) -> Option<usize> {
        self.queues[state as usize]
            .iter()
            .copied()
            .find(|&index| self.frames.get(index).is_some_and(&pred))
    }

    /// Indices currently in `state`, head first.
    pub fn iter_state(&self, state: FrameState) -> impl Iterator<Item = usize> + '_ {
        self.queues[state as usize].iter().copied()
    }

    /// Move `index` from its current queue to the tail of `to`.
    pub fn trans(&mut self, index: usize, to: FrameState) -> Result<(), CamifError> {
        let Some(frame) = self.frames.get(index) else {
            warn!("[FRM{}] frame {} is not tracked", self.id, index);
            return Err(CamifError::UntrackedFrame { index });
        };
        let from = frame.state;
        let queue = &mut self.queues[from as usize];
        let Some(pos) = queue.iter().position(|&i| i == index) else {
            warn!(
                "[FRM{}] frame {} missing from {} queue",
                self.id,
                index,
                from.name()
            );
            return Err(CamifError::UntrackedFrame { index });
        };
        queue.remove(pos);
        self.queues[to as usize].push_back(index);
        if let Some(frame) = self.frames.get_mut(index) {
            frame.state = to;
        }
        Ok(())
    }

    /// Complete every frame in `from` with `status`, head first, recording
    /// each index in `batch`.
    pub fn flush(
        &mut self,
        from: FrameState,
        status: FrameStatus,
        batch: &mut FrameBatch,
    ) -> Result<(), CamifError> {
        while let Some(index) = self.peek(from) {
            if let Some(frame) = self.frames.get_mut(index) {
                frame.status = status;
            }
            self.trans(index, FrameState::Complete)?;
            batch.push(index);
        }
        Ok(())
    }

    /// Move the head of `from` to `to`, returning its index.
    pub fn trans_head(&mut self, from: FrameState, to: FrameState) -> Option<usize> {
        let index = self.peek(from)?;
        self.trans(index, to).ok()?;
        Some(index)
    }

    pub fn dump(&self) {
        for state in FrameState::ALL {
            debug!(
                "[FRM{}] {}({}): {:?}",
                self.id,
                state.name(),
                self.queued_count(state),
                self.queues[state as usize]
            );
        }
    }
}

/// Proof of running in interrupt-side context; the only way to take the
/// interrupt-masking lock.
pub struct AtomicContext<'a> {
    irq: &'a dyn IrqControl,
}

impl<'a> AtomicContext<'a> {
    pub(crate) fn new(irq: &'a dyn IrqControl) -> Self {
        Self { irq }
    }
}

/// Restores the interrupt state saved by [`FrameManager::barrier_irqs`].
struct IrqRestore<'a> {
    irq: &'a dyn IrqControl,
    flags: IrqFlags,
}

impl Drop for IrqRestore<'_> {
    fn drop(&mut self) {
        self.irq.irq_restore(self.flags);
    }
}

/// Exclusive access to a [`FrameQueues`]; releases the lock, then restores
/// interrupts if it masked them.
pub struct FrameGuard<'a> {
    // Fields drop in declaration order: the lock goes before the irq state.
    queues: MutexGuard<'a, FrameQueues>,
    _irq: Option<IrqRestore<'a>>,
}

impl Deref for FrameGuard<'_> {
    type Target = FrameQueues;

    fn deref(&self) -> &FrameQueues {
        &self.queues
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut FrameQueues {
        &mut self.queues
    }
}

pub struct FrameManager {
    id: u32,
    inner: Mutex<FrameQueues>,
}

impl FrameManager {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            inner: Mutex::new(FrameQueues::new(id)),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Lock from process context.
    pub fn barrier(&self) -> FrameGuard<'_> {
        FrameGuard {
            queues: self.inner.lock(),
            _irq: None,
        }
    }

    /// Lock from interrupt-side context with local interrupts masked.
    pub fn barrier_irqs<'a>(&'a self, ctx: &AtomicContext<'a>) -> FrameGuard<'a> {
        let flags = ctx.irq.irq_save();
        FrameGuard {
            queues: self.inner.lock(),
            _irq: Some(IrqRestore {
                irq: ctx.irq,
                flags,
            }),
        }
    }

    pub fn setup(&self, buffers: &[FrameBuffer]) {
        self.barrier().setup(buffers);
    }

    pub fn total(&self) -> usize {
        self.barrier().total()
    }

    pub fn queued_count(&self, state: FrameState) -> usize {
        self.barrier().queued_count(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    fn pool(n: usize) -> FrameManager {
        let mgr = FrameManager::new(0);
        let buffers: Vec<_> = (0..n)
            .map(|i| FrameBuffer::single(0x1000_0000 + (i as u64) * 0x10_0000))
            .collect();
        mgr.setup(&buffers);
        mgr
    }

    fn assert_consistent(q: &FrameQueues) {
        let sum: usize = FrameState::ALL.iter().map(|&s| q.queued_count(s)).sum();
        assert_eq!(sum, q.total());
        for index in 0..q.total() {
            let hits = FrameState::ALL
                .iter()
                .filter(|&&s| q.iter_state(s).any(|i| i == index))
                .count();
            assert_eq!(hits, 1, "frame {index} tracked {hits} times");
            let state = q.frame(index).map(|f| f.state);
            assert!(q.iter_state(state.unwrap()).any(|i| i == index));
        }
    }

    #[test]
    fn transitions_preserve_state_sum() {
        let mgr = pool(4);
        let mut q = mgr.barrier();
        assert_eq!(q.queued_count(FrameState::Free), 4);

        let steps = [
            (0, FrameState::Request),
            (1, FrameState::Request),
            (0, FrameState::Process),
            (2, FrameState::Request),
            (0, FrameState::Complete),
            (1, FrameState::Process),
            (0, FrameState::Free),
            (3, FrameState::Complete),
        ];
        for (index, to) in steps {
            q.trans(index, to).unwrap();
            assert_consistent(&q);
        }
        assert_eq!(q.peek(FrameState::Process), Some(1));
        assert_eq!(q.peek(FrameState::Request), Some(2));
    }

    #[test]
    fn peek_keeps_fifo_order() {
        let mgr = pool(3);
        let mut q = mgr.barrier();
        q.trans(2, FrameState::Request).unwrap();
        q.trans(0, FrameState::Request).unwrap();
        assert_eq!(q.peek(FrameState::Request), Some(2));
        assert_eq!(q.trans_head(FrameState::Request, FrameState::Process), Some(2));
        assert_eq!(q.peek(FrameState::Request), Some(0));
        assert_eq!(q.peek(FrameState::Complete), None);
    }

    #[test]
    fn untracked_frame_is_a_logged_noop() {
        let mgr = pool(2);
        let mut q = mgr.barrier();
        assert_eq!(
            q.trans(7, FrameState::Process),
            Err(CamifError::UntrackedFrame { index: 7 })
        );
        assert_eq!(q.queued_count(FrameState::Free), 2);
        assert_consistent(&q);
    }

    #[test]
    fn find_by_fcount() {
        let mgr = pool(4);
        let mut q = mgr.barrier();
        for (index, fcount) in [(0, 10), (1, 11), (2, 12)] {
            q.frame_mut(index).unwrap().fcount = fcount;
            q.trans(index, FrameState::Complete).unwrap();
        }
        assert_eq!(q.find(FrameState::Complete, |f| f.fcount == 11), Some(1));
        assert_eq!(q.find(FrameState::Complete, |f| f.fcount == 13), None);
        assert_eq!(q.find(FrameState::Free, |f| f.fcount == 0), Some(3));
    }

    #[test]
    fn setup_replaces_pool() {
        let mgr = pool(4);
        mgr.barrier().trans(1, FrameState::Request).unwrap();
        mgr.setup(&[FrameBuffer::single(0x10), FrameBuffer::single(0x20)]);
        let q = mgr.barrier();
        assert_eq!(q.total(), 2);
        assert_eq!(q.queued_count(FrameState::Free), 2);
        assert_eq!(q.frame(1).map(|f| f.dvaddr()), Some(0x20));
        assert_eq!(q.frame(1).map(|f| f.owner), Some(0));
    }

    struct CountingIrq {
        masked: Cell<usize>,
        saves: Cell<usize>,
    }

    impl IrqControl for CountingIrq {
        fn irq_save(&self) -> IrqFlags {
            self.saves.set(self.saves.get() + 1);
            let prev = self.masked.get();
            self.masked.set(prev + 1);
            prev
        }

        fn irq_restore(&self, flags: IrqFlags) {
            self.masked.set(flags);
        }
    }

    #[test]
    fn irq_barrier_masks_for_its_scope() {
        let irq = CountingIrq {
            masked: Cell::new(0),
            saves: Cell::new(0),
        };
        let ctx = AtomicContext::new(&irq);
        let mgr = pool(2);
        {
            let mut q = mgr.barrier_irqs(&ctx);
            assert_eq!(irq.masked.get(), 1);
            q.trans(0, FrameState::Request).unwrap();
        }
        assert_eq!(irq.masked.get(), 0);
        assert_eq!(irq.saves.get(), 1);

        drop(mgr.barrier());
        assert_eq!(irq.saves.get(), 1);
        assert_eq!(mgr.queued_count(FrameState::Request), 1);
    }

    struct UnlockCheck<'m> {
        mgr: &'m FrameManager,
        unlocked_on_restore: Cell<Option<bool>>,
    }

    impl IrqControl for UnlockCheck<'_> {
        fn irq_save(&self) -> IrqFlags {
            0
        }

        fn irq_restore(&self, _flags: IrqFlags) {
            self.unlocked_on_restore
                .set(Some(self.mgr.inner.try_lock().is_some()));
        }
    }

    #[test]
    fn irq_barrier_unlocks_before_restoring() {
        let mgr = pool(1);
        let irq = UnlockCheck {
            mgr: &mgr,
            unlocked_on_restore: Cell::new(None),
        };
        let ctx = AtomicContext::new(&irq);
        drop(mgr.barrier_irqs(&ctx));
        assert_eq!(irq.unlocked_on_restore.get(), Some(true));
    }

    #[test]
    fn flush_completes_queue_in_order() {
        let mgr = pool(4);
        let mut q = mgr.barrier();
        for index in [2, 0, 3] {
            q.trans(index, FrameState::Process).unwrap();
        }
        let mut batch = FrameBatch::new();
        q.flush(FrameState::Process, FrameStatus::Error, &mut batch)
            .unwrap();
        assert_eq!(batch.iter().collect::<Vec<_>>(), vec![2, 0, 3]);
        assert_eq!(q.queued_count(FrameState::Process), 0);
        assert_eq!(q.queued_count(FrameState::Complete), 3);
        assert!(q
            .iter_state(FrameState::Complete)
            .all(|i| q.frame(i).unwrap().status == FrameStatus::Error));
        assert_consistent(&q);
    }

    #[test]
    fn batch_stops_at_capacity() {
        let mut batch = FrameBatch::default();
        for index in 0..FRAMES_MAX + 3 {
            batch.push(index);
        }
        assert_eq!(batch.len(), FRAMES_MAX);
        assert_eq!(batch.iter().last(), Some(FRAMES_MAX - 1));
    }

    #[test]
    fn wide_addresses_do_not_fit() {
        assert!(FrameBuffer::single(0xffff_f000).fits_32bit());
        assert!(!FrameBuffer::single(0x1_0000_0000).fits_32bit());
    }
}
