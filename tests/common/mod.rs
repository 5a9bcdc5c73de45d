#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, Instant};

use camif::*;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Register file stand-in that records every access.
#[derive(Default)]
pub struct MockHw {
    status: AtomicU32,
    err_ids: Mutex<[u32; CSI_VIRTUAL_CH_MAX]>,
    regs: Mutex<HashMap<usize, u32>>,
    writes: Mutex<Vec<(usize, u32)>>,
    pub ops: AtomicUsize,
    pub resets: AtomicUsize,
    pub enables: AtomicUsize,
    pub disables: AtomicUsize,
    pub irq_mask: AtomicU32,
}

impl MockHw {
    /// Latch interrupt sources as pending.
    pub fn raise(&self, bits: u32) {
        self.status.fetch_or(bits, Ordering::SeqCst);
    }

    pub fn set_error_ids(&self, ids: [u32; CSI_VIRTUAL_CH_MAX]) {
        *self.err_ids.lock().unwrap() = ids;
    }

    /// Set a register as hardware would, without recording a write.
    pub fn poke(&self, offset: usize, value: u32) {
        self.regs.lock().unwrap().insert(offset, value);
    }

    pub fn reg(&self, offset: usize) -> u32 {
        self.regs.lock().unwrap().get(&offset).copied().unwrap_or(0)
    }

    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn ops(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }

    fn op(&self) {
        self.ops.fetch_add(1, Ordering::SeqCst);
    }
}

impl CamifHw for MockHw {
    fn read_status(&self) -> u32 {
        self.status.load(Ordering::SeqCst)
    }

    fn clear_status(&self, bits: u32) {
        self.op();
        self.status.fetch_and(!bits, Ordering::SeqCst);
    }

    fn read_error_ids(&self) -> [u32; CSI_VIRTUAL_CH_MAX] {
        std::mem::take(&mut *self.err_ids.lock().unwrap())
    }

    fn write_register(&self, offset: usize, value: u32) {
        self.op();
        self.writes.lock().unwrap().push((offset, value));
        self.regs.lock().unwrap().insert(offset, value);
    }

    fn read_register(&self, offset: usize) -> u32 {
        self.reg(offset)
    }

    fn reset(&self) {
        self.op();
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn enable(&self) {
        self.op();
        self.enables.fetch_add(1, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.op();
        self.disables.fetch_add(1, Ordering::SeqCst);
    }

    fn set_irq_mask(&self, mask: u32) {
        self.op();
        self.irq_mask.store(mask, Ordering::SeqCst);
    }
}

pub struct StdOsal {
    epoch: Instant,
    pub requested: Mutex<Vec<u32>>,
    pub freed: Mutex<Vec<u32>>,
    pub kicks: AtomicUsize,
    pub irq_saves: AtomicUsize,
    /// Makes `request_irq` fail.
    pub deny_irq: AtomicBool,
}

impl Default for StdOsal {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
            requested: Mutex::default(),
            freed: Mutex::default(),
            kicks: AtomicUsize::new(0),
            irq_saves: AtomicUsize::new(0),
            deny_irq: AtomicBool::new(false),
        }
    }
}

impl IrqControl for StdOsal {
    fn irq_save(&self) -> IrqFlags {
        self.irq_saves.fetch_add(1, Ordering::SeqCst);
        0
    }

    fn irq_restore(&self, _flags: IrqFlags) {}
}

impl Osal for StdOsal {
    fn get_time_us(&self) -> TimeStamp {
        self.epoch.elapsed().as_micros() as TimeStamp
    }

    fn msleep(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }

    fn request_irq(&self, irq: u32) -> Result<(), OsalError> {
        if self.deny_irq.load(Ordering::SeqCst) {
            return Err(OsalError::DeviceError);
        }
        self.requested.lock().unwrap().push(irq);
        Ok(())
    }

    fn free_irq(&self, irq: u32) {
        self.freed.lock().unwrap().push(irq);
    }

    fn kick_deferred(&self, _instance: u32) {
        self.kicks.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct Events(Mutex<Vec<CamifEvent>>);

impl Events {
    pub fn all(&self) -> Vec<CamifEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn frame_ends(&self) -> Vec<Option<FrameInfo>> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                CamifEvent::FrameEnd { frame, .. } => Some(frame),
                _ => None,
            })
            .collect()
    }

    pub fn frame_starts(&self) -> Vec<u32> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                CamifEvent::FrameStart { fcount } => Some(fcount),
                _ => None,
            })
            .collect()
    }
}

impl NotifySink for Events {
    fn notify(&self, _instance: u32, event: CamifEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct Done(Mutex<Vec<(usize, FrameStatus)>>);

impl Done {
    pub fn all(&self) -> Vec<(usize, FrameStatus)> {
        self.0.lock().unwrap().clone()
    }
}

impl BufferDone for Done {
    fn complete(&self, index: usize, status: FrameStatus) {
        self.0.lock().unwrap().push((index, status));
    }
}

type OnDone = Box<dyn Fn(&TestCamif, usize, FrameStatus) + Send + Sync>;

/// Buffer owner that calls back into the channel each time a buffer is
/// handed back, the way a queue owner may requeue from its done callback.
pub struct Reentrant {
    camif: OnceLock<Weak<TestCamif>>,
    on_done: OnDone,
    done: Arc<Done>,
}

impl BufferDone for Reentrant {
    fn complete(&self, index: usize, status: FrameStatus) {
        self.done.complete(index, status);
        if let Some(camif) = self.camif.get().and_then(Weak::upgrade) {
            (self.on_done)(&camif, index, status);
        }
    }
}

#[derive(Default)]
pub struct Trigger {
    pub waiter: AtomicBool,
    pub fcounts: Mutex<Vec<u32>>,
    pub triggered: AtomicUsize,
}

impl GroupTrigger for Trigger {
    fn has_waiter(&self) -> bool {
        self.waiter.load(Ordering::SeqCst)
    }

    fn set_sensor_fcount(&self, fcount: u32) {
        self.fcounts.lock().unwrap().push(fcount);
    }

    fn trigger(&self) {
        self.triggered.fetch_add(1, Ordering::SeqCst);
    }
}

pub type TestCamif = Camif<MockHw, StdOsal>;

pub struct Fixture {
    pub camif: Arc<TestCamif>,
    pub events: Arc<Events>,
    pub done: Arc<Done>,
}

pub const BUF_BASE: u64 = 0x1000_0000;

pub fn addr(index: usize) -> u64 {
    BUF_BASE + index as u64 * 0x10_0000
}

pub fn buffers(n: usize) -> Vec<FrameBuffer> {
    (0..n).map(|i| FrameBuffer::single(addr(i))).collect()
}

/// FLITE channel on a generation with a two-deep process queue.
pub fn flite() -> CamifConfig {
    CamifConfig::new(InterfaceKind::Flite, HwVersion::V4_3_0)
        .with_instance(0)
        .with_irq(42)
        .with_stop_timeout_ms(2000)
}

pub fn csi(version: HwVersion) -> CamifConfig {
    CamifConfig::new(InterfaceKind::Csi, version)
        .with_instance(1)
        .with_irq(43)
        .with_stop_timeout_ms(2000)
}

pub fn fixture(config: CamifConfig) -> Fixture {
    fixture_with(config, |c| c)
}

pub fn fixture_with(config: CamifConfig, wire: impl FnOnce(TestCamif) -> TestCamif) -> Fixture {
    init_logger();
    let events = Arc::new(Events::default());
    let done = Arc::new(Done::default());
    let camif = Camif::new(
        config,
        MockHw::default(),
        StdOsal::default(),
        events.clone(),
        done.clone(),
    )
    .unwrap();
    Fixture {
        camif: Arc::new(wire(camif)),
        events,
        done,
    }
}

/// Fixture whose buffer owner runs `on_done` for every returned buffer.
pub fn fixture_reentrant(
    config: CamifConfig,
    on_done: impl Fn(&TestCamif, usize, FrameStatus) + Send + Sync + 'static,
) -> Fixture {
    init_logger();
    let events = Arc::new(Events::default());
    let done = Arc::new(Done::default());
    let owner = Arc::new(Reentrant {
        camif: OnceLock::new(),
        on_done: Box::new(on_done),
        done: done.clone(),
    });
    let camif = Arc::new(
        Camif::new(
            config,
            MockHw::default(),
            StdOsal::default(),
            events.clone(),
            owner.clone(),
        )
        .unwrap(),
    );
    let _ = owner.camif.set(Arc::downgrade(&camif));
    Fixture { camif, events, done }
}

impl Fixture {
    pub fn hw(&self) -> &MockHw {
        self.camif.hw()
    }

    pub fn requested(&self) -> Vec<u32> {
        self.camif.osal().requested.lock().unwrap().clone()
    }

    /// Open, give the channel `total` buffers and enqueue the first `queued`.
    pub fn prepare(&self, total: usize, queued: usize) {
        self.camif.open().unwrap();
        self.camif.setup_buffers(&buffers(total)).unwrap();
        for index in 0..queued {
            self.camif.enqueue(index).unwrap();
        }
    }

    pub fn start(&self, total: usize, queued: usize) {
        self.prepare(total, queued);
        self.camif.stream(true, false).unwrap();
    }

    /// Run only the interrupt handler.
    pub fn irq(&self, bits: u32) {
        self.hw().raise(bits);
        self.camif.irq_handler();
    }

    /// Run the interrupt handler, then the deferred work it scheduled.
    pub fn deliver(&self, bits: u32) {
        self.irq(bits);
        self.camif.run_deferred().unwrap();
    }

    pub fn count(&self, state: FrameState) -> usize {
        self.camif.frames().queued_count(state)
    }

    pub fn state_of(&self, index: usize) -> FrameState {
        self.camif.frames().barrier().frame(index).unwrap().state
    }

    pub fn assert_state_sum(&self) {
        let q = self.camif.frames().barrier();
        let sum: usize = FrameState::ALL.iter().map(|&s| q.queued_count(s)).sum();
        assert_eq!(sum, q.total());
    }
}
